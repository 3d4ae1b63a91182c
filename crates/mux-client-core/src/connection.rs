//! QUIC connection wrapper (client-side).
//!
//! A `QuicSession` exists before its connection does: the connector hands
//! it out in the connecting state and attaches the `quinn::Connection` once
//! the handshake completes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use mux_proto::Headers;
use mux_proto::error::code;
use tokio::sync::Notify;
use tracing::debug;

use crate::authority::Authority;
use crate::event::StreamEvents;
use crate::stream_io::{self, QuicStream};
use crate::transport::{TransportError, TransportSession};

/// One pooled QUIC connection.
#[derive(Clone)]
pub struct QuicSession {
    shared: Arc<Shared>,
}

struct Shared {
    authority: Authority,
    connection: Mutex<Option<quinn::Connection>>,
    closed: AtomicBool,
    destroyed: Notify,
}

impl QuicSession {
    pub(crate) fn connecting(authority: Authority) -> Self {
        Self {
            shared: Arc::new(Shared {
                authority,
                connection: Mutex::new(None),
                closed: AtomicBool::new(false),
                destroyed: Notify::new(),
            }),
        }
    }

    pub fn authority(&self) -> &Authority {
        &self.shared.authority
    }

    /// The underlying connection, once established.
    pub fn inner(&self) -> Option<quinn::Connection> {
        self.shared
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install the established connection. Returns `false` if the session
    /// was destroyed while the handshake was in progress.
    pub(crate) fn attach(&self, connection: quinn::Connection) -> bool {
        let mut slot = self
            .shared
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.shared.closed.load(Ordering::SeqCst) {
            return false;
        }
        *slot = Some(connection);
        true
    }

    pub(crate) fn mark_closed(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }

    /// Resolves once [`TransportSession::destroy`] has been called.
    pub(crate) async fn destroyed(&self) {
        self.shared.destroyed.notified().await;
    }
}

impl TransportSession for QuicSession {
    type Stream = QuicStream;

    fn open_stream(&self, headers: &Headers) -> Result<(QuicStream, StreamEvents), TransportError> {
        if self.is_closed() {
            return Err(TransportError::NotConnected);
        }
        let connection = self.inner().ok_or(TransportError::NotConnected)?;
        Ok(stream_io::open(connection, headers.clone()))
    }

    fn destroy(&self) {
        let mut slot = self
            .shared
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.shared.closed.swap(true, Ordering::SeqCst) && slot.is_none() {
            return;
        }

        debug!(authority = %self.shared.authority, "destroying session");
        self.shared.destroyed.notify_one();
        if let Some(connection) = slot.take() {
            connection.close(code::NO_ERROR.into(), b"destroyed");
        }
    }

    fn is_closed(&self) -> bool {
        if self.shared.closed.load(Ordering::SeqCst) {
            return true;
        }
        self.inner()
            .is_some_and(|connection| connection.close_reason().is_some())
    }
}
