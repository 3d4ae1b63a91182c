//! The transport seam consumed by the pool and the executor.
//!
//! A [`Connector`] starts sessions, a [`TransportSession`] opens streams,
//! and a [`TransportStream`] carries one request. All three report progress
//! as events (see [`crate::event`]) rather than through callbacks, so the
//! core can be driven by a real QUIC binding or by a scripted mock alike.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use mux_proto::Headers;
use thiserror::Error;

use crate::authority::Authority;
use crate::event::{SessionEvents, StreamEvents};

/// Transport-level failures.
///
/// Carries strings rather than source errors so it can be cloned into
/// every waiter of a failed session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("could not resolve authority {0}")]
    Resolve(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("connection lost: {0}")]
    Connection(String),

    #[error("session is not connected")]
    NotConnected,

    #[error("stream closed")]
    StreamClosed,

    #[error("stream reset by peer (code {0})")]
    Reset(u64),

    #[error("stream I/O error: {0}")]
    StreamIo(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Starts sessions to authorities.
pub trait Connector: Send + Sync + 'static {
    type Session: TransportSession;

    /// Begin connecting to `authority`.
    ///
    /// Returns immediately with the session in its connecting state; the
    /// outcome is reported on the returned event channel (`Connected`, or a
    /// terminal event).
    fn connect(&self, authority: &Authority) -> (Self::Session, SessionEvents);
}

/// One live (or connecting) session.
pub trait TransportSession: Clone + Send + Sync + 'static {
    type Stream: TransportStream;

    /// Open a new stream carrying `headers`.
    fn open_stream(
        &self,
        headers: &Headers,
    ) -> Result<(Self::Stream, StreamEvents), TransportError>;

    /// Forcibly terminate the session and every stream on it.
    fn destroy(&self);

    fn is_closed(&self) -> bool;
}

/// Object-safe part of a stream, retained by a streaming response body.
pub trait StreamHandle: Send + 'static {
    /// The stream id, or `None` until the transport has assigned one.
    fn id(&self) -> Option<u64>;

    /// Abort the stream in both directions.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// One request stream.
pub trait TransportStream: StreamHandle + Sized {
    type Sink: StreamSink;

    /// Take the send half of the stream.
    ///
    /// Only the first call yields a working sink; later ones fail every
    /// write with [`TransportError::StreamClosed`].
    fn sink(&mut self) -> Self::Sink;
}

/// A write accepted by a [`StreamSink`], resolving once the transport took
/// the chunk. Independent of the sink that produced it.
pub type Written = Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send>>;

/// Send half of a request stream.
///
/// Dropping a sink that was never ended aborts the send direction.
pub trait StreamSink: Send + 'static {
    /// Queue `chunk` for sending.
    fn write(&mut self, chunk: Bytes) -> Written;

    /// Half-close: no more data will be written. The read side stays open.
    fn end(&mut self) -> Result<(), TransportError>;
}
