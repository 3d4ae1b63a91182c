//! Discrete transport notifications.
//!
//! Transports report everything that happens to a session or a stream as
//! one of these events, delivered in order over an unbounded channel. The
//! pool and the executor consume them through explicit transition
//! functions ([`SessionState::on_event`](crate::session::SessionState::on_event),
//! [`Exchange::on_event`](crate::exchange::Exchange::on_event)).

use bytes::Bytes;
use mux_proto::Headers;
use tokio::sync::mpsc;

use crate::transport::TransportError;

/// Session-level events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Handshake finished; streams may be opened.
    Connected,
    /// The session closed normally (locally or by reset).
    Closed,
    /// The transport failed.
    Errored(TransportError),
    /// The session idled out.
    TimedOut,
    /// The remote side is shutting the session down.
    GoAway { code: u64 },
}

impl SessionEvent {
    /// True for every event that ends the session.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionEvent::Connected)
    }
}

/// Stream-level events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The stream has been assigned an id and may be written.
    Ready { id: u64 },
    /// Response headers arrived.
    Response(Headers),
    /// A chunk of the response body.
    Data(Bytes),
    /// The remote finished its half of the stream.
    Ended,
    /// The stream failed.
    Errored(TransportError),
}

pub type SessionEvents = mpsc::UnboundedReceiver<SessionEvent>;
pub type StreamEvents = mpsc::UnboundedReceiver<StreamEvent>;
