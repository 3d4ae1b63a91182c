//! Session lifecycle state machine.
//!
//! `Connecting → Open → Closed`. `Closed` is absorbing: once a session has
//! failed no later event can revive it.

use thiserror::Error;

use crate::event::SessionEvent;
use crate::transport::TransportError;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionFailure {
    #[error("session closed")]
    Closed,

    #[error("session timeout")]
    TimedOut,

    #[error("session goaway (code {code})")]
    GoAway { code: u64 },

    #[error("session error: {0}")]
    Errored(TransportError),

    #[error("session destroyed")]
    Destroyed,
}

/// Lifecycle state of a pooled session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed(SessionFailure),
}

impl SessionState {
    /// Apply one transport event.
    pub fn on_event(&self, event: SessionEvent) -> SessionState {
        match (self, event) {
            (SessionState::Closed(failure), _) => SessionState::Closed(failure.clone()),
            (_, SessionEvent::Connected) => SessionState::Open,
            (_, SessionEvent::Closed) => SessionState::Closed(SessionFailure::Closed),
            (_, SessionEvent::TimedOut) => SessionState::Closed(SessionFailure::TimedOut),
            (_, SessionEvent::GoAway { code }) => {
                SessionState::Closed(SessionFailure::GoAway { code })
            }
            (_, SessionEvent::Errored(err)) => SessionState::Closed(SessionFailure::Errored(err)),
        }
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, SessionState::Connecting)
    }

    pub fn is_open(&self) -> bool {
        matches!(self, SessionState::Open)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Closed(_))
    }
}
