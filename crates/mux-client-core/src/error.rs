//! Error types for the client.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::session::SessionFailure;
use crate::transport::TransportError;

/// Errors surfaced to callers of [`Client::request`](crate::Client::request).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request body is not text, bytes or a byte-stream source.
    #[error("invalid body type: {0}")]
    InvalidBody(String),

    /// The session never opened, or closed underneath the request.
    #[error(transparent)]
    Session(#[from] SessionFailure),

    /// Transport-level error on this request's stream.
    #[error("stream failure: {0}")]
    Stream(#[from] TransportError),

    /// No response headers arrived within the idle timeout.
    #[error("Stream timed out because of no activity for {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("endpoint creation failed: {0}")]
    Endpoint(String),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] mux_proto::ProtoError),
}

/// Coarse classification of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidBody,
    Session,
    Stream,
    Timeout,
    Endpoint,
    TlsConfig,
    Protocol,
}

impl ErrorKind {
    /// Stable name callers can match on.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::InvalidBody => "InvalidBody",
            ErrorKind::Session => "SessionFailure",
            ErrorKind::Stream => "StreamFailure",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Endpoint => "EndpointError",
            ErrorKind::TlsConfig => "TlsConfigError",
            ErrorKind::Protocol => "ProtocolError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::InvalidBody(_) => ErrorKind::InvalidBody,
            ClientError::Session(_) => ErrorKind::Session,
            ClientError::Stream(_) => ErrorKind::Stream,
            ClientError::Timeout(_) => ErrorKind::Timeout,
            ClientError::Endpoint(_) => ErrorKind::Endpoint,
            ClientError::TlsConfig(_) => ErrorKind::TlsConfig,
            ClientError::Protocol(_) => ErrorKind::Protocol,
        }
    }

    /// Shorthand for `self.kind().name()`.
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
