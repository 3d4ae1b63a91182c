//! Error types for the server transport layer.

use thiserror::Error;

/// Errors that can occur in the server transport.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("endpoint bind failed: {0}")]
    Bind(String),

    #[error("endpoint closed")]
    EndpointClosed,

    #[error("connection accept failed: {0}")]
    Accept(#[from] quinn::ConnectionError),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("stream I/O error: {0}")]
    StreamIo(String),

    #[error("request stream ended before its headers")]
    MissingHeaders,

    #[error("protocol error: {0}")]
    Protocol(#[from] mux_proto::ProtoError),
}

pub type Result<T> = std::result::Result<T, ServerError>;
