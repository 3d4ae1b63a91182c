//! Error types for the mux wire protocol.
//!
//! Framing errors surface here; transport crates wrap [`ProtoError`] in
//! their own error enums at crate boundaries.

use thiserror::Error;

/// Errors that can occur within the `mux-proto` crate.
#[derive(Debug, Error)]
pub enum ProtoError {
    // --- Identity ---
    #[error("failed to generate self-signed certificate: {0}")]
    CertificateGeneration(String),

    // --- TLS ---
    #[error("TLS configuration error: {0}")]
    TlsConfiguration(String),

    // --- Framing ---
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("frame has no payload")]
    EmptyFrame,

    #[error("protobuf encode error: {0}")]
    ProtobufEncode(#[from] prost::EncodeError),

    #[error("protobuf decode error: {0}")]
    ProtobufDecode(#[from] prost::DecodeError),
}

/// Result type alias using [`ProtoError`].
pub type Result<T> = std::result::Result<T, ProtoError>;

/// Application error codes carried in QUIC `CONNECTION_CLOSE` / `RESET_STREAM`.
pub mod code {
    /// Orderly shutdown, no error.
    pub const NO_ERROR: u32 = 0x0;
    /// The peer is going away; in-flight work may be dropped.
    pub const GOAWAY: u32 = 0x1;
    /// The stream was cancelled by the local side.
    pub const CANCEL: u32 = 0x8;
    /// A frame could not be decoded.
    pub const FRAME_ERROR: u32 = 0x10;
}
