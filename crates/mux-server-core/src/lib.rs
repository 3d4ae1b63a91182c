//! mux server-side transport core.
//!
//! The responding peer of the mux stream framing:
//!
//! - QUIC server endpoint (accepts connections via quinn)
//! - Per-connection request streams: read headers and body, answer with
//!   headers, data and FIN
//! - GOAWAY by application close

pub mod connection;
pub mod endpoint;
pub mod error;
pub mod stream_io;

pub use connection::ServerConnection;
pub use endpoint::ServerEndpoint;
pub use error::ServerError;
pub use stream_io::IncomingRequest;
