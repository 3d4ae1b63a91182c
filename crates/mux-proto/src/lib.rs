//! mux wire protocol definitions.
//!
//! Shared protocol layer used by both `mux-client-core` and `mux-server-core`:
//!
//! - Frame messages (headers block + data) and their length-delimited codec
//! - The ordered [`Headers`] set
//! - TLS config builders and self-signed identities for QUIC endpoints

pub mod codec;
pub mod error;
pub mod headers;
pub mod identity;
pub mod tls;
pub mod wire;

pub use error::ProtoError;
pub use headers::Headers;
pub use identity::SelfSignedIdentity;
