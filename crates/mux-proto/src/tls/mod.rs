//! TLS configuration for QUIC connections.
//!
//! Provides the rustls config builders shared by `mux-client-core` and
//! `mux-server-core`.

pub mod config;

pub use config::{ALPN_MUX, build_client_tls_config, build_server_tls_config};
