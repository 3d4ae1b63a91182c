//! QUIC server endpoint.
//!
//! `ServerEndpoint` wraps a quinn server endpoint, binding to a local
//! address and accepting incoming connections.

use std::net::SocketAddr;
use std::sync::Arc;

use mux_proto::SelfSignedIdentity;
use mux_proto::error::code;
use mux_proto::tls::build_server_tls_config;
use tracing::info;

use crate::connection::ServerConnection;
use crate::error::{Result, ServerError};

/// A QUIC server endpoint that accepts mux connections.
pub struct ServerEndpoint {
    endpoint: quinn::Endpoint,
}

impl ServerEndpoint {
    /// Bind a QUIC server to the given address, presenting `identity`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(addr: SocketAddr, identity: &SelfSignedIdentity) -> Result<Self> {
        let rustls_config = build_server_tls_config(identity)?;

        let quic_server_config = quinn::crypto::rustls::QuicServerConfig::try_from(rustls_config)
            .map_err(|e| ServerError::TlsConfig(format!("rustls→quinn: {e}")))?;

        let server_config = quinn::ServerConfig::with_crypto(Arc::new(quic_server_config));

        let endpoint = quinn::Endpoint::server(server_config, addr)
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        info!(%addr, "server endpoint bound");

        Ok(Self { endpoint })
    }

    /// Accept the next incoming connection and complete its handshake.
    pub async fn accept(&self) -> Result<ServerConnection> {
        let incoming = self
            .endpoint
            .accept()
            .await
            .ok_or(ServerError::EndpointClosed)?;

        let connection = incoming.await?;

        info!(remote = %connection.remote_address(), "accepted connection");

        Ok(ServerConnection::new(connection))
    }

    /// Returns the local address this endpoint is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.endpoint
            .local_addr()
            .map_err(|e| ServerError::Bind(e.to_string()))
    }

    /// Close every connection and stop accepting new ones.
    pub fn close(&self) {
        self.endpoint.close(code::NO_ERROR.into(), b"shutdown");
    }
}
