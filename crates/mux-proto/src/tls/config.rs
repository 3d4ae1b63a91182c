//! TLS configuration builders for QUIC server and client endpoints.
//!
//! Both builders enforce:
//! - TLS 1.3 only (required by QUIC)
//! - Ring crypto provider
//! - The `mux/1` ALPN identifier

use std::sync::Arc;

use rustls::RootCertStore;
use rustls_pki_types::CertificateDer;

use crate::error::{ProtoError, Result};
use crate::identity::SelfSignedIdentity;

/// ALPN protocol identifier for the mux stream framing.
pub const ALPN_MUX: &[u8] = b"mux/1";

/// Build a `rustls::ServerConfig` presenting `identity`.
pub fn build_server_tls_config(identity: &SelfSignedIdentity) -> Result<rustls::ServerConfig> {
    let cert_chain = vec![identity.certificate()];

    let mut config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_protocol_versions(&[&rustls::version::TLS13])
    .map_err(|e| ProtoError::TlsConfiguration(format!("TLS version config: {e}")))?
    .with_no_client_auth()
    .with_single_cert(cert_chain, identity.private_key())
    .map_err(|e| ProtoError::TlsConfiguration(format!("server cert config: {e}")))?;

    config.alpn_protocols = vec![ALPN_MUX.to_vec()];

    Ok(config)
}

/// Build a `rustls::ClientConfig` trusting exactly the given roots.
///
/// Pass the server's self-signed certificate for loopback deployments, or
/// a platform root set for public servers.
pub fn build_client_tls_config<I>(roots: I) -> Result<rustls::ClientConfig>
where
    I: IntoIterator<Item = CertificateDer<'static>>,
{
    let mut store = RootCertStore::empty();
    for root in roots {
        store
            .add(root)
            .map_err(|e| ProtoError::TlsConfiguration(format!("root certificate: {e}")))?;
    }

    let mut config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_protocol_versions(&[&rustls::version::TLS13])
    .map_err(|e| ProtoError::TlsConfiguration(format!("TLS version config: {e}")))?
    .with_root_certificates(store)
    .with_no_client_auth();

    config.alpn_protocols = vec![ALPN_MUX.to_vec()];

    Ok(config)
}
