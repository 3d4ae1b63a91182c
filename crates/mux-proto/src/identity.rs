//! Self-signed X.509 identities for loopback and test endpoints.
//!
//! A server endpoint needs a certificate for the QUIC TLS handshake. For
//! local deployments the server generates its own and hands the DER
//! certificate to clients, which add it to their root store.
//!
//! Reference: `rcgen` crate (rustls team, MIT/Apache-2.0)
//! <https://github.com/rustls/rcgen>

use rcgen::{CertificateParams, KeyPair};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

use crate::error::{ProtoError, Result};

/// A self-signed certificate and its private key.
pub struct SelfSignedIdentity {
    /// DER-encoded certificate bytes.
    cert_der: Vec<u8>,
    /// PEM-encoded certificate string.
    cert_pem: String,
    /// PKCS#8 DER-encoded private key.
    key_der: Vec<u8>,
}

impl SelfSignedIdentity {
    /// Generate a fresh ECDSA P-256 identity valid for the given names.
    ///
    /// Names that parse as IP addresses become IP SANs, the rest DNS SANs.
    pub fn generate<I, S>(subject_alt_names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = subject_alt_names.into_iter().map(Into::into).collect();

        let key_pair =
            KeyPair::generate().map_err(|e| ProtoError::CertificateGeneration(e.to_string()))?;

        let params = CertificateParams::new(names)
            .map_err(|e| ProtoError::CertificateGeneration(format!("invalid cert params: {e}")))?;

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| ProtoError::CertificateGeneration(e.to_string()))?;

        Ok(Self {
            cert_der: cert.der().to_vec(),
            cert_pem: cert.pem(),
            key_der: key_pair.serialize_der(),
        })
    }

    /// Identity valid for `localhost`, `127.0.0.1` and `::1`.
    pub fn localhost() -> Result<Self> {
        Self::generate(["localhost", "127.0.0.1", "::1"])
    }

    /// Returns the DER-encoded certificate bytes.
    pub fn der(&self) -> &[u8] {
        &self.cert_der
    }

    /// Returns the PEM-encoded certificate string.
    pub fn pem(&self) -> &str {
        &self.cert_pem
    }

    /// The certificate as a rustls certificate.
    pub fn certificate(&self) -> CertificateDer<'static> {
        CertificateDer::from(self.cert_der.clone())
    }

    /// The private key as a rustls key.
    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key_der.clone()))
    }
}
