//! QUIC client endpoint.
//!
//! `QuicConnector` wraps a quinn client endpoint and implements
//! [`Connector`]: each `connect` spawns a driver task that resolves the
//! authority, performs the handshake and then reports how the connection
//! ended.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mux_proto::error::code;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::authority::Authority;
use crate::connection::QuicSession;
use crate::error::{ClientError, Result};
use crate::event::{SessionEvent, SessionEvents};
use crate::transport::{Connector, TransportError};

/// Port used when an authority does not name one.
const DEFAULT_PORT: u16 = 443;

/// Options for the client endpoint.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Local address to bind the UDP socket to.
    pub bind_addr: SocketAddr,
    /// Close a connection after this long without activity.
    pub idle_timeout: Option<Duration>,
    /// Send keep-alive packets at this interval.
    pub keep_alive: Option<Duration>,
    /// Overrides the TLS server name derived from the authority host.
    pub server_name: Option<String>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            idle_timeout: Some(Duration::from_secs(30)),
            keep_alive: None,
            server_name: None,
        }
    }
}

impl ConnectorConfig {
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_keep_alive(mut self, interval: Option<Duration>) -> Self {
        self.keep_alive = interval;
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }
}

/// A QUIC client endpoint that opens one connection per session.
pub struct QuicConnector {
    endpoint: quinn::Endpoint,
    server_name: Option<String>,
}

impl QuicConnector {
    /// Create a client endpoint bound to `config.bind_addr`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(tls: rustls::ClientConfig, config: ConnectorConfig) -> Result<Self> {
        let quic_client_config = quinn::crypto::rustls::QuicClientConfig::try_from(tls)
            .map_err(|e| ClientError::TlsConfig(format!("rustls→quinn: {e}")))?;

        let mut transport = quinn::TransportConfig::default();
        let idle_timeout = config
            .idle_timeout
            .map(quinn::IdleTimeout::try_from)
            .transpose()
            .map_err(|e| ClientError::Endpoint(format!("idle timeout: {e}")))?;
        transport.max_idle_timeout(idle_timeout);
        transport.keep_alive_interval(config.keep_alive);

        let mut client_config = quinn::ClientConfig::new(Arc::new(quic_client_config));
        client_config.transport_config(Arc::new(transport));

        let mut endpoint = quinn::Endpoint::client(config.bind_addr)
            .map_err(|e| ClientError::Endpoint(e.to_string()))?;
        endpoint.set_default_client_config(client_config);

        info!(bind = %config.bind_addr, "client endpoint created");

        Ok(Self {
            endpoint,
            server_name: config.server_name,
        })
    }

    /// Returns the local address this endpoint is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.endpoint
            .local_addr()
            .map_err(|e| ClientError::Endpoint(e.to_string()))
    }

    /// Close every connection on this endpoint.
    pub fn close(&self) {
        self.endpoint.close(code::NO_ERROR.into(), b"shutdown");
    }
}

impl Connector for QuicConnector {
    type Session = QuicSession;

    fn connect(&self, authority: &Authority) -> (QuicSession, SessionEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = QuicSession::connecting(authority.clone());

        tokio::spawn(drive_connection(
            self.endpoint.clone(),
            self.server_name.clone(),
            authority.clone(),
            session.clone(),
            tx,
        ));

        (session, rx)
    }
}

/// Establish the connection, then wait for it to end.
async fn drive_connection(
    endpoint: quinn::Endpoint,
    server_name: Option<String>,
    authority: Authority,
    session: QuicSession,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let established = tokio::select! {
        result = establish(&endpoint, server_name.as_deref(), &authority) => result,
        () = session.destroyed() => {
            debug!(%authority, "connect aborted");
            let _ = events.send(SessionEvent::Closed);
            return;
        }
    };

    let connection = match established {
        Ok(connection) => connection,
        Err(err) => {
            warn!(%authority, error = %err, "connect failed");
            session.mark_closed();
            let _ = events.send(SessionEvent::Errored(err));
            return;
        }
    };

    if !session.attach(connection.clone()) {
        connection.close(code::NO_ERROR.into(), b"destroyed");
        let _ = events.send(SessionEvent::Closed);
        return;
    }

    info!(%authority, remote = %connection.remote_address(), "connected");
    let _ = events.send(SessionEvent::Connected);

    let reason = connection.closed().await;
    debug!(%authority, %reason, "connection ended");
    let _ = events.send(close_event(reason));
}

async fn establish(
    endpoint: &quinn::Endpoint,
    server_name: Option<&str>,
    authority: &Authority,
) -> std::result::Result<quinn::Connection, TransportError> {
    let (host, port) = split_authority(authority.as_str())
        .ok_or_else(|| TransportError::Resolve(authority.to_string()))?;

    let prefer_v6 = endpoint
        .local_addr()
        .map(|addr| addr.is_ipv6())
        .unwrap_or(false);
    let addr = resolve(host, port, prefer_v6).await?;

    debug!(%authority, %addr, "connecting");
    let connecting = endpoint
        .connect(addr, server_name.unwrap_or(host))
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    connecting
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))
}

async fn resolve(
    host: &str,
    port: u16,
    prefer_v6: bool,
) -> std::result::Result<SocketAddr, TransportError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| TransportError::Resolve(format!("{host}: {e}")))?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv6() == prefer_v6)
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| TransportError::Resolve(format!("{host}: no addresses")))
}

/// Split `[scheme://]host[:port][/path]` into host and port.
///
/// IPv6 literals must be bracketed; the brackets are stripped.
fn split_authority(authority: &str) -> Option<(&str, u16)> {
    let rest = authority
        .split_once("://")
        .map_or(authority, |(_, rest)| rest);
    let rest = rest.split('/').next().unwrap_or(rest);

    if let Some(bracketed) = rest.strip_prefix('[') {
        let (host, tail) = bracketed.split_once(']')?;
        let port = match tail.strip_prefix(':') {
            Some(port) => port.parse().ok()?,
            None if tail.is_empty() => DEFAULT_PORT,
            None => return None,
        };
        return (!host.is_empty()).then_some((host, port));
    }

    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().ok()?),
        None => (rest, DEFAULT_PORT),
    };
    (!host.is_empty()).then_some((host, port))
}

/// Map how a connection ended onto a session event.
fn close_event(reason: quinn::ConnectionError) -> SessionEvent {
    use quinn::ConnectionError as E;

    match reason {
        E::ApplicationClosed(close) => SessionEvent::GoAway {
            code: close.error_code.into_inner(),
        },
        E::TimedOut => SessionEvent::TimedOut,
        E::LocallyClosed | E::Reset => SessionEvent::Closed,
        other => SessionEvent::Errored(TransportError::Connection(other.to_string())),
    }
}
