//! The public request client.

use tracing::{debug, info};

use crate::authority::Authority;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::executor::RequestExecutor;
use crate::pool::SessionPool;
use crate::request::RequestParams;
use crate::response::Response;
use crate::transport::Connector;

/// Issues requests over pooled sessions, one session per authority.
///
/// All requests to the same authority share one session until it closes,
/// times out, errors, receives a GOAWAY or the client is destroyed. The
/// next request after any of those opens a fresh session.
///
/// ```ignore
/// let client = Client::new(QuicConnector::new(tls, ConnectorConfig::default())?);
/// let response = client
///     .request("https://127.0.0.1:4433", RequestParams::new().header(":path", "/"))
///     .await?;
/// println!("{}", response.text().await?);
/// client.destroy();
/// ```
pub struct Client<C: Connector> {
    executor: RequestExecutor<C>,
}

impl<C: Connector> Client<C> {
    pub fn new(connector: C) -> Self {
        Self::with_config(connector, ClientConfig::default())
    }

    pub fn with_config(connector: C, config: ClientConfig) -> Self {
        debug!(response_mode = ?config.response_mode, "client created");
        Self {
            executor: RequestExecutor::new(SessionPool::new(connector), config),
        }
    }

    /// Send one request to `authority`.
    ///
    /// Reuses the pooled session for `authority` or connects a new one.
    /// Fails with the session's failure if it never opens, with a stream
    /// failure if the request stream errors, and with a timeout if
    /// `params.timeout` elapses without stream activity before the
    /// response headers arrive.
    pub async fn request(
        &self,
        authority: impl Into<Authority>,
        params: RequestParams,
    ) -> Result<Response> {
        let authority = authority.into();
        self.executor.execute(&authority, params).await
    }

    /// Destroy every pooled session and clear the pool.
    ///
    /// Requests still waiting for a session fail with
    /// [`SessionFailure::Destroyed`](crate::SessionFailure::Destroyed);
    /// requests already streaming fail when their stream is torn down.
    /// Later requests open new sessions. Safe to call repeatedly.
    pub fn destroy(&self) {
        info!(sessions = self.executor.pool().len(), "destroying client sessions");
        self.executor.pool().destroy();
    }

    pub fn pool(&self) -> &SessionPool<C> {
        self.executor.pool()
    }

    pub fn config(&self) -> &ClientConfig {
        self.executor.config()
    }
}
