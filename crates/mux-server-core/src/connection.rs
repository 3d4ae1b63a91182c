//! Accepted QUIC connection wrapper (server-side).

use std::net::SocketAddr;

use mux_proto::error::code;
use tracing::{debug, info};

use crate::error::{Result, ServerError};
use crate::stream_io::IncomingRequest;

/// One client connection. Cloning yields another handle to it.
#[derive(Clone)]
pub struct ServerConnection {
    inner: quinn::Connection,
}

impl ServerConnection {
    pub(crate) fn new(inner: quinn::Connection) -> Self {
        Self { inner }
    }

    /// Access the underlying quinn connection.
    pub fn inner(&self) -> &quinn::Connection {
        &self.inner
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_address()
    }

    /// Wait for the next request stream and read its headers.
    ///
    /// Returns `Ok(None)` once the connection has been closed by either
    /// side at the application level.
    pub async fn accept_request(&self) -> Result<Option<IncomingRequest>> {
        let (send, recv) = match self.inner.accept_bi().await {
            Ok(halves) => halves,
            Err(
                quinn::ConnectionError::ApplicationClosed(_) | quinn::ConnectionError::LocallyClosed,
            ) => return Ok(None),
            Err(e) => return Err(ServerError::Accept(e)),
        };

        let request = IncomingRequest::read_head(send, recv).await?;
        debug!(
            stream_id = request.stream_id(),
            headers = %request.headers(),
            "request received"
        );
        Ok(Some(request))
    }

    /// Tell the client this connection is going away and close it.
    ///
    /// The client evicts its session and reconnects on its next request.
    pub fn go_away(&self, error_code: u32) {
        info!(remote = %self.remote_addr(), error_code, "sending goaway");
        self.inner.close(error_code.into(), b"goaway");
    }

    /// Close with [`code::NO_ERROR`].
    pub fn close(&self) {
        self.inner.close(code::NO_ERROR.into(), b"close");
    }

    /// Wait until the connection has closed, for any reason.
    pub async fn closed(&self) -> quinn::ConnectionError {
        self.inner.closed().await
    }
}
