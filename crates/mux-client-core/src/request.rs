//! Request parameters.

use std::any::Any;
use std::time::Duration;

use mux_proto::Headers;

use crate::body::Body;
use crate::config::ResponseMode;
use crate::error::Result;

/// Everything needed to issue one request on a session.
#[derive(Debug, Default)]
pub struct RequestParams {
    pub headers: Headers,
    pub body: Option<Body>,
    /// Idle timeout until response headers arrive.
    pub timeout: Option<Duration>,
    /// Overrides [`ClientConfig::response_mode`](crate::ClientConfig::response_mode).
    pub mode: Option<ResponseMode>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(mut self, headers: impl Into<Headers>) -> Self {
        self.headers = headers.into();
        self
    }

    /// Add a single header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the body from a loosely-typed payload.
    ///
    /// Fails immediately with [`ClientError::InvalidBody`](crate::ClientError::InvalidBody)
    /// if the payload is not text, bytes or a byte-stream source.
    pub fn try_body(mut self, body: Box<dyn Any + Send>) -> Result<Self> {
        self.body = Some(Body::from_any(body)?);
        Ok(self)
    }

    /// Fail the request if its stream stays idle this long before the
    /// response headers arrive. A zero duration disables the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn mode(mut self, mode: ResponseMode) -> Self {
        self.mode = Some(mode);
        self
    }
}
