//! mux client-side request core.
//!
//! Issues request/response exchanges over a multiplexed stream transport:
//!
//! - [`SessionPool`]: one session per authority, single-flight connects,
//!   eviction on close, timeout, error or GOAWAY
//! - [`RequestExecutor`]: opens a stream, sends the body, and resolves with
//!   a buffered or streaming [`Response`]
//! - [`TimeoutGuard`]: per-request idle watchdog
//! - [`QuicConnector`]: the QUIC binding of the transport seam
//!   (see [`transport`])

pub mod authority;
pub mod body;
pub mod client;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod exchange;
pub mod executor;
pub mod pool;
pub mod request;
pub mod response;
pub mod session;
pub mod stream_io;
pub mod timeout;
pub mod transport;
mod upload;

#[cfg(test)]
mod mock;

pub use authority::Authority;
pub use body::{Body, BodySender, BodySource};
pub use client::Client;
pub use config::{ClientConfig, ResponseMode};
pub use connection::QuicSession;
pub use endpoint::{ConnectorConfig, QuicConnector};
pub use error::{ClientError, ErrorKind, Result};
pub use executor::RequestExecutor;
pub use pool::SessionPool;
pub use request::RequestParams;
pub use response::{BodyStream, Response, ResponseBody};
pub use session::{SessionFailure, SessionState};
pub use stream_io::{QuicSink, QuicStream};
pub use timeout::TimeoutGuard;
