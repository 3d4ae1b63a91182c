//! Client configuration.

use mux_proto::Headers;

/// How a response body is delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseMode {
    /// Collect the whole body before resolving.
    #[default]
    Buffered,
    /// Resolve as soon as headers arrive and hand over the live stream.
    Streaming,
    /// Stream when the response content-type mentions `stream`
    /// (e.g. `text/event-stream`, `application/octet-stream`), buffer
    /// otherwise.
    ContentType,
}

impl ResponseMode {
    /// Whether a response with `headers` should be delivered as a stream.
    pub fn streams(self, headers: &Headers) -> bool {
        match self {
            ResponseMode::Buffered => false,
            ResponseMode::Streaming => true,
            ResponseMode::ContentType => headers
                .content_type()
                .is_some_and(|ct| ct.contains("stream")),
        }
    }
}

/// Construction-time options for a [`Client`](crate::Client).
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Default response delivery; requests may override it.
    pub response_mode: ResponseMode,
}

impl ClientConfig {
    pub fn with_response_mode(mut self, mode: ResponseMode) -> Self {
        self.response_mode = mode;
        self
    }
}
