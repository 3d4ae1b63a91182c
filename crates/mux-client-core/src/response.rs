//! Responses and streaming response bodies.

use std::fmt;

use bytes::{Bytes, BytesMut};
use mux_proto::Headers;
use tokio::task::JoinHandle;

use crate::error::{ClientError, Result};
use crate::event::{StreamEvent, StreamEvents};
use crate::transport::{StreamHandle, TransportError};

/// A response: headers plus a buffered or live body.
#[derive(Debug)]
pub struct Response {
    headers: Headers,
    body: ResponseBody,
}

/// How the response body was delivered.
pub enum ResponseBody {
    /// Every byte has already been received.
    Buffered(Bytes),
    /// The caller consumes the rest of the stream.
    Streaming(BodyStream),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            ResponseBody::Streaming(stream) => f.debug_tuple("Streaming").field(stream).finish(),
        }
    }
}

impl Response {
    pub(crate) fn buffered(headers: Headers, body: Bytes) -> Self {
        Self {
            headers,
            body: ResponseBody::Buffered(body),
        }
    }

    pub(crate) fn streaming(headers: Headers, body: BodyStream) -> Self {
        Self {
            headers,
            body: ResponseBody::Streaming(body),
        }
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Get the first header value matching `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// The `:status` pseudo-header parsed as a number, if present.
    pub fn status(&self) -> Option<u16> {
        self.headers.get(":status").and_then(|s| s.parse().ok())
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, ResponseBody::Streaming(_))
    }

    pub fn into_parts(self) -> (Headers, ResponseBody) {
        (self.headers, self.body)
    }

    /// The live body, if this response was delivered in streaming mode.
    pub fn into_stream(self) -> Option<BodyStream> {
        match self.body {
            ResponseBody::Streaming(stream) => Some(stream),
            ResponseBody::Buffered(_) => None,
        }
    }

    /// The whole body, draining the stream first in streaming mode.
    pub async fn bytes(self) -> Result<Bytes> {
        match self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Streaming(mut stream) => stream.collect().await,
        }
    }

    /// The whole body as UTF-8 text.
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| ClientError::Stream(TransportError::Protocol(e.to_string())))
    }
}

/// A response body still arriving on its stream.
///
/// Owns the transport stream: dropping the handle before the body ends
/// closes the stream. A request body still uploading when the response
/// started keeps going in a task owned by this handle.
pub struct BodyStream {
    stream: Box<dyn StreamHandle>,
    events: StreamEvents,
    upload: Option<JoinHandle<()>>,
    finished: bool,
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyStream")
            .field("id", &self.stream.id())
            .field("finished", &self.finished)
            .field("uploading", &self.is_uploading())
            .finish()
    }
}

impl BodyStream {
    pub(crate) fn new(
        stream: Box<dyn StreamHandle>,
        events: StreamEvents,
        upload: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            stream,
            events,
            upload,
            finished: false,
        }
    }

    /// Yield the next body chunk, or `None` when the body is complete.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.finished {
            return Ok(None);
        }

        loop {
            match self.events.recv().await {
                Some(StreamEvent::Data(chunk)) => return Ok(Some(chunk)),
                Some(StreamEvent::Ended) => {
                    self.finished = true;
                    return Ok(None);
                }
                Some(StreamEvent::Errored(err)) => {
                    self.finished = true;
                    return Err(ClientError::Stream(err));
                }
                // Trailing header blocks are not surfaced.
                Some(StreamEvent::Response(_)) | Some(StreamEvent::Ready { .. }) => continue,
                None => {
                    self.finished = true;
                    return Err(ClientError::Stream(TransportError::StreamClosed));
                }
            }
        }
    }

    /// Drain the remaining body into one buffer.
    pub async fn collect(&mut self) -> Result<Bytes> {
        let mut body = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await? {
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    /// Abort the stream; no more chunks will be delivered.
    pub fn close(&mut self) {
        self.finished = true;
        self.stop_upload();
        self.stream.close();
    }

    /// True while the request body is still being sent.
    pub fn is_uploading(&self) -> bool {
        self.upload.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn stop_upload(&mut self) {
        if let Some(task) = self.upload.take() {
            task.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_closed()
    }

    /// True once the end of the body (or an error) has been observed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn stream_id(&self) -> Option<u64> {
        self.stream.id()
    }
}

impl Drop for BodyStream {
    fn drop(&mut self) {
        self.stop_upload();
        if !self.finished {
            self.stream.close();
        }
    }
}
