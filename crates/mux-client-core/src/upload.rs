//! Request body transmission on a stream's send half.

use bytes::Bytes;

use crate::body::{Body, BodySource};
use crate::transport::{StreamSink, TransportError, Written};

/// Largest chunk handed to the sink in one write.
const UPLOAD_CHUNK: usize = 64 * 1024;

/// What one call to [`Upload::advance`] achieved.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Progress {
    /// A chunk was accepted by the transport.
    Sent,
    /// Everything was sent and the stream half-closed.
    Finished,
}

/// A request body on its way out, one write in flight at a time.
pub(crate) struct Upload<K: StreamSink> {
    sink: K,
    source: Option<BodySource>,
    pending: Bytes,
    in_flight: Option<Written>,
}

impl<K: StreamSink> Upload<K> {
    pub(crate) fn new(sink: K, body: Option<Body>) -> Self {
        let (source, pending) = match body {
            Some(Body::Stream(source)) => (Some(source), Bytes::new()),
            Some(Body::Text(text)) => (None, Bytes::from(text)),
            Some(Body::Bytes(bytes)) => (None, bytes),
            None => (None, Bytes::new()),
        };
        Self {
            sink,
            source,
            pending,
            in_flight: None,
        }
    }

    /// Wait for the in-flight write, or start the next one, or half-close.
    ///
    /// Cancel-safe: dropping the future keeps the in-flight write and any
    /// unsent bytes for the next call.
    pub(crate) async fn advance(&mut self) -> Result<Progress, TransportError> {
        loop {
            if let Some(write) = self.in_flight.as_mut() {
                let written = write.await;
                self.in_flight = None;
                written?;
                return Ok(Progress::Sent);
            }

            if !self.pending.is_empty() {
                let len = self.pending.len().min(UPLOAD_CHUNK);
                let chunk = self.pending.split_to(len);
                self.in_flight = Some(self.sink.write(chunk));
                continue;
            }

            let Some(source) = self.source.as_mut() else {
                self.sink.end()?;
                return Ok(Progress::Finished);
            };
            match source.next_chunk().await {
                Some(Ok(chunk)) => self.pending = chunk,
                Some(Err(err)) => return Err(TransportError::StreamIo(err.to_string())),
                None => self.source = None,
            }
        }
    }

    /// Drive the upload to completion.
    pub(crate) async fn finish(mut self) -> Result<(), TransportError> {
        while self.advance().await? != Progress::Finished {}
        Ok(())
    }
}
