//! Request bodies.

use std::any::Any;
use std::fmt;
use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

use crate::error::{ClientError, Result};

/// Read size used when pulling from an [`AsyncRead`] source.
const READ_CHUNK: usize = 16 * 1024;

/// Request body.
///
/// Text and byte bodies are written in one piece; a [`BodySource`] is piped
/// chunk by chunk until exhausted.
pub enum Body {
    Text(String),
    Bytes(Bytes),
    Stream(BodySource),
}

impl Body {
    /// Convert a loosely-typed payload into a body.
    ///
    /// Accepts `String`, `&'static str`, `Vec<u8>`, `Bytes` and
    /// [`BodySource`]. Anything else is rejected with
    /// [`ClientError::InvalidBody`].
    pub fn from_any(value: Box<dyn Any + Send>) -> Result<Self> {
        let value = match value.downcast::<String>() {
            Ok(text) => return Ok(Body::Text(*text)),
            Err(value) => value,
        };
        let value = match value.downcast::<&'static str>() {
            Ok(text) => return Ok(Body::Text((*text).to_owned())),
            Err(value) => value,
        };
        let value = match value.downcast::<Vec<u8>>() {
            Ok(bytes) => return Ok(Body::Bytes(Bytes::from(*bytes))),
            Err(value) => value,
        };
        let value = match value.downcast::<Bytes>() {
            Ok(bytes) => return Ok(Body::Bytes(*bytes)),
            Err(value) => value,
        };
        match value.downcast::<BodySource>() {
            Ok(source) => Ok(Body::Stream(*source)),
            Err(_) => Err(ClientError::InvalidBody(
                "expected text, bytes or a byte-stream source".into(),
            )),
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Body::Stream(_))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            Body::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Body::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Text(s)
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_owned())
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(v))
    }
}

impl From<&[u8]> for Body {
    fn from(s: &[u8]) -> Self {
        Body::Bytes(Bytes::copy_from_slice(s))
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Body::Bytes(b)
    }
}

impl From<BodySource> for Body {
    fn from(source: BodySource) -> Self {
        Body::Stream(source)
    }
}

/// A live byte-stream request body.
pub struct BodySource {
    inner: Source,
}

enum Source {
    Channel(mpsc::Receiver<io::Result<Bytes>>),
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl BodySource {
    /// A body fed through the returned sender. The body ends when every
    /// sender has been dropped.
    pub fn channel(capacity: usize) -> (BodySender, BodySource) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            BodySender { tx },
            BodySource {
                inner: Source::Channel(rx),
            },
        )
    }

    /// A body read from `reader` until EOF.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            inner: Source::Reader(Box::new(reader)),
        }
    }

    /// Next chunk, or `None` once the source is exhausted.
    pub async fn next_chunk(&mut self) -> Option<io::Result<Bytes>> {
        match &mut self.inner {
            Source::Channel(rx) => rx.recv().await,
            Source::Reader(reader) => {
                let mut buf = BytesMut::with_capacity(READ_CHUNK);
                match reader.read_buf(&mut buf).await {
                    Ok(0) => None,
                    Ok(_) => Some(Ok(buf.freeze())),
                    Err(e) => Some(Err(e)),
                }
            }
        }
    }
}

/// Feeds a channel-backed [`BodySource`].
#[derive(Clone)]
pub struct BodySender {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl BodySender {
    /// Send one chunk. Fails if the request side has gone away.
    pub async fn send(&self, chunk: impl Into<Bytes>) -> io::Result<()> {
        self.tx
            .send(Ok(chunk.into()))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "request body closed"))
    }

    /// Abort the body with an error; the request fails.
    pub async fn abort(&self, err: io::Error) {
        let _ = self.tx.send(Err(err)).await;
    }
}
