//! Server side of one request stream.
//!
//! The client sends a headers frame, data frames and FIN; the server
//! answers the same way. Trailing header frames from the client are read
//! past and dropped.

use bytes::{Bytes, BytesMut};
use mux_proto::Headers;
use mux_proto::codec::{self, Decoded, FrameDecoder};
use quinn::{RecvStream, SendStream};

use crate::error::{Result, ServerError};

/// Largest chunk pulled from the receive side at once.
const READ_CHUNK: usize = 64 * 1024;

/// An accepted request stream.
pub struct IncomingRequest {
    send: SendStream,
    recv: RecvStream,
    decoder: FrameDecoder,
    headers: Headers,
    /// FIN has been received.
    recv_done: bool,
}

impl IncomingRequest {
    /// Read until the request headers frame has been decoded.
    pub(crate) async fn read_head(send: SendStream, recv: RecvStream) -> Result<Self> {
        let mut request = Self {
            send,
            recv,
            decoder: FrameDecoder::new(),
            headers: Headers::new(),
            recv_done: false,
        };

        loop {
            match request.decoder.next_frame()? {
                Some(Decoded::Headers(headers)) => {
                    request.headers = headers;
                    return Ok(request);
                }
                Some(Decoded::Data(_)) => {
                    return Err(ServerError::StreamIo("data frame before headers".into()));
                }
                None => {
                    if !request.fill().await? {
                        return Err(ServerError::MissingHeaders);
                    }
                }
            }
        }
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn stream_id(&self) -> u64 {
        self.send.id().index()
    }

    /// Next request body chunk, or `None` once the client half-closed.
    pub async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.decoder.next_frame()? {
                Some(Decoded::Data(data)) => return Ok(Some(data)),
                Some(Decoded::Headers(_)) => continue,
                None => {
                    if !self.fill().await? {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Read the whole request body.
    pub async fn read_body(&mut self) -> Result<Bytes> {
        let mut body = BytesMut::new();
        while let Some(chunk) = self.read_chunk().await? {
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    /// Send the response headers frame.
    pub async fn send_headers(&mut self, headers: &Headers) -> Result<()> {
        let frame = codec::encode_headers(headers)?;
        self.write(&frame).await
    }

    /// Send a chunk of the response body.
    pub async fn send_data(&mut self, data: impl Into<Bytes>) -> Result<()> {
        let frames = codec::encode_data(&data.into())?;
        self.write(&frames).await
    }

    /// Half-close: the response is complete.
    pub fn finish(&mut self) -> Result<()> {
        self.send
            .finish()
            .map_err(|e| ServerError::StreamIo(format!("finish: {e}")))
    }

    /// Abort the response with `error_code`.
    pub fn reset(&mut self, error_code: u32) -> Result<()> {
        self.send
            .reset(error_code.into())
            .map_err(|e| ServerError::StreamIo(format!("reset: {e}")))
    }

    /// Wait until the client stops reading, returning its error code.
    ///
    /// Resolves with `None` if the stream finished normally.
    pub async fn stopped(&mut self) -> Result<Option<u64>> {
        self.send
            .stopped()
            .await
            .map(|code| code.map(|c| c.into_inner()))
            .map_err(|e| ServerError::StreamIo(format!("stopped: {e}")))
    }

    async fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.send
            .write_all(buf)
            .await
            .map_err(|e| ServerError::StreamIo(format!("write: {e}")))
    }

    /// Pull more bytes into the decoder. Returns `false` at end of stream.
    async fn fill(&mut self) -> Result<bool> {
        if self.recv_done {
            return Ok(false);
        }

        match self.recv.read_chunk(READ_CHUNK, true).await {
            Ok(Some(chunk)) => {
                self.decoder.extend(&chunk.bytes);
                Ok(true)
            }
            Ok(None) => {
                self.recv_done = true;
                if self.decoder.pending() > 0 {
                    return Err(ServerError::StreamIo(format!(
                        "stream ended inside a frame ({} bytes pending)",
                        self.decoder.pending()
                    )));
                }
                Ok(false)
            }
            Err(e) => Err(ServerError::StreamIo(format!("read: {e}"))),
        }
    }
}
