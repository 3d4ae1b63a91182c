//! Length-delimited frame codec for QUIC streams.
//!
//! Each [`Frame`] is preceded by a varint-encoded length prefix, the
//! standard prost framing format. Inbound bytes arrive in arbitrary chunks,
//! so [`FrameDecoder`] buffers until a complete frame is available.
//!
//! These functions are synchronous and work on byte slices. Async wrappers
//! that read/write quinn streams live in the transport crates.

use bytes::{Buf, Bytes, BytesMut};
use prost::Message;

use crate::error::{ProtoError, Result};
use crate::headers::Headers;
use crate::wire::{Frame, frame};

/// Maximum allowed frame size (1 MiB). Prevents unbounded allocation
/// from malformed length prefixes.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Outbound data is split into frames of at most this many payload bytes.
pub const MAX_DATA_CHUNK: usize = 16 * 1024;

/// Longest possible varint length prefix.
const MAX_VARINT_LEN: usize = 10;

/// Encode a protobuf message with a varint length prefix.
///
/// Returns the encoded bytes: `[varint length][protobuf payload]`.
pub fn encode_length_delimited<M: Message>(msg: &M) -> Result<Vec<u8>> {
    let payload_len = msg.encoded_len();
    let varint_len = prost::length_delimiter_len(payload_len);
    let mut buf = Vec::with_capacity(varint_len + payload_len);
    prost::encode_length_delimiter(payload_len, &mut buf)?;
    msg.encode(&mut buf)?;
    Ok(buf)
}

/// Try to decode a length-delimited protobuf message from a buffer.
///
/// Returns `Ok(Some((message, bytes_consumed)))` if a complete message is
/// available, `Ok(None)` if the buffer doesn't contain a complete message
/// yet (need more data), or `Err` on malformed data.
pub fn decode_length_delimited<M: Message + Default>(buf: &[u8]) -> Result<Option<(M, usize)>> {
    let mut cursor = buf;

    let payload_len = match prost::decode_length_delimiter(&mut cursor) {
        Ok(len) => len,
        Err(e) if buf.len() >= MAX_VARINT_LEN => return Err(e.into()),
        Err(_) => return Ok(None),
    };

    if payload_len > MAX_FRAME_SIZE {
        return Err(ProtoError::FrameTooLarge {
            size: payload_len,
            max: MAX_FRAME_SIZE,
        });
    }

    let varint_len = buf.len() - cursor.len();
    let total_needed = varint_len + payload_len;

    if buf.len() < total_needed {
        return Ok(None);
    }

    let msg = M::decode(&buf[varint_len..total_needed])?;
    Ok(Some((msg, total_needed)))
}

/// Encode a protobuf message with a varint length prefix into a `BytesMut`.
///
/// Useful for building up multiple messages in a single buffer.
pub fn encode_into<M: Message>(msg: &M, buf: &mut BytesMut) -> Result<()> {
    let payload_len = msg.encoded_len();
    let varint_len = prost::length_delimiter_len(payload_len);
    buf.reserve(varint_len + payload_len);
    prost::encode_length_delimiter(payload_len, buf)?;
    msg.encode(buf)?;
    Ok(())
}

/// Encode a headers frame.
pub fn encode_headers(headers: &Headers) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    encode_into(&Frame::headers(headers), &mut buf)?;
    Ok(buf.freeze())
}

/// Encode `data` as one or more data frames of at most [`MAX_DATA_CHUNK`]
/// payload bytes each. Empty input encodes to nothing.
pub fn encode_data(data: &Bytes) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + MAX_DATA_CHUNK).min(data.len());
        encode_into(&Frame::data(data.slice(offset..end)), &mut buf)?;
        offset = end;
    }
    Ok(buf.freeze())
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Headers(Headers),
    Data(Bytes),
}

/// Incremental decoder for a stream of length-delimited frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append inbound bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Decode the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Decoded>> {
        let Some((frame, consumed)) = decode_length_delimited::<Frame>(&self.buf)? else {
            return Ok(None);
        };
        self.buf.advance(consumed);

        match frame.kind {
            Some(frame::Kind::Headers(block)) => Ok(Some(Decoded::Headers(block.into()))),
            Some(frame::Kind::Data(data)) => Ok(Some(Decoded::Data(data))),
            None => Err(ProtoError::EmptyFrame),
        }
    }

    /// Bytes buffered but not yet forming a complete frame.
    ///
    /// Non-zero at end of stream means the peer truncated a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
