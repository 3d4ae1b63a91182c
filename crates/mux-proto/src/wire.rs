//! Frame messages carried on every bidirectional stream.
//!
//! A stream carries one `Headers` frame, zero or more `Data` frames, and is
//! terminated by the sender finishing its half of the stream. Messages are
//! declared with the prost derive macros directly rather than compiled from
//! a `.proto` file; the field tags below are the wire contract.

use bytes::Bytes;

use crate::headers::Headers;

/// A single header name/value pair.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HeaderField {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

/// An ordered block of header fields.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HeaderBlock {
    #[prost(message, repeated, tag = "1")]
    pub fields: Vec<HeaderField>,
}

/// One frame on a stream.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Frame {
    #[prost(oneof = "frame::Kind", tags = "1, 2")]
    pub kind: Option<frame::Kind>,
}

pub mod frame {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        Headers(super::HeaderBlock),
        #[prost(bytes = "bytes", tag = "2")]
        Data(bytes::Bytes),
    }
}

impl Frame {
    /// Build a headers frame.
    pub fn headers(headers: &Headers) -> Self {
        Frame {
            kind: Some(frame::Kind::Headers(HeaderBlock::from(headers))),
        }
    }

    /// Build a data frame.
    pub fn data(data: Bytes) -> Self {
        Frame {
            kind: Some(frame::Kind::Data(data)),
        }
    }
}
