//! Wire codec
//!
//! Frame layout: `[u32 length][u8 tag][body]` where `length` counts the tag
//! byte plus the body. The tag selects the concrete message type; an unknown
//! tag means the peer runs an incompatible protocol version and is treated as
//! fatal.

use crate::rpc::types::{MessageType, Request, Response};
use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

const LENGTH_FIELD_LEN: usize = 4;

/// Largest frame accepted by default (16 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("frame has no type tag")]
    EmptyFrame,

    #[error("malformed message body: {0}")]
    Body(#[from] serde_json::Error),
}

fn decode_frame(
    src: &mut BytesMut,
    max_frame_len: usize,
) -> Result<Option<(MessageType, BytesMut)>, CodecError> {
    if src.len() < LENGTH_FIELD_LEN {
        return Ok(None);
    }

    let mut length_bytes = [0u8; LENGTH_FIELD_LEN];
    length_bytes.copy_from_slice(&src[..LENGTH_FIELD_LEN]);
    let length = u32::from_be_bytes(length_bytes) as usize;

    if length == 0 {
        return Err(CodecError::EmptyFrame);
    }
    if length > max_frame_len {
        return Err(CodecError::FrameTooLarge {
            size: length,
            limit: max_frame_len,
        });
    }
    if src.len() < LENGTH_FIELD_LEN + length {
        src.reserve(LENGTH_FIELD_LEN + length - src.len());
        return Ok(None);
    }

    src.advance(LENGTH_FIELD_LEN);
    let tag = src.get_u8();
    let body = src.split_to(length - 1);

    match MessageType::from_tag(tag) {
        Some(message_type) => Ok(Some((message_type, body))),
        None => panic!("unsupported message type tag {}", tag),
    }
}

fn encode_frame(message_type: MessageType, body: &[u8], dst: &mut BytesMut) {
    dst.reserve(LENGTH_FIELD_LEN + 1 + body.len());
    dst.put_u32((body.len() + 1) as u32);
    dst.put_u8(message_type.tag());
    if !body.is_empty() {
        dst.put_slice(body);
    }
}

/// Server side: decodes requests, encodes responses.
#[derive(Debug, Clone)]
pub struct RequestCodec {
    max_frame_len: usize,
}

impl RequestCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }
}

impl Default for RequestCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl Decoder for RequestCodec {
    type Item = Request;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match decode_frame(src, self.max_frame_len)? {
            Some((message_type, body)) => Ok(Some(Request::decode(message_type, &body)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<Response> for RequestCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = item.encode_body()?;
        encode_frame(item.message_type(), &body, dst);
        Ok(())
    }
}

/// Client side: encodes requests, decodes responses.
#[derive(Debug, Clone)]
pub struct ResponseCodec {
    max_frame_len: usize,
}

impl ResponseCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }
}

impl Default for ResponseCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl Decoder for ResponseCodec {
    type Item = Response;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match decode_frame(src, self.max_frame_len)? {
            Some((message_type, body)) => Ok(Some(Response::decode(message_type, &body)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<Request> for ResponseCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = item.encode_body()?;
        encode_frame(item.message_type(), &body, dst);
        Ok(())
    }
}
