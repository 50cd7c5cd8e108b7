//! Outbound messages and payload content helpers.

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use serde_json::Value;

use super::codec;
use super::header::{Header, CONTENT_TYPE_JSON, ENCODING_UTF8};
use crate::error::{Result, WireError};

/// Content-encoding tag used for opaque payloads.
pub const ENCODING_BINARY: &str = "binary";

/// Header fields plus payload, ready to be framed.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: Header,
    pub payload: Bytes,
}

impl Message {
    pub fn new(header: Header, payload: impl Into<Bytes>) -> Self {
        Self {
            header,
            payload: payload.into(),
        }
    }

    /// A `text/json` message encoded as UTF-8.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let payload = serde_json::to_vec(value)
            .map_err(|e| WireError::encoding(format!("json payload: {e}")))?;
        Ok(Self::new(
            Header::new(CONTENT_TYPE_JSON, ENCODING_UTF8),
            payload,
        ))
    }

    /// An opaque payload tagged with `content_type`.
    pub fn binary(content_type: &str, payload: impl Into<Bytes>) -> Self {
        Self::new(Header::new(content_type, ENCODING_BINARY), payload)
    }

    /// Append the framed message to `dst`.
    pub fn encode_into(self, dst: &mut BytesMut) -> Result<()> {
        codec::encode_into(self.header, &self.payload, dst)
    }
}

/// Decode a `text/json` payload using the header's content-encoding.
pub fn decode_json(header: &Header, payload: &[u8]) -> Result<Value> {
    if !header.is_json() {
        return Err(WireError::protocol(format!(
            "expected {CONTENT_TYPE_JSON}, got '{}'",
            header.content_type
        )));
    }
    if !header.content_encoding.eq_ignore_ascii_case(ENCODING_UTF8) {
        return Err(WireError::protocol(format!(
            "unsupported content-encoding '{}'",
            header.content_encoding
        )));
    }
    serde_json::from_slice(payload).map_err(|e| WireError::protocol(format!("json payload: {e}")))
}
