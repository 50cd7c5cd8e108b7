//! Frame codec.
//!
//! Wire format:
//!
//! ```text
//! +----------------+----------------------+--------------------------+
//! | header len (2) | header (JSON, UTF-8) | payload (content-length) |
//! |   big-endian   |                      |                          |
//! +----------------+----------------------+--------------------------+
//! ```
//!
//! Decoding is split into three steps that each consume only bytes already
//! buffered. A step that lacks data returns `None` and leaves the buffer
//! untouched, so the caller simply retries after the next read.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::header::Header;
use crate::error::{Result, WireError};

/// Size of the big-endian header length prefix.
pub const LENGTH_PREFIX_LEN: usize = 2;

/// Largest header the length prefix can describe.
pub const MAX_HEADER_LEN: usize = u16::MAX as usize;

/// Encode a frame into a fresh buffer.
#[cfg(test)]
pub fn encode(header: Header, payload: &[u8]) -> Result<Bytes> {
    let mut out = BytesMut::new();
    encode_into(header, payload, &mut out)?;
    Ok(out.freeze())
}

/// Append an encoded frame to `dst`.
///
/// `content-length` is overwritten with the payload length, and extra keys
/// named like a required field are dropped. On error nothing is written
/// to `dst`.
pub fn encode_into(mut header: Header, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    header.strip_shadowing_fields();
    header.content_length = payload.len() as u64;
    let header_bytes = header.to_bytes()?;

    let header_len = u16::try_from(header_bytes.len()).map_err(|_| {
        WireError::encoding(format!(
            "header is {} bytes, limit is {}",
            header_bytes.len(),
            MAX_HEADER_LEN
        ))
    })?;

    dst.reserve(LENGTH_PREFIX_LEN + header_bytes.len() + payload.len());
    dst.put_u16(header_len);
    dst.extend_from_slice(&header_bytes);
    dst.extend_from_slice(payload);
    Ok(())
}

/// Consume the 2-byte header length prefix if it has arrived.
pub fn try_parse_frame_length(buf: &mut BytesMut) -> Option<usize> {
    if buf.len() < LENGTH_PREFIX_LEN {
        return None;
    }
    Some(buf.get_u16() as usize)
}

/// Consume and decode a header block of `frame_len` bytes if it has arrived.
///
/// A malformed block or one missing a required key is a protocol error.
pub fn try_parse_header(buf: &mut BytesMut, frame_len: usize) -> Result<Option<Header>> {
    if buf.len() < frame_len {
        return Ok(None);
    }
    let block = buf.split_to(frame_len);
    Header::from_bytes(&block).map(Some)
}

/// Consume the payload described by `header` if it has arrived.
pub fn try_parse_payload(buf: &mut BytesMut, header: &Header) -> Option<Bytes> {
    let len = usize::try_from(header.content_length).ok()?;
    if buf.len() < len {
        return None;
    }
    Some(buf.split_to(len).freeze())
}
