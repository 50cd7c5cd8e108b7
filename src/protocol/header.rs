//! Frame header: a self-describing JSON object.
//!
//! ```text
//! {"byteorder": "little", "content-type": "text/json",
//!  "content-encoding": "utf-8", "content-length": 18}
//! ```
//!
//! Keys beyond the four required ones are carried through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, WireError};

/// Keys every inbound header must carry.
pub const REQUIRED_FIELDS: [&str; 4] = [
    "byteorder",
    "content-type",
    "content-encoding",
    "content-length",
];

/// Content type for JSON payloads.
pub const CONTENT_TYPE_JSON: &str = "text/json";

/// The only text encoding accepted for JSON payloads.
pub const ENCODING_UTF8: &str = "utf-8";

/// Decoded frame header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Sender's native byte order, informational only.
    #[serde(rename = "byteorder")]
    pub byte_order: String,
    #[serde(rename = "content-type")]
    pub content_type: String,
    #[serde(rename = "content-encoding")]
    pub content_encoding: String,
    /// Exact byte length of the payload that follows the header.
    #[serde(rename = "content-length")]
    pub content_length: u64,
    /// Any additional keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Header {
    /// Create header fields for an outbound frame.
    ///
    /// `content_length` is filled in by the encoder.
    pub fn new(content_type: impl Into<String>, content_encoding: impl Into<String>) -> Self {
        Self {
            byte_order: native_byte_order().to_string(),
            content_type: content_type.into(),
            content_encoding: content_encoding.into(),
            content_length: 0,
            extra: Map::new(),
        }
    }

    /// Attach an additional key.
    #[cfg(test)]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Drop extra keys that would shadow a required field on the wire.
    pub(crate) fn strip_shadowing_fields(&mut self) {
        self.extra.retain(|key, _| !REQUIRED_FIELDS.contains(&key.as_str()));
    }

    pub fn is_json(&self) -> bool {
        self.content_type == CONTENT_TYPE_JSON
    }

    /// Serialize to UTF-8 JSON text.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| WireError::encoding(format!("header: {e}")))
    }

    /// Decode a header block.
    ///
    /// Structural decoding happens first; a missing required key is then
    /// reported by name.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| WireError::protocol("header is not valid UTF-8"))?;
        let value: Value = serde_json::from_str(text)
            .map_err(|e| WireError::protocol(format!("malformed header: {e}")))?;

        let map = match value {
            Value::Object(map) => map,
            _ => return Err(WireError::protocol("header is not a JSON object")),
        };

        if let Some(field) = REQUIRED_FIELDS.iter().find(|f| !map.contains_key(**f)) {
            return Err(WireError::protocol(format!(
                "missing required header field '{field}'"
            )));
        }

        serde_json::from_value(Value::Object(map))
            .map_err(|e| WireError::protocol(format!("invalid header field: {e}")))
    }
}

/// Byte order of this host, as reported in outbound headers.
pub fn native_byte_order() -> &'static str {
    if cfg!(target_endian = "big") {
        "big"
    } else {
        "little"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_wire_keys() {
        let mut header = Header::new(CONTENT_TYPE_JSON, ENCODING_UTF8);
        header.content_length = 18;

        let value: Value = serde_json::from_slice(&header.to_bytes().unwrap()).unwrap();
        assert_eq!(value["content-type"], "text/json");
        assert_eq!(value["content-encoding"], "utf-8");
        assert_eq!(value["content-length"], 18);
        assert_eq!(value["byteorder"], native_byte_order());
    }

    #[test]
    fn test_header_extra_fields_survive() {
        let header = Header::new("binary", "binary").with_field("request-id", 7);
        let decoded = Header::from_bytes(&header.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.extra["request-id"], 7);
    }

    #[test]
    fn test_each_missing_field_is_named() {
        for missing in REQUIRED_FIELDS {
            let mut map = Map::new();
            map.insert("byteorder".into(), "little".into());
            map.insert("content-type".into(), "binary".into());
            map.insert("content-encoding".into(), "binary".into());
            map.insert("content-length".into(), 0.into());
            map.remove(missing);

            let bytes = serde_json::to_vec(&Value::Object(map)).unwrap();
            match Header::from_bytes(&bytes) {
                Err(WireError::Protocol(msg)) => {
                    assert!(msg.contains("missing required header field"));
                    assert!(msg.contains(missing));
                }
                other => panic!("unexpected: {:?}", other),
            }
        }
    }

    #[test]
    fn test_malformed_header() {
        assert!(matches!(
            Header::from_bytes(b"{not json"),
            Err(WireError::Protocol(_))
        ));
        assert!(matches!(
            Header::from_bytes(b"[1, 2, 3]"),
            Err(WireError::Protocol(_))
        ));
        assert!(matches!(
            Header::from_bytes(&[0xff, 0xfe]),
            Err(WireError::Protocol(_))
        ));
    }

    #[test]
    fn test_wrong_field_type() {
        let bytes = br#"{"byteorder":"little","content-type":"binary","content-encoding":"binary","content-length":"ten"}"#;
        assert!(matches!(
            Header::from_bytes(bytes),
            Err(WireError::Protocol(_))
        ));
    }
}
