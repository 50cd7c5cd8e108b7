//! Lookup-table service.
//!
//! JSON requests look like `{"action": "search", "value": "<key>"}` and are
//! answered with `{"result": "<text>"}`. Any other content type gets a
//! binary acknowledgement quoting the first bytes of the request.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::trace;

use super::{MessageHandler, Reply};
use crate::error::Result;
use crate::protocol::message::decode_json;
use crate::protocol::{Header, Message};

/// Content type of binary replies.
pub const SERVER_BINARY_TYPE: &str = "binary/custom-server-binary-type";

/// Number of request bytes quoted in a binary reply.
const QUOTE_LEN: usize = 10;

/// Table used when the configuration provides none.
pub fn default_table() -> BTreeMap<String, String> {
    [
        ("morpheus", "Follow the white rabbit. \u{1f430}"),
        ("ring", "In the caves beneath the Misty Mountains. \u{1f48d}"),
        ("\u{1f436}", "\u{1f43e} Playing ball! \u{1f3d0}"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub struct SearchHandler {
    table: Arc<BTreeMap<String, String>>,
    keep_alive: bool,
}

impl SearchHandler {
    pub fn new(table: Arc<BTreeMap<String, String>>, keep_alive: bool) -> Self {
        Self { table, keep_alive }
    }

    fn answer(&self, request: &Value) -> String {
        let action = request.get("action").and_then(Value::as_str).unwrap_or("");
        if action != "search" {
            return format!("Error: invalid action '{action}'.");
        }

        let query = match request.get("value") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        match self.table.get(&query) {
            Some(answer) => answer.clone(),
            None => format!("No match for {query}."),
        }
    }
}

impl MessageHandler for SearchHandler {
    fn handle(&self, conn_id: usize, header: &Header, payload: &[u8]) -> Result<Reply> {
        let message = if header.is_json() {
            let request = decode_json(header, payload)?;
            trace!(conn_id, request = %request, "search request");
            Message::json(&json!({ "result": self.answer(&request) }))?
        } else {
            let quoted = &payload[..payload.len().min(QUOTE_LEN)];
            let mut body = b"First 10 bytes of request: ".to_vec();
            body.extend_from_slice(quoted);
            Message::binary(SERVER_BINARY_TYPE, body)
        };

        Ok(Reply::send(message).closing(!self.keep_alive))
    }
}
