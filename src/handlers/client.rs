//! Client side of a one-shot request: take the first reply, then close.

use std::sync::Mutex;

use bytes::Bytes;
use serde_json::Value;
use tracing::info;

use super::{MessageHandler, Reply};
use crate::error::Result;
use crate::protocol::message::decode_json;
use crate::protocol::{Header, Message};

/// Content type of binary requests.
pub const CLIENT_BINARY_TYPE: &str = "binary/custom-client-binary-type";

/// Build the request for `action`: JSON for a search, binary otherwise.
pub fn request_message(action: &str, value: &str) -> Result<Message> {
    if action == "search" {
        Message::json(&serde_json::json!({ "action": action, "value": value }))
    } else {
        Ok(Message::binary(
            CLIENT_BINARY_TYPE,
            format!("{action}{value}").into_bytes(),
        ))
    }
}

/// A decoded reply from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Json(Value),
    Binary { content_type: String, payload: Bytes },
}

#[derive(Default)]
pub struct ClientHandler {
    response: Mutex<Option<Response>>,
}

impl ClientHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the reply received so far.
    pub fn take_response(&self) -> Option<Response> {
        self.response
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

impl MessageHandler for ClientHandler {
    fn handle(&self, conn_id: usize, header: &Header, payload: &[u8]) -> Result<Reply> {
        let response = if header.is_json() {
            let value = decode_json(header, payload)?;
            info!(conn_id, result = %value.get("result").unwrap_or(&value), "Got result");
            Response::Json(value)
        } else {
            info!(
                conn_id,
                content_type = %header.content_type,
                bytes = payload.len(),
                "Got binary response"
            );
            Response::Binary {
                content_type: header.content_type.clone(),
                payload: Bytes::copy_from_slice(payload),
            }
        };

        *self
            .response
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(response);
        Ok(Reply::close())
    }
}
