//! Echo service: every frame goes back unchanged.

use bytes::Bytes;
use tracing::trace;

use super::{MessageHandler, Reply};
use crate::error::Result;
use crate::protocol::{Header, Message};

pub struct EchoHandler {
    keep_alive: bool,
}

impl EchoHandler {
    pub fn new(keep_alive: bool) -> Self {
        Self { keep_alive }
    }
}

impl MessageHandler for EchoHandler {
    fn handle(&self, conn_id: usize, header: &Header, payload: &[u8]) -> Result<Reply> {
        trace!(conn_id, bytes = payload.len(), "echo");
        let message = Message::new(header.clone(), Bytes::copy_from_slice(payload));
        Ok(Reply::send(message).closing(!self.keep_alive))
    }
}
