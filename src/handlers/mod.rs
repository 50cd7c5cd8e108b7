//! Message handlers.
//!
//! A handler receives each complete inbound frame and decides what, if
//! anything, goes back, and whether the connection should close once the
//! reply is flushed. Handlers are shared immutably across connections and
//! workers, so any state they hold is fixed at construction or
//! synchronized internally.
//!
//! - `search`: lookup-table service answering `{"action": "search"}` requests
//! - `echo`: returns every frame unchanged
//! - `client`: consumes the single reply of a one-shot request

pub mod client;
pub mod echo;
pub mod search;

pub use client::{request_message, ClientHandler, Response};
pub use echo::EchoHandler;
pub use search::SearchHandler;

use crate::error::Result;
use crate::protocol::{Header, Message};

/// Business logic invoked once per complete inbound frame.
///
/// Must not block. The header and payload are only borrowed for the
/// duration of the call.
pub trait MessageHandler: Send + Sync {
    /// Handle one frame from connection `conn_id`.
    ///
    /// An error is fatal to that connection only.
    fn handle(&self, conn_id: usize, header: &Header, payload: &[u8]) -> Result<Reply>;
}

/// What a handler wants done after a frame.
#[derive(Debug, Default, PartialEq)]
pub struct Reply {
    /// Frame to queue on the connection, if any.
    pub message: Option<Message>,
    /// Close once the send buffer has drained.
    pub close: bool,
}

impl Reply {
    /// Nothing to send, keep the connection open.
    #[cfg(test)]
    pub fn none() -> Self {
        Self::default()
    }

    pub fn send(message: Message) -> Self {
        Self {
            message: Some(message),
            close: false,
        }
    }

    /// Nothing to send, close the connection.
    pub fn close() -> Self {
        Self {
            message: None,
            close: true,
        }
    }

    /// Set the close-after-flush flag.
    pub fn closing(mut self, close: bool) -> Self {
        self.close = close;
        self
    }
}
