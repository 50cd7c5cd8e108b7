//! Readiness-based runtime.
//!
//! - `Connection`: per-socket buffers and frame state machine
//! - `Registrar`: how a connection tells the event loop what it wants next
//! - `server`: mio worker loops (epoll on Linux, kqueue on macOS)
//! - `client`: single-request driver on the same machinery

pub mod client;
mod connection;
mod interest;
mod registrar;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{Limits, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_PAYLOAD_LEN};
pub use interest::Interest;
pub use registrar::Registrar;
