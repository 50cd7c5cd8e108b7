//! Wire protocol: a 2-byte big-endian header length, a JSON header, and a
//! payload of exactly `content-length` bytes.

pub mod codec;
pub mod header;
pub mod message;

pub use header::Header;
pub use message::Message;
