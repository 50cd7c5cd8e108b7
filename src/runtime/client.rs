//! One-shot client: send a single request, wait for the reply, close.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use mio::net::TcpStream;
use mio::{Events, Poll};
use tracing::debug;

use super::connection::{Connection, Limits, Step};
use crate::error::Result;
use crate::handlers::{ClientHandler, Response};
use crate::protocol::Message;

const CLIENT_ID: usize = 0;

/// Send `request` to `addr` and return the reply, if one arrived before
/// the connection closed.
pub fn run_request(addr: SocketAddr, request: Message, limits: Limits) -> Result<Option<Response>> {
    let stream = std::net::TcpStream::connect(addr)?;
    stream.set_nonblocking(true)?;
    let stream = TcpStream::from_std(stream);
    debug!(addr = %addr, "Connected");

    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(16);

    let handler = Arc::new(ClientHandler::new());
    let mut conn = Connection::new(CLIENT_ID, stream, Some(addr), handler.clone(), limits);

    // Queue first so the initial registration already asks for writability.
    conn.queue(request, poll.registry())?;
    conn.register(poll.registry())?;

    while !conn.is_closed() {
        if let Err(e) = poll.poll(&mut events, None) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            conn.close(poll.registry());
            return Err(e.into());
        }

        for event in events.iter() {
            if event.token() != conn.token() {
                continue;
            }
            let readable = event.is_readable() || event.is_read_closed();
            let writable = event.is_writable() || event.is_write_closed();
            if conn.service(readable, writable, poll.registry()) == Step::Closed {
                break;
            }
        }
    }

    Ok(handler.take_response())
}
