//! Connection state machine.
//!
//! Each connection owns a receive buffer, a send buffer, and its parse
//! progress. The event loop calls `on_readable` / `on_writable` when the
//! socket is ready; each call performs exactly one bounded I/O attempt,
//! advances the state machine, and pushes the resulting interest set back
//! through the `Registrar`.
//!
//! ```text
//!   AwaitingFrameLength --2 bytes--> AwaitingHeader(len)
//!          ^                              |
//!          |                          len bytes
//!       dispatch                          v
//!          |                       AwaitingPayload(header)
//!   FrameReady(header, payload) <--content-length bytes--+
//! ```

use std::io::{self, Read, Write};
use std::mem;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use mio::Token;
use slab::Slab;
use tracing::{debug, trace, warn};

use super::{Interest, Registrar};
use crate::error::{Result, WireError};
use crate::handlers::MessageHandler;
use crate::protocol::codec::{
    try_parse_frame_length, try_parse_header, try_parse_payload, MAX_HEADER_LEN,
};
use crate::protocol::{Header, Message};

/// Bytes requested from the socket per read attempt.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Largest accepted payload.
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Per-connection size limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub chunk_size: usize,
    pub max_header_len: usize,
    pub max_payload_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_header_len: MAX_HEADER_LEN,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }
}

/// Progress through the current inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseState {
    AwaitingFrameLength,
    AwaitingHeader { frame_len: usize },
    AwaitingPayload { header: Header },
    FrameReady { header: Header, payload: Bytes },
}

/// Outcome of a single callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Bytes moved or a frame was dispatched; calling again may make more progress.
    Advanced,
    /// Nothing more can happen until the next readiness notification.
    Blocked,
    /// The connection is closed.
    Closed,
}

pub struct Connection<S> {
    id: usize,
    peer: Option<SocketAddr>,
    /// `None` once closed.
    stream: Option<S>,
    recv_buf: BytesMut,
    send_buf: BytesMut,
    parse: ParseState,
    /// Interest last handed to the registrar.
    interest: Interest,
    registered: bool,
    close_after_flush: bool,
    limits: Limits,
    handler: Arc<dyn MessageHandler>,
}

impl<S: Read + Write> Connection<S> {
    pub fn new(
        id: usize,
        stream: S,
        peer: Option<SocketAddr>,
        handler: Arc<dyn MessageHandler>,
        limits: Limits,
    ) -> Self {
        Self {
            id,
            peer,
            stream: Some(stream),
            recv_buf: BytesMut::with_capacity(limits.chunk_size),
            send_buf: BytesMut::new(),
            parse: ParseState::AwaitingFrameLength,
            interest: Interest::READABLE,
            registered: false,
            close_after_flush: false,
            limits,
            handler,
        }
    }

    #[cfg(test)]
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn token(&self) -> Token {
        Token(self.id)
    }

    #[cfg(test)]
    pub fn interest(&self) -> Interest {
        self.interest
    }

    #[cfg(test)]
    pub fn parse_state(&self) -> &ParseState {
        &self.parse
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    pub fn has_pending_output(&self) -> bool {
        !self.send_buf.is_empty()
    }

    /// Register with the event loop using the current interest set.
    pub fn register<R: Registrar<S>>(&mut self, registrar: &R) -> io::Result<()> {
        let token = self.token();
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection closed"))?;
        registrar.register(stream, token, self.interest)?;
        self.registered = true;
        Ok(())
    }

    /// Queue an outbound frame.
    ///
    /// A frame that cannot be encoded closes the connection and the error is
    /// returned to the caller.
    pub fn queue<R: Registrar<S>>(&mut self, message: Message, registrar: &R) -> Result<()> {
        if self.is_closed() {
            return Err(WireError::PeerClosed);
        }
        if let Err(e) = message.encode_into(&mut self.send_buf) {
            warn!(conn_id = self.id, error = %e, "Cannot encode frame");
            self.close(registrar);
            return Err(e);
        }
        if let Err(e) = self.sync_interest(registrar) {
            debug!(conn_id = self.id, error = %e, "Cannot update interest");
            self.close(registrar);
            return Err(e.into());
        }
        Ok(())
    }

    /// Socket reported readable: one read, then at most one frame dispatched.
    pub fn on_readable<R: Registrar<S>>(&mut self, registrar: &R) -> Step {
        if self.is_closed() {
            return Step::Closed;
        }
        // Nothing more is read once a close has been requested.
        if self.close_after_flush {
            return Step::Blocked;
        }

        match self.read_chunk() {
            Ok(0) => return self.fail(WireError::PeerClosed, registrar),
            Ok(n) => trace!(conn_id = self.id, bytes = n, "read"),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Step::Blocked,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Step::Advanced,
            Err(e) => return self.fail(classify(e), registrar),
        }

        if let Err(e) = self.advance() {
            return self.fail(e, registrar);
        }
        self.settle(registrar, true)
    }

    /// Dispatch a frame already sitting in the receive buffer, without reading.
    ///
    /// The event loop calls this after reads block so that frames which
    /// arrived together with an earlier one are not left waiting.
    pub fn dispatch_buffered<R: Registrar<S>>(&mut self, registrar: &R) -> Step {
        if self.is_closed() {
            return Step::Closed;
        }
        if self.close_after_flush || self.recv_buf.is_empty() {
            return Step::Blocked;
        }

        match self.advance() {
            Ok(dispatched) => self.settle(registrar, dispatched),
            Err(e) => self.fail(e, registrar),
        }
    }

    /// Socket reported writable: one write of as much as the socket accepts.
    pub fn on_writable<R: Registrar<S>>(&mut self, registrar: &R) -> Step {
        let Some(stream) = self.stream.as_mut() else {
            return Step::Closed;
        };

        let mut wrote = false;
        if !self.send_buf.is_empty() {
            match stream.write(&self.send_buf) {
                Ok(0) => {
                    let e = io::Error::new(io::ErrorKind::WriteZero, "write returned 0");
                    return self.fail(e.into(), registrar);
                }
                Ok(n) => {
                    trace!(conn_id = self.id, bytes = n, "wrote");
                    self.send_buf.advance(n);
                    wrote = true;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Step::Blocked,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => return Step::Advanced,
                Err(e) => return self.fail(classify(e), registrar),
            }
        }

        self.settle(registrar, wrote)
    }

    /// Handle one readiness notification from the event loop.
    ///
    /// Reads until the socket would block and dispatches any complete frames
    /// left in the buffer, then writes until the socket would block.
    pub fn service<R: Registrar<S>>(
        &mut self,
        readable: bool,
        writable: bool,
        registrar: &R,
    ) -> Step {
        if readable {
            loop {
                match self.on_readable(registrar) {
                    Step::Advanced => continue,
                    Step::Blocked => break,
                    Step::Closed => return Step::Closed,
                }
            }
            loop {
                match self.dispatch_buffered(registrar) {
                    Step::Advanced => continue,
                    Step::Blocked => break,
                    Step::Closed => return Step::Closed,
                }
            }
        }

        if writable {
            loop {
                match self.on_writable(registrar) {
                    Step::Advanced if self.has_pending_output() => continue,
                    Step::Closed => return Step::Closed,
                    _ => break,
                }
            }
        }

        Step::Blocked
    }

    /// Release the registration and close the socket. Idempotent.
    pub fn close<R: Registrar<S>>(&mut self, registrar: &R) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        if self.registered {
            if let Err(e) = registrar.unregister(&mut stream) {
                debug!(conn_id = self.id, error = %e, "unregister failed");
            }
            self.registered = false;
        }
        self.interest = Interest::NONE;
        self.recv_buf.clear();
        self.send_buf.clear();
        self.parse = ParseState::AwaitingFrameLength;
        debug!(conn_id = self.id, peer = ?self.peer, "Connection closed");
    }

    fn read_chunk(&mut self) -> io::Result<usize> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection closed"))?;

        let start = self.recv_buf.len();
        self.recv_buf.resize(start + self.limits.chunk_size, 0);
        let result = stream.read(&mut self.recv_buf[start..]);
        let filled = *result.as_ref().unwrap_or(&0);
        self.recv_buf.truncate(start + filled);
        result
    }

    /// Run parse steps until blocked or one frame has been dispatched.
    ///
    /// Returns whether a frame was dispatched.
    fn advance(&mut self) -> Result<bool> {
        match self.parse_frame()? {
            Some((header, payload)) => {
                self.dispatch(header, payload)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn parse_frame(&mut self) -> Result<Option<(Header, Bytes)>> {
        loop {
            let state = mem::replace(&mut self.parse, ParseState::AwaitingFrameLength);
            let (next, progressed) = match state {
                ParseState::AwaitingFrameLength => {
                    match try_parse_frame_length(&mut self.recv_buf) {
                        Some(frame_len) if frame_len > self.limits.max_header_len => {
                            return Err(WireError::protocol(format!(
                                "header length {frame_len} exceeds limit {}",
                                self.limits.max_header_len
                            )));
                        }
                        Some(frame_len) => (ParseState::AwaitingHeader { frame_len }, true),
                        None => (ParseState::AwaitingFrameLength, false),
                    }
                }
                ParseState::AwaitingHeader { frame_len } => {
                    match try_parse_header(&mut self.recv_buf, frame_len)? {
                        Some(header) => {
                            self.check_payload_len(&header)?;
                            (ParseState::AwaitingPayload { header }, true)
                        }
                        None => (ParseState::AwaitingHeader { frame_len }, false),
                    }
                }
                ParseState::AwaitingPayload { header } => {
                    match try_parse_payload(&mut self.recv_buf, &header) {
                        Some(payload) => (ParseState::FrameReady { header, payload }, true),
                        None => (ParseState::AwaitingPayload { header }, false),
                    }
                }
                // Parse state is already reset for the next frame.
                ParseState::FrameReady { header, payload } => return Ok(Some((header, payload))),
            };

            self.parse = next;
            if !progressed {
                return Ok(None);
            }
        }
    }

    fn check_payload_len(&self, header: &Header) -> Result<()> {
        let too_large = usize::try_from(header.content_length)
            .map(|len| len > self.limits.max_payload_len)
            .unwrap_or(true);
        if too_large {
            return Err(WireError::protocol(format!(
                "content-length {} exceeds limit {}",
                header.content_length, self.limits.max_payload_len
            )));
        }
        Ok(())
    }

    fn dispatch(&mut self, header: Header, payload: Bytes) -> Result<()> {
        trace!(
            conn_id = self.id,
            content_type = %header.content_type,
            bytes = payload.len(),
            "dispatching frame"
        );
        let reply = self.handler.handle(self.id, &header, &payload)?;
        if let Some(message) = reply.message {
            message.encode_into(&mut self.send_buf)?;
        }
        if reply.close {
            self.close_after_flush = true;
        }
        Ok(())
    }

    /// The interest set implied by the current buffers and flags.
    fn desired_interest(&self) -> Interest {
        if self.is_closed() {
            return Interest::NONE;
        }
        let write = if self.send_buf.is_empty() {
            Interest::NONE
        } else {
            Interest::WRITABLE
        };
        if self.close_after_flush {
            write
        } else {
            Interest::READABLE | write
        }
    }

    fn sync_interest<R: Registrar<S>>(&mut self, registrar: &R) -> io::Result<()> {
        let desired = self.desired_interest();
        if desired == self.interest {
            return Ok(());
        }
        if self.registered {
            let token = self.token();
            if let Some(stream) = self.stream.as_mut() {
                registrar.set_interest(stream, token, desired)?;
            }
        }
        trace!(conn_id = self.id, from = ?self.interest, to = ?desired, "interest");
        self.interest = desired;
        Ok(())
    }

    /// Recompute interest after a callback, closing if a requested close is due.
    fn settle<R: Registrar<S>>(&mut self, registrar: &R, progressed: bool) -> Step {
        if self.close_after_flush && self.send_buf.is_empty() {
            debug!(conn_id = self.id, "Closing after reply");
            self.close(registrar);
            return Step::Closed;
        }
        if let Err(e) = self.sync_interest(registrar) {
            return self.fail(e.into(), registrar);
        }
        if progressed {
            Step::Advanced
        } else {
            Step::Blocked
        }
    }

    fn fail<R: Registrar<S>>(&mut self, error: WireError, registrar: &R) -> Step {
        match &error {
            WireError::PeerClosed => debug!(conn_id = self.id, peer = ?self.peer, "Peer closed"),
            WireError::Protocol(_) | WireError::Encoding(_) => {
                warn!(conn_id = self.id, peer = ?self.peer, error = %error, "Dropping connection")
            }
            WireError::Io(_) => {
                debug!(conn_id = self.id, peer = ?self.peer, error = %error, "Connection error")
            }
        }
        self.close(registrar);
        Step::Closed
    }
}

/// Resets and broken pipes mean the peer went away.
fn classify(e: io::Error) -> WireError {
    match e.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => WireError::PeerClosed,
        _ => WireError::Io(e),
    }
}

/// Registry of live connections using slab allocation.
///
/// Slab keys double as connection ids and event-loop tokens.
pub struct ConnectionRegistry<S> {
    connections: Slab<Connection<S>>,
    max_connections: usize,
}

impl<S> ConnectionRegistry<S> {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Slab::with_capacity(max_connections),
            max_connections,
        }
    }

    /// Insert a connection built with its assigned id.
    ///
    /// Returns `None` if the registry is at capacity.
    pub fn insert_with(&mut self, build: impl FnOnce(usize) -> Connection<S>) -> Option<usize> {
        if self.connections.len() >= self.max_connections {
            return None;
        }
        let entry = self.connections.vacant_entry();
        let id = entry.key();
        entry.insert(build(id));
        Some(id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Connection<S>> {
        self.connections.get_mut(id)
    }

    pub fn remove(&mut self, id: usize) -> Option<Connection<S>> {
        self.connections.try_remove(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }
}
