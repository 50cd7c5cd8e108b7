//! In-memory stand-ins for a socket, an event loop, and a handler.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::sync::Mutex;

use mio::Token;

use super::{Interest, Registrar};
use crate::error::Result;
use crate::handlers::{MessageHandler, Reply};
use crate::protocol::{Header, Message};

enum ReadEvent {
    Data(Vec<u8>),
    Eof,
    Fail(io::ErrorKind),
}

enum WriteEvent {
    Accept(usize),
    WouldBlock,
    Fail(io::ErrorKind),
}

#[derive(Default)]
struct Script {
    reads: VecDeque<ReadEvent>,
    writes: VecDeque<WriteEvent>,
    written: Vec<u8>,
    read_calls: usize,
}

/// Socket whose read and write results are queued by the test.
///
/// With nothing queued, reads would block and writes accept everything.
pub struct ScriptedStream {
    script: Rc<RefCell<Script>>,
}

/// Test-side handle onto a `ScriptedStream`.
#[derive(Clone)]
pub struct StreamHandle {
    script: Rc<RefCell<Script>>,
}

impl ScriptedStream {
    pub fn new() -> (ScriptedStream, StreamHandle) {
        let script = Rc::new(RefCell::new(Script::default()));
        (
            ScriptedStream {
                script: Rc::clone(&script),
            },
            StreamHandle { script },
        )
    }
}

impl StreamHandle {
    pub fn push_read(&self, data: &[u8]) {
        self.script
            .borrow_mut()
            .reads
            .push_back(ReadEvent::Data(data.to_vec()));
    }

    pub fn push_eof(&self) {
        self.script.borrow_mut().reads.push_back(ReadEvent::Eof);
    }

    pub fn push_read_error(&self, kind: io::ErrorKind) {
        self.script.borrow_mut().reads.push_back(ReadEvent::Fail(kind));
    }

    pub fn push_write_limit(&self, n: usize) {
        self.script.borrow_mut().writes.push_back(WriteEvent::Accept(n));
    }

    pub fn push_write_block(&self) {
        self.script.borrow_mut().writes.push_back(WriteEvent::WouldBlock);
    }

    pub fn push_write_error(&self, kind: io::ErrorKind) {
        self.script.borrow_mut().writes.push_back(WriteEvent::Fail(kind));
    }

    /// Drain everything written so far.
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.script.borrow_mut().written)
    }

    pub fn read_calls(&self) -> usize {
        self.script.borrow().read_calls
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut script = self.script.borrow_mut();
        script.read_calls += 1;
        match script.reads.pop_front() {
            Some(ReadEvent::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    let rest = data.split_off(n);
                    script.reads.push_front(ReadEvent::Data(rest));
                }
                Ok(n)
            }
            Some(ReadEvent::Eof) => Ok(0),
            Some(ReadEvent::Fail(kind)) => Err(io::Error::from(kind)),
            None => Err(io::Error::from(io::ErrorKind::WouldBlock)),
        }
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut script = self.script.borrow_mut();
        let n = match script.writes.pop_front() {
            Some(WriteEvent::Accept(n)) => n.min(buf.len()),
            Some(WriteEvent::WouldBlock) => {
                return Err(io::Error::from(io::ErrorKind::WouldBlock))
            }
            Some(WriteEvent::Fail(kind)) => return Err(io::Error::from(kind)),
            None => buf.len(),
        };
        script.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A call made against the registrar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryCall {
    Register(Interest),
    SetInterest(Interest),
    Unregister,
}

/// Registrar that records every call instead of polling.
#[derive(Default)]
pub struct RecordingRegistrar {
    calls: RefCell<Vec<RegistryCall>>,
}

impl RecordingRegistrar {
    pub fn calls(&self) -> Vec<RegistryCall> {
        self.calls.borrow().clone()
    }

    pub fn unregister_count(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| **c == RegistryCall::Unregister)
            .count()
    }
}

impl<S: ?Sized> Registrar<S> for RecordingRegistrar {
    fn register(&self, _: &mut S, _: Token, interest: Interest) -> io::Result<()> {
        self.calls.borrow_mut().push(RegistryCall::Register(interest));
        Ok(())
    }

    fn set_interest(&self, _: &mut S, _: Token, interest: Interest) -> io::Result<()> {
        self.calls
            .borrow_mut()
            .push(RegistryCall::SetInterest(interest));
        Ok(())
    }

    fn unregister(&self, _: &mut S) -> io::Result<()> {
        self.calls.borrow_mut().push(RegistryCall::Unregister);
        Ok(())
    }
}

/// Handler that records frames and answers with a fixed policy.
pub struct RecordingHandler {
    frames: Mutex<Vec<(Header, Vec<u8>)>>,
    echo: bool,
    close: bool,
}

impl RecordingHandler {
    /// Record only, never reply.
    pub fn silent() -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
            echo: false,
            close: false,
        }
    }

    /// Echo each frame back, optionally asking for close after the reply.
    pub fn echoing(close: bool) -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
            echo: true,
            close,
        }
    }

    pub fn frames(&self) -> Vec<(Header, Vec<u8>)> {
        self.frames.lock().unwrap().clone()
    }
}

impl MessageHandler for RecordingHandler {
    fn handle(&self, _conn_id: usize, header: &Header, payload: &[u8]) -> Result<Reply> {
        self.frames
            .lock()
            .unwrap()
            .push((header.clone(), payload.to_vec()));
        let reply = if self.echo {
            Reply::send(Message::new(header.clone(), payload.to_vec()))
        } else {
            Reply::none()
        };
        Ok(reply.closing(self.close))
    }
}
