//! Readiness registration.
//!
//! Connections never talk to the poller directly. After every callback they
//! compute the interest set they need and hand it to a `Registrar`; the
//! event loop only delivers readiness for what was last registered.

use std::io;

use mio::event::Source;
use mio::{Registry, Token};

use super::Interest;

/// Register, update, and drop a source's interest with an event loop.
///
/// Implementations must never deliver two callbacks for the same token
/// concurrently. `set_interest` takes effect no later than the next poll.
pub trait Registrar<S: ?Sized> {
    fn register(&self, source: &mut S, token: Token, interest: Interest) -> io::Result<()>;

    fn set_interest(&self, source: &mut S, token: Token, interest: Interest) -> io::Result<()>;

    fn unregister(&self, source: &mut S) -> io::Result<()>;
}

fn require(interest: Interest) -> io::Result<mio::Interest> {
    interest.to_mio().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "cannot register empty interest")
    })
}

impl<S: Source + ?Sized> Registrar<S> for Registry {
    fn register(&self, source: &mut S, token: Token, interest: Interest) -> io::Result<()> {
        Registry::register(self, source, token, require(interest)?)
    }

    fn set_interest(&self, source: &mut S, token: Token, interest: Interest) -> io::Result<()> {
        Registry::reregister(self, source, token, require(interest)?)
    }

    fn unregister(&self, source: &mut S) -> io::Result<()> {
        Registry::deregister(self, source)
    }
}
