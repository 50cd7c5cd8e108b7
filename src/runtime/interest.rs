//! Readiness interest set.

use std::fmt;
use std::ops::BitOr;

/// Subset of {Readable, Writable} a connection wants to be notified about.
///
/// Unlike `mio::Interest` this can be empty, which is the state of a
/// closed connection.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest(u8);

const READABLE: u8 = 0b01;
const WRITABLE: u8 = 0b10;

impl Interest {
    pub const NONE: Interest = Interest(0);
    pub const READABLE: Interest = Interest(READABLE);
    pub const WRITABLE: Interest = Interest(WRITABLE);

    pub fn is_readable(self) -> bool {
        self.0 & READABLE != 0
    }

    pub fn is_writable(self) -> bool {
        self.0 & WRITABLE != 0
    }

    /// The equivalent mio interest, `None` when empty.
    pub fn to_mio(self) -> Option<mio::Interest> {
        match (self.is_readable(), self.is_writable()) {
            (true, true) => Some(mio::Interest::READABLE | mio::Interest::WRITABLE),
            (true, false) => Some(mio::Interest::READABLE),
            (false, true) => Some(mio::Interest::WRITABLE),
            (false, false) => None,
        }
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, other: Interest) -> Interest {
        Interest(self.0 | other.0)
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_readable(), self.is_writable()) {
            (true, true) => f.write_str("READABLE | WRITABLE"),
            (true, false) => f.write_str("READABLE"),
            (false, true) => f.write_str("WRITABLE"),
            (false, false) => f.write_str("NONE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interest_set_ops() {
        let both = Interest::READABLE | Interest::WRITABLE;
        assert!(both.is_readable() && both.is_writable());
        assert_eq!(both | Interest::NONE, both);
        assert!(!Interest::NONE.is_readable() && !Interest::NONE.is_writable());
        assert_eq!(Interest::default(), Interest::NONE);
    }

    #[test]
    fn test_to_mio() {
        assert_eq!(Interest::NONE.to_mio(), None);
        assert_eq!(Interest::READABLE.to_mio(), Some(mio::Interest::READABLE));
        let both = (Interest::READABLE | Interest::WRITABLE).to_mio().unwrap();
        assert!(both.is_readable() && both.is_writable());
    }
}
