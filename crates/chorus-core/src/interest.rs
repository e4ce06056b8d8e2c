//! Readiness interest mask stored per client slot.

use std::{fmt, ops::BitOr};

/// Readiness a slot wants to be woken for.
///
/// Kept independent of any polling backend; the server maps it onto the
/// backend's own interest type when (re)registering a descriptor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interest(u8);

impl Interest {
    /// No readiness (free slots carry this).
    pub const NONE: Self = Self(0);
    /// Inbound data or a pending connection.
    pub const READABLE: Self = Self(0b01);
    /// Room in the outbound socket buffer.
    pub const WRITABLE: Self = Self(0b10);

    /// True when no readiness bit is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is also set in `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when `READABLE` is set.
    pub fn is_readable(self) -> bool {
        self.contains(Self::READABLE)
    }

    /// True when `WRITABLE` is set.
    pub fn is_writable(self) -> bool {
        self.contains(Self::WRITABLE)
    }

    /// `self` with the bits of `other` cleared.
    #[must_use]
    pub fn remove(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for Interest {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_readable(), self.is_writable()) {
            (false, false) => f.write_str("NONE"),
            (true, false) => f.write_str("READABLE"),
            (false, true) => f.write_str("WRITABLE"),
            (true, true) => f.write_str("READABLE | WRITABLE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_and_remove() {
        let both = Interest::READABLE | Interest::WRITABLE;
        assert!(both.is_readable());
        assert!(both.is_writable());
        assert_eq!(both.remove(Interest::WRITABLE), Interest::READABLE);
        assert!(Interest::default().is_empty());
    }

    #[test]
    fn debug_names_bits() {
        assert_eq!(format!("{:?}", Interest::NONE), "NONE");
        assert_eq!(format!("{:?}", Interest::READABLE | Interest::WRITABLE), "READABLE | WRITABLE");
    }
}
