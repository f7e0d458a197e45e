//! Absolute slotframe numbers.

use std::fmt;

/// The absolute sequence number of the current unicast slotframe repetition.
///
/// Every hash key is offset by the epoch, so schedules computed for
/// different epochs are unrelated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Epoch(pub u32);

impl Epoch {
    /// First slotframe.
    pub const ZERO: Self = Self(0);

    /// Raw value.
    #[inline]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// The following epoch, wrapping like the host's counter.
    #[inline]
    pub const fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl From<u32> for Epoch {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asfn {}", self.0)
    }
}
