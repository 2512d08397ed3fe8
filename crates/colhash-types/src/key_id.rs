//! Build-row identifiers.
//!
//! A [`KeyId`] names one buffered build row using the convention
//! `key_id = row_index + 1`.  "No row" (end of a bucket chain, no match yet)
//! is spelled `Option::<KeyId>::None`, which the `NonZeroU32` niche keeps the
//! same size as a bare `u32`, so per-row id arrays stay dense.

use std::fmt;
use std::num::NonZeroU32;

/// 1-based identifier of a build row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct KeyId(NonZeroU32);

impl KeyId {
    /// Identifier of the build row at zero-based `index`.
    #[inline]
    #[must_use]
    pub const fn from_index(index: u32) -> Self {
        Self(NonZeroU32::MIN.saturating_add(index))
    }

    /// Identifier from its raw 1-based value; `0` is the "no row" sentinel.
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    /// Zero-based row index this id refers to.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trips_through_one_based_id() {
        let id = KeyId::from_index(0);
        assert_eq!(id.get(), 1);
        assert_eq!(id.index(), 0);
        assert_eq!(KeyId::from_index(41).index(), 41);
    }

    #[test]
    fn zero_is_the_sentinel() {
        assert_eq!(KeyId::new(0), None);
        assert_eq!(KeyId::new(7), Some(KeyId::from_index(6)));
    }

    #[test]
    fn option_key_id_is_niche_packed() {
        assert_eq!(
            std::mem::size_of::<Option<KeyId>>(),
            std::mem::size_of::<u32>()
        );
    }
}
