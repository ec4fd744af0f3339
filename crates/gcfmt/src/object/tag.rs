//! Tagged Reference Convention
//!
//! Reference slots and ambiguous root-table words share one 64-bit layout:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────────────────┐
//! │   tag (16 bits)  │   heap address or immediate (48 bits)    │
//! │      63-48       │                 47-0                     │
//! └──────────────────┴──────────────────────────────────────────┘
//! ```
//!
//! This module is the only place the mask is defined. Root registration hands
//! a [`TagMask`] to the collector once; the collector applies it to every word
//! of the table. Object payload slots do not go through this test: they are
//! exact, untagged references.

use std::fmt;

/// Number of tag bits at the top of a word
pub const TAG_BITS: u32 = 16;

/// Number of address/value bits below the tag
pub const VALUE_BITS: u32 = 48;

/// Mask selecting the tag bits
pub const TAG_MASK: u64 = 0xFFFF << VALUE_BITS;

/// Mask selecting the value bits
pub const VALUE_MASK: u64 = !TAG_MASK;

/// Describes the format of a tagged reference.
///
/// A word is a genuine pointer if `word & MASK == PATTERN` and the word is
/// non-zero (the all-zero word is nil).
pub trait ReferenceTag {
    /// Mask to extract the tag bits from a tagged reference
    const MASK: u64;
    /// A value is only considered a reference if the tag matches this pattern.
    const PATTERN: u64;

    #[inline]
    fn is_reference(word: u64) -> bool {
        word != 0 && word & Self::MASK == Self::PATTERN
    }
}

/// Untagged heap pointers: the tag bits must all be zero
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactPointer;

impl ReferenceTag for ExactPointer {
    const MASK: u64 = TAG_MASK;
    const PATTERN: u64 = 0;
}

/// Runtime form of a [`ReferenceTag`], declared once per root table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagMask {
    mask: u64,
    pattern: u64,
}

impl TagMask {
    pub fn of<R: ReferenceTag>() -> Self {
        Self {
            mask: R::MASK,
            pattern: R::PATTERN,
        }
    }

    #[inline]
    pub fn mask(&self) -> u64 {
        self.mask
    }

    #[inline]
    pub fn pattern(&self) -> u64 {
        self.pattern
    }

    #[inline]
    pub fn is_reference(&self, word: u64) -> bool {
        word != 0 && word & self.mask == self.pattern
    }

    /// Address bits of a word that passed [`TagMask::is_reference`]
    #[inline]
    pub fn address(&self, word: u64) -> usize {
        (word & !self.mask) as usize
    }

    /// Replace the address bits, keeping the tag bits
    #[inline]
    pub fn retarget(&self, word: u64, address: usize) -> u64 {
        (word & self.mask) | (address as u64 & !self.mask)
    }
}

impl Default for TagMask {
    fn default() -> Self {
        Self::of::<ExactPointer>()
    }
}

/// A word split into tag and value, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedWord(pub u64);

impl TaggedWord {
    pub fn from_parts(tag: u16, value: u64) -> Self {
        TaggedWord(((tag as u64) << VALUE_BITS) | (value & VALUE_MASK))
    }

    #[inline]
    pub fn tag(&self) -> u16 {
        ((self.0 & TAG_MASK) >> VALUE_BITS) as u16
    }

    #[inline]
    pub fn value(&self) -> u64 {
        self.0 & VALUE_MASK
    }
}

impl fmt::Display for TaggedWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}:{:012x}", self.tag(), self.value())
    }
}
