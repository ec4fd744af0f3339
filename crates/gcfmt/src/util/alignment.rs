//! Alignment Utilities
//!
//! Helper functions for word and page alignment of sizes and addresses.

/// Alignment - utility for alignment operations
pub struct Alignment;

impl Alignment {
    /// Align value up to boundary
    ///
    /// `alignment` must be a power of two.
    ///
    /// # Examples
    /// ```
    /// use gcfmt::util::Alignment;
    ///
    /// assert_eq!(Alignment::align_up(100, 8), 104);
    /// assert_eq!(Alignment::align_up(64, 8), 64);
    /// ```
    pub fn align_up(value: usize, alignment: usize) -> usize {
        (value + alignment - 1) & !(alignment - 1)
    }

    /// Align value up, returning `None` on overflow
    pub fn checked_align_up(value: usize, alignment: usize) -> Option<usize> {
        value
            .checked_add(alignment - 1)
            .map(|v| v & !(alignment - 1))
    }

    /// Align value down to boundary
    pub fn align_down(value: usize, alignment: usize) -> usize {
        value & !(alignment - 1)
    }

    /// Check if value is aligned
    pub fn is_aligned(value: usize, alignment: usize) -> bool {
        value & (alignment - 1) == 0
    }

    /// Round a mapping length up to the system page size
    pub fn page_align(value: usize) -> usize {
        Self::align_up(value, page_size::get())
    }
}
