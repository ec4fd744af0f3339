//! Anonymous Memory Mapping - wrapper around memmap2
//!
//! Backs both the local arena and root tables. Memory is zero-filled and
//! page-aligned, and the length is rounded up to the page size.

use crate::error::{BridgeError, Result};
use crate::util::Alignment;
use memmap2::{MmapMut, MmapOptions};

/// Anonymous mapping with exclusive ownership
///
/// Addresses handed out stay valid until the mapping is dropped.
pub struct AnonMapping {
    mmap: MmapMut,
    base: usize,
    size: usize,
}

impl AnonMapping {
    /// Create a zero-filled anonymous mapping of at least `size` bytes
    pub fn anonymous(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(BridgeError::InvalidArgument(
                "mapping size must be > 0".to_string(),
            ));
        }
        let aligned_size = Alignment::page_align(size);

        let mut mmap = MmapOptions::new()
            .len(aligned_size)
            .map_anon()
            .map_err(|e| {
                BridgeError::VirtualMemory(format!("Failed to create anonymous mapping: {}", e))
            })?;

        let base = mmap.as_mut_ptr() as usize;

        Ok(Self {
            mmap,
            base,
            size: aligned_size,
        })
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// One past the last mapped byte
    pub fn limit(&self) -> usize {
        self.base + self.size
    }

    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr < self.limit()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mmap[..]
    }
}

impl std::fmt::Debug for AnonMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnonMapping")
            .field("base", &format_args!("{:#x}", self.base))
            .field("size", &self.size)
            .finish()
    }
}
