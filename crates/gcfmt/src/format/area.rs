//! Custom object format for vectors of words.
//!
//! Every formatted block starts with a [`Header`]. Object payloads are
//! exact references and are reported to the collector slot by slot. Array
//! payloads are raw words and are never reported. Padding and forward stubs
//! carry no references.

use crate::error::{BridgeError, Result};
use crate::format::{ObjectFormat, ScanState};
use crate::object::header::{
    check_span, max_span, payload_start, read_kind_tag, read_size, read_word, rounded_span,
    write_kind, write_size, write_word, Header, ObjectKind, FORWARD_OFFSET, HEADER_SIZE,
    MIN_OBJECT_SIZE, OBJECT_ALIGNMENT, WORD_SIZE,
};

/// Object format for dynamically sized areas of words
///
/// The size of an area is fixed when it is allocated and never changes
/// afterwards, except that the collector may overwrite it in place with a
/// forward stub or a padding block of the same span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaFormat {
    alignment: usize,
}

impl AreaFormat {
    /// Format with the given header alignment
    ///
    /// `alignment` must be a power of two no smaller than a word.
    pub fn new(alignment: usize) -> Result<Self> {
        if !alignment.is_power_of_two() || alignment < OBJECT_ALIGNMENT {
            return Err(BridgeError::AlignmentError {
                address: alignment,
                alignment: OBJECT_ALIGNMENT,
            });
        }
        Ok(Self { alignment })
    }

    /// Round an allocation request up to a size this format can hold
    ///
    /// Fails if the rounded size no longer fits the header's size field.
    pub fn object_size(&self, requested: usize) -> Result<usize> {
        rounded_span(requested, self.alignment)
    }

    /// Walk one header inside `[addr, limit)` and return the next address
    ///
    /// # Safety
    /// `addr` must be a readable header address.
    pub unsafe fn checked_skip(&self, addr: usize, limit: usize) -> Result<(Header, usize)> {
        let header = Header::read(addr)?;
        check_span(addr, header.span(), self.alignment)?;

        let next = addr + header.span();
        if next > limit {
            log::error!(
                "{} at {:#x} spans {} bytes, past limit {:#x}",
                header.kind,
                addr,
                header.span(),
                limit
            );
            return Err(BridgeError::format_violation(
                addr,
                format!("skip to {:#x} passes limit {:#x}", next, limit),
            ));
        }
        Ok((header, next))
    }
}

impl Default for AreaFormat {
    fn default() -> Self {
        Self {
            alignment: OBJECT_ALIGNMENT,
        }
    }
}

impl ObjectFormat for AreaFormat {
    fn alignment(&self) -> usize {
        self.alignment
    }

    fn header_size(&self) -> usize {
        HEADER_SIZE
    }

    unsafe fn scan(&self, ss: &mut dyn ScanState, base: usize, limit: usize) -> Result<()> {
        let mut addr = base;

        while addr < limit {
            let (header, next) = self.checked_skip(addr, limit)?;

            match header.kind {
                ObjectKind::Object => {
                    let mut slot = payload_start(addr);
                    while slot < next {
                        ss.fix(&mut *(slot as *mut u64))?;
                        slot += WORD_SIZE;
                    }
                    log::trace!("scanned {} slots of object at {:#x}", header.slot_count(), addr);
                }
                ObjectKind::Array | ObjectKind::Padding | ObjectKind::Forward => {}
            }

            addr = next;
        }

        Ok(())
    }

    unsafe fn skip(&self, addr: usize) -> usize {
        addr + read_size(addr)
    }

    unsafe fn is_forwarded(&self, addr: usize) -> Option<usize> {
        if read_kind_tag(addr) == ObjectKind::Forward.tag() {
            return Some(read_word(addr + FORWARD_OFFSET) as usize);
        }
        None
    }

    unsafe fn forward(&self, old: usize, new: usize) {
        let span = self.skip(old) - old;
        debug_assert!(span >= MIN_OBJECT_SIZE, "forward stub does not fit {} bytes", span);

        write_kind(old, ObjectKind::Forward);
        write_size(old, span as u32);
        write_word(old + FORWARD_OFFSET, new as u64);
    }

    unsafe fn pad(&self, addr: usize, size: usize) {
        debug_assert!(size >= HEADER_SIZE && size % self.alignment == 0);

        // Spans past the size field become a run of padding blocks.
        let mut addr = addr;
        let mut remaining = size;
        while remaining > 0 {
            let block = padding_block(remaining, self.alignment);
            Header::padding(block as u32).write(addr);
            addr += block;
            remaining -= block;
        }
    }
}

/// Size of the first padding block covering `remaining` bytes
fn padding_block(remaining: usize, alignment: usize) -> usize {
    remaining.min(max_span(alignment))
}
