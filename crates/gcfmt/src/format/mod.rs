//! Object Formats - callbacks the collector invokes during pauses
//!
//! A format is registered with the collector once, at arena creation, and is
//! never replaced. The collector calls it only while it holds exclusive access
//! to the range passed in, so none of these callbacks lock anything.
//!
//! # Callbacks
//!
//! | callback       | purpose                                              |
//! |----------------|------------------------------------------------------|
//! | `scan`         | report every reference slot in `[base, limit)`       |
//! | `skip`         | address of the next header                           |
//! | `is_forwarded` | new address if the header is a forward stub          |
//! | `forward`      | overwrite a relocated object with a forward stub     |
//! | `pad`          | overwrite a span with a padding block                |

pub mod area;

pub use area::AreaFormat;

use crate::error::Result;
use crate::object::header::{read_kind_tag, read_word, ObjectKind, FORWARD_OFFSET};

/// The collector's side of a scan: its fix operation
///
/// `fix` may rewrite `*slot` to the referent's new address. An error aborts
/// the scan call it was made from.
pub trait ScanState {
    fn fix(&mut self, slot: &mut u64) -> Result<()>;
}

impl<F> ScanState for F
where
    F: FnMut(&mut u64) -> Result<()>,
{
    fn fix(&mut self, slot: &mut u64) -> Result<()> {
        self(slot)
    }
}

/// Client-defined object format
///
/// All callbacks are `unsafe`: addresses must lie inside memory the collector
/// owns exclusively for the duration of the call and must be header
/// addresses produced by this format.
pub trait ObjectFormat: Send + Sync {
    /// Declared header alignment
    fn alignment(&self) -> usize;

    fn header_size(&self) -> usize;

    /// Apply `ss.fix` to every reference slot of every Object in `[base, limit)`
    ///
    /// # Safety
    /// `[base, limit)` must be a walkable span of formatted headers.
    unsafe fn scan(&self, ss: &mut dyn ScanState, base: usize, limit: usize) -> Result<()>;

    /// Address of the header following the one at `addr`
    ///
    /// # Safety
    /// `addr` must be a header address.
    unsafe fn skip(&self, addr: usize) -> usize;

    /// New address if `addr` holds a forward stub
    ///
    /// # Safety
    /// `addr` must be a header address.
    unsafe fn is_forwarded(&self, addr: usize) -> Option<usize>;

    /// Turn the object at `old` into a forward stub pointing at `new`
    ///
    /// # Safety
    /// `old` must be an Object or Array header whose contents were already
    /// copied to `new`.
    unsafe fn forward(&self, old: usize, new: usize);

    /// Write a padding block of `size` bytes at `addr`
    ///
    /// # Safety
    /// `[addr, addr + size)` must be writable and owned by the collector.
    unsafe fn pad(&self, addr: usize, size: usize);
}

/// Follow forward stubs from `addr` to the authoritative address
///
/// # Safety
/// `addr` must be a header address; forward chains must be acyclic.
pub unsafe fn resolve_forward(mut addr: usize) -> usize {
    while read_kind_tag(addr) == ObjectKind::Forward.tag() {
        addr = read_word(addr + FORWARD_OFFSET) as usize;
    }
    addr
}
