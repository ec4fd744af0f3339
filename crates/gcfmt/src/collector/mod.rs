//! Collector Boundary
//!
//! The collector runtime is a black box. The bridge only needs the handful of
//! operations below; [`LocalArena`] provides them in-process.
//!
//! | operation                | bridge use                              |
//! |--------------------------|-----------------------------------------|
//! | `create_buffer`          | one allocation buffer per mutator       |
//! | `register_root_table`    | ambiguous root tables (tag contract)    |
//! | `walk_formatted_objects` | debug walk reporter                     |
//! | `format`                 | the format registered at creation       |

pub mod local;

pub use local::{LocalArena, LocalBuffer};

use crate::error::Result;
use crate::format::ObjectFormat;
use crate::object::tag::TagMask;
use crate::stats::AllocSummary;

/// Identifies a registered root table
pub type RootId = usize;

/// One owner's cursor into collector-supplied free space
///
/// Not shared: every method takes `&mut self`.
pub trait AllocationPoint {
    /// Request `size` bytes
    ///
    /// The returned address is provisional: its contents are not an object
    /// and the collector does not see it until [`AllocationPoint::commit`]
    /// succeeds. Fails with `ResourceExhausted` or `AlignmentError` (when
    /// `size` is not a multiple of the format alignment).
    fn reserve(&mut self, size: usize) -> Result<usize>;

    /// Publish the object initialized at `addr`
    ///
    /// Returns `false` when a collection invalidated the reservation since
    /// the matching reserve; the caller must restart at reserve.
    fn commit(&mut self, addr: usize, size: usize) -> bool;
}

/// The external collector runtime
pub trait Collector {
    type Buffer: AllocationPoint;

    /// Format registered at creation; never replaced
    fn format(&self) -> &dyn ObjectFormat;

    fn create_buffer(&self) -> Result<Self::Buffer>;

    /// Register `count` words at `base` as an ambiguous root table
    ///
    /// Words matching `tag` are treated as references.
    ///
    /// # Safety
    /// `[base, base + count * 8)` must stay valid and word aligned until the
    /// table is deregistered.
    unsafe fn register_root_table(&self, base: usize, count: usize, tag: TagMask)
        -> Result<RootId>;

    fn deregister_root(&self, id: RootId) -> Result<()>;

    /// Visit every formatted Object and Array in heap-address order
    ///
    /// Runs while the mutator is suspended. `visit` must not call back into
    /// the collector.
    fn walk_formatted_objects(&self, visit: &mut dyn FnMut(usize) -> Result<()>) -> Result<()>;

    /// Allocation counters
    fn alloc_stats(&self) -> AllocSummary;
}
