//! # gcfmt - Client Object Format for a Relocating Collector
//!
//! gcfmt is the bridge a host runtime needs to embed an external, automatic,
//! relocating memory manager. It defines how heap objects are laid out so the
//! collector can scan, relocate and reclaim them, and the handshake a mutator
//! uses to allocate from a buffer the collector may invalidate at any time.
//!
//! ## Overview
//!
//! - **Object Header Model**: an 8-byte versioned header in front of every block
//! - **Format Callbacks**: scan, skip, is_forwarded, forward and pad
//! - **Tag Contract**: one mask separating heap pointers from immediates
//! - **Allocation Handshake**: reserve, initialize, commit, retry on a race
//! - **Walk Reporter**: prints every formatted object for debugging
//!
//! The collector itself sits behind the [`Collector`] trait. [`LocalArena`]
//! implements it in-process over an anonymous mapping.
//!
//! ## Quick Start
//!
//! ```rust
//! use gcfmt::{BridgeConfig, ClassDesc, LocalArena, Mutator, Value};
//!
//! fn main() -> Result<(), gcfmt::BridgeError> {
//!     let config = BridgeConfig {
//!         arena_size: 1024 * 1024,
//!         root_slots: 64,
//!         ..Default::default()
//!     };
//!     let arena = LocalArena::new(config.clone())?;
//!     let mut mutator = Mutator::new(&arena, &config)?;
//!
//!     // Allocate a two-slot object straight into root slot 0
//!     let point = mutator.alloc(0, &ClassDesc::new(7, 2))?;
//!     point.set_field(0, Value::Float(1.5))?;
//!
//!     // Relocate it the way a collector would
//!     let moved = arena.evacuate(point.addr())?;
//!     arena.update_references()?;
//!
//!     assert_eq!(mutator.load_obj(0)?.map(|obj| obj.addr()), Some(moved));
//!     assert_eq!(point.get_field(0)?.as_float(), Some(1.5));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                      Mutator                          │
//! │   RootTable (tag contract)      Allocation Handshake  │
//! └───────────────┬────────────────────────┬──────────────┘
//!                 │ register               │ reserve / commit
//! ┌───────────────▼────────────────────────▼──────────────┐
//! │                 Collector (black box)                  │
//! └───────────────┬────────────────────────┬──────────────┘
//!                 │ scan / skip / forward  │ walk
//! ┌───────────────▼──────────┐   ┌─────────▼──────────────┐
//! │       ObjectFormat       │   │     WalkReporter       │
//! └──────────────────────────┘   └────────────────────────┘
//! ```
//!
//! ## Safety
//!
//! Format callbacks work on raw addresses and are `unsafe`. The collector
//! only calls them on ranges it owns exclusively. Mutators must:
//!
//! 1. **Root new objects before commit**: [`Mutator::alloc`] does this
//! 2. **Never write Padding or Forward headers**: only the collector does
//! 3. **Resolve before dereferencing**: [`ObjRef`] always follows forward stubs
//!
//! ## Platform Support
//!
//! 64-bit targets only: the tag contract splits a 64-bit word into a 16-bit
//! tag and a 48-bit address.
//!
//! ## Modules
//!
//! - [`allocator`]: allocation requests and the reserve/commit handshake
//! - [`collector`]: the collector boundary and the local arena
//! - [`config`]: bridge configuration and validation
//! - [`error`]: error types for all gcfmt operations
//! - [`format`]: the object format callbacks
//! - [`logging`]: structured bridge events
//! - [`mutator`]: single-owner allocation context
//! - [`object`]: header layout, tag contract and host values
//! - [`roots`]: root tables and handle tables
//! - [`stats`]: allocation counters
//! - [`util`]: alignment and memory mapping helpers
//! - [`walk`]: the debug walk reporter

#[cfg(not(target_pointer_width = "64"))]
compile_error!("gcfmt requires a 64-bit target");

// Core
pub mod config;
pub mod error;

// Layout and format
pub mod format;
pub mod object;

// Collector boundary
pub mod allocator;
pub mod collector;
pub mod mutator;
pub mod roots;

// Diagnostics
pub mod logging;
pub mod stats;
pub mod walk;

// Utilities
pub mod util;

// Re-export main types for convenience
pub use allocator::{AllocRequest, Handshake};
pub use collector::{AllocationPoint, Collector, LocalArena, RootId};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use format::{AreaFormat, ObjectFormat, ScanState};
pub use mutator::Mutator;
pub use object::{ClassDesc, ObjRef, ObjectKind, Slot, Value};
pub use roots::{Handle, HandleTable, RootTable};
pub use stats::AllocSummary;
pub use walk::{print_reachable, WalkSummary};

/// gcfmt version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create a local arena configured from the environment
///
/// Reads `GCFMT_*` variables through [`BridgeConfig::from_env`].
///
/// # Examples
///
/// ```rust
/// let arena = gcfmt::init()?;
/// assert!(arena.capacity() > 0);
/// # Ok::<(), gcfmt::BridgeError>(())
/// ```
pub fn init() -> Result<LocalArena> {
    LocalArena::new(BridgeConfig::from_env())
}

/// Create a local arena with a custom configuration
pub fn init_with_config(config: BridgeConfig) -> Result<LocalArena> {
    LocalArena::new(config)
}
