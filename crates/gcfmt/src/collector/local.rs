//! Local Arena - in-process collector double
//!
//! Implements the [`Collector`] boundary on top of one anonymous mapping so
//! the format callbacks and the allocation handshake can be exercised without
//! an external runtime. It never decides liveness: callers drive relocation
//! and reclamation explicitly.
//!
//! Memory layout:
//! ```text
//! base                                   cursor                     limit
//! ┌─────────┬──────────┬─────────┬────────┬──────────────────────────┐
//! │ chunk 0 │ chunk 1  │ chunk 2 │ copy   │        unused            │
//! └─────────┴──────────┴─────────┴────────┴──────────────────────────┘
//! ```
//!
//! Each chunk is walkable from its base up to its `init` mark. Buffers carve
//! open chunks; [`LocalArena::evacuate`] carves closed, exactly sized copy
//! chunks. [`LocalArena::flip`] seals every open chunk (padding its tail past
//! any outstanding reservation) and bumps the epoch, which makes every
//! outstanding reservation fail to commit. The rejected commit pads the
//! reserved span.

use crate::collector::{AllocationPoint, Collector, RootId};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::format::{AreaFormat, ObjectFormat};
use crate::logging::{self, BridgeEvent, BridgeLoggerConfig, LogLevel};
use crate::object::header::{Header, ObjectKind, WORD_SIZE};
use crate::object::tag::TagMask;
use crate::stats::{AllocStats, AllocSummary};
use crate::util::{Alignment, AnonMapping};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::ptr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct Chunk {
    base: usize,
    /// End of the committed, walkable prefix
    init: usize,
    /// End of the outstanding reservation; equals `init` when there is none
    reserved: usize,
    limit: usize,
    open: bool,
}

impl Chunk {
    fn free(&self) -> usize {
        self.limit - self.init
    }
}

#[derive(Debug)]
struct ArenaState {
    cursor: usize,
    /// Ordered by base address
    chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Copy)]
struct RootEntry {
    base: usize,
    count: usize,
    tag: TagMask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reservation {
    addr: usize,
    size: usize,
    epoch: u64,
}

struct ArenaInner {
    mapping: AnonMapping,
    format: AreaFormat,
    config: BridgeConfig,
    epoch: AtomicU64,
    state: Mutex<ArenaState>,
    roots: Mutex<IndexMap<RootId, RootEntry>>,
    next_root: AtomicUsize,
    stats: AllocStats,
}

impl ArenaInner {
    /// Take a new chunk from the cursor
    ///
    /// Open chunks get at least `buffer_size` bytes when the arena has them.
    fn carve(&self, state: &mut ArenaState, size: usize, open: bool) -> Result<usize> {
        let available = self.mapping.limit() - state.cursor;
        if size > available {
            return Err(BridgeError::ResourceExhausted {
                requested: size,
                available,
            });
        }

        let len = if open {
            self.config.buffer_size.max(size).min(available)
        } else {
            size
        };
        let base = state.cursor;
        let init = if open { base } else { base + len };
        state.chunks.push(Chunk {
            base,
            init,
            reserved: init,
            limit: base + len,
            open,
        });
        state.cursor += len;

        let kind = if open { "open" } else { "copy" };
        log::trace!("carved {} chunk of {} bytes at {:#x}", kind, len, base);
        Ok(state.chunks.len() - 1)
    }

    /// Close a chunk, padding everything past the outstanding reservation
    ///
    /// The reserved span belongs to its owner until [`ArenaInner::release`].
    fn seal(&self, chunk: &mut Chunk) -> usize {
        let tail = chunk.limit - chunk.reserved;
        if tail > 0 {
            unsafe { self.format.pad(chunk.reserved, tail) };
        }
        chunk.open = false;
        if chunk.reserved == chunk.init {
            chunk.init = chunk.limit;
            chunk.reserved = chunk.limit;
        }
        tail
    }

    /// Drop the outstanding reservation of a chunk
    ///
    /// On a sealed chunk the abandoned span is padded, which makes the whole
    /// chunk walkable. Only call this once the owner stopped writing to it.
    fn release(&self, chunk: &mut Chunk) -> usize {
        if chunk.open {
            chunk.reserved = chunk.init;
            return 0;
        }

        let span = chunk.reserved - chunk.init;
        if span > 0 {
            unsafe { self.format.pad(chunk.init, span) };
        }
        chunk.init = chunk.limit;
        chunk.reserved = chunk.limit;
        span
    }

    /// Release and seal a chunk its owner is done with
    fn retire(&self, chunk: &mut Chunk) {
        self.release(chunk);
        if chunk.open {
            self.seal(chunk);
        }
    }

    /// Whether `addr` is the address of a header in a walkable prefix
    fn is_header(&self, state: &ArenaState, addr: usize) -> Result<bool> {
        if !Alignment::is_aligned(addr, self.format.alignment()) {
            return Ok(false);
        }

        let index = state.chunks.partition_point(|chunk| chunk.base <= addr);
        if index == 0 {
            return Ok(false);
        }
        let chunk = &state.chunks[index - 1];
        if addr >= chunk.init {
            return Ok(false);
        }

        let mut cursor = chunk.base;
        while cursor < addr {
            let (_, next) = unsafe { self.format.checked_skip(cursor, chunk.init)? };
            cursor = next;
        }
        Ok(cursor == addr)
    }

    /// Addresses of every header in the walkable prefixes, ascending
    fn header_index(&self, state: &ArenaState) -> Result<Vec<usize>> {
        let mut headers = Vec::new();
        for chunk in state.chunks.iter() {
            let mut addr = chunk.base;
            while addr < chunk.init {
                let (_, next) = unsafe { self.format.checked_skip(addr, chunk.init)? };
                headers.push(addr);
                addr = next;
            }
        }
        Ok(headers)
    }

    /// Final address of a relocated object, if `addr` is a forward stub
    ///
    /// `headers` comes from [`ArenaInner::header_index`].
    fn forwarded_target(&self, headers: &[usize], addr: usize) -> Option<usize> {
        headers.binary_search(&addr).ok()?;

        let mut current = addr;
        while let Some(next) = unsafe { self.format.is_forwarded(current) } {
            current = next;
        }
        (current != addr).then_some(current)
    }

    fn require_header(&self, state: &ArenaState, addr: usize) -> Result<Header> {
        if !self.is_header(state, addr)? {
            return Err(BridgeError::InvalidArgument(format!(
                "{:#x} is not a committed header address",
                addr
            )));
        }
        unsafe { Header::read(addr) }
    }
}

/// Record format violations before handing them back
fn reported(err: BridgeError) -> BridgeError {
    if let BridgeError::FormatViolation { address, reason } = &err {
        log::error!("format violation at {:#x}: {}", address, reason);
        logging::log_event(BridgeEvent::FormatViolation {
            address: *address,
            reason: reason.clone(),
        });
    }
    err
}

/// In-process collector over one anonymous mapping
///
/// Cheap to clone; clones share the arena.
#[derive(Clone)]
pub struct LocalArena {
    inner: Arc<ArenaInner>,
}

impl LocalArena {
    /// Map an arena of `config.arena_size` bytes and register an
    /// [`AreaFormat`] with `config.alignment`
    pub fn new(config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        let format = AreaFormat::new(config.alignment)?;
        let mapping = AnonMapping::anonymous(config.arena_size)?;

        if !Alignment::is_aligned(mapping.base(), config.alignment) {
            return Err(BridgeError::AlignmentError {
                address: mapping.base(),
                alignment: config.alignment,
            });
        }

        if config.verbose {
            logging::configure_logger(BridgeLoggerConfig {
                level: LogLevel::Debug,
                console: true,
                max_events: config.max_logged_events,
                ..Default::default()
            });
        }

        log::debug!(
            "local arena: {} bytes at {:#x}, buffer size {}",
            mapping.size(),
            mapping.base(),
            config.buffer_size
        );

        let cursor = mapping.base();
        Ok(Self {
            inner: Arc::new(ArenaInner {
                mapping,
                format,
                config,
                epoch: AtomicU64::new(0),
                state: Mutex::new(ArenaState {
                    cursor,
                    chunks: Vec::new(),
                }),
                roots: Mutex::new(IndexMap::new()),
                next_root: AtomicUsize::new(1),
                stats: AllocStats::new(),
            }),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Current collection epoch
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::Acquire)
    }

    pub fn base(&self) -> usize {
        self.inner.mapping.base()
    }

    pub fn capacity(&self) -> usize {
        self.inner.mapping.size()
    }

    /// Bytes handed out to chunks so far
    pub fn used_bytes(&self) -> usize {
        self.inner.state.lock().cursor - self.inner.mapping.base()
    }

    pub fn contains(&self, addr: usize) -> bool {
        self.inner.mapping.contains(addr)
    }

    pub fn root_count(&self) -> usize {
        self.inner.roots.lock().len()
    }

    pub fn stats(&self) -> &AllocStats {
        &self.inner.stats
    }

    /// Start a collection
    ///
    /// Seals every open chunk and invalidates every outstanding reservation.
    /// Reserved spans are left to their owners, who may still be initializing
    /// them; a rejected commit pads them later. Returns the new epoch.
    pub fn flip(&self) -> u64 {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        let epoch = inner.epoch.fetch_add(1, Ordering::AcqRel) + 1;

        let mut padded_bytes = 0;
        for chunk in state.chunks.iter_mut().filter(|chunk| chunk.open) {
            padded_bytes += inner.seal(chunk);
        }
        drop(state);

        log::debug!("flip to epoch {}, padded {} bytes", epoch, padded_bytes);
        logging::log_event(BridgeEvent::Flip {
            epoch,
            padded_bytes,
        });
        epoch
    }

    /// Copy the object at `addr` to fresh space and leave a forward stub
    ///
    /// Returns the new address.
    pub fn evacuate(&self, addr: usize) -> Result<usize> {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        let header = inner.require_header(&state, addr).map_err(reported)?;

        match header.kind {
            ObjectKind::Object | ObjectKind::Array => {}
            ObjectKind::Padding | ObjectKind::Forward => {
                return Err(BridgeError::InvalidArgument(format!(
                    "cannot evacuate {} at {:#x}",
                    header.kind, addr
                )))
            }
        }

        let span = header.span();
        let index = inner.carve(&mut state, span, false)?;
        let new = state.chunks[index].base;

        unsafe {
            ptr::copy_nonoverlapping(addr as *const u8, new as *mut u8, span);
            inner.format.forward(addr, new);
        }
        drop(state);

        logging::log_event(BridgeEvent::Forward {
            old: addr,
            new,
            size: span,
        });
        Ok(new)
    }

    /// Rewrite every reference to a relocated object
    ///
    /// Scans every chunk through the format and every registered root table
    /// through its tag mask. Returns the number of words rewritten.
    pub fn update_references(&self) -> Result<usize> {
        let inner = &self.inner;
        let state = inner.state.lock();
        let headers = inner.header_index(&state).map_err(reported)?;
        let mut fixed = 0;

        {
            let mut fix = |slot: &mut u64| -> Result<()> {
                if let Some(new) = inner.forwarded_target(&headers, *slot as usize) {
                    *slot = new as u64;
                    fixed += 1;
                }
                Ok(())
            };

            for chunk in state.chunks.iter() {
                unsafe { inner.format.scan(&mut fix, chunk.base, chunk.init) }
                    .map_err(reported)?;
            }
        }

        let roots = inner.roots.lock();
        for entry in roots.values() {
            for index in 0..entry.count {
                let word_ptr = (entry.base + index * WORD_SIZE) as *mut u64;
                let word = unsafe { ptr::read(word_ptr) };
                if !entry.tag.is_reference(word) {
                    continue;
                }
                if let Some(new) = inner.forwarded_target(&headers, entry.tag.address(word)) {
                    unsafe { ptr::write(word_ptr, entry.tag.retarget(word, new)) };
                    fixed += 1;
                }
            }
        }

        log::debug!("updated {} references", fixed);
        Ok(fixed)
    }

    /// Overwrite the object (or stub) at `addr` with padding of its span
    pub fn reclaim(&self, addr: usize) -> Result<usize> {
        let inner = &self.inner;
        let state = inner.state.lock();
        let header = inner.require_header(&state, addr).map_err(reported)?;
        let span = header.span();

        unsafe { inner.format.pad(addr, span) };
        drop(state);

        logging::log_event(BridgeEvent::Pad { addr, size: span });
        Ok(span)
    }
}

impl Collector for LocalArena {
    type Buffer = LocalBuffer;

    fn format(&self) -> &dyn ObjectFormat {
        &self.inner.format
    }

    fn create_buffer(&self) -> Result<LocalBuffer> {
        Ok(LocalBuffer {
            arena: Arc::clone(&self.inner),
            chunk: None,
            pending: None,
        })
    }

    unsafe fn register_root_table(
        &self,
        base: usize,
        count: usize,
        tag: TagMask,
    ) -> Result<RootId> {
        if count == 0 {
            return Err(BridgeError::InvalidArgument(
                "root table must have at least one slot".to_string(),
            ));
        }
        if !Alignment::is_aligned(base, WORD_SIZE) {
            return Err(BridgeError::AlignmentError {
                address: base,
                alignment: WORD_SIZE,
            });
        }

        let id = self.inner.next_root.fetch_add(1, Ordering::Relaxed);
        self.inner
            .roots
            .lock()
            .insert(id, RootEntry { base, count, tag });

        log::debug!("registered root table {} ({} slots at {:#x})", id, count, base);
        Ok(id)
    }

    fn deregister_root(&self, id: RootId) -> Result<()> {
        self.inner
            .roots
            .lock()
            .shift_remove(&id)
            .map(|_| ())
            .ok_or_else(|| BridgeError::InvalidArgument(format!("root {} is not registered", id)))
    }

    fn walk_formatted_objects(&self, visit: &mut dyn FnMut(usize) -> Result<()>) -> Result<()> {
        let inner = &self.inner;
        let state = inner.state.lock();
        let mut objects = 0;
        let mut bytes = 0;

        for chunk in state.chunks.iter() {
            let mut addr = chunk.base;
            while addr < chunk.init {
                let (header, next) =
                    unsafe { inner.format.checked_skip(addr, chunk.init) }.map_err(reported)?;

                match header.kind {
                    ObjectKind::Object | ObjectKind::Array => {
                        visit(addr)?;
                        objects += 1;
                        bytes += header.span();
                    }
                    ObjectKind::Padding | ObjectKind::Forward => {}
                }
                addr = next;
            }
        }
        drop(state);

        logging::log_event(BridgeEvent::Walk { objects, bytes });
        Ok(())
    }

    fn alloc_stats(&self) -> AllocSummary {
        self.inner.stats.summary()
    }
}

impl std::fmt::Debug for LocalArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalArena")
            .field("mapping", &self.inner.mapping)
            .field("epoch", &self.epoch())
            .finish()
    }
}

/// Allocation buffer of a [`LocalArena`]
///
/// Reserve never advances the chunk: a retried reservation after a failed
/// commit hands out the same address unless a flip sealed the chunk.
pub struct LocalBuffer {
    arena: Arc<ArenaInner>,
    chunk: Option<usize>,
    pending: Option<Reservation>,
}

impl AllocationPoint for LocalBuffer {
    fn reserve(&mut self, size: usize) -> Result<usize> {
        let inner = &self.arena;
        inner.stats.record_reserve();

        let alignment = inner.format.alignment();
        if size == 0 || !Alignment::is_aligned(size, alignment) {
            return Err(BridgeError::AlignmentError {
                address: size,
                alignment,
            });
        }

        let mut state = inner.state.lock();
        let epoch = inner.epoch.load(Ordering::Acquire);

        let current = self.chunk.filter(|&index| {
            let chunk = &state.chunks[index];
            chunk.open && chunk.free() >= size
        });
        let index = match current {
            Some(index) => index,
            None => {
                if let Some(old) = self.chunk.take() {
                    inner.retire(&mut state.chunks[old]);
                }
                match inner.carve(&mut state, size, true) {
                    Ok(index) => index,
                    Err(err) => {
                        drop(state);
                        inner.stats.record_reserve_failure();
                        if let BridgeError::ResourceExhausted { available, .. } = &err {
                            logging::log_event(BridgeEvent::ReserveFailure {
                                size,
                                available: *available,
                            });
                        }
                        return Err(err);
                    }
                }
            }
        };

        let chunk = &mut state.chunks[index];
        let addr = chunk.init;
        chunk.reserved = addr + size;
        drop(state);

        self.chunk = Some(index);
        self.pending = Some(Reservation { addr, size, epoch });

        logging::log_event(BridgeEvent::Reserve { addr, size });
        Ok(addr)
    }

    fn commit(&mut self, addr: usize, size: usize) -> bool {
        let inner = &self.arena;
        let mut state = inner.state.lock();

        let reservation = match self.pending.take() {
            Some(reservation) if reservation.addr == addr && reservation.size == size => {
                reservation
            }
            other => {
                log::warn!("commit of {} bytes at {:#x} without matching reserve", size, addr);
                self.pending = other;
                return false;
            }
        };
        let index = match self.chunk {
            Some(index) => index,
            None => return false,
        };

        let chunk = &mut state.chunks[index];
        if reservation.epoch != inner.epoch.load(Ordering::Acquire)
            || !chunk.open
            || chunk.init != addr
        {
            let padded = inner.release(chunk);
            drop(state);
            if padded > 0 {
                log::trace!("padded {} raced bytes at {:#x}", padded, addr);
            }
            inner.stats.record_commit_race();
            return false;
        }

        chunk.init += size;
        chunk.reserved = chunk.init;
        drop(state);

        inner.stats.record_commit(size);
        logging::log_event(BridgeEvent::Commit { addr, size });
        true
    }
}

impl Drop for LocalBuffer {
    fn drop(&mut self) {
        if let Some(index) = self.chunk.take() {
            let mut state = self.arena.state.lock();
            self.arena.retire(&mut state.chunks[index]);
        }
    }
}
