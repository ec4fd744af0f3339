//! Test Utilities for the gcfmt Protocol Suite
//!
//! Fixtures around [`LocalArena`] plus helpers that check the walkability and
//! scan contracts with ZERO tolerance: a single gap, overlap or double visit
//! fails the test.

#![allow(dead_code)]

use gcfmt::collector::LocalBuffer;
use gcfmt::object::header::{read_word, write_word, Header, ObjectKind};
use gcfmt::{
    AllocRequest, AllocationPoint, AreaFormat, BridgeConfig, Collector, Handshake, LocalArena,
    ObjectFormat, Result,
};

/// Default arena size for tests (1MB)
pub const DEFAULT_ARENA_SIZE: usize = 1024 * 1024;

/// Default buffer chunk size for tests (4KB)
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024;

/// Default alignment (8 bytes)
pub const DEFAULT_ALIGNMENT: usize = 8;

/// ============================================================================
/// ARENA FIXTURE
/// ============================================================================

/// Test fixture owning one local arena
pub struct ArenaFixture {
    pub arena: LocalArena,
    pub config: BridgeConfig,
}

impl ArenaFixture {
    /// **Bug this finds:** Configuration validation bugs, mapping failures
    pub fn with_defaults() -> Self {
        Self::with_arena_size(DEFAULT_ARENA_SIZE)
    }

    /// **Bug this finds:** Exhaustion handling near the end of the arena
    pub fn with_arena_size(arena_size: usize) -> Self {
        let config = BridgeConfig {
            arena_size,
            buffer_size: DEFAULT_BUFFER_SIZE.min(arena_size),
            root_slots: 64,
            verbose: false,
            ..Default::default()
        };

        let arena = LocalArena::new(config.clone())
            .expect("arena initialization should succeed with valid config");

        Self { arena, config }
    }

    pub fn buffer(&self) -> LocalBuffer {
        self.arena
            .create_buffer()
            .expect("buffer creation should succeed")
    }

    pub fn handshake(&self) -> Handshake {
        Handshake::for_collector(&self.arena, &self.config)
            .expect("handshake parameters should match the arena format")
    }

    /// Run the full handshake for a `kind` block of `bytes` bytes
    ///
    /// **Bug this finds:** Handshake bugs, header encoding errors
    pub fn allocate<A: AllocationPoint>(
        &self,
        buffer: &mut A,
        kind: ObjectKind,
        class: u16,
        bytes: usize,
    ) -> usize {
        let request = AllocRequest::new(kind, class, bytes).expect("valid request");
        self.handshake()
            .allocate(buffer, &request)
            .unwrap_or_else(|e| panic!("allocation of {} bytes failed: {:?}", bytes, e))
    }

    /// Walk the arena and fix references, failing on any format violation
    ///
    /// **Bug this finds:** Raced or abandoned spans left unwalkable
    #[track_caller]
    pub fn assert_heap_consistent(&self) -> Vec<usize> {
        let walked = self.walk();
        self.arena
            .update_references()
            .unwrap_or_else(|e| panic!("update_references failed: {:?}", e));
        walked
    }

    /// Addresses the collector enumerates, in walk order
    pub fn walk(&self) -> Vec<usize> {
        let mut seen = Vec::new();
        self.arena
            .walk_formatted_objects(&mut |addr: usize| {
                seen.push(addr);
                Ok(())
            })
            .expect("walk should succeed on a well-formed arena");
        seen
    }
}

/// ============================================================================
/// RACING BUFFER
/// ============================================================================

/// Where a simulated collection lands inside the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RacePoint {
    /// Between Reserve and Initialize
    AfterReserve,
    /// Between Initialize and Commit
    BeforeCommit,
}

/// Buffer that starts a collection during each of its first `races`
/// handshake attempts, so those commits lose the race
pub struct RacingBuffer<'a> {
    pub inner: LocalBuffer,
    arena: &'a LocalArena,
    point: RacePoint,
    races_left: usize,
    pub reserves: usize,
    pub commits: usize,
}

impl<'a> RacingBuffer<'a> {
    pub fn new(arena: &'a LocalArena, races: usize) -> Self {
        Self::at(arena, RacePoint::BeforeCommit, races)
    }

    pub fn at(arena: &'a LocalArena, point: RacePoint, races: usize) -> Self {
        Self {
            inner: arena.create_buffer().expect("buffer creation should succeed"),
            arena,
            point,
            races_left: races,
            reserves: 0,
            commits: 0,
        }
    }

    fn race(&mut self, point: RacePoint) {
        if self.point == point && self.races_left > 0 {
            self.races_left -= 1;
            self.arena.flip();
        }
    }
}

impl<'a> AllocationPoint for RacingBuffer<'a> {
    fn reserve(&mut self, size: usize) -> Result<usize> {
        self.reserves += 1;
        let addr = self.inner.reserve(size)?;
        self.race(RacePoint::AfterReserve);
        Ok(addr)
    }

    fn commit(&mut self, addr: usize, size: usize) -> bool {
        self.commits += 1;
        self.race(RacePoint::BeforeCommit);
        self.inner.commit(addr, size)
    }
}

/// ============================================================================
/// RAW REGIONS
/// ============================================================================

/// Word-aligned scratch memory for building regions by hand
///
/// Every access goes through the pointer taken at construction.
pub struct Region {
    mem: Vec<u64>,
    base: usize,
}

impl Region {
    pub fn new(bytes: usize) -> Self {
        let mut mem = vec![0; bytes / 8];
        let base = mem.as_mut_ptr() as usize;
        Self { mem, base }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn limit(&self) -> usize {
        self.base + self.mem.len() * 8
    }

    /// Write a header at `offset` bytes from the base
    pub fn header(&mut self, offset: usize, kind: ObjectKind, class: u16, size: usize) -> usize {
        assert!(offset + size <= self.mem.len() * 8, "header past region end");
        let addr = self.base() + offset;
        unsafe { Header::new(kind, class, size as u32).write(addr) };
        addr
    }

    pub fn word(&self, offset: usize) -> u64 {
        assert!(offset + 8 <= self.mem.len() * 8, "word past region end");
        unsafe { read_word(self.base + offset) }
    }

    pub fn set_word(&mut self, offset: usize, word: u64) {
        assert!(offset + 8 <= self.mem.len() * 8, "word past region end");
        unsafe { write_word(self.base + offset, word) }
    }

    pub fn bytes(&self, offset: usize, len: usize) -> Vec<u8> {
        let start = self.base() + offset;
        unsafe { std::slice::from_raw_parts(start as *const u8, len).to_vec() }
    }
}

/// ============================================================================
/// STRICT ASSERTION HELPERS
/// ============================================================================

/// Walk `[base, limit)` with skip and return every header address
///
/// **Bug this finds:** Span mismatches after forward/pad installs
/// **Tolerance:** ZERO - the walk must land exactly on `limit`
#[track_caller]
pub fn assert_walkable(format: &AreaFormat, base: usize, limit: usize, context: &str) -> Vec<usize> {
    let mut headers = Vec::new();
    let mut addr = base;

    while addr < limit {
        headers.push(addr);
        let next = unsafe { format.skip(addr) };
        assert!(
            next > addr,
            "{}: skip({:#x}) = {:#x} does not advance - zero-size header",
            context,
            addr,
            next
        );
        addr = next;
    }

    assert_eq!(
        addr, limit,
        "{}: walk overshot the limit by {} bytes - span overlap",
        context,
        addr - limit
    );
    headers
}

/// Addresses of every slot `scan` hands to fix, in visit order
///
/// **Bug this finds:** Missed slots, double visits, Array payloads traced
pub fn scanned_slots(format: &AreaFormat, base: usize, limit: usize) -> Result<Vec<usize>> {
    let mut visited = Vec::new();
    let mut fix = |slot: &mut u64| -> Result<()> {
        visited.push(slot as *mut u64 as usize);
        Ok(())
    };
    unsafe { format.scan(&mut fix, base, limit)? };
    Ok(visited)
}

/// Bytes of the committed block at `addr`
pub fn object_bytes(addr: usize) -> Vec<u8> {
    let size = unsafe { Header::read(addr) }
        .expect("committed block must have a valid header")
        .size as usize;
    unsafe { std::slice::from_raw_parts(addr as *const u8, size).to_vec() }
}

/// Assert that addresses are aligned to `alignment`
#[track_caller]
pub fn assert_address_aligned(address: usize, alignment: usize, context: &str) {
    assert_eq!(
        address % alignment,
        0,
        "{}: Address {:#x} is not {}-byte aligned",
        context,
        address,
        alignment
    );
}
