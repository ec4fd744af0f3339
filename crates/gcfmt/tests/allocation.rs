//! Allocation Handshake Tests
//!
//! End-to-end tests of reserve/initialize/commit against a real arena:
//! - Committed objects carry exactly the requested header
//! - Sizes round up to the format alignment
//! - Lost commit races retry transparently and idempotently
//! - Exhaustion surfaces immediately without a retry
//! - Roots and object fields follow relocated objects
//!
//! ============================================================================
//! EACH TEST FINDS SPECIFIC BUGS - DO NOT WEAKEN ASSERTIONS
//! ============================================================================

mod common;

use common::{
    assert_address_aligned, object_bytes, ArenaFixture, RacePoint, RacingBuffer,
    DEFAULT_ALIGNMENT,
};
use gcfmt::logging::{self, BridgeEvent};
use gcfmt::object::header::{read_word, Header, ObjectKind};
use gcfmt::{
    AllocRequest, AllocationPoint, BridgeError, ClassDesc, Collector, HandleTable, Handshake,
    Mutator, ObjRef, Value,
};
use std::collections::HashSet;
use std::thread;

/// ============================================================================
/// COMMITTED LAYOUT
/// ============================================================================

/// Scenario: allocate 32 bytes of type 7
///
/// **Bug this finds:** header fields written to the wrong offsets
/// **Invariant verified:** header {Object, 7, 32}, payload all zero
#[test]
fn test_allocate_type_seven() {
    let fixture = ArenaFixture::with_defaults();
    let mut buffer = fixture.buffer();

    let addr = fixture.allocate(&mut buffer, ObjectKind::Object, 7, 32);

    assert_address_aligned(addr, DEFAULT_ALIGNMENT, "type 7 object");
    let header = unsafe { Header::read(addr) }.unwrap();
    assert_eq!(header.kind, ObjectKind::Object);
    assert_eq!(header.secondary, 7);
    assert_eq!(header.size, 32);
    for offset in (8..32).step_by(8) {
        assert_eq!(unsafe { read_word(addr + offset) }, 0, "slot at +{}", offset);
    }
    assert_eq!(fixture.walk(), vec![addr]);
}

/// **Bug this finds:** spans below the minimum, or not a multiple of 8
/// **Invariant verified:** 1 -> 16, 16 -> 16, 17 -> 24, 33 -> 40
#[test]
fn test_sizes_round_up() {
    let fixture = ArenaFixture::with_defaults();
    let mut buffer = fixture.buffer();

    for (requested, expected) in [(1, 16), (16, 16), (17, 24), (33, 40)] {
        let addr = fixture.allocate(&mut buffer, ObjectKind::Object, 1, requested);
        let size = unsafe { Header::read(addr) }.unwrap().size as usize;
        assert_eq!(size, expected, "request of {} bytes", requested);
    }
}

/// Consecutive allocations from one buffer are contiguous
///
/// **Bug this finds:** commit advancing init by the wrong amount
#[test]
fn test_consecutive_allocations_are_adjacent() {
    let fixture = ArenaFixture::with_defaults();
    let mut buffer = fixture.buffer();

    let first = fixture.allocate(&mut buffer, ObjectKind::Object, 1, 24);
    let second = fixture.allocate(&mut buffer, ObjectKind::Array, 2, 40);
    let third = fixture.allocate(&mut buffer, ObjectKind::Object, 3, 16);

    assert_eq!(second, first + 24);
    assert_eq!(third, second + 40);
    assert_eq!(fixture.walk(), vec![first, second, third]);

    let stats = fixture.arena.alloc_stats();
    assert_eq!(stats.commits, 3);
    assert_eq!(stats.bytes_committed, 80);
    assert_eq!(stats.commit_races, 0);
}

/// ============================================================================
/// COMMIT RACES
/// ============================================================================

/// **Bug this finds:** the handshake giving up, or keeping a stale address
/// **Invariant verified:** three lost races, then one committed object, with
/// the heap walkable whether the collection hit before or after Initialize
#[test]
fn test_retry_after_lost_races() {
    for point in [RacePoint::AfterReserve, RacePoint::BeforeCommit] {
        let fixture = ArenaFixture::with_defaults();
        let mut racing = RacingBuffer::at(&fixture.arena, point, 3);

        let addr = fixture.allocate(&mut racing, ObjectKind::Object, 7, 32);

        assert_eq!(racing.reserves, 4, "{:?}", point);
        assert_eq!(racing.commits, 4, "{:?}", point);
        assert_eq!(fixture.arena.alloc_stats().commit_races, 3, "{:?}", point);
        assert_eq!(fixture.arena.epoch(), 3, "{:?}", point);
        assert_eq!(
            fixture.assert_heap_consistent(),
            vec![addr],
            "{:?}: aborted attempts must not be walkable",
            point
        );
    }

    let raced = logging::get_events()
        .into_iter()
        .filter(|event| matches!(event, BridgeEvent::CommitRace { size: 32, .. }))
        .count();
    assert!(raced >= 6, "expected CommitRace events, found {}", raced);
}

/// The object committed after races is byte-identical to a race-free one
///
/// **Bug this finds:** state from an aborted attempt leaking into the result
#[test]
fn test_retry_is_idempotent() {
    let calm = ArenaFixture::with_defaults();
    let mut buffer = calm.buffer();
    let expected = object_bytes(calm.allocate(&mut buffer, ObjectKind::Object, 5, 48));

    for point in [RacePoint::AfterReserve, RacePoint::BeforeCommit] {
        let stormy = ArenaFixture::with_defaults();
        let mut racing = RacingBuffer::at(&stormy.arena, point, 3);
        let addr = stormy.allocate(&mut racing, ObjectKind::Object, 5, 48);

        assert_eq!(object_bytes(addr), expected, "{:?}", point);
        assert_eq!(stormy.assert_heap_consistent(), vec![addr], "{:?}", point);
    }
}

/// Scenario: a collection lands between Reserve and Initialize
///
/// **Bug this finds:** the collector padding over a live reservation, which
/// Initialize then overwrites with a header followed by zero-size words
#[test]
fn test_collection_between_reserve_and_initialize() {
    let fixture = ArenaFixture::with_defaults();
    let mut buffer = fixture.buffer();
    let kept = fixture.allocate(&mut buffer, ObjectKind::Object, 1, 16);
    let request = AllocRequest::new(ObjectKind::Object, 2, 32).unwrap();

    let addr = buffer.reserve(32).unwrap();
    fixture.arena.flip();
    unsafe { request.initialize(addr, 32) };
    assert!(!buffer.commit(addr, 32));

    let retry = fixture.allocate(&mut buffer, ObjectKind::Object, 2, 32);
    assert_ne!(retry, addr);
    assert_eq!(fixture.assert_heap_consistent(), vec![kept, retry]);
}

/// Reserve keeps handing out the same address until a commit succeeds
///
/// **Bug this finds:** reserve advancing past space that was never committed
#[test]
fn test_repeated_reserve_without_commit() {
    let fixture = ArenaFixture::with_defaults();
    let mut buffer = fixture.buffer();

    let first = buffer.reserve(32).unwrap();
    let second = buffer.reserve(32).unwrap();
    assert_eq!(first, second);
    assert!(fixture.walk().is_empty());
}

/// ============================================================================
/// EXHAUSTION
/// ============================================================================

/// **Bug this finds:** retry loop spinning on a request that can never fit
/// **Invariant verified:** one reserve, no commit, ResourceExhausted
#[test]
fn test_exhaustion_is_not_retried() {
    let fixture = ArenaFixture::with_defaults();
    let mut racing = RacingBuffer::new(&fixture.arena, 0);
    let request =
        AllocRequest::new(ObjectKind::Array, 1, fixture.arena.capacity() + 8).unwrap();

    let err = fixture
        .handshake()
        .allocate(&mut racing, &request)
        .unwrap_err();

    assert!(matches!(err, BridgeError::ResourceExhausted { .. }));
    assert!(err.is_exhaustion());
    assert_eq!(racing.reserves, 1);
    assert_eq!(racing.commits, 0);
    assert_eq!(fixture.arena.alloc_stats().reserve_failures, 1);
}

/// Filling the arena ends in exhaustion, never in a corrupt heap
#[test]
fn test_fill_until_exhausted() {
    let fixture = ArenaFixture::with_arena_size(64 * 1024);
    let mut buffer = fixture.buffer();
    let handshake = fixture.handshake();
    let request = AllocRequest::new(ObjectKind::Object, 1, 200).unwrap();

    let mut committed = 0;
    let err = loop {
        match handshake.allocate(&mut buffer, &request) {
            Ok(_) => committed += 1,
            Err(err) => break err,
        }
    };
    drop(buffer);

    assert!(err.is_exhaustion());
    assert!(committed > 0);
    assert_eq!(fixture.walk().len(), committed);
}

/// ============================================================================
/// RELOCATION
/// ============================================================================

/// **Bug this finds:** roots left pointing at forward stubs
/// **Invariant verified:** root slots and fields follow evacuated objects
#[test]
fn test_roots_follow_evacuation() {
    let fixture = ArenaFixture::with_defaults();
    let mut mutator = Mutator::new(&fixture.arena, &fixture.config).unwrap();

    let parent = mutator.alloc(0, &ClassDesc::new(1, 2)).unwrap();
    let child = mutator.alloc(1, &ClassDesc::new(2, 1)).unwrap();
    parent.set_field(0, Value::Obj(child)).unwrap();
    parent.set_field(1, Value::Float(2.5)).unwrap();
    child.set_field(0, Value::Float(-1.0)).unwrap();

    let moved_parent = fixture.arena.evacuate(parent.addr()).unwrap();
    let moved_child = fixture.arena.evacuate(child.addr()).unwrap();
    let fixed = fixture.arena.update_references().unwrap();

    // Two root slots plus the parent's field in its new copy.
    assert_eq!(fixed, 3);
    assert_eq!(mutator.load_obj(0).unwrap().map(|o| o.addr()), Some(moved_parent));
    assert_eq!(mutator.load_obj(1).unwrap().map(|o| o.addr()), Some(moved_child));

    let parent = mutator.load_obj(0).unwrap().unwrap();
    let field = parent.get_field(0).unwrap().as_obj().unwrap();
    assert_eq!(field.addr(), moved_child);
    assert_eq!(parent.get_field(1).unwrap().as_float(), Some(2.5));
    assert_eq!(field.get_field(0).unwrap().as_float(), Some(-1.0));
    assert_eq!(fixture.walk(), vec![moved_parent, moved_child]);
}

/// **Bug this finds:** handles not registered as roots
#[test]
fn test_handles_follow_evacuation() {
    let fixture = ArenaFixture::with_defaults();
    let mut buffer = fixture.buffer();
    let mut handles = HandleTable::new(&fixture.arena, 4).unwrap();

    let addr = fixture.allocate(&mut buffer, ObjectKind::Object, 9, 24);
    let obj = unsafe { ObjRef::from_raw(addr) };
    let handle = handles.alloc_handle(Value::Obj(obj)).unwrap();
    let number = handles.alloc_handle(Value::Float(3.0)).unwrap();

    let moved = fixture.arena.evacuate(addr).unwrap();
    fixture.arena.update_references().unwrap();

    let value = handles.get(handle).unwrap();
    assert_eq!(value.as_obj().map(|o| o.addr()), Some(moved));
    assert_eq!(handles.get(number).unwrap().as_float(), Some(3.0));

    handles.free_handle(handle).unwrap();
    assert_eq!(handles.live(), 1);
}

/// ============================================================================
/// CONCURRENCY
/// ============================================================================

/// Threads with their own buffers never hand out overlapping space
///
/// **Bug this finds:** two buffers carving the same chunk
#[test]
fn test_threads_with_private_buffers() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 200;

    let fixture = ArenaFixture::with_defaults();

    let handles: Vec<_> = (0..THREADS)
        .map(|thread_id| {
            let arena = fixture.arena.clone();
            let config = fixture.config.clone();
            thread::spawn(move || {
                let mut buffer = arena.create_buffer().unwrap();
                let handshake = Handshake::for_collector(&arena, &config).unwrap();
                let request =
                    AllocRequest::new(ObjectKind::Object, thread_id as u16, 32).unwrap();
                (0..PER_THREAD)
                    .map(|_| handshake.allocate(&mut buffer, &request).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for addr in handle.join().unwrap() {
            assert!(seen.insert(addr), "address {:#x} handed out twice", addr);
        }
    }

    assert_eq!(seen.len(), THREADS * PER_THREAD);
    let walked: HashSet<usize> = fixture.walk().into_iter().collect();
    assert_eq!(walked, seen);
}
