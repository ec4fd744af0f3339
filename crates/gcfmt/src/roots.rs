//! Root Tables and Handles
//!
//! A [`RootTable`] is a page-aligned run of [`Slot`]s registered with the
//! collector as an ambiguous table under the [`ExactPointer`] convention:
//! every word whose tag bits are zero and which is non-zero is treated as a
//! heap reference, and rewritten in place when its referent moves.
//!
//! A [`HandleTable`] hands out individual slots of a root table through a
//! free list, for hosts that pin values one at a time.

use crate::collector::{Collector, RootId};
use crate::error::{BridgeError, Result};
use crate::object::header::WORD_SIZE;
use crate::object::tag::{ExactPointer, TagMask};
use crate::object::value::{Slot, Value};
use crate::util::AnonMapping;
use std::ops::{Index, IndexMut};
use std::slice;

/// Registered root table
///
/// Deregisters itself on drop, before its memory is unmapped.
pub struct RootTable<'a, C: Collector> {
    collector: &'a C,
    mapping: AnonMapping,
    count: usize,
    id: RootId,
}

impl<'a, C: Collector> RootTable<'a, C> {
    /// Map `count` nil slots and register them with `collector`
    pub fn new(collector: &'a C, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(BridgeError::InvalidArgument(
                "root table must have at least one slot".to_string(),
            ));
        }
        let bytes = count.checked_mul(WORD_SIZE).ok_or_else(|| {
            BridgeError::InvalidArgument(format!("root table of {} slots overflows", count))
        })?;

        let mapping = AnonMapping::anonymous(bytes)?;
        let id = unsafe {
            collector.register_root_table(mapping.base(), count, TagMask::of::<ExactPointer>())?
        };

        Ok(Self {
            collector,
            mapping,
            count,
            id,
        })
    }

    pub fn id(&self) -> RootId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn collector(&self) -> &'a C {
        self.collector
    }

    pub fn slots(&self) -> &[Slot] {
        unsafe { slice::from_raw_parts(self.mapping.base() as *const Slot, self.count) }
    }

    pub fn slots_mut(&mut self) -> &mut [Slot] {
        unsafe { slice::from_raw_parts_mut(self.mapping.base() as *mut Slot, self.count) }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.count {
            return Err(BridgeError::BoundsCheckFailed {
                index,
                length: self.count,
            });
        }
        Ok(())
    }

    /// Address of slot `index`
    pub fn slot_addr(&self, index: usize) -> Result<usize> {
        self.check_index(index)?;
        Ok(self.mapping.base() + index * WORD_SIZE)
    }

    pub fn get(&self, index: usize) -> Result<Value> {
        self.check_index(index)?;
        self.slots()[index].load()
    }

    pub fn set(&mut self, index: usize, value: Value) -> Result<()> {
        self.check_index(index)?;
        self.slots_mut()[index].store(value);
        Ok(())
    }
}

impl<'a, C: Collector> Index<usize> for RootTable<'a, C> {
    type Output = Slot;

    fn index(&self, index: usize) -> &Slot {
        &self.slots()[index]
    }
}

impl<'a, C: Collector> IndexMut<usize> for RootTable<'a, C> {
    fn index_mut(&mut self, index: usize) -> &mut Slot {
        &mut self.slots_mut()[index]
    }
}

impl<'a, C: Collector> Drop for RootTable<'a, C> {
    fn drop(&mut self) {
        if let Err(err) = self.collector.deregister_root(self.id) {
            log::warn!("failed to deregister root table {}: {}", self.id, err);
        }
    }
}

/// Index of a slot handed out by a [`HandleTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(usize);

impl Handle {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Free-list allocator over the slots of one root table
pub struct HandleTable<'a, C: Collector> {
    roots: RootTable<'a, C>,
    /// Free slot indices; the last one is handed out next
    free: Vec<usize>,
    in_use: Vec<bool>,
}

impl<'a, C: Collector> HandleTable<'a, C> {
    pub fn new(collector: &'a C, capacity: usize) -> Result<Self> {
        let roots = RootTable::new(collector, capacity)?;
        Ok(Self {
            roots,
            free: (0..capacity).rev().collect(),
            in_use: vec![false; capacity],
        })
    }

    pub fn capacity(&self) -> usize {
        self.roots.len()
    }

    /// Number of live handles
    pub fn live(&self) -> usize {
        self.capacity() - self.free.len()
    }

    /// Store `value` in a free slot
    ///
    /// Fails with `ResourceExhausted` when every slot is taken.
    pub fn alloc_handle(&mut self, value: Value) -> Result<Handle> {
        let index = self.free.pop().ok_or(BridgeError::ResourceExhausted {
            requested: 1,
            available: 0,
        })?;
        self.roots[index].store(value);
        self.in_use[index] = true;
        Ok(Handle(index))
    }

    /// Release a handle; its slot becomes nil so the collector stops seeing it
    pub fn free_handle(&mut self, handle: Handle) -> Result<()> {
        self.check_live(handle)?;
        self.roots[handle.0] = Slot::NIL;
        self.in_use[handle.0] = false;
        self.free.push(handle.0);
        Ok(())
    }

    pub fn get(&self, handle: Handle) -> Result<Value> {
        self.check_live(handle)?;
        self.roots.get(handle.0)
    }

    pub fn set(&mut self, handle: Handle, value: Value) -> Result<()> {
        self.check_live(handle)?;
        self.roots.set(handle.0, value)
    }

    pub fn roots(&self) -> &RootTable<'a, C> {
        &self.roots
    }

    fn check_live(&self, handle: Handle) -> Result<()> {
        match self.in_use.get(handle.0) {
            Some(true) => Ok(()),
            Some(false) => Err(BridgeError::InvalidArgument(format!(
                "handle {} is not allocated",
                handle.0
            ))),
            None => Err(BridgeError::BoundsCheckFailed {
                index: handle.0,
                length: self.capacity(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::LocalArena;
    use crate::config::BridgeConfig;
    use crate::util::constants::KB;

    fn arena() -> LocalArena {
        LocalArena::new(BridgeConfig {
            arena_size: 64 * KB,
            buffer_size: 4 * KB,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_root_table_registration_lifetime() {
        let arena = arena();
        {
            let table = RootTable::new(&arena, 16).unwrap();
            assert_eq!(table.len(), 16);
            assert_eq!(arena.root_count(), 1);
            assert!(table.slots().iter().all(|slot| slot.is_nil()));
        }
        assert_eq!(arena.root_count(), 0);
    }

    #[test]
    fn test_root_table_bounds() {
        let arena = arena();
        let mut table = RootTable::new(&arena, 4).unwrap();

        table.set(3, Value::Float(1.5)).unwrap();
        assert_eq!(table.get(3).unwrap().as_float(), Some(1.5));
        assert!(matches!(
            table.get(4),
            Err(BridgeError::BoundsCheckFailed { index: 4, length: 4 })
        ));
        assert!(RootTable::new(&arena, 0).is_err());
    }

    #[test]
    fn test_handles_reuse_lifo() {
        let arena = arena();
        let mut handles = HandleTable::new(&arena, 4).unwrap();

        let a = handles.alloc_handle(Value::Float(1.0)).unwrap();
        let b = handles.alloc_handle(Value::Float(2.0)).unwrap();
        assert_eq!((a.index(), b.index()), (0, 1));

        handles.free_handle(a).unwrap();
        assert!(handles.roots()[0].is_nil());

        let c = handles.alloc_handle(Value::Nil).unwrap();
        assert_eq!(c.index(), 0);
        assert_eq!(handles.get(b).unwrap().as_float(), Some(2.0));
    }

    #[test]
    fn test_handles_exhaust_and_reject_double_free() {
        let arena = arena();
        let mut handles = HandleTable::new(&arena, 2).unwrap();

        let a = handles.alloc_handle(Value::Nil).unwrap();
        handles.alloc_handle(Value::Nil).unwrap();
        assert!(handles
            .alloc_handle(Value::Nil)
            .unwrap_err()
            .is_exhaustion());

        handles.free_handle(a).unwrap();
        assert!(handles.free_handle(a).is_err());
        assert_eq!(handles.live(), 1);
    }
}
