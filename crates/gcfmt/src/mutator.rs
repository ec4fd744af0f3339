//! Mutator Context
//!
//! One owner pairs a root table with an allocation buffer. New objects are
//! made reachable from a root slot before their commit, so a collection that
//! starts right after commit already sees them.

use crate::allocator::{AllocRequest, Handshake};
use crate::collector::Collector;
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::object::value::{ClassDesc, ObjRef, Slot, Value};
use crate::roots::RootTable;

/// Single-owner allocation context
pub struct Mutator<'a, C: Collector> {
    collector: &'a C,
    roots: RootTable<'a, C>,
    buffer: C::Buffer,
    handshake: Handshake,
}

impl<'a, C: Collector> Mutator<'a, C> {
    /// Register `config.root_slots` root slots and open a buffer
    pub fn new(collector: &'a C, config: &BridgeConfig) -> Result<Self> {
        config.validate()?;
        let roots = RootTable::new(collector, config.root_slots)?;
        let buffer = collector.create_buffer()?;
        let handshake = Handshake::for_collector(collector, config)?;

        Ok(Self {
            collector,
            roots,
            buffer,
            handshake,
        })
    }

    pub fn collector(&self) -> &'a C {
        self.collector
    }

    pub fn roots(&self) -> &RootTable<'a, C> {
        &self.roots
    }

    pub fn roots_mut(&mut self) -> &mut RootTable<'a, C> {
        &mut self.roots
    }

    /// Allocate an instance of `class` into root slot `dst`
    ///
    /// The slot holds the provisional address from initialization on, and
    /// is reset to nil if the allocation fails.
    pub fn alloc(&mut self, dst: usize, class: &ClassDesc) -> Result<ObjRef> {
        self.alloc_request(dst, &AllocRequest::object(class))
    }

    /// Allocate an Array of `words` raw words into root slot `dst`
    pub fn alloc_array(&mut self, dst: usize, class: u16, words: usize) -> Result<ObjRef> {
        self.alloc_request(dst, &AllocRequest::array(class, words)?)
    }

    fn alloc_request(&mut self, dst: usize, request: &AllocRequest) -> Result<ObjRef> {
        self.roots.slot_addr(dst)?;

        let roots = &mut self.roots;
        let result = self
            .handshake
            .allocate_with(&mut self.buffer, request, |addr| {
                unsafe { roots[dst].store_raw(addr as u64) };
                Ok(())
            });

        match result {
            Ok(addr) => Ok(unsafe { ObjRef::from_raw(addr) }),
            Err(err) => {
                self.roots[dst] = Slot::NIL;
                Err(err)
            }
        }
    }

    /// Decode root slot `index`
    pub fn load(&self, index: usize) -> Result<Value> {
        self.roots.get(index)
    }

    pub fn store(&mut self, index: usize, value: Value) -> Result<()> {
        self.roots.set(index, value)
    }

    /// Object referenced by root slot `index`, if any
    pub fn load_obj(&self, index: usize) -> Result<Option<ObjRef>> {
        Ok(self.load(index)?.as_obj())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::LocalArena;
    use crate::error::BridgeError;
    use crate::object::header::ObjectKind;
    use crate::util::constants::KB;

    fn config() -> BridgeConfig {
        BridgeConfig {
            arena_size: 64 * KB,
            buffer_size: 4 * KB,
            root_slots: 8,
            ..Default::default()
        }
    }

    #[test]
    fn test_alloc_stores_root() {
        let arena = LocalArena::new(config()).unwrap();
        let mut mutator = Mutator::new(&arena, &config()).unwrap();

        let obj = mutator.alloc(2, &ClassDesc::new(7, 3)).unwrap();
        assert_eq!(mutator.load_obj(2).unwrap(), Some(obj));
        assert_eq!(obj.class_id().unwrap(), 7);
        assert_eq!(obj.slot_count().unwrap(), 3);
        assert!(obj.get_field(0).unwrap().is_nil());
    }

    #[test]
    fn test_alloc_array() {
        let arena = LocalArena::new(config()).unwrap();
        let mut mutator = Mutator::new(&arena, &config()).unwrap();

        let arr = mutator.alloc_array(0, 4, 5).unwrap();
        assert_eq!(arr.header().unwrap().kind, ObjectKind::Array);
        assert_eq!(arr.header().unwrap().size, 48);
    }

    #[test]
    fn test_alloc_bad_slot() {
        let arena = LocalArena::new(config()).unwrap();
        let mut mutator = Mutator::new(&arena, &config()).unwrap();

        assert!(matches!(
            mutator.alloc(8, &ClassDesc::new(1, 1)),
            Err(BridgeError::BoundsCheckFailed { .. })
        ));
    }

    #[test]
    fn test_failed_alloc_clears_root() {
        let arena = LocalArena::new(config()).unwrap();
        let mut mutator = Mutator::new(&arena, &config()).unwrap();
        mutator.store(1, Value::Float(4.0)).unwrap();

        let huge = ClassDesc::new(1, (arena.capacity() / 8) as u32);
        assert!(mutator.alloc(1, &huge).unwrap_err().is_exhaustion());
        assert!(mutator.load(1).unwrap().is_nil());
    }
}
