//! Host value representation stored in root tables and object slots.
//!
//! A [`Slot`] is one NaN-boxed word:
//! - nil is the all-zero word
//! - object references are untagged heap addresses (tag `0x0000`)
//! - doubles keep their sign bit and invert every other bit when non-negative,
//!   which moves all of them into tags `0x0007..=0xFFF8`
//!
//! Object references therefore satisfy [`ExactPointer`], the convention root
//! tables are registered with.

use crate::error::{BridgeError, Result};
use crate::format::resolve_forward;
use crate::object::header::{
    payload_start, Header, ObjectKind, HEADER_SIZE, MIN_OBJECT_SIZE, WORD_SIZE,
};
use crate::object::tag::{ExactPointer, ReferenceTag, TaggedWord};
use std::fmt;
use std::ptr;

const TAG_DOUBLE_MIN: u16 = 0x0007;
const TAG_DOUBLE_MAX: u16 = 0xFFF8;

#[inline]
fn invert_non_negative(repr: u64) -> u64 {
    let mask: u64 = ((!repr as i64) >> 63) as u64 & !(1 << 63);
    repr ^ mask
}

/// One NaN-boxed word
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Slot {
    repr: u64,
}

/// Decoded slot content
#[derive(Clone, Copy, PartialEq)]
pub enum Value {
    Nil,
    Float(f64),
    Obj(ObjRef),
}

impl Slot {
    pub const NIL: Slot = Slot { repr: 0 };

    #[inline]
    pub fn raw(&self) -> u64 {
        self.repr
    }

    /// # Safety
    /// A root-table slot holding a pointer-tagged word is reported to the
    /// collector as a reference; it must point at a formatted object.
    #[inline]
    pub unsafe fn store_raw(&mut self, repr: u64) {
        self.repr = repr;
    }

    #[inline]
    fn tag(&self) -> u16 {
        TaggedWord(self.repr).tag()
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        self.repr == 0
    }

    #[inline]
    pub fn is_double(&self) -> bool {
        (TAG_DOUBLE_MIN..=TAG_DOUBLE_MAX).contains(&self.tag())
    }

    #[inline]
    pub fn is_objref(&self) -> bool {
        ExactPointer::is_reference(self.repr)
    }

    pub fn store(&mut self, value: Value) {
        self.repr = Self::encode(value);
    }

    pub fn encode(value: Value) -> u64 {
        match value {
            Value::Nil => 0,
            Value::Float(double) => {
                // Non-canonical NaNs could land on the pointer tags.
                let double = if double.is_nan() { f64::NAN } else { double };
                invert_non_negative(double.to_bits())
            }
            Value::Obj(obj) => obj.addr() as u64,
        }
    }

    /// Decode the slot
    ///
    /// Fails with `InvalidArgument` for words that no [`Value`] encodes to.
    pub fn load(&self) -> Result<Value> {
        if self.is_nil() {
            Ok(Value::Nil)
        } else if self.is_double() {
            Ok(Value::Float(f64::from_bits(invert_non_negative(self.repr))))
        } else if self.is_objref() {
            Ok(Value::Obj(ObjRef {
                addr: self.repr as usize,
            }))
        } else {
            Err(BridgeError::InvalidArgument(format!(
                "slot word {} is not a valid value",
                TaggedWord(self.repr)
            )))
        }
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({})", TaggedWord(self.repr))
    }
}

impl Value {
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(val) => Some(*val),
            _ => None,
        }
    }

    pub fn as_obj(&self) -> Option<ObjRef> {
        match self {
            Value::Obj(obj) => Some(*obj),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Float(double) => write!(f, "Float({})", double),
            Value::Obj(obj) => write!(f, "Obj({:#x})", obj.addr()),
        }
    }
}

/// Reference to a formatted Object or Array
///
/// The stored address may be stale after a relocation; every access goes
/// through [`ObjRef::resolve`], which follows forward stubs.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef {
    addr: usize,
}

impl ObjRef {
    /// # Safety
    /// `addr` must be the header address of a committed Object or Array (or
    /// of a forward stub leading to one) that stays reachable while this
    /// reference is used.
    pub unsafe fn from_raw(addr: usize) -> Self {
        Self { addr }
    }

    #[inline]
    pub fn addr(&self) -> usize {
        self.addr
    }

    /// Authoritative address, following any forward stubs
    pub fn resolve(&self) -> usize {
        unsafe { resolve_forward(self.addr) }
    }

    pub fn header(&self) -> Result<Header> {
        unsafe { Header::read(self.resolve()) }
    }

    /// Client type id
    pub fn class_id(&self) -> Result<u16> {
        self.header().map(|h| h.secondary)
    }

    pub fn slot_count(&self) -> Result<usize> {
        self.header().map(|h| h.slot_count())
    }

    fn field_addr(&self, index: usize) -> Result<usize> {
        let base = self.resolve();
        let header = unsafe { Header::read(base)? };
        match header.kind {
            ObjectKind::Object => {}
            ObjectKind::Array | ObjectKind::Padding | ObjectKind::Forward => {
                return Err(BridgeError::InvalidArgument(format!(
                    "{} at {:#x} has no value fields",
                    header.kind, base
                )))
            }
        }

        let length = header.slot_count();
        if index >= length {
            return Err(BridgeError::BoundsCheckFailed { index, length });
        }
        Ok(payload_start(base) + index * WORD_SIZE)
    }

    pub fn get_field(&self, index: usize) -> Result<Value> {
        let addr = self.field_addr(index)?;
        let slot = unsafe { ptr::read(addr as *const Slot) };
        slot.load()
    }

    pub fn set_field(&self, index: usize, value: Value) -> Result<()> {
        let addr = self.field_addr(index)?;
        unsafe { ptr::write(addr as *mut Slot, Slot { repr: Slot::encode(value) }) };
        Ok(())
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjRef({:#x})", self.addr)
    }
}

/// Describes an allocatable client class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassDesc {
    /// Secondary tag written into every instance header
    pub id: u16,
    /// Number of value slots
    pub slots: u32,
}

impl ClassDesc {
    pub fn new(id: u16, slots: u32) -> Self {
        Self { id, slots }
    }

    /// Instance size in bytes, header included
    pub fn instance_size(&self) -> usize {
        (HEADER_SIZE + self.slots as usize * WORD_SIZE).max(MIN_OBJECT_SIZE)
    }
}
