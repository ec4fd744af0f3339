//! Allocator Module - Creating Formatted Objects
//!
//! Objects come into existence only through the reserve/initialize/commit
//! handshake against an [`AllocationPoint`](crate::collector::AllocationPoint).
//!
//! ## Allocation Flow
//!
//! 1. Round the request to a span the format can describe (minimum 16 bytes)
//! 2. Reserve the span from the buffer
//! 3. Zero the span and write the header
//! 4. Commit; on a race, start again at 2

pub mod handshake;

pub use handshake::{allocate, AllocState, Handshake};

use crate::error::{BridgeError, Result};
use crate::object::header::{Header, ObjectKind, HEADER_SIZE, WORD_SIZE};
use crate::object::value::ClassDesc;
use std::ptr;

/// What to build at a reserved address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocRequest {
    kind: ObjectKind,
    class: u16,
    /// Requested bytes, header included, before rounding
    bytes: usize,
}

impl AllocRequest {
    /// Object or Array of `bytes` bytes (header included)
    ///
    /// Padding and Forward headers are written by the collector only.
    pub fn new(kind: ObjectKind, class: u16, bytes: usize) -> Result<Self> {
        match kind {
            ObjectKind::Object | ObjectKind::Array => {}
            ObjectKind::Padding | ObjectKind::Forward => {
                return Err(BridgeError::InvalidArgument(format!(
                    "mutators cannot allocate {} headers",
                    kind
                )))
            }
        }
        Ok(Self { kind, class, bytes })
    }

    /// Instance of `class` with all slots nil
    pub fn object(class: &ClassDesc) -> Self {
        Self {
            kind: ObjectKind::Object,
            class: class.id,
            bytes: class.instance_size(),
        }
    }

    /// Array of `words` raw words
    pub fn array(class: u16, words: usize) -> Result<Self> {
        let bytes = words
            .checked_mul(WORD_SIZE)
            .and_then(|payload| payload.checked_add(HEADER_SIZE))
            .ok_or_else(|| {
                BridgeError::InvalidArgument(format!("array of {} words overflows", words))
            })?;
        Self::new(ObjectKind::Array, class, bytes)
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn class(&self) -> u16 {
        self.class
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Write the complete object at `addr`: zeroed payload, then header
    ///
    /// Safe to repeat from scratch after a failed commit.
    ///
    /// # Safety
    /// `[addr, addr + size)` must be a reservation owned by the caller.
    pub unsafe fn initialize(&self, addr: usize, size: usize) {
        ptr::write_bytes(addr as *mut u8, 0, size);
        Header::new(self.kind, self.class, size as u32).write(addr);
    }
}
