//! Object Module - on-heap layout and host values
//!
//! This module defines what the collector sees in memory (headers, forward
//! stubs, padding) and how host values are encoded into words.

pub mod header;
pub mod tag;
pub mod value;

pub use header::{Header, HeaderLayout, ObjectKind, HEADER_SIZE, LAYOUT, MIN_OBJECT_SIZE};
pub use header::{OBJECT_ALIGNMENT, WORD_SIZE};

pub use tag::{ExactPointer, ReferenceTag, TagMask, TaggedWord, TAG_MASK};
pub use value::{ClassDesc, ObjRef, Slot, Value};
