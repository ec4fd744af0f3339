//! Object Header - on-heap layout every formatted object presents
//!
//! Header Layout (version 1, 8 bytes, native byte order):
//! ┌────────────┬────────────┬──────────────────┬──────────────────────┐
//! │  type tag  │  reserved  │  secondary tag   │  size (incl. header) │
//! │  [0] u8    │  [1] u8    │  [2..4] u16      │  [4..8] u32          │
//! └────────────┴────────────┴──────────────────┴──────────────────────┘
//!
//! Forward stub:
//! ┌──────────────────────────┬──────────────────────────┬─────────────┐
//! │  header (tag = Forward)  │  new address [8..16] u64 │  (stale)    │
//! └──────────────────────────┴──────────────────────────┴─────────────┘
//!
//! Fields are addressed through [`HeaderLayout`] offsets and widths, never
//! through a packed struct, so the layout does not depend on any platform's
//! structure-packing rules. `size` always covers the whole span up to the
//! next header, for every [`ObjectKind`].

use crate::error::{BridgeError, Result};
use std::fmt;
use std::ptr;

/// Machine word size in bytes
pub const WORD_SIZE: usize = 8;

/// Minimum object alignment (bytes)
pub const OBJECT_ALIGNMENT: usize = WORD_SIZE;

/// Size of object header in bytes
pub const HEADER_SIZE: usize = 8;

/// Smallest formatted object: a header plus one word, so that any object can
/// later be overwritten by a forward stub.
pub const MIN_OBJECT_SIZE: usize = HEADER_SIZE + WORD_SIZE;

/// Offset of the new-address word inside a forward stub
pub const FORWARD_OFFSET: usize = HEADER_SIZE;

/// Offset and width (bytes) of one header field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub offset: usize,
    pub width: usize,
}

/// Versioned description of the header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLayout {
    pub version: u8,
    pub kind: Field,
    pub reserved: Field,
    pub secondary: Field,
    pub size: Field,
    pub header_size: usize,
}

/// Layout version 1
pub const LAYOUT_V1: HeaderLayout = HeaderLayout {
    version: 1,
    kind: Field { offset: 0, width: 1 },
    reserved: Field { offset: 1, width: 1 },
    secondary: Field { offset: 2, width: 2 },
    size: Field { offset: 4, width: 4 },
    header_size: HEADER_SIZE,
};

/// Layout in use by this crate
pub const LAYOUT: HeaderLayout = LAYOUT_V1;

/// Type tag stored in the first header byte
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Filler written by the collector; never scanned
    Padding = 0,
    /// Stub left at the old address of a relocated object
    Forward = 1,
    /// Header followed by exact reference slots
    Object = 2,
    /// Header followed by raw, untraced words
    Array = 3,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 4] = [
        ObjectKind::Padding,
        ObjectKind::Forward,
        ObjectKind::Object,
        ObjectKind::Array,
    ];

    /// Decode a raw type tag
    #[inline]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ObjectKind::Padding),
            1 => Some(ObjectKind::Forward),
            2 => Some(ObjectKind::Object),
            3 => Some(ObjectKind::Array),
            _ => None,
        }
    }

    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            ObjectKind::Padding => "Padding",
            ObjectKind::Forward => "Forward",
            ObjectKind::Object => "Object",
            ObjectKind::Array => "Array",
        }
    }

    /// Whether the header carries a meaningful secondary (client type) tag
    pub fn has_secondary(self) -> bool {
        match self {
            ObjectKind::Object | ObjectKind::Array => true,
            ObjectKind::Padding | ObjectKind::Forward => false,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub kind: ObjectKind,
    /// Client type id
    pub secondary: u16,
    /// Byte length including the header
    pub size: u32,
}

impl Header {
    pub fn new(kind: ObjectKind, secondary: u16, size: u32) -> Self {
        Self {
            kind,
            secondary,
            size,
        }
    }

    pub fn padding(size: u32) -> Self {
        Self::new(ObjectKind::Padding, 0, size)
    }

    /// Span in bytes, header included
    #[inline]
    pub fn span(&self) -> usize {
        self.size as usize
    }

    /// Number of payload words after the header
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.span().saturating_sub(HEADER_SIZE) / WORD_SIZE
    }

    /// Decode the header at `addr`
    ///
    /// Fails with `FormatViolation` on an unrecognized type tag.
    ///
    /// # Safety
    /// `addr` must point to at least [`HEADER_SIZE`] readable bytes.
    pub unsafe fn read(addr: usize) -> Result<Self> {
        let tag = read_kind_tag(addr);
        let kind = ObjectKind::from_tag(tag).ok_or_else(|| {
            BridgeError::format_violation(addr, format!("unrecognized type tag {:#04x}", tag))
        })?;

        Ok(Self {
            kind,
            secondary: read_secondary(addr),
            size: read_size(addr) as u32,
        })
    }

    /// Encode this header at `addr`, clearing the reserved byte
    ///
    /// # Safety
    /// `addr` must point to at least [`HEADER_SIZE`] writable bytes.
    pub unsafe fn write(&self, addr: usize) {
        write_kind(addr, self.kind);
        ptr::write((addr + LAYOUT.reserved.offset) as *mut u8, 0);
        ptr::write_unaligned((addr + LAYOUT.secondary.offset) as *mut u16, self.secondary);
        write_size(addr, self.size);
    }
}

/// Validate that `size` is a usable header size for alignment `alignment`
pub fn check_span(addr: usize, size: usize, alignment: usize) -> Result<u32> {
    if size < HEADER_SIZE || size % alignment != 0 {
        return Err(BridgeError::format_violation(
            addr,
            format!("span of {} bytes is not a whole number of {}-byte units", size, alignment),
        ));
    }
    u32::try_from(size).map_err(|_| {
        BridgeError::format_violation(addr, format!("span of {} bytes exceeds u32", size))
    })
}

/// Largest span a single header can describe at `alignment`
#[inline]
pub fn max_span(alignment: usize) -> usize {
    u32::MAX as usize & !(alignment - 1)
}

/// Round a requested object size up to a span the header can describe
///
/// At least [`MIN_OBJECT_SIZE`], a multiple of `alignment`, and within the
/// 32-bit size field.
pub fn rounded_span(requested: usize, alignment: usize) -> Result<usize> {
    requested
        .max(MIN_OBJECT_SIZE)
        .checked_add(alignment - 1)
        .map(|size| size & !(alignment - 1))
        .filter(|&size| size <= max_span(alignment))
        .ok_or_else(|| {
            BridgeError::InvalidArgument(format!(
                "object of {} bytes exceeds the header size field",
                requested
            ))
        })
}

/// Read the raw type tag byte
///
/// # Safety
/// `addr` must point to a readable header.
#[inline]
pub unsafe fn read_kind_tag(addr: usize) -> u8 {
    ptr::read((addr + LAYOUT.kind.offset) as *const u8)
}

/// # Safety
/// `addr` must point to a readable header.
#[inline]
pub unsafe fn read_secondary(addr: usize) -> u16 {
    ptr::read_unaligned((addr + LAYOUT.secondary.offset) as *const u16)
}

/// Read the span field
///
/// # Safety
/// `addr` must point to a readable header.
#[inline]
pub unsafe fn read_size(addr: usize) -> usize {
    ptr::read_unaligned((addr + LAYOUT.size.offset) as *const u32) as usize
}

/// # Safety
/// `addr` must point to a writable header.
#[inline]
pub unsafe fn write_kind(addr: usize, kind: ObjectKind) {
    ptr::write((addr + LAYOUT.kind.offset) as *mut u8, kind.tag());
}

/// # Safety
/// `addr` must point to a writable header.
#[inline]
pub unsafe fn write_size(addr: usize, size: u32) {
    ptr::write_unaligned((addr + LAYOUT.size.offset) as *mut u32, size);
}

/// # Safety
/// `addr` must be word aligned and readable.
#[inline]
pub unsafe fn read_word(addr: usize) -> u64 {
    ptr::read(addr as *const u64)
}

/// # Safety
/// `addr` must be word aligned and writable.
#[inline]
pub unsafe fn write_word(addr: usize, word: u64) {
    ptr::write(addr as *mut u64, word)
}

/// First payload word of the object at `addr`
#[inline]
pub fn payload_start(addr: usize) -> usize {
    addr + HEADER_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(words: usize) -> Vec<u64> {
        vec![0u64; words]
    }

    #[test]
    fn test_layout_fields_fit_header() {
        for field in [LAYOUT.kind, LAYOUT.reserved, LAYOUT.secondary, LAYOUT.size] {
            assert!(field.offset + field.width <= LAYOUT.header_size);
        }
        assert_eq!(LAYOUT.version, 1);
        assert_eq!(LAYOUT.header_size, WORD_SIZE);
    }

    #[test]
    fn test_kind_tags_are_stable() {
        for kind in ObjectKind::ALL {
            assert_eq!(ObjectKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(ObjectKind::Padding.tag(), 0);
        assert_eq!(ObjectKind::Forward.tag(), 1);
        assert_eq!(ObjectKind::Object.tag(), 2);
        assert_eq!(ObjectKind::Array.tag(), 3);
        assert_eq!(ObjectKind::from_tag(4), None);
    }

    #[test]
    fn test_header_write_read() {
        let mut mem = buffer(4);
        let addr = mem.as_mut_ptr() as usize;
        let header = Header::new(ObjectKind::Object, 7, 32);

        unsafe {
            header.write(addr);
            assert_eq!(Header::read(addr).unwrap(), header);
            assert_eq!(read_size(addr), 32);
            assert_eq!(read_kind_tag(addr), 2);
        }
        assert_eq!(header.slot_count(), 3);
    }

    #[test]
    fn test_header_bytes_at_declared_offsets() {
        let mut mem = buffer(1);
        let addr = mem.as_mut_ptr() as usize;
        unsafe { Header::new(ObjectKind::Array, 0x0102, 0x40).write(addr) };

        let bytes = mem[0].to_ne_bytes();
        assert_eq!(bytes[0], 3);
        assert_eq!(bytes[1], 0);
        assert_eq!(u16::from_ne_bytes([bytes[2], bytes[3]]), 0x0102);
        assert_eq!(
            u32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            0x40
        );
    }

    #[test]
    fn test_unknown_tag_is_format_violation() {
        let mut mem = buffer(2);
        let addr = mem.as_mut_ptr() as usize;
        unsafe {
            Header::new(ObjectKind::Object, 1, 16).write(addr);
            ptr::write(addr as *mut u8, 0x7f);
        }

        let err = unsafe { Header::read(addr) }.unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_check_span() {
        assert_eq!(check_span(0, 16, 8).unwrap(), 16);
        assert!(check_span(0, 0, 8).is_err());
        assert!(check_span(0, 12, 8).is_err());
        assert!(check_span(0, 24, 16).is_err());
    }

    #[test]
    fn test_rounded_span() {
        assert_eq!(rounded_span(0, 8).unwrap(), MIN_OBJECT_SIZE);
        assert_eq!(rounded_span(17, 8).unwrap(), 24);
        assert_eq!(rounded_span(24, 16).unwrap(), 32);
        assert!(rounded_span(u32::MAX as usize, 8).is_err());
        assert!(rounded_span(usize::MAX, 8).is_err());
    }

    #[test]
    fn test_secondary_only_for_objects_and_arrays() {
        assert!(ObjectKind::Object.has_secondary());
        assert!(ObjectKind::Array.has_secondary());
        assert!(!ObjectKind::Padding.has_secondary());
        assert!(!ObjectKind::Forward.has_secondary());
    }
}
