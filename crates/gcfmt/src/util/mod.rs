//! Util Module - Shared Utilities

pub mod alignment;
pub mod mapping;

pub use alignment::Alignment;
pub use mapping::AnonMapping;

/// Debug formatter for heap addresses, as printed by the walk reporter
pub fn format_address(address: usize) -> String {
    format!("0x{:012x}", address)
}

/// Size constants
pub mod constants {
    /// 1 Kilobyte
    pub const KB: usize = 1024;
    /// 1 Megabyte
    pub const MB: usize = 1024 * 1024;
}
