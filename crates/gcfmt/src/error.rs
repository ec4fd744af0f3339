//! Error Module - gcfmt Error Types
//!
//! Defines all error types used by the format bridge.
//!
//! # Error Categories
//!
//! ## Allocation Errors
//! - `ResourceExhausted` - Reserve cannot satisfy a request (never auto-retried)
//!
//! ## Heap Integrity Errors
//! - `FormatViolation` - Unknown type tag, or a walk crossing its declared limit
//! - `FixFailure` - The collector's fix operation failed during scan
//!
//! ## Usage Errors
//! - `InvalidArgument` - Invalid function argument
//! - `BoundsCheckFailed` - Field or slot index out of range
//! - `AlignmentError` - Misaligned address or size
//! - `Configuration` - Invalid configuration
//!
//! ## Collector Errors
//! - `Collector` - Raw result code reported by the collector runtime
//! - `VirtualMemory` - An anonymous mapping could not be created
//!
//! ## Diagnostic Errors
//! - `Io` - The walk reporter could not write its output
//!
//! A failed commit is not an error: the allocation handshake absorbs it by
//! restarting at Reserve, so it never appears here.

use crate::config::ConfigError;
use std::fmt;
use thiserror::Error;

/// Main error type for all gcfmt operations
///
/// # Examples
///
/// ```rust
/// use gcfmt::BridgeError;
///
/// fn handle_error(err: BridgeError) {
///     match err {
///         BridgeError::ResourceExhausted { requested, available } => {
///             eprintln!("exhausted: requested {}, available {}", requested, available);
///         }
///         err if err.is_fatal() => panic!("heap corrupted: {}", err),
///         _ => eprintln!("other error: {}", err),
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Reserve could not satisfy a request
    ///
    /// **When returned:** The allocation buffer and its collector have no
    /// room for `requested` bytes.
    ///
    /// **Recovery strategy:** Surface to the caller. The handshake never
    /// retries this on its own.
    #[error("Resource exhausted: requested {requested} bytes, available {available} bytes")]
    ResourceExhausted { requested: usize, available: usize },

    /// Heap corruption or construction bug
    ///
    /// **When returned:** A header carries an unrecognized type tag, a header
    /// size is zero or unaligned, or skip walks past the declared limit.
    ///
    /// **Recovery strategy:** None. Continuing would corrupt collector state.
    #[error("Format violation at {address:#x}: {reason}")]
    FormatViolation { address: usize, reason: String },

    /// The collector's fix operation failed during scan
    ///
    /// **When returned:** Propagated unchanged as the result of `scan`; the
    /// rest of that scan call is abandoned.
    #[error("Fix failed for slot {slot:#x}: {reason}")]
    FixFailure { slot: usize, reason: String },

    /// Invalid argument
    ///
    /// **Example scenarios:**
    /// - Allocation request for a Padding or Forward header
    /// - Root table with zero slots
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Bounds check failed
    ///
    /// **Example scenario:** Field index >= slot count of the object
    #[error("Bounds check failed: index {index} out of bounds for length {length}")]
    BoundsCheckFailed { index: usize, length: usize },

    /// Alignment error
    ///
    /// **Example scenario:** Reserve called directly with a size that is not
    /// a multiple of the format alignment
    #[error("Alignment error: value {address:#x} is not aligned to {alignment} bytes")]
    AlignmentError { address: usize, alignment: usize },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Result code reported by the collector runtime
    #[error("Collector error: {0}")]
    Collector(CollectorCode),

    /// Virtual memory operation failed
    ///
    /// **When returned:** The arena or a root table mapping could not be
    /// created.
    #[error("Virtual memory error: {0}")]
    VirtualMemory(String),

    /// Writing diagnostic output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Constructs a `Result` from a raw collector result code.
    /// `RES_OK` is converted to `Ok(())`.
    pub fn from_code(code: i32) -> Result<()> {
        match CollectorCode::from_raw(code) {
            None => Ok(()),
            Some(code) => Err(BridgeError::Collector(code)),
        }
    }

    /// Shorthand for a [`BridgeError::FormatViolation`]
    pub fn format_violation(address: usize, reason: impl Into<String>) -> Self {
        BridgeError::FormatViolation {
            address,
            reason: reason.into(),
        }
    }

    /// Check if the failed operation may succeed once memory pressure drops
    pub fn is_recoverable(&self) -> bool {
        self.is_exhaustion()
    }

    /// Check if this error is a resource exhaustion, whatever its origin
    pub fn is_exhaustion(&self) -> bool {
        match self {
            BridgeError::ResourceExhausted { .. } => true,
            BridgeError::Collector(code) => matches!(
                code,
                CollectorCode::CommitLimit
                    | CollectorCode::InsufficientMemory
                    | CollectorCode::InsufficientResources
            ),
            _ => false,
        }
    }

    /// Check if this error means the heap can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::FormatViolation { .. })
    }
}

/// Raw result codes of the collector runtime
pub mod codes {
    pub const RES_OK: i32 = 0;
    pub const RES_FAIL: i32 = 1;
    pub const RES_RESOURCE: i32 = 2;
    pub const RES_MEMORY: i32 = 3;
    pub const RES_LIMIT: i32 = 4;
    pub const RES_UNIMPL: i32 = 5;
    pub const RES_IO: i32 = 6;
    pub const RES_COMMIT_LIMIT: i32 = 7;
    pub const RES_PARAM: i32 = 8;
}

/// Non-OK collector result codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorCode {
    CommitLimit,
    InputOutput,
    InsufficientMemory,
    InsufficientResources,
    InternalLimit,
    InvalidParam,
    Unimplemented,
    Other,
}

impl CollectorCode {
    /// `None` for `RES_OK`
    pub fn from_raw(code: i32) -> Option<Self> {
        use self::codes::*;

        let code = match code {
            RES_OK => return None,
            RES_COMMIT_LIMIT => CollectorCode::CommitLimit,
            RES_IO => CollectorCode::InputOutput,
            RES_MEMORY => CollectorCode::InsufficientMemory,
            RES_RESOURCE => CollectorCode::InsufficientResources,
            RES_LIMIT => CollectorCode::InternalLimit,
            RES_PARAM => CollectorCode::InvalidParam,
            RES_UNIMPL => CollectorCode::Unimplemented,
            _ => CollectorCode::Other,
        };
        Some(code)
    }
}

impl fmt::Display for CollectorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CollectorCode::CommitLimit => "the arena's commit limit would be exceeded",
            CollectorCode::InputOutput => "an input/output error occurred",
            CollectorCode::InsufficientMemory => "needed memory could not be obtained",
            CollectorCode::InsufficientResources => "a needed resource could not be obtained",
            CollectorCode::InternalLimit => "an internal limitation was exceeded",
            CollectorCode::InvalidParam => "an invalid parameter was passed",
            CollectorCode::Unimplemented => "operation is not implemented",
            CollectorCode::Other => "operation failed",
        };
        f.write_str(text)
    }
}

/// Result type alias for gcfmt operations
pub type Result<T> = std::result::Result<T, BridgeError>;
