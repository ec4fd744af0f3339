//! Configuration Module - Bridge Parameters
//!
//! Parameters for the collector boundary: how large the in-process arena is,
//! how much memory each allocation buffer draws at once, how many root slots a
//! mutator context registers, and the header alignment declared with the format.

use crate::object::header::{max_span, WORD_SIZE};
use crate::util::constants::{KB, MB};
use serde::{Deserialize, Serialize};

/// Main configuration for the format bridge
///
/// # Examples
///
/// ```rust
/// use gcfmt::BridgeConfig;
///
/// let config = BridgeConfig {
///     arena_size: 8 * 1024 * 1024,
///     root_slots: 256,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Arena size in bytes
    ///
    /// Rounded up to the system page size when the arena is mapped.
    /// Default: 32MB
    pub arena_size: usize,

    /// Bytes an allocation buffer draws from the arena per refill
    ///
    /// Requests larger than this get a dedicated chunk.
    /// Default: 64KB
    pub buffer_size: usize,

    /// Header alignment declared with the object format
    ///
    /// Must be a power of two and at least one machine word.
    /// Default: 8
    pub alignment: usize,

    /// Number of slots in a mutator's root table
    ///
    /// Default: 2048
    pub root_slots: usize,

    /// Consecutive commit failures before the handshake logs a warning
    ///
    /// The loop keeps retrying regardless; this only controls noise.
    /// Default: 16
    pub commit_race_warn_threshold: u32,

    /// Maximum number of events retained by the bridge logger
    ///
    /// Default: 4096
    pub max_logged_events: usize,

    /// Enable verbose console logging
    ///
    /// Default: false
    pub verbose: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            arena_size: 32 * MB,
            buffer_size: 64 * KB,
            alignment: WORD_SIZE,
            root_slots: 2048,
            commit_race_warn_threshold: 16,
            max_logged_events: 4096,
            verbose: false,
        }
    }
}

impl BridgeConfig {
    /// Validate configuration
    ///
    /// # Examples
    ///
    /// ```rust
    /// use gcfmt::BridgeConfig;
    ///
    /// let config = BridgeConfig {
    ///     alignment: 12,  // Invalid!
    ///     ..Default::default()
    /// };
    ///
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.alignment.is_power_of_two() || self.alignment < WORD_SIZE {
            return Err(ConfigError::InvalidAlignment(format!(
                "alignment must be a power of two >= {}, got {}",
                WORD_SIZE, self.alignment
            )));
        }

        if self.arena_size == 0 {
            return Err(ConfigError::InvalidArenaSize(
                "arena_size must be > 0".to_string(),
            ));
        }

        if self.buffer_size < self.alignment * 2 {
            return Err(ConfigError::InvalidBufferSize(format!(
                "buffer_size must hold at least one minimal object ({} bytes)",
                self.alignment * 2
            )));
        }

        if self.buffer_size % self.alignment != 0 {
            return Err(ConfigError::InvalidBufferSize(
                "buffer_size must be a multiple of alignment".to_string(),
            ));
        }

        if self.buffer_size > max_span(self.alignment) {
            return Err(ConfigError::InvalidBufferSize(format!(
                "buffer_size must fit one header size field ({} bytes)",
                max_span(self.alignment)
            )));
        }

        if self.buffer_size > self.arena_size {
            return Err(ConfigError::InvalidBufferSize(
                "buffer_size cannot exceed arena_size".to_string(),
            ));
        }

        if self.root_slots == 0 {
            return Err(ConfigError::InvalidRootSlots(
                "root_slots must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with environment variables:
    /// - GCFMT_ARENA_SIZE
    /// - GCFMT_BUFFER_SIZE
    /// - GCFMT_ROOT_SLOTS
    /// - GCFMT_VERBOSE
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("GCFMT_ARENA_SIZE") {
            if let Ok(size) = val.parse::<usize>() {
                config.arena_size = size;
            }
        }

        if let Ok(val) = std::env::var("GCFMT_BUFFER_SIZE") {
            if let Ok(size) = val.parse::<usize>() {
                config.buffer_size = size;
            }
        }

        if let Ok(val) = std::env::var("GCFMT_ROOT_SLOTS") {
            if let Ok(slots) = val.parse::<usize>() {
                config.root_slots = slots;
            }
        }

        if let Ok(val) = std::env::var("GCFMT_VERBOSE") {
            config.verbose = val == "1" || val.eq_ignore_ascii_case("true");
        }

        config
    }
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid arena size: {0}")]
    InvalidArenaSize(String),

    #[error("Invalid buffer size: {0}")]
    InvalidBufferSize(String),

    #[error("Invalid alignment: {0}")]
    InvalidAlignment(String),

    #[error("Invalid root slots: {0}")]
    InvalidRootSlots(String),
}
