//! Bridge Logging and Tracing
//!
//! Two layers:
//! - call sites use the `log` facade directly (trace per object, debug per
//!   handshake retry, warn on repeated commit races, error on format violations)
//! - [`BridgeLogger`] records structured [`BridgeEvent`]s for later inspection
//!   and can echo them to the console in human or JSON form
//!
//! Log Levels:
//! - ERROR: format violations, reserve failures
//! - WARN: commit races
//! - INFO: flips, walks
//! - DEBUG: forwarding and padding installed by the collector
//! - TRACE: per-allocation reserve and commit

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Log level for bridge events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    fn as_log(self) -> log::Level {
        match self {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

/// Bridge event types
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Reserve handed out a provisional address
    Reserve { addr: usize, size: usize },

    /// Commit succeeded; the object is live
    Commit { addr: usize, size: usize },

    /// Commit failed because a collection intervened
    CommitRace { addr: usize, size: usize, attempt: u32 },

    /// Reserve could not satisfy a request
    ReserveFailure { size: usize, available: usize },

    /// Collector installed a forward stub
    Forward { old: usize, new: usize, size: usize },

    /// Collector installed a padding block
    Pad { addr: usize, size: usize },

    /// Collector flipped, invalidating outstanding reservations
    Flip { epoch: u64, padded_bytes: usize },

    /// Formatted-object walk completed
    Walk { objects: usize, bytes: usize },

    /// Header decoding or walk failure
    FormatViolation { address: usize, reason: String },
}

impl BridgeEvent {
    /// Stable event name used in JSON output
    pub fn name(&self) -> &'static str {
        match self {
            BridgeEvent::Reserve { .. } => "reserve",
            BridgeEvent::Commit { .. } => "commit",
            BridgeEvent::CommitRace { .. } => "commit_race",
            BridgeEvent::ReserveFailure { .. } => "reserve_failure",
            BridgeEvent::Forward { .. } => "forward",
            BridgeEvent::Pad { .. } => "pad",
            BridgeEvent::Flip { .. } => "flip",
            BridgeEvent::Walk { .. } => "walk",
            BridgeEvent::FormatViolation { .. } => "format_violation",
        }
    }

    pub fn level(&self) -> LogLevel {
        match self {
            BridgeEvent::FormatViolation { .. } | BridgeEvent::ReserveFailure { .. } => {
                LogLevel::Error
            }
            BridgeEvent::CommitRace { .. } => LogLevel::Warn,
            BridgeEvent::Flip { .. } | BridgeEvent::Walk { .. } => LogLevel::Info,
            BridgeEvent::Forward { .. } | BridgeEvent::Pad { .. } => LogLevel::Debug,
            BridgeEvent::Reserve { .. } | BridgeEvent::Commit { .. } => LogLevel::Trace,
        }
    }

    /// Human-readable rendering
    pub fn to_human(&self) -> String {
        match self {
            BridgeEvent::Reserve { addr, size } => {
                format!("[gcfmt] Reserved {} bytes at {:#x}", size, addr)
            }
            BridgeEvent::Commit { addr, size } => {
                format!("[gcfmt] Committed {} bytes at {:#x}", size, addr)
            }
            BridgeEvent::CommitRace {
                addr,
                size,
                attempt,
            } => format!(
                "[gcfmt] Commit race on {} bytes at {:#x} (attempt {})",
                size, addr, attempt
            ),
            BridgeEvent::ReserveFailure { size, available } => format!(
                "[gcfmt] Reserve failure: {} bytes (available: {})",
                size, available
            ),
            BridgeEvent::Forward { old, new, size } => {
                format!("[gcfmt] Forwarded {:#x} -> {:#x} ({} bytes)", old, new, size)
            }
            BridgeEvent::Pad { addr, size } => {
                format!("[gcfmt] Padded {} bytes at {:#x}", size, addr)
            }
            BridgeEvent::Flip {
                epoch,
                padded_bytes,
            } => format!("[gcfmt] Flip to epoch {} ({} bytes padded)", epoch, padded_bytes),
            BridgeEvent::Walk { objects, bytes } => {
                format!("[gcfmt] Walked {} objects ({} bytes)", objects, bytes)
            }
            BridgeEvent::FormatViolation { address, reason } => {
                format!("[gcfmt] Format violation at {:#x}: {}", address, reason)
            }
        }
    }

    /// JSON rendering
    pub fn to_json(&self) -> serde_json::Value {
        let mut json = match self {
            BridgeEvent::Reserve { addr, size } | BridgeEvent::Commit { addr, size } => {
                serde_json::json!({ "addr": addr, "size": size })
            }
            BridgeEvent::CommitRace {
                addr,
                size,
                attempt,
            } => serde_json::json!({ "addr": addr, "size": size, "attempt": attempt }),
            BridgeEvent::ReserveFailure { size, available } => {
                serde_json::json!({ "size": size, "available": available })
            }
            BridgeEvent::Forward { old, new, size } => {
                serde_json::json!({ "old": old, "new": new, "size": size })
            }
            BridgeEvent::Pad { addr, size } => serde_json::json!({ "addr": addr, "size": size }),
            BridgeEvent::Flip {
                epoch,
                padded_bytes,
            } => serde_json::json!({ "epoch": epoch, "padded_bytes": padded_bytes }),
            BridgeEvent::Walk { objects, bytes } => {
                serde_json::json!({ "objects": objects, "bytes": bytes })
            }
            BridgeEvent::FormatViolation { address, reason } => {
                serde_json::json!({ "address": address, "reason": reason })
            }
        };
        json["type"] = serde_json::Value::from(self.name());
        json
    }
}

/// Bridge logger configuration
#[derive(Debug, Clone)]
pub struct BridgeLoggerConfig {
    /// Minimum log level
    pub level: LogLevel,

    /// Echo events to stderr
    pub console: bool,

    /// Render console output as JSON
    pub json: bool,

    /// Prefix console output with a wall-clock timestamp
    pub timestamps: bool,

    /// Oldest events are dropped past this count
    pub max_events: usize,
}

impl Default for BridgeLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: false,
            json: false,
            timestamps: true,
            max_events: 4096,
        }
    }
}

/// Bridge Logger - structured event recorder
pub struct BridgeLogger {
    config: BridgeLoggerConfig,
    events: Mutex<VecDeque<(Instant, BridgeEvent)>>,
    enabled: AtomicBool,
}

impl BridgeLogger {
    pub fn new(config: BridgeLoggerConfig) -> Self {
        Self {
            config,
            events: Mutex::new(VecDeque::new()),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &BridgeLoggerConfig {
        &self.config
    }

    /// Record an event and forward it to the `log` facade
    pub fn log(&self, event: BridgeEvent) {
        if !self.is_enabled() {
            return;
        }

        let level = event.level();
        if level > self.config.level {
            return;
        }

        log::log!(target: "gcfmt::events", level.as_log(), "{}", event.to_human());

        if self.config.console {
            self.output_console(&event);
        }

        let mut events = self.events.lock();
        if self.config.max_events == 0 {
            return;
        }
        while events.len() >= self.config.max_events {
            events.pop_front();
        }
        events.push_back((Instant::now(), event));
    }

    fn output_console(&self, event: &BridgeEvent) {
        let line = if self.config.json {
            event.to_json().to_string()
        } else {
            event.to_human()
        };

        if self.config.timestamps {
            let now = chrono::Local::now();
            eprintln!("[{}] {}", now.format("%Y-%m-%d %H:%M:%S%.3f"), line);
        } else {
            eprintln!("{}", line);
        }
    }

    /// Snapshot of retained events, oldest first
    pub fn get_events(&self) -> Vec<(Instant, BridgeEvent)> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    /// Number of retained events with the given name
    pub fn count_named(&self, name: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|(_, event)| event.name() == name)
            .count()
    }
}

impl Default for BridgeLogger {
    fn default() -> Self {
        Self::new(BridgeLoggerConfig::default())
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_LOGGER: Mutex<BridgeLogger> = Mutex::new(BridgeLogger::default());
}

/// Log an event to the global logger
pub fn log_event(event: BridgeEvent) {
    GLOBAL_LOGGER.lock().log(event);
}

/// Replace the global logger
pub fn configure_logger(config: BridgeLoggerConfig) {
    *GLOBAL_LOGGER.lock() = BridgeLogger::new(config);
}

/// Global logger event count
pub fn get_event_count() -> usize {
    GLOBAL_LOGGER.lock().event_count()
}

/// Events recorded by the global logger
pub fn get_events() -> Vec<BridgeEvent> {
    GLOBAL_LOGGER
        .lock()
        .get_events()
        .into_iter()
        .map(|(_, event)| event)
        .collect()
}
