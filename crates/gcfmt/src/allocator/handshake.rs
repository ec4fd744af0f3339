//! Allocation Handshake - reserve / initialize / commit
//!
//! ```text
//!   Start ──reserve──▶ Reserved ──initialize──▶ Initialized ──commit ok──▶ Committed
//!     ▲                                              │
//!     └────────────── Aborted ◀────commit race───────┘
//! ```
//!
//! The loop is unbounded except by memory pressure: a reserve failure ends it
//! with `ResourceExhausted`, a commit race never does.

use crate::allocator::AllocRequest;
use crate::collector::{AllocationPoint, Collector};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::logging::{self, BridgeEvent};
use crate::object::header::{rounded_span, OBJECT_ALIGNMENT};

/// Position in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocState {
    Start,
    /// Provisional address; contents are not an object yet
    Reserved(usize),
    /// Header and zeroed payload written
    Initialized(usize),
    /// Live and visible to the collector
    Committed(usize),
    /// Commit lost a race with a collection; writes are discarded
    Aborted,
}

/// Handshake parameters for one collector
#[derive(Debug, Clone, Copy)]
pub struct Handshake {
    alignment: usize,
    warn_threshold: u32,
}

impl Handshake {
    pub fn new(alignment: usize, warn_threshold: u32) -> Result<Self> {
        if !alignment.is_power_of_two() || alignment < OBJECT_ALIGNMENT {
            return Err(BridgeError::AlignmentError {
                address: alignment,
                alignment: OBJECT_ALIGNMENT,
            });
        }
        Ok(Self {
            alignment,
            warn_threshold: warn_threshold.max(1),
        })
    }

    /// Parameters matching `collector`'s registered format
    pub fn for_collector<C: Collector>(collector: &C, config: &BridgeConfig) -> Result<Self> {
        Self::new(
            collector.format().alignment(),
            config.commit_race_warn_threshold,
        )
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Span reserved for `request`
    pub fn span(&self, request: &AllocRequest) -> Result<usize> {
        rounded_span(request.bytes(), self.alignment)
    }

    /// Run the handshake and return the committed address
    pub fn allocate<A>(&self, ap: &mut A, request: &AllocRequest) -> Result<usize>
    where
        A: AllocationPoint + ?Sized,
    {
        self.allocate_with(ap, request, |_| Ok(()))
    }

    /// Run the handshake, calling `on_initialized` before every commit
    ///
    /// The hook is where a caller makes the new object reachable from a root
    /// so it survives a collection that starts right after commit. It runs
    /// again on every retry, with the new provisional address.
    pub fn allocate_with<A, F>(
        &self,
        ap: &mut A,
        request: &AllocRequest,
        mut on_initialized: F,
    ) -> Result<usize>
    where
        A: AllocationPoint + ?Sized,
        F: FnMut(usize) -> Result<()>,
    {
        let size = self.span(request)?;
        let mut races: u32 = 0;
        let mut state = AllocState::Start;

        loop {
            state = match state {
                AllocState::Start | AllocState::Aborted => AllocState::Reserved(ap.reserve(size)?),
                AllocState::Reserved(addr) => {
                    unsafe { request.initialize(addr, size) };
                    on_initialized(addr)?;
                    AllocState::Initialized(addr)
                }
                AllocState::Initialized(addr) => {
                    if ap.commit(addr, size) {
                        AllocState::Committed(addr)
                    } else {
                        races += 1;
                        self.record_race(addr, size, races);
                        AllocState::Aborted
                    }
                }
                AllocState::Committed(addr) => {
                    if races > 0 {
                        log::debug!("committed {:#x} after {} races", addr, races);
                    }
                    return Ok(addr);
                }
            };
        }
    }

    fn record_race(&self, addr: usize, size: usize, attempt: u32) {
        log::debug!(
            "commit of {} bytes at {:#x} lost a race, retrying (attempt {})",
            size,
            addr,
            attempt
        );
        if attempt % self.warn_threshold == 0 {
            log::warn!(
                "allocation of {} bytes has lost {} consecutive commit races",
                size,
                attempt
            );
        }
        logging::log_event(BridgeEvent::CommitRace {
            addr,
            size,
            attempt,
        });
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self {
            alignment: OBJECT_ALIGNMENT,
            warn_threshold: BridgeConfig::default().commit_race_warn_threshold,
        }
    }
}

/// Run the handshake with default parameters
pub fn allocate<A>(ap: &mut A, request: &AllocRequest) -> Result<usize>
where
    A: AllocationPoint + ?Sized,
{
    Handshake::default().allocate(ap, request)
}
