//! Debug Walk Reporter
//!
//! Prints every formatted object the collector enumerates, in heap-address
//! order:
//!
//! ```text
//! ==== Walking Reachable Objects ====
//! Object(0x7f3a9c000000) [32 bytes] [type: 7]
//!   0x0000:000000000000
//!   0x0000:000000000000
//!   0x0000:000000000000
//! Array(0x7f3a9c000020) [24 bytes] [type: 2]
//! ```
//!
//! Diagnostic only. The walk runs while the collector holds the mutator
//! suspended.

use crate::collector::Collector;
use crate::error::Result;
use crate::object::header::{payload_start, read_word, Header, ObjectKind, WORD_SIZE};
use crate::object::tag::TaggedWord;
use crate::util::format_address;
use std::io::{self, Write};

pub const BANNER: &str = "==== Walking Reachable Objects ====";

/// Totals of one walk
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WalkSummary {
    pub objects: usize,
    pub arrays: usize,
    pub bytes: usize,
}

/// Writes one line group per formatted object
pub struct WalkReporter<W: Write> {
    out: W,
    summary: WalkSummary,
}

impl<W: Write> WalkReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            summary: WalkSummary::default(),
        }
    }

    pub fn banner(&mut self) -> Result<()> {
        writeln!(self.out, "{}", BANNER)?;
        Ok(())
    }

    /// Print the object at `addr`
    ///
    /// Fails with `FormatViolation` on an unrecognized type tag.
    ///
    /// # Safety
    /// `addr` must be a header address inside memory the collector keeps
    /// stable for the duration of the call.
    pub unsafe fn report(&mut self, addr: usize) -> Result<()> {
        let header = Header::read(addr)?;

        write!(
            self.out,
            "{}({}) [{} bytes]",
            header.kind,
            format_address(addr),
            header.size
        )?;

        match header.kind {
            ObjectKind::Object => {
                writeln!(self.out, " [type: {}]", header.secondary)?;
                for index in 0..header.slot_count() {
                    let word = read_word(payload_start(addr) + index * WORD_SIZE);
                    writeln!(self.out, "  {}", TaggedWord(word))?;
                }
                self.summary.objects += 1;
            }
            ObjectKind::Array => {
                writeln!(self.out, " [type: {}]", header.secondary)?;
                self.summary.arrays += 1;
            }
            ObjectKind::Padding | ObjectKind::Forward => {
                writeln!(self.out)?;
            }
        }

        self.summary.bytes += header.span();
        Ok(())
    }

    pub fn summary(&self) -> WalkSummary {
        self.summary
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Walk every formatted object of `collector` and print it to `out`
pub fn print_reachable<C, W>(collector: &C, out: W) -> Result<WalkSummary>
where
    C: Collector,
    W: Write,
{
    let mut reporter = WalkReporter::new(out);
    reporter.banner()?;
    collector.walk_formatted_objects(&mut |addr: usize| unsafe {
        reporter.report(addr)
    })?;
    reporter.out.flush()?;
    Ok(reporter.summary())
}

/// [`print_reachable`] to stderr
pub fn debug_print_reachable<C: Collector>(collector: &C) -> Result<WalkSummary> {
    print_reachable(collector, io::stderr().lock())
}
