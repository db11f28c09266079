//! Shared meter state.
//!
//! Written from the pulse handler (interrupt context, never blocks) and read
//! (possibly mid-update) from arbitrary accessor contexts on either core.
//!
//! ## Access discipline
//!
//! | Field              | Writer            | Mechanism                        |
//! |--------------------|-------------------|----------------------------------|
//! | last timestamp     | handler           | seqlock block (4 × `AtomicU32`)  |
//! | last interval      | handler           | seqlock block                    |
//! | generation tag     | handler           | seqlock block                    |
//! | pulse count        | handler, accessor | `fetch_add` / `store`            |
//! | output mirror      | handler           | `fetch_xor`                      |
//! | debounce flag      | accessor          | `swap`                           |
//!
//! The timing block is a composite of four 32-bit words (the ESP32-S3 has no
//! 64-bit atomics).  The handler is its only writer: it bumps `seq` to odd,
//! stores the words, and bumps `seq` to even.  Readers retry until they see
//! the same even `seq` on both sides of their loads, so a snapshot never
//! mixes two pulses.  The writer never waits on a reader.

use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering, fence};
use core::time::Duration;

use crate::error::ClockError;
use crate::meter::time::Timestamp;

/// Readers yield the thread after this many failed attempts.
const READ_YIELD_EVERY: u32 = 64;

/// Timing fields of the most recent accepted pulse, read as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseTiming {
    /// Clock reading at the most recent accepted pulse.
    pub last: Timestamp,
    /// Time between the two most recent accepted pulses.
    pub interval: Duration,
    /// Number of pulses accepted since start; never reset.  Identifies the
    /// pulse this snapshot belongs to.
    pub generation: u32,
}

/// Fatal conditions latched by the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MeterFault {
    ClockUnavailable = 1,
    ClockRegressed = 2,
}

impl MeterFault {
    fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::ClockUnavailable),
            2 => Some(Self::ClockRegressed),
            _ => None,
        }
    }
}

impl From<ClockError> for MeterFault {
    fn from(e: ClockError) -> Self {
        match e {
            ClockError::Unavailable => Self::ClockUnavailable,
            ClockError::Regressed => Self::ClockRegressed,
        }
    }
}

impl From<MeterFault> for ClockError {
    fn from(f: MeterFault) -> Self {
        match f {
            MeterFault::ClockUnavailable => Self::Unavailable,
            MeterFault::ClockRegressed => Self::Regressed,
        }
    }
}

/// Handler-side counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeterDiagnostics {
    /// Raw edges discarded by the edge filter.
    pub suppressed_edges: u32,
    /// Output line writes that reported an error.
    pub output_errors: u32,
}

pub struct MeterState {
    // ── Seqlock-protected timing block ─────────────────────
    seq: AtomicU32,
    last_hi: AtomicU32,
    last_lo: AtomicU32,
    interval_hi: AtomicU32,
    interval_lo: AtomicU32,
    generation: AtomicU32,

    // ── Independent atomics ────────────────────────────────
    pulse_count: AtomicU32,
    output: AtomicBool,
    debounce_enabled: AtomicBool,

    // ── Health ─────────────────────────────────────────────
    fault: AtomicU8,
    suppressed: AtomicU32,
    output_errors: AtomicU32,
}

impl MeterState {
    /// Fresh state: zero count, output off, last timestamp `now` so that
    /// the first interval is measured from startup.
    pub fn new(now: Timestamp, debounce_enabled: bool) -> Self {
        let nanos = now.as_nanos();
        Self {
            seq: AtomicU32::new(0),
            last_hi: AtomicU32::new((nanos >> 32) as u32),
            last_lo: AtomicU32::new(nanos as u32),
            interval_hi: AtomicU32::new(0),
            interval_lo: AtomicU32::new(0),
            generation: AtomicU32::new(0),
            pulse_count: AtomicU32::new(0),
            output: AtomicBool::new(false),
            debounce_enabled: AtomicBool::new(debounce_enabled),
            fault: AtomicU8::new(0),
            suppressed: AtomicU32::new(0),
            output_errors: AtomicU32::new(0),
        }
    }

    // ── Readers (any context) ──────────────────────────────

    /// Consistent snapshot of the timing block.
    pub fn timing(&self) -> PulseTiming {
        let mut attempts: u32 = 0;
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 == 0 {
                let timing = self.load_timing();
                fence(Ordering::Acquire);
                if self.seq.load(Ordering::Relaxed) == before {
                    return timing;
                }
            }
            attempts = attempts.wrapping_add(1);
            if attempts % READ_YIELD_EVERY == 0 {
                std::thread::yield_now();
            } else {
                core::hint::spin_loop();
            }
        }
    }

    pub fn pulse_count(&self) -> u32 {
        self.pulse_count.load(Ordering::Acquire)
    }

    pub fn output(&self) -> bool {
        self.output.load(Ordering::Acquire)
    }

    pub fn debounce_enabled(&self) -> bool {
        self.debounce_enabled.load(Ordering::Acquire)
    }

    pub fn fault(&self) -> Option<MeterFault> {
        MeterFault::from_u8(self.fault.load(Ordering::Acquire))
    }

    pub fn diagnostics(&self) -> MeterDiagnostics {
        MeterDiagnostics {
            suppressed_edges: self.suppressed.load(Ordering::Relaxed),
            output_errors: self.output_errors.load(Ordering::Relaxed),
        }
    }

    // ── Accessor-side writers ──────────────────────────────

    /// Overwrite the cumulative count.  Leaves the timing block alone.
    pub fn set_pulse_count(&self, value: u32) {
        self.pulse_count.store(value, Ordering::Release);
    }

    /// Reinstate a persisted count before the handler is attached.  The
    /// mirror follows the count's parity.
    pub(crate) fn restore(&self, count: u32) {
        self.pulse_count.store(count, Ordering::Release);
        self.output.store(count % 2 == 1, Ordering::Release);
    }

    /// Returns the previous flag.
    pub(crate) fn set_debounce_enabled(&self, enabled: bool) -> bool {
        self.debounce_enabled.swap(enabled, Ordering::AcqRel)
    }

    // ── Handler-side writers (single writer) ───────────────

    /// Account one accepted pulse at `now`.  Returns the new output level.
    ///
    /// Fails without touching any field if `now` is earlier than the last
    /// accepted pulse.
    pub(crate) fn record_pulse(&self, now: Timestamp) -> Result<bool, ClockError> {
        // Sole writer of the block: a plain load sees our own last store.
        let previous = self.load_timing();
        let interval = now
            .checked_since(previous.last)
            .ok_or(ClockError::Regressed)?;

        self.publish_timing(PulseTiming {
            last: now,
            interval,
            generation: previous.generation.wrapping_add(1),
        });

        let level = !self.output.fetch_xor(true, Ordering::AcqRel);
        self.pulse_count.fetch_add(1, Ordering::AcqRel);
        Ok(level)
    }

    /// First fault wins; later ones are ignored.
    pub(crate) fn latch_fault(&self, fault: MeterFault) {
        let _ = self
            .fault
            .compare_exchange(0, fault as u8, Ordering::AcqRel, Ordering::Acquire);
    }

    pub(crate) fn record_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_output_error(&self) {
        self.output_errors.fetch_add(1, Ordering::Relaxed);
    }

    // ── Internal ───────────────────────────────────────────

    fn load_timing(&self) -> PulseTiming {
        let last = join(
            self.last_hi.load(Ordering::Relaxed),
            self.last_lo.load(Ordering::Relaxed),
        );
        let interval = join(
            self.interval_hi.load(Ordering::Relaxed),
            self.interval_lo.load(Ordering::Relaxed),
        );
        PulseTiming {
            last: Timestamp::from_nanos(last),
            interval: Duration::from_nanos(interval),
            generation: self.generation.load(Ordering::Relaxed),
        }
    }

    fn publish_timing(&self, timing: PulseTiming) {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        let last = timing.last.as_nanos();
        let interval = timing.interval.as_nanos() as u64;
        self.last_hi.store((last >> 32) as u32, Ordering::Relaxed);
        self.last_lo.store(last as u32, Ordering::Relaxed);
        self.interval_hi.store((interval >> 32) as u32, Ordering::Relaxed);
        self.interval_lo.store(interval as u32, Ordering::Relaxed);
        self.generation.store(timing.generation, Ordering::Relaxed);

        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }
}

fn join(hi: u32, lo: u32) -> u64 {
    (u64::from(hi) << 32) | u64::from(lo)
}
