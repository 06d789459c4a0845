//! Receive-path counters.
//!
//! One [`Stats`] is shared (via `Arc`) between the producer and consumer
//! threads. Every counter is an independently-updated `AtomicU64` with
//! relaxed ordering: these are monitoring numbers, not synchronization
//! primitives, and no reader ever needs to observe them atomically as a
//! group. [`Stats::snapshot`] gives a consistent-enough point-in-time copy
//! for logging or a status line.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Stats {
    /// Candidate preambles that passed the demodulator's own checks.
    pub preamble_ok: AtomicU64,
    /// Demodulated frames whose downlink format wasn't recognized.
    pub demod_rejected_unknown: AtomicU64,
    /// Frames whose CRC residue was nonzero and not correctable.
    pub crc_bad: AtomicU64,
    /// Frames repaired by the syndrome table.
    pub crc_fixed: AtomicU64,
    /// Global CPR decodes that produced a position.
    pub cpr_global_ok: AtomicU64,
    /// Global CPR attempts skipped for lack of an even/odd pair within the window.
    pub cpr_global_skipped: AtomicU64,
    /// Local CPR decodes that produced a position.
    pub cpr_local_ok: AtomicU64,
    /// CPR decodes rejected by a consistency check (zone mismatch, distance, speed).
    pub cpr_rejected: AtomicU64,
    /// Frames dropped by the duplicate-reception cache.
    pub dupes_dropped: AtomicU64,
    /// Samples lost to FIFO pool exhaustion, reported by the producer.
    pub dropped_samples: AtomicU64,
}

/// A consistent-enough point-in-time copy of [`Stats`] for logging.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct StatsSnapshot {
    pub preamble_ok: u64,
    pub demod_rejected_unknown: u64,
    pub crc_bad: u64,
    pub crc_fixed: u64,
    pub cpr_global_ok: u64,
    pub cpr_global_skipped: u64,
    pub cpr_local_ok: u64,
    pub cpr_rejected: u64,
    pub dupes_dropped: u64,
    pub dropped_samples: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            preamble_ok: self.preamble_ok.load(Ordering::Relaxed),
            demod_rejected_unknown: self.demod_rejected_unknown.load(Ordering::Relaxed),
            crc_bad: self.crc_bad.load(Ordering::Relaxed),
            crc_fixed: self.crc_fixed.load(Ordering::Relaxed),
            cpr_global_ok: self.cpr_global_ok.load(Ordering::Relaxed),
            cpr_global_skipped: self.cpr_global_skipped.load(Ordering::Relaxed),
            cpr_local_ok: self.cpr_local_ok.load(Ordering::Relaxed),
            cpr_rejected: self.cpr_rejected.load(Ordering::Relaxed),
            dupes_dropped: self.dupes_dropped.load(Ordering::Relaxed),
            dropped_samples: self.dropped_samples.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}
