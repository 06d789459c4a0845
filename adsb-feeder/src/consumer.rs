//! Consumer thread: drains demodulated candidates off the [`Fifo`] and
//! feeds them through [`Dispatcher`] (Mode S) or the tracker's Mode A/C
//! tally directly.
//!
//! One demodulator and one [`Dispatcher`] per consumer thread — both carry
//! mutable, non-thread-safe state (the IcaoCache, the duplicate cache, the
//! aircraft table), so there is exactly one consumer per capture session,
//! matching spec.md's single-consumer FIFO model.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use adsb_core::{df_info, Demodulator, Dispatcher, Fifo, SampleRate, Stats, TrackEvent};

const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(200);

/// Converts a 12 MHz receive-clock tick count into seconds.
const RECEIVE_CLOCK_HZ: f64 = 12_000_000.0;

/// Drain `fifo` until halted, handing each buffer to `demodulator` and each
/// resulting candidate to `dispatcher`. `on_event` is called with every
/// emitted `TrackEvent` (logging, forwarding, or a UI are all just
/// different `on_event` closures — the tracker itself doesn't care).
pub fn run(
    fifo: Arc<Fifo>,
    mut demodulator: Box<dyn Demodulator>,
    sample_rate: SampleRate,
    mut dispatcher: Dispatcher,
    halt: Arc<AtomicBool>,
    stats: Arc<Stats>,
    mut on_event: impl FnMut(&TrackEvent),
) {
    loop {
        if halt.load(Ordering::Relaxed) {
            fifo.halt();
            break;
        }
        let Some(idx) = fifo.dequeue(DEQUEUE_TIMEOUT) else {
            if fifo.is_halted() {
                break;
            }
            continue;
        };

        let mut candidates = Vec::new();
        fifo.with_buffer(idx, |buf| {
            demodulator.demod(buf, &mut |raw| candidates.push(raw));
        });
        fifo.release(idx);

        for raw in candidates {
            if sample_rate == SampleRate::ModeAc2_4 {
                // A bare Mode A/C reply carries no indication of which
                // interrogation (identity vs. altitude) it's answering;
                // without a paired Mode S track to cross-reference,
                // dump1090 itself can't tell them apart either. Tally as
                // Mode A, matching dump1090's uncorrelated-reply count.
                dispatcher.tracker.record_mode_ac(false);
                continue;
            }

            Stats::inc(&stats.preamble_ok);

            let df = (raw.bytes.first().copied().unwrap_or(0) >> 3) & 0x1F;
            if df_info(df).is_none() {
                Stats::inc(&stats.demod_rejected_unknown);
                continue;
            }

            let hex = raw.to_hex();
            let timestamp = raw.timestamp as f64 / RECEIVE_CLOCK_HZ;
            let signal_level = Some(raw.sig_level as f64);

            if let Some((_decoded, events)) = dispatcher.handle(&hex, timestamp, signal_level) {
                for event in &events {
                    on_event(event);
                }
            }
        }
    }
}
