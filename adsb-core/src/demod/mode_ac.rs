//! Mode A/C demodulation at 2.4 MS/s.
//!
//! Mode A (identity/squawk) and Mode C (altitude) replies share the same
//! pulse-position framing: an F1 framing pulse, 12 information pulse slots
//! (some suppressed, carrying a 1 or 0 bit each), an X slot that's always
//! zero, and an F2 framing pulse exactly 20.3us after F1. There's no
//! preamble shape to match the way Mode S has one — framing pulses are
//! found directly, then the pulse train between them is sampled against a
//! signal/noise threshold band.
//!
//! F1's position is only known to the nearest real sample — at 2.4 MS/s
//! that's 417ns, coarse next to the 1.45us slot spacing. A virtual 60MHz
//! clock (25 cycles per real sample) carries a parabolic sub-sample
//! estimate of F1's true phase forward to F2 and every data slot, the same
//! way a PLL would track it, rather than re-measuring phase fresh at each
//! pulse.

use super::{Demodulator, RawMessage};
use crate::fifo::MagBuf;

/// Samples/us at 2.4 MS/s, used only for the minimum-buffer-length gate.
const SAMPLES_PER_US: f64 = 2.4;
/// Spacing between the 12 information pulse slots plus X, microseconds.
const SLOT_US: f64 = 1.45;
/// Raw pulse positions between F1 and F2: C1 A1 C2 A2 C4 A4 X B1 D1 B2 D2 B4 D4.
const N_SLOTS: usize = 13;
/// Virtual demodulation clock, cycles per microsecond.
const CYCLES_PER_US: f64 = 60.0;
/// Virtual demodulation clock, cycles per real 2.4 MS/s sample (60MHz / 2.4MHz).
const CYCLES_PER_SAMPLE: f64 = 25.0;
/// F1-to-F2 spacing in virtual-clock cycles: 87*14 = 1218 cycles, i.e.
/// 20.3us at 60MHz.
const F1_F2_CYCLES: i64 = 87 * 14;

/// Canonical bit position (0 = D1 .. 11 = A4) for each raw slot index, i.e.
/// the inverse of the transmission order above. `None` marks the X spacer,
/// which carries no data and must read quiet.
const SLOT_TO_BIT: [Option<u8>; N_SLOTS] = [
    Some(3),  // C1
    Some(9),  // A1
    Some(4),  // C2
    Some(10), // A2
    Some(5),  // C4
    Some(11), // A4
    None,     // X
    Some(6),  // B1
    Some(0),  // D1
    Some(7),  // B2
    Some(1),  // D2
    Some(8),  // B4
    Some(2),  // D4
];

pub struct ModeAcDemod {
    noise_floor: f64,
}

impl ModeAcDemod {
    pub fn new() -> Self {
        ModeAcDemod { noise_floor: 100.0 }
    }
}

impl Default for ModeAcDemod {
    fn default() -> Self {
        Self::new()
    }
}

/// Sub-sample offset (in samples, clamped to +-0.5) of a peak at `center`,
/// via parabolic interpolation over its two neighbors. Zero if the three
/// points are collinear and there's no curvature to interpolate against.
fn parabolic_offset(left: f64, center: f64, right: f64) -> f64 {
    let denom = left - 2.0 * center + right;
    if denom.abs() < 1e-9 {
        return 0.0;
    }
    (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
}

/// Interpolated magnitude at virtual-clock position `clock`, linearly
/// blended between the two real samples it falls between. `None` past the
/// end of the buffer.
fn sample_at_clock(m: &[u16], clock: i64) -> Option<f64> {
    if clock < 0 {
        return None;
    }
    let pos = clock as f64 / CYCLES_PER_SAMPLE;
    let idx = pos.floor() as usize;
    if idx + 1 >= m.len() {
        return None;
    }
    let frac = pos - idx as f64;
    Some(m[idx] as f64 * (1.0 - frac) + m[idx + 1] as f64 * frac)
}

/// Decode the 12-bit identity/altitude payload given F1's virtual-clock
/// position, reordering the raw C1 A1 C2 A2 C4 A4 X B1 D1 B2 D2 B4 D4 pulse
/// train into the canonical A4..D1 bit order.
///
/// `signal_threshold` and `noise_threshold` bound the ambiguous band
/// between on and off: a slot above `signal_threshold` is on, below
/// `noise_threshold` is off, and anything between counts as uncertain.
/// Returns `None` if too many slots land in that band.
fn decode_payload(
    m: &[u16],
    f1_clock: i64,
    signal_threshold: f64,
    noise_threshold: f64,
) -> Option<(u16, u32)> {
    let mut bits: u16 = 0;
    let mut uncertain = 0;
    let mut peak = 0u32;

    for slot in 0..N_SLOTS {
        let slot_cycles = ((1.45 + slot as f64 * SLOT_US) * CYCLES_PER_US).round() as i64;
        let level = sample_at_clock(m, f1_clock + slot_cycles)?;
        peak = peak.max(level.round() as u32);
        let is_on = level > signal_threshold;
        let is_ambiguous = !is_on && level > noise_threshold;

        match SLOT_TO_BIT[slot] {
            Some(bit) => {
                if is_on {
                    bits |= 1 << bit;
                } else if is_ambiguous {
                    uncertain += 1;
                }
            }
            None => {
                // X spacer: any energy here means the frame is misaligned.
                if is_on || is_ambiguous {
                    uncertain += 1;
                }
            }
        }
    }

    if uncertain > 2 {
        return None;
    }
    Some((bits, peak))
}

impl Demodulator for ModeAcDemod {
    fn demod(&mut self, buf: &MagBuf, sink: &mut dyn FnMut(RawMessage)) {
        let m = &buf.data[..buf.valid_length.min(buf.data.len())];
        let frame_samples = (F1_F2_CYCLES as f64 / CYCLES_PER_SAMPLE).round() as usize;
        let slot_span_samples = (SLOT_US * N_SLOTS as f64 * SAMPLES_PER_US).round() as usize;
        if m.len() < frame_samples + slot_span_samples + 4 {
            return;
        }

        let window = 32.min(m.len());
        let mean: u64 = m[..window].iter().map(|&v| v as u64).sum();
        self.noise_floor = (self.noise_floor * 15.0 + (mean as f64 / window as f64)) / 16.0;
        let min_level = (self.noise_floor * 2.5).max(50.0);

        let mut i = 1;
        let last = m.len() - 2;
        while i < last {
            let f1 = m[i] as f64;
            if f1 < min_level || f1 < m[i - 1] as f64 || f1 < m[i + 1] as f64 {
                i += 1;
                continue;
            }

            let offset = parabolic_offset(m[i - 1] as f64, f1, m[i + 1] as f64);
            let f1_clock = ((i as f64 + offset) * CYCLES_PER_SAMPLE).round() as i64;
            let f2_clock = f1_clock + F1_F2_CYCLES;

            let Some(f2) = sample_at_clock(m, f2_clock) else {
                i += 1;
                continue;
            };
            // Framing pulses should be comparable in amplitude, and F2 must
            // independently clear 6dB above the noise floor rather than
            // just riding on F1's own detection.
            if f2 < self.noise_floor * 2.0 || (f1 - f2).abs() > f1.max(f2) * 0.6 {
                i += 1;
                continue;
            }

            // Geometric mid between the noise floor and this candidate's
            // own peak sets the on/off decision band; sqrt(2) above and
            // below it is +-3dB, a 6dB-wide ambiguous zone around the mid.
            let mid = (self.noise_floor * f1.max(f2)).sqrt();
            let signal_threshold = mid * std::f64::consts::SQRT_2;
            let noise_threshold = mid / std::f64::consts::SQRT_2;

            if let Some((bits, peak)) =
                decode_payload(m, f1_clock, signal_threshold, noise_threshold)
            {
                let sig_level = (peak as f32 / 65535.0).min(1.0);
                let bytes = vec![(bits >> 8) as u8, (bits & 0xFF) as u8];
                let f2_sample = (f2_clock as f64 / CYCLES_PER_SAMPLE).round() as u64;
                sink(RawMessage {
                    bytes,
                    bit_len: 13,
                    // Timestamped at F2, not F1: F2 is the pulse that marks
                    // the reply's end, matching the Mode S convention of
                    // timestamping at the frame's last bit.
                    timestamp: buf.sample_timestamp + f2_sample,
                    sig_level,
                    score: super::score::SCORE_CLEAN,
                });
                i += frame_samples;
                continue;
            }
            i += 1;
        }
    }
}
