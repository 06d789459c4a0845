//! Mode S demodulation at 8.0 MS/s: eight samples per bit, detected by a
//! sliding correlation against the Manchester-coded data rather than a
//! preamble shape match.
//!
//! At 8 samples/bit, comparing individual sample pairs the way the 2.0
//! MS/s path does is too sensitive to phase — there's no guarantee a bit
//! transition lands exactly on a sample boundary. Instead this computes
//! `diff[j] = m[j] - m[j+4]` once per block (a half-bit-period
//! correlator) and tracks eight running sums, one per sub-phase, so a
//! detection can trigger on whichever phase the signal actually arrived
//! on.

use super::score::{is_acceptable, score_message};
use super::{Demodulator, RawMessage};
use crate::fifo::MagBuf;
use crate::types::{df_info, message_len};

const SAMPLES_PER_BIT: usize = 8;
const SUB_PHASES: usize = 8;
const PREAMBLE_BITS: usize = 8;
const LONG_MSG_BITS: usize = 112;
/// Bits of slack searched backward/forward from the trigger point when
/// picking the best-scoring start-of-message offset.
const SEARCH_BACK: usize = 4;
const SEARCH_AHEAD: usize = 12;

pub struct ModeS8MhzDemod {
    noise_floor: i64,
}

impl ModeS8MhzDemod {
    pub fn new() -> Self {
        ModeS8MhzDemod { noise_floor: 200 }
    }
}

impl Default for ModeS8MhzDemod {
    fn default() -> Self {
        Self::new()
    }
}

/// Recover `n_bits` Manchester-coded bits starting at sample offset
/// `start`, one bit per `SAMPLES_PER_BIT`-sample cell, using the first half
/// vs second half mean within each cell.
fn recover_bits(m: &[u16], start: usize, n_bits: usize) -> Option<Vec<u8>> {
    if start + n_bits * SAMPLES_PER_BIT > m.len() {
        return None;
    }
    let half = SAMPLES_PER_BIT / 2;
    let mut bytes = vec![0u8; (n_bits + 7) / 8];
    for i in 0..n_bits {
        let cell = start + i * SAMPLES_PER_BIT;
        let first: u32 = m[cell..cell + half].iter().map(|&v| v as u32).sum();
        let second: u32 = m[cell + half..cell + SAMPLES_PER_BIT]
            .iter()
            .map(|&v| v as u32)
            .sum();
        if first > second {
            bytes[i / 8] |= 1 << (7 - (i % 8));
        }
    }
    Some(bytes)
}

/// Try to decode a full message starting at `start`, picking whichever
/// offset within `[start - SEARCH_BACK, start + SEARCH_AHEAD]` (in bits)
/// scores best, to absorb trigger jitter around the true preamble start.
fn pick_best(m: &[u16], start_bit_offset: i64) -> Option<RawMessage> {
    let mut best: Option<(i32, Vec<u8>, usize)> = None;

    let lo = start_bit_offset - SEARCH_BACK as i64;
    let hi = start_bit_offset + SEARCH_AHEAD as i64;
    for bit_off in lo..=hi {
        if bit_off < 0 {
            continue;
        }
        let start = (bit_off as usize) * SAMPLES_PER_BIT;
        let df_bytes = match recover_bits(m, start, 5) {
            Some(b) => b,
            None => continue,
        };
        let df = (df_bytes[0] >> 3) & 0x1F;
        if df_info(df).is_none() {
            continue;
        }
        let bit_len = message_len(df).max(5);
        if bit_len > LONG_MSG_BITS {
            continue;
        }
        let mut bytes = match recover_bits(m, start, bit_len) {
            Some(b) => b,
            None => continue,
        };
        let score = score_message(&mut bytes, bit_len);
        if !is_acceptable(score) {
            continue;
        }
        if best.as_ref().map(|(s, ..)| score > *s).unwrap_or(true) {
            best = Some((score, bytes, bit_len));
        }
    }

    best.map(|(score, bytes, bit_len)| RawMessage {
        bytes,
        bit_len,
        timestamp: start_bit_offset.max(0) as u64,
        sig_level: 0.0,
        score,
    })
}

impl Demodulator for ModeS8MhzDemod {
    fn demod(&mut self, buf: &MagBuf, sink: &mut dyn FnMut(RawMessage)) {
        let m = &buf.data[..buf.valid_length.min(buf.data.len())];
        if m.len() < SAMPLES_PER_BIT * (PREAMBLE_BITS + LONG_MSG_BITS / 8) {
            return;
        }

        let half = SAMPLES_PER_BIT / 2;
        let n = m.len() - half;
        let mut diff = vec![0i32; n];
        for j in 0..n {
            diff[j] = m[j] as i32 - m[j + half] as i32;
        }

        let sample_mean: i64 = m.iter().step_by(509).take(64).map(|&v| v as i64).sum();
        let sample_count = m.iter().step_by(509).take(64).count().max(1) as i64;
        self.noise_floor = (self.noise_floor * 15 + sample_mean / sample_count) / 16;
        let trigger = (self.noise_floor * 3 / 2).max(150);

        let mut phase_sums = [0i64; SUB_PHASES];
        let mut j = 0usize;
        let mut last_trigger_end = 0usize;

        while j + SUB_PHASES < diff.len() {
            let phase = j % SUB_PHASES;
            phase_sums[phase] += diff[j].unsigned_abs() as i64;
            if j >= SUB_PHASES {
                phase_sums[phase] -= diff[j - SUB_PHASES].unsigned_abs() as i64;
            }

            if j > last_trigger_end && phase_sums[phase] / SUB_PHASES as i64 > trigger {
                let start_bit = (j / SAMPLES_PER_BIT) as i64 + PREAMBLE_BITS as i64;
                if let Some(raw) = pick_best(m, start_bit) {
                    let mut raw = raw;
                    raw.timestamp = buf.sample_timestamp + j as u64;
                    raw.sig_level = (phase_sums[phase] as f32 / SUB_PHASES as f32 / 65535.0)
                        .clamp(0.0, 1.0);
                    last_trigger_end =
                        j + SAMPLES_PER_BIT * (PREAMBLE_BITS + raw.bit_len);
                    sink(raw);
                }
            }
            j += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fifo::MagBufFlags;

    fn make_buf(data: Vec<u16>) -> MagBuf {
        let len = data.len();
        MagBuf {
            total_length: len,
            valid_length: len,
            overlap: 0,
            sample_timestamp: 0,
            sys_timestamp: 0,
            flags: MagBufFlags::empty(),
            mean_level: 0.0,
            mean_power: 0.0,
            dropped: 0,
            data,
        }
    }

    #[test]
    fn test_flat_signal_yields_nothing() {
        let buf = make_buf(vec![500; 4000]);
        let mut demod = ModeS8MhzDemod::new();
        let mut found = Vec::new();
        demod.demod(&buf, &mut |r| found.push(r));
        assert!(found.is_empty());
    }

    #[test]
    fn test_recover_bits_respects_manchester_coding() {
        // one '1' bit: first half high, second half low
        let mut m = vec![60000u16, 60000, 60000, 60000, 200, 200, 200, 200];
        m.extend(vec![200u16; 8]);
        let bytes = recover_bits(&m, 0, 2).unwrap();
        assert_eq!(bytes[0] & 0b1100_0000, 0b1000_0000);
    }
}
