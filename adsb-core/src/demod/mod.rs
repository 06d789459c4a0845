//! Demodulators: turn a block of 16-bit magnitude samples into candidate
//! Mode S / Mode A/C messages.
//!
//! There isn't one demodulator, there are three, because the signal looks
//! completely different depending on how fast it was sampled. A receiver
//! configured for 2.0 MS/s, 2.4 MS/s, or 8.0 MS/s needs the matching
//! implementation; there's no universal algorithm that works across all
//! three, so [`make_demodulator`] picks one at startup based on
//! [`crate::config::SampleRate`] and that choice doesn't change for the
//! life of the capture session.

pub mod mode_ac;
pub mod mode_s_2mhz;
pub mod mode_s_8mhz;
pub mod score;

use crate::config::SampleRate;
use crate::fifo::MagBuf;

/// A candidate message recovered from the signal, not yet known to be
/// valid. `score` comes from [`score::score_message`] — callers decide
/// what counts as acceptable via [`score::is_acceptable`].
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Packed message bytes, `bit_len / 8` long.
    pub bytes: Vec<u8>,
    pub bit_len: usize,
    /// Receive-clock timestamp (same units as [`MagBuf::sample_timestamp`])
    /// of the first preamble sample.
    pub timestamp: u64,
    /// Peak signal level of the preamble, normalized to `[0, 1]`.
    pub sig_level: f32,
    pub score: i32,
}

impl RawMessage {
    pub fn to_hex(&self) -> String {
        crate::types::hex_encode(&self.bytes)
    }
}

/// Implemented once per sample rate. `demod` scans one buffer end to end,
/// calling `sink` for every candidate message found — including ones that
/// later turn out not to be acceptable, so callers can still count and log
/// rejections.
pub trait Demodulator: Send {
    fn demod(&mut self, buf: &MagBuf, sink: &mut dyn FnMut(RawMessage));
}

/// Select the demodulator matching a configured sample rate.
pub fn make_demodulator(rate: SampleRate) -> Box<dyn Demodulator> {
    match rate {
        SampleRate::ModeS2_0 => Box::new(mode_s_2mhz::ModeS2MhzDemod::new()),
        SampleRate::ModeS8_0 => Box::new(mode_s_8mhz::ModeS8MhzDemod::new()),
        SampleRate::ModeAc2_4 => Box::new(mode_ac::ModeAcDemod::new()),
    }
}
