//! Receive-path configuration.
//!
//! Everything the demodulation and tracking pipeline needs to run is
//! collected into one immutable [`Config`], built once at startup and
//! shared (by reference or cheap clone) with every thread. There is no
//! file format here and no file I/O: parsing a config file, if a caller
//! wants one, is the caller's job, not this crate's. What used to be a
//! single mutable `Modes` blob with receiver/database/dashboard/webhook
//! settings is replaced by the handful of knobs the receive path actually
//! reads from.

use crate::magnitude::{ConverterCaps, SampleFormat};

/// Sample rate a capture session runs at. Each variant is driven by a
/// distinct demodulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleRate {
    /// Mode A/C framing pulses, 2.4 MS/s.
    ModeAc2_4,
    /// Mode S preamble correlation, 2.0 MS/s.
    ModeS2_0,
    /// Mode S sliding correlation, 8.0 MS/s.
    ModeS8_0,
}

impl SampleRate {
    /// Samples per second as a plain float, for converter/filter math.
    pub fn hz(self) -> f64 {
        match self {
            SampleRate::ModeAc2_4 => 2_400_000.0,
            SampleRate::ModeS2_0 => 2_000_000.0,
            SampleRate::ModeS8_0 => 8_000_000.0,
        }
    }
}

/// FIFO sizing between the capture/convert producer and the demod consumer.
#[derive(Debug, Clone, Copy)]
pub struct FifoConfig {
    /// Number of buffers in the pool.
    pub pool_size: usize,
    /// Samples per buffer, excluding the leading overlap region.
    pub buffer_len: usize,
    /// Samples of trailing context carried into the next buffer, so a
    /// preamble or frame straddling a block boundary is still seen whole.
    pub overlap: usize,
}

impl Default for FifoConfig {
    fn default() -> Self {
        FifoConfig {
            pool_size: 16,
            buffer_len: 1 << 18,
            overlap: 320,
        }
    }
}

/// CPR position-decode consistency checks (see [`crate::cpr`]).
#[derive(Debug, Clone, Copy)]
pub struct CprConfig {
    /// Reject a locally-decoded fix further than this from the receiver,
    /// in nautical miles. ~180 NM for airborne, ~45 NM for surface.
    pub max_dist_airborne_nm: f64,
    /// Surface-position equivalent of `max_dist_airborne_nm`.
    pub max_dist_surface_nm: f64,
    /// Reject an update implying groundspeed above this, in knots.
    pub max_speed_kts: f64,
}

impl Default for CprConfig {
    fn default() -> Self {
        CprConfig {
            max_dist_airborne_nm: 180.0,
            max_dist_surface_nm: 45.0,
            max_speed_kts: 2000.0,
        }
    }
}

/// Top-level receive-path configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub sample_rate: SampleRate,
    pub sample_format: SampleFormat,
    pub converter_caps: ConverterCaps,
    pub fifo: FifoConfig,
    /// Maximum bit errors the CRC error-correction table will repair.
    /// The syndrome tables only ever hold entries up to 2, so values above
    /// that have no effect.
    pub max_correct: u8,
    pub cpr: CprConfig,
    /// Seconds an unvalidated residual-recovered ICAO stays usable before
    /// it must be re-confirmed by another frame from the same address.
    pub icao_cache_ttl: f64,
    /// Seconds of silence before an aircraft is dropped from the track table.
    pub stale_timeout: f64,
    /// Minimum seconds between stored position updates for a given aircraft
    /// (downsampling); `0.0` stores every decoded position.
    pub min_position_interval: f64,
    /// Receiver position, if known. Required for local CPR decode and the
    /// CPR distance consistency check; without it those paths are skipped.
    pub receiver_lat: Option<f64>,
    pub receiver_lon: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sample_rate: SampleRate::ModeS2_0,
            sample_format: SampleFormat::Uc8,
            converter_caps: ConverterCaps::default(),
            fifo: FifoConfig::default(),
            max_correct: 2,
            cpr: CprConfig::default(),
            icao_cache_ttl: 60.0,
            stale_timeout: crate::tracker::STALE_TIMEOUT,
            min_position_interval: 0.0,
            receiver_lat: None,
            receiver_lon: None,
        }
    }
}

impl Config {
    /// Builder-style helper: set the receiver's reference position.
    pub fn with_receiver_position(mut self, lat: f64, lon: f64) -> Self {
        self.receiver_lat = Some(lat);
        self.receiver_lon = Some(lon);
        self
    }

    pub fn with_sample_rate(mut self, rate: SampleRate) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn with_sample_format(mut self, format: SampleFormat) -> Self {
        self.sample_format = format;
        self
    }

    pub fn with_min_position_interval(mut self, seconds: f64) -> Self {
        self.min_position_interval = seconds;
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
