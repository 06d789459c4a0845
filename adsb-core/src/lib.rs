//! adsb-core: Pure decode + tracking library for Mode S / ADS-B.
//!
//! No async, no I/O — just algorithms. This crate is the shared core used by
//! `adsb-feeder` (the SDR capture + demodulation binary): magnitude
//! conversion, the magnitude-buffer FIFO, the three sample-rate
//! demodulators, CRC/error correction, Mode S framing, CPR position
//! decoding, aircraft tracking, and message dispatch.

pub mod config;
pub mod cpr;
pub mod crc;
pub mod decode;
pub mod demod;
pub mod dispatch;
pub mod fifo;
pub mod frame;
pub mod icao;
pub mod magnitude;
pub mod stats;
pub mod tracker;
pub mod types;

// Re-export commonly used types at crate root
pub use config::{Config, CprConfig, FifoConfig, SampleRate};
pub use decode::decode;
pub use demod::{make_demodulator, Demodulator, RawMessage};
pub use dispatch::Dispatcher;
pub use fifo::{Fifo, MagBuf, MagBufFlags};
pub use frame::{parse_frame, parse_frame_uncached, parse_raw_line, IcaoCache, ModeFrame};
pub use magnitude::{select_converter, Converter, ConverterCaps, SampleFormat};
pub use stats::{Stats, StatsSnapshot};
pub use tracker::{AircraftState, TrackEvent, Tracker};
pub use types::*;
