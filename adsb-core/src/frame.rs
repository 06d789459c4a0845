//! Parse raw hex strings into structured Mode S frames.
//!
//! Responsibilities:
//! - Classify Downlink Format (DF) from first 5 bits
//! - Extract ICAO address (bytes 1-3 for DF11/17/18, or from CRC residual)
//! - Package into `ModeFrame`
//! - Reject frames that fail CRC validation
//! - Attempt 1-2 bit error correction on CRC failures
//! - Validate residual-recovered ICAOs against a time-windowed cache

use std::collections::HashMap;

use crate::crc;
use crate::types::{df_info, hex_decode, AddrType, Icao};

// DFs where ICAO is explicit in bytes 1-3
const DF_EXPLICIT_ICAO: &[u8] = &[11, 17, 18];

// DFs where ICAO is recovered from CRC residual
const DF_RESIDUAL_ICAO: &[u8] = &[0, 4, 5, 16, 20, 21];

// ---------------------------------------------------------------------------
// ICAO cache
// ---------------------------------------------------------------------------

/// Time-windowed cache of validated ICAO addresses.
///
/// ICAOs are registered when seen in DF11/17/18 frames (explicit, CRC-validated).
/// For DF0/4/5/16/20/21, the ICAO is recovered from the CRC residual — noise
/// produces fake addresses. The cache rejects residual-recovered ICAOs not
/// recently seen in a validated frame.
pub struct IcaoCache {
    ttl: f64,
    cache: HashMap<Icao, f64>, // icao -> last_seen timestamp
}

impl IcaoCache {
    pub fn new(ttl: f64) -> Self {
        IcaoCache {
            ttl,
            cache: HashMap::new(),
        }
    }

    /// Register a validated ICAO (from DF11/17/18).
    pub fn register(&mut self, icao: Icao, timestamp: f64) {
        self.cache.insert(icao, timestamp);
    }

    /// Check if an ICAO was recently seen in a validated frame.
    pub fn is_known(&mut self, icao: &Icao, timestamp: f64) -> bool {
        if let Some(&last_seen) = self.cache.get(icao) {
            if timestamp - last_seen <= self.ttl {
                return true;
            }
            self.cache.remove(icao);
        }
        false
    }

    /// Remove expired entries.
    pub fn prune(&mut self, now: f64) {
        let ttl = self.ttl;
        self.cache.retain(|_, &mut last_seen| now - last_seen <= ttl);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for IcaoCache {
    fn default() -> Self {
        IcaoCache::new(60.0)
    }
}

// ---------------------------------------------------------------------------
// ModeFrame
// ---------------------------------------------------------------------------

/// A parsed Mode S frame.
#[derive(Debug, Clone)]
pub struct ModeFrame {
    /// Downlink Format (0-24)
    pub df: u8,
    /// 3-byte ICAO address
    pub icao: Icao,
    /// Full message bytes
    pub raw: Vec<u8>,
    /// Unix timestamp
    pub timestamp: f64,
    /// Signal strength if available
    pub signal_level: Option<f64>,
    /// Message length in bits (56 or 112)
    pub msg_bits: usize,
    /// CRC validation passed
    pub crc_ok: bool,
    /// True if error correction was applied
    pub corrected: bool,
    /// Bits repaired by the syndrome table (0, 1, or 2).
    pub error_bits: u8,
    /// Demodulator confidence score, [`crate::demod::score::SCORE_CLEAN`]
    /// for an uncorrected frame.
    pub score: i32,
    /// Confidence in the ICAO address, lowered for error-corrected and
    /// residual-recovered frames.
    pub addrtype: AddrType,
}

/// Confidence level for a frame's ICAO address, from how it was obtained.
fn addrtype_for(df: u8, corrected: bool) -> AddrType {
    if corrected {
        return AddrType::ModeS;
    }
    match df {
        17 => AddrType::Adsb,
        18 => AddrType::Tisb,
        11 => AddrType::ModeSChecked,
        _ => AddrType::ModeS,
    }
}

impl ModeFrame {
    /// Human-readable Downlink Format name.
    pub fn df_name(&self) -> &'static str {
        df_info(self.df)
            .map(|info| info.name)
            .unwrap_or("Unknown")
    }

    /// True if this is an ADS-B extended squitter (DF17).
    pub fn is_adsb(&self) -> bool {
        self.df == 17
    }

    /// True if this is a 112-bit (long) message.
    pub fn is_long(&self) -> bool {
        self.msg_bits == 112
    }

    /// Message Extended field (bytes 4-10, 56 bits) for DF17/18.
    /// Returns empty slice for short frames.
    pub fn me(&self) -> &[u8] {
        if self.is_long() && self.raw.len() >= 11 {
            &self.raw[4..11]
        } else {
            &[]
        }
    }

    /// ADS-B Type Code (first 5 bits of ME field). None for non-ADS-B.
    pub fn type_code(&self) -> Option<u8> {
        if (self.df != 17 && self.df != 18) || !self.is_long() {
            return None;
        }
        if self.raw.len() < 5 {
            return None;
        }
        Some((self.raw[4] >> 3) & 0x1F)
    }
}

// ---------------------------------------------------------------------------
// Frame parsing
// ---------------------------------------------------------------------------

/// Parse a hex string into a ModeFrame.
///
/// `validate_icao`: if true, reject residual-recovered ICAOs not in cache.
pub fn parse_frame(
    hex_str: &str,
    timestamp: f64,
    signal_level: Option<f64>,
    validate_icao: bool,
    icao_cache: &mut IcaoCache,
) -> Option<ModeFrame> {
    let hex_str = hex_str.trim();

    // Validate length: 14 hex chars (56 bits) or 28 hex chars (112 bits)
    if hex_str.len() != 14 && hex_str.len() != 28 {
        return None;
    }

    let raw = hex_decode(hex_str)?;
    let msg_bits = raw.len() * 8;
    let df = (raw[0] >> 3) & 0x1F;

    // Check if DF is recognized
    let info = df_info(df)?;

    // Validate message length matches expected for this DF
    if msg_bits != info.bits {
        return None;
    }

    let crc_remainder = crc::crc24(&raw);
    let mut corrected = false;
    let mut error_bits = 0u8;
    let mut raw = raw;

    // Extract ICAO address
    let (icao, crc_ok) = if DF_EXPLICIT_ICAO.contains(&df) {
        let mut crc_ok = crc_remainder == 0;

        // Attempt error correction for DF17/18 if CRC fails
        if !crc_ok && (df == 17 || df == 18) {
            if let Some(info) = crc::diagnose(crc_remainder, msg_bits) {
                if info.errors > 0 {
                    crc::apply_fix(&mut raw, &info);
                    crc_ok = true;
                    corrected = true;
                    error_bits = info.errors;
                }
            }
        }

        // Extract ICAO (possibly from corrected raw bytes)
        let icao: Icao = [raw[1], raw[2], raw[3]];
        if crc_ok && validate_icao {
            icao_cache.register(icao, timestamp);
        }
        (icao, crc_ok)
    } else if DF_RESIDUAL_ICAO.contains(&df) {
        let icao: Icao = [
            ((crc_remainder >> 16) & 0xFF) as u8,
            ((crc_remainder >> 8) & 0xFF) as u8,
            (crc_remainder & 0xFF) as u8,
        ];

        // Validate against ICAO cache if enabled
        if validate_icao && !icao_cache.is_known(&icao, timestamp) {
            return None;
        }

        (icao, true)
    } else {
        return None;
    };

    let score = if error_bits > 0 {
        if error_bits == 1 {
            90
        } else {
            50
        }
    } else {
        i32::MAX
    };
    let addrtype = addrtype_for(df, corrected);

    Some(ModeFrame {
        df,
        icao,
        raw,
        timestamp,
        signal_level,
        msg_bits,
        crc_ok,
        corrected,
        error_bits,
        score,
        addrtype,
    })
}

/// Parse a hex string without ICAO cache validation.
/// Convenience for decoding standalone frames (e.g., from test vectors).
pub fn parse_frame_uncached(
    hex_str: &str,
    timestamp: f64,
    signal_level: Option<f64>,
) -> Option<ModeFrame> {
    let mut cache = IcaoCache::new(60.0);
    parse_frame(hex_str, timestamp, signal_level, false, &mut cache)
}

// ---------------------------------------------------------------------------
// Raw text message ingestion
// ---------------------------------------------------------------------------

/// Extract a bare Mode S hex string from one line of raw text ingestion.
///
/// Accepts the dump1090 beast-ish ASCII format `*HEX;` (14 or 28 hex
/// digits between the markers) as well as a plain hex line with no
/// framing, case-insensitively. Blank lines and `#`-prefixed comments
/// are ignored. This is a string-framing concern, not file I/O, so it
/// lives next to the rest of the framer rather than in the feeder.
pub fn parse_raw_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    if let Some(inner) = line.strip_prefix('*').and_then(|s| s.strip_suffix(';')) {
        return is_valid_hex(inner).then(|| inner.to_ascii_uppercase());
    }

    is_valid_hex(line).then(|| line.to_ascii_uppercase())
}

fn is_valid_hex(s: &str) -> bool {
    (s.len() == 14 || s.len() == 28) && s.chars().all(|c| c.is_ascii_hexdigit())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
