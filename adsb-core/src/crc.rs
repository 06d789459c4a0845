//! CRC-24 validation for Mode S messages.
//!
//! ICAO standard polynomial: x^24 + x^23 + x^22 + ... + x^10 + x^3 + 1
//! Generator: 0xFFF409
//!
//! For DF17/18 (ADS-B): last 24 bits are pure CRC. Valid frames → remainder 0.
//! For DF0/4/5/16/20/21: last 24 bits are CRC XOR'd with ICAO address.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::types::{hex_decode, hex_encode, ErrorInfo, Icao};

/// Bits 0-4 encode the Downlink Format; a correction table never proposes
/// flipping one of them, since that would turn one message type into
/// another rather than fix a transmission error.
const DF_FIELD_BITS: usize = 5;

/// Errors corrected beyond 1 bit. 2-bit correction roughly doubles syndrome
/// table size but is what dump1090 does for DF17/18.
const MAX_CORRECT: usize = 2;

const GENERATOR: u32 = 0xFFF409;

// ---------------------------------------------------------------------------
// CRC lookup table (compile-time)
// ---------------------------------------------------------------------------

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 16;
        let mut bit = 0;
        while bit < 8 {
            if crc & 0x800000 != 0 {
                crc = (crc << 1) ^ GENERATOR;
            } else {
                crc <<= 1;
            }
            crc &= 0xFFFFFF;
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC_TABLE: [u32; 256] = build_crc_table();

// ---------------------------------------------------------------------------
// Core CRC functions
// ---------------------------------------------------------------------------

/// Mode S CRC-24 check.
///
/// Polynomial division of the first (n-3) bytes, then XOR with the last 3
/// bytes (PI/CRC field).
///
/// - DF17/18: returns 0 when valid.
/// - DF0/4/5/16/20/21: returns ICAO address.
pub fn crc24(data: &[u8]) -> u32 {
    if data.len() <= 3 {
        let mut val = 0u32;
        for &b in data {
            val = (val << 8) | b as u32;
        }
        return val & 0xFFFFFF;
    }

    let payload_len = data.len() - 3;
    let mut crc = 0u32;

    for &byte in &data[..payload_len] {
        crc = ((crc << 8) ^ CRC_TABLE[((crc >> 16) ^ byte as u32) as usize & 0xFF]) & 0xFFFFFF;
    }

    // XOR with PI field (last 3 bytes)
    crc ^= (data[payload_len] as u32) << 16
        | (data[payload_len + 1] as u32) << 8
        | data[payload_len + 2] as u32;
    crc
}

/// Pure CRC-24 polynomial division of all bytes.
/// Used internally for syndrome table building.
fn crc24_raw(data: &[u8]) -> u32 {
    let mut crc = 0u32;
    for &byte in data {
        crc = ((crc << 8) ^ CRC_TABLE[((crc >> 16) ^ byte as u32) as usize & 0xFF]) & 0xFFFFFF;
    }
    crc
}

/// Compute CRC-24 of payload bytes (all except last 3).
pub fn crc24_payload(data: &[u8]) -> u32 {
    if data.len() <= 3 {
        return 0;
    }
    crc24_raw(&data[..data.len() - 3])
}

/// Validate a Mode S message (hex string). Returns true if CRC remainder is 0.
pub fn validate(msg_hex: &str) -> bool {
    match hex_decode(msg_hex) {
        Some(data) => crc24(&data) == 0,
        None => false,
    }
}

/// Get CRC residual of a full message.
///
/// For DF17/18: returns 0 if valid.
/// For DF0/4/5/16/20/21: returns the ICAO address.
pub fn residual(msg_hex: &str) -> Option<u32> {
    hex_decode(msg_hex).map(|data| crc24(&data))
}

/// Extract ICAO address from a Mode S message hex string.
///
/// - DF11/17/18: ICAO is bytes 1-3 (explicit).
/// - DF0/4/5/16/20/21: ICAO recovered from CRC residual.
pub fn extract_icao(msg_hex: &str) -> Option<Icao> {
    let data = hex_decode(msg_hex)?;
    if data.is_empty() {
        return None;
    }
    let df = (data[0] >> 3) & 0x1F;

    match df {
        11 | 17 | 18 => {
            if data.len() < 4 {
                return None;
            }
            Some([data[1], data[2], data[3]])
        }
        0 | 4 | 5 | 16 | 20 | 21 => {
            let icao_val = crc24(&data);
            Some([
                ((icao_val >> 16) & 0xFF) as u8,
                ((icao_val >> 8) & 0xFF) as u8,
                (icao_val & 0xFF) as u8,
            ])
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Syndrome tables for error correction
// ---------------------------------------------------------------------------

/// Syndrome of a single-bit error at `bit`, computed by running the pure
/// division over an all-zero message with that one bit set. CRC-24 is
/// linear over GF(2), so the syndrome of any multi-bit error is the XOR of
/// its single-bit syndromes — this is what lets us build the 2-bit table
/// by recursive expansion instead of a second O(n^2) pass through `crc24`.
fn single_bit_syndromes(n_bits: usize) -> Vec<u32> {
    let n_bytes = n_bits / 8;
    (0..n_bits)
        .map(|bit| {
            let mut msg = vec![0u8; n_bytes];
            msg[bit / 8] |= 1 << (7 - (bit % 8));
            crc24_raw(&msg)
        })
        .collect()
}

/// Recursively extend an error pattern by one more bit position at a time,
/// up to `max_correct` bits, recording every (syndrome, pattern) generated
/// along the way. Patterns only ever grow by bit positions greater than
/// the last one chosen, so each reachable pattern is visited exactly once.
fn expand_patterns(
    start: usize,
    n_bits: usize,
    depth: usize,
    max_correct: usize,
    syndrome: u32,
    bits: &mut Vec<usize>,
    sbs: &[u32],
    raw: &mut HashMap<u32, Vec<Vec<usize>>>,
) {
    if depth == max_correct {
        return;
    }
    for b in start..n_bits {
        if b < DF_FIELD_BITS {
            continue;
        }
        let s = syndrome ^ sbs[b];
        bits.push(b);
        raw.entry(s).or_default().push(bits.clone());
        expand_patterns(b + 1, n_bits, depth + 1, max_correct, s, bits, sbs, raw);
        bits.pop();
    }
}

/// Build the syndrome -> correction table for messages of `n_bits` length.
///
/// Any syndrome reached by more than one distinct error pattern is
/// ambiguous — we cannot tell which pattern actually occurred — and is
/// dropped from the table entirely rather than resolved by first-match.
fn build_syndrome_table(n_bits: usize) -> HashMap<u32, ErrorInfo> {
    let sbs = single_bit_syndromes(n_bits);
    let mut raw: HashMap<u32, Vec<Vec<usize>>> = HashMap::new();
    raw.entry(0).or_default().push(Vec::new());

    let mut bits = Vec::new();
    expand_patterns(0, n_bits, 0, MAX_CORRECT, 0, &mut bits, &sbs, &mut raw);

    let mut table = HashMap::with_capacity(raw.len());
    for (syndrome, patterns) in raw {
        if patterns.len() != 1 {
            continue; // ambiguous — reachable by more than one pattern
        }
        let info = match patterns[0].as_slice() {
            [] => ErrorInfo::clean(syndrome),
            [b] => ErrorInfo::single(syndrome, *b),
            [a, b] => ErrorInfo::double(syndrome, *a, *b),
            _ => unreachable!("max_correct caps patterns at 2 bits"),
        };
        table.insert(syndrome, info);
    }
    table
}

static SYNDROME_TABLE_112: LazyLock<HashMap<u32, ErrorInfo>> =
    LazyLock::new(|| build_syndrome_table(112));
static SYNDROME_TABLE_56: LazyLock<HashMap<u32, ErrorInfo>> =
    LazyLock::new(|| build_syndrome_table(56));

fn syndrome_table(n_bits: usize) -> &'static HashMap<u32, ErrorInfo> {
    if n_bits == 112 {
        &SYNDROME_TABLE_112
    } else {
        &SYNDROME_TABLE_56
    }
}

/// Diagnose a CRC residue: `Some(ErrorInfo::clean)` for a zero residue,
/// `Some` with 1 or 2 bit positions for a correctable residue, `None` if
/// the residue isn't in the table (unfixable, or would require flipping
/// the DF field).
pub fn diagnose(residue: u32, bits: usize) -> Option<ErrorInfo> {
    if residue == 0 {
        return Some(ErrorInfo::clean(0));
    }
    syndrome_table(bits).get(&residue).copied()
}

/// Flip the bits named by an `ErrorInfo` in place.
pub fn apply_fix(msg: &mut [u8], info: &ErrorInfo) {
    for &bit in &info.bit_positions {
        if bit == ErrorInfo::NO_SECOND_BIT {
            continue;
        }
        msg[bit / 8] ^= 1 << (7 - (bit % 8));
    }
}

/// Attempt to correct 1-2 bit errors in a Mode S message (hex-string API).
///
/// Returns corrected hex string if fixable, `None` otherwise. Never
/// corrects bits 0-4 (DF field) since those bit positions are excluded
/// from the syndrome table entirely.
pub fn try_fix(msg_hex: &str) -> Option<String> {
    let mut data = hex_decode(msg_hex)?;
    let n_bits = data.len() * 8;
    let syndrome = crc24(&data);

    let info = diagnose(syndrome, n_bits)?;
    if info.errors == 0 {
        return Some(msg_hex.to_uppercase());
    }

    apply_fix(&mut data, &info);

    // Verify the fix actually works — diagnose never returns ambiguous
    // entries, but this stays as the final authority per spec.md's edge
    // policy, and protects against a mismatched n_bits/table lookup.
    if crc24(&data) != 0 {
        return None;
    }

    Some(hex_encode(&data))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // Test vectors from known_frames.py
    const VALID_FRAMES: &[&str] = &[
        "8D4840D6202CC371C32CE0576098",
        "8D40621D58C382D690C8AC2863A7",
        "8D485020994409940838175B284F",
    ];

    #[test]
    fn test_crc_table_entry_zero() {
        assert_eq!(CRC_TABLE[0], 0);
    }

    #[test]
    fn test_crc_table_entry_one() {
        // First byte = 1: manual polynomial division
        // 0x010000 -> shift left 8 times with XOR
        assert_ne!(CRC_TABLE[1], 0);
    }

    #[test]
    fn test_valid_df17_remainder_zero() {
        for hex in VALID_FRAMES {
            let data = hex_decode(hex).unwrap();
            assert_eq!(crc24(&data), 0, "CRC should be 0 for valid DF17: {hex}");
        }
    }

    #[test]
    fn test_validate_hex() {
        for hex in VALID_FRAMES {
            assert!(validate(hex), "validate() should return true for: {hex}");
        }
    }

    #[test]
    fn test_validate_corrupted() {
        // Flip one bit in a valid frame
        let mut data = hex_decode(VALID_FRAMES[0]).unwrap();
        data[5] ^= 0x01;
        let corrupted = hex_encode(&data);
        assert!(!validate(&corrupted));
    }

    #[test]
    fn test_residual() {
        for hex in VALID_FRAMES {
            assert_eq!(residual(hex), Some(0));
        }
    }

    #[test]
    fn test_extract_icao_df17() {
        // "8D4840D6..." -> DF=17, ICAO=4840D6
        let icao = extract_icao("8D4840D6202CC371C32CE0576098").unwrap();
        assert_eq!(icao, [0x48, 0x40, 0xD6]);
    }

    #[test]
    fn test_extract_icao_df17_second() {
        let icao = extract_icao("8D40621D58C382D690C8AC2863A7").unwrap();
        assert_eq!(icao, [0x40, 0x62, 0x1D]);
    }

    #[test]
    fn test_crc24_payload() {
        let data = hex_decode(VALID_FRAMES[0]).unwrap();
        let payload_crc = crc24_payload(&data);
        // For DF17, payload CRC should equal the last 3 bytes
        let pi = (data[11] as u32) << 16 | (data[12] as u32) << 8 | data[13] as u32;
        assert_eq!(payload_crc, pi);
    }

    #[test]
    fn test_try_fix_already_valid() {
        let fixed = try_fix(VALID_FRAMES[0]).unwrap();
        assert_eq!(fixed, VALID_FRAMES[0]);
    }

    #[test]
    fn test_try_fix_single_bit_error() {
        // Corrupt bit 40 (byte 5, bit 0) — well past the DF field
        let mut data = hex_decode(VALID_FRAMES[0]).unwrap();
        data[5] ^= 0x01;
        let corrupted = hex_encode(&data);

        let fixed = try_fix(&corrupted);
        assert!(fixed.is_some(), "Should fix single-bit error");
        assert_eq!(fixed.unwrap(), VALID_FRAMES[0]);
    }

    #[test]
    fn test_try_fix_df_field_protection() {
        // Corrupt bit 0 (DF field) — should refuse to fix
        let mut data = hex_decode(VALID_FRAMES[0]).unwrap();
        data[0] ^= 0x80; // bit 0
        let corrupted = hex_encode(&data);

        assert!(try_fix(&corrupted).is_none());
    }

    #[test]
    fn test_diagnose_clean() {
        let info = diagnose(0, 112).unwrap();
        assert_eq!(info.errors, 0);
    }

    #[test]
    fn test_diagnose_apply_fix_roundtrip() {
        let mut data = hex_decode(VALID_FRAMES[0]).unwrap();
        data[5] ^= 0x01;
        let syndrome = crc24(&data);
        let info = diagnose(syndrome, 112).expect("single-bit syndrome must be in table");
        assert_eq!(info.errors, 1);
        apply_fix(&mut data, &info);
        assert_eq!(crc24(&data), 0);
    }

    #[test]
    fn test_diagnose_never_touches_df_field() {
        for info in SYNDROME_TABLE_112.values() {
            assert!(info.bit_positions.iter().all(|&b| b == ErrorInfo::NO_SECOND_BIT || b >= 5));
        }
    }

    #[test]
    fn test_diagnose_table_is_injective() {
        // Every stored syndrome maps to exactly one pattern by construction
        // (ambiguous ones are dropped during table build); spot-check that
        // no two distinct single-bit positions collide to the same entry.
        let mut seen = std::collections::HashSet::new();
        for info in SYNDROME_TABLE_56.values() {
            assert!(seen.insert(info.syndrome), "duplicate syndrome key in table");
        }
    }

    #[test]
    fn test_syndrome_table_sizes() {
        // 112-bit: 112 single + C(112,2) double = 112 + 6216 = 6328 entries
        // (minus collisions)
        assert!(!SYNDROME_TABLE_112.is_empty());
        assert!(!SYNDROME_TABLE_56.is_empty());
        // Single-bit entries should exist for all bit positions
        assert!(SYNDROME_TABLE_112.len() > 100);
        assert!(SYNDROME_TABLE_56.len() > 50);
    }
}
