//! Shared message scoring, used by all three demodulators.
//!
//! A demodulated candidate is handed to the CRC error-correction machinery
//! exactly as if it had come off the wire; scoring doesn't know or care
//! which demodulator produced the bits.

use crate::crc;
use crate::types::df_info;

/// A message whose CRC residue was zero: no correction needed.
pub const SCORE_CLEAN: i32 = i32::MAX;
/// A message that couldn't be validated or corrected; reject it.
pub const SCORE_REJECT: i32 = -1;

/// Score a packed message. Higher is better; [`SCORE_REJECT`] means "don't
/// bother decoding this". A message correctable within the CRC's syndrome
/// table (1 or 2 bit errors) is fixed in place and scored lower than a
/// clean one, reflecting the lower confidence described for error-corrected
/// frames.
pub fn score_message(bytes: &mut [u8], bit_len: usize) -> i32 {
    if bit_len == 0 || bytes.is_empty() {
        return SCORE_REJECT;
    }
    let df = (bytes[0] >> 3) & 0x1F;
    if df_info(df).is_none() {
        return SCORE_REJECT;
    }
    let is_explicit_icao = matches!(df, 11 | 17 | 18);

    if !is_explicit_icao {
        // DF0/4/5/16/20/21 don't carry an explicit ICAO: the CRC residue
        // *is* the ICAO address recovered from the transponder's known
        // identity, so a nonzero residue doesn't mean an error by itself.
        return SCORE_CLEAN;
    }

    let residue = crc::crc24(bytes);
    if residue == 0 {
        return SCORE_CLEAN;
    }

    match crc::diagnose(residue, bit_len) {
        Some(info) => {
            crc::apply_fix(bytes, &info);
            match info.errors {
                1 => 90,
                2 => 50,
                _ => SCORE_REJECT,
            }
        }
        None => SCORE_REJECT,
    }
}

pub fn is_acceptable(score: i32) -> bool {
    score > SCORE_REJECT
}
