//! I/Q sample to magnitude conversion.
//!
//! Mirrors the precomputed-lookup-table approach `demod.rs` already uses for
//! its 2 MS/s path, generalized to the full set of wire formats: UC8 (the
//! RTL-SDR native format), SC16, and SC16Q11. Each converter owns its own
//! filter state so multiple streams can run concurrently without aliasing
//! through global statics.

use std::sync::LazyLock;

use crate::types::AdsbError;

/// Size of the 16-bit magnitude lookup table: one entry per (I, Q) byte pair,
/// packed as `(I as u16) << 8 | Q as u16`.
const MAG_LUT_LEN: usize = 65536;

/// `(255/2)^2 + (255/2)^2`, the maximum squared distance from center for an
/// 8-bit unsigned I/Q pair — the normalization constant from spec.md §4.2.
const MAG_LUT_NORM: f64 = 16256.5;

/// `MAG_LUT[(i as usize) << 8 | q as usize] = round(sqrt(((I-127.5)^2 + (Q-127.5)^2) / 16256.5) * 65535)`,
/// clamped to 65535.
static MAG_LUT: LazyLock<Vec<u16>> = LazyLock::new(|| {
    let mut lut = vec![0u16; MAG_LUT_LEN];
    for i in 0u16..256 {
        let iv = i as f64 - 127.5;
        let i_sq = iv * iv;
        for q in 0u16..256 {
            let qv = q as f64 - 127.5;
            let mag = ((i_sq + qv * qv) / MAG_LUT_NORM).sqrt() * 65535.0;
            lut[((i as usize) << 8) | q as usize] = mag.round().clamp(0.0, 65535.0) as u16;
        }
    }
    lut
});

#[inline]
fn lut_lookup(i: u8, q: u8) -> u16 {
    MAG_LUT[((i as usize) << 8) | q as usize]
}

/// Wire format of the raw sample stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// RTL-SDR native: interleaved unsigned 8-bit I/Q.
    Uc8,
    /// Interleaved signed 16-bit I/Q.
    Sc16,
    /// Interleaved signed 16-bit I/Q, Q11 fixed point (HackRF-style).
    Sc16Q11,
}

/// Requested converter capabilities; selection picks the first converter
/// whose capabilities are a superset of what's requested.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConverterCaps {
    pub filter_dc: bool,
    pub compute_power: bool,
}

/// Per-block statistics a converter reports alongside the magnitude samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertStats {
    /// Mean magnitude over the block, normalized to `[0, 1]`.
    pub mean_level: f32,
    /// Mean squared magnitude (power) over the block, normalized to `[0, 1]`,
    /// only meaningful when the converter was selected with `compute_power`.
    pub mean_power: f32,
}

/// Converts a block of raw wire-format bytes into 16-bit magnitude samples.
///
/// Selected once per stream (never per-sample or per-block) so owned filter
/// state — the DC-blocking IIR's `z1_i`/`z1_q` — persists correctly across
/// calls.
pub trait Converter: Send {
    fn convert(&mut self, raw: &[u8], out: &mut [u16]) -> ConvertStats;
}

// ---------------------------------------------------------------------------
// UC8 converters
// ---------------------------------------------------------------------------

/// UC8, table lookup, no DC filter, no power accumulation. The common case
/// for a plain RTL-SDR feed.
#[derive(Debug, Default)]
pub struct Uc8Table;

impl Converter for Uc8Table {
    fn convert(&mut self, raw: &[u8], out: &mut [u16]) -> ConvertStats {
        let n = (raw.len() / 2).min(out.len());
        let mut sum = 0u64;
        for k in 0..n {
            let m = lut_lookup(raw[k * 2], raw[k * 2 + 1]);
            out[k] = m;
            sum += m as u64;
        }
        let mean_level = if n > 0 {
            (sum as f64 / n as f64 / 65535.0) as f32
        } else {
            0.0
        };
        ConvertStats {
            mean_level,
            mean_power: 0.0,
        }
    }
}

/// UC8, table lookup, with block power accumulation.
#[derive(Debug, Default)]
pub struct Uc8TablePower;

impl Converter for Uc8TablePower {
    fn convert(&mut self, raw: &[u8], out: &mut [u16]) -> ConvertStats {
        let n = (raw.len() / 2).min(out.len());
        let mut sum = 0u64;
        let mut power_sum = 0f64;
        for k in 0..n {
            let m = lut_lookup(raw[k * 2], raw[k * 2 + 1]);
            out[k] = m;
            sum += m as u64;
            let norm = m as f64 / 65535.0;
            power_sum += norm * norm;
        }
        let (mean_level, mean_power) = if n > 0 {
            (
                (sum as f64 / n as f64 / 65535.0) as f32,
                (power_sum / n as f64) as f32,
            )
        } else {
            (0.0, 0.0)
        };
        ConvertStats {
            mean_level,
            mean_power,
        }
    }
}

/// Single-pole DC-blocking IIR, owned per converter instance so independent
/// streams never share filter state.
#[derive(Debug, Clone, Copy)]
struct DcBlock {
    b: f64,
    a: f64,
    z1_i: f64,
    z1_q: f64,
}

impl DcBlock {
    fn new(sample_rate: f64) -> Self {
        let b = (-2.0 * std::f64::consts::PI / sample_rate).exp();
        DcBlock {
            b,
            a: 1.0 - b,
            z1_i: 0.0,
            z1_q: 0.0,
        }
    }

    /// Demean one I/Q pair, returning the filtered (I, Q).
    fn apply(&mut self, i: f64, q: f64) -> (f64, f64) {
        let di = i - self.z1_i;
        let dq = q - self.z1_q;
        self.z1_i = self.b * self.z1_i + self.a * i;
        self.z1_q = self.b * self.z1_q + self.a * q;
        (di, dq)
    }
}

/// UC8, float path: per-sample demean, DC-blocking IIR, Euclidean magnitude.
#[derive(Debug, Clone, Copy)]
pub struct Uc8Float {
    dc: DcBlock,
}

impl Uc8Float {
    pub fn new(sample_rate: f64) -> Self {
        Uc8Float {
            dc: DcBlock::new(sample_rate),
        }
    }
}

impl Converter for Uc8Float {
    fn convert(&mut self, raw: &[u8], out: &mut [u16]) -> ConvertStats {
        let n = (raw.len() / 2).min(out.len());
        let mut sum = 0f64;
        for k in 0..n {
            let i = (raw[k * 2] as f64 - 127.5) / 127.5;
            let q = (raw[k * 2 + 1] as f64 - 127.5) / 127.5;
            let (i, q) = self.dc.apply(i, q);
            let mag = (i * i + q * q).sqrt().min(1.0);
            let scaled = (mag * 65535.0).round() as u16;
            out[k] = scaled;
            sum += mag;
        }
        ConvertStats {
            mean_level: if n > 0 { (sum / n as f64) as f32 } else { 0.0 },
            mean_power: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// SC16 / SC16Q11 converters
// ---------------------------------------------------------------------------

/// Alpha-max-plus-beta-min magnitude approximation: `max(|I|,|Q|) * a + min(|I|,|Q|) * b`
/// with region-dependent coefficients, keeping error under ~1% without a
/// sqrt per sample. Two regions (min/max ratio above/below ~0.5) use
/// distinct coefficient pairs, matching spec.md's "two thresholds and four
/// coefficient pairs".
fn alpha_beta_magnitude(i: i32, q: i32) -> f64 {
    let ai = i.unsigned_abs() as f64;
    let aq = q.unsigned_abs() as f64;
    let (hi, lo) = if ai >= aq { (ai, aq) } else { (aq, ai) };
    if hi == 0.0 {
        return 0.0;
    }
    let ratio = lo / hi;
    let (a, b) = if ratio < 0.5 {
        (0.9609, 0.3984)
    } else {
        (0.8984, 0.4985)
    };
    hi * a + lo * b
}

/// SC16, integer piecewise-linear magnitude, no DC filter, no power.
#[derive(Debug, Default)]
pub struct Sc16;

impl Converter for Sc16 {
    fn convert(&mut self, raw: &[u8], out: &mut [u16]) -> ConvertStats {
        let n = (raw.len() / 4).min(out.len());
        let mut sum = 0u64;
        for k in 0..n {
            let i = i16::from_le_bytes([raw[k * 4], raw[k * 4 + 1]]) as i32;
            let q = i16::from_le_bytes([raw[k * 4 + 2], raw[k * 4 + 3]]) as i32;
            let mag = alpha_beta_magnitude(i, q) / 32768.0;
            let scaled = (mag.min(1.0) * 65535.0).round() as u16;
            out[k] = scaled;
            sum += scaled as u64;
        }
        ConvertStats {
            mean_level: if n > 0 {
                (sum as f64 / n as f64 / 65535.0) as f32
            } else {
                0.0
            },
            mean_power: 0.0,
        }
    }
}

/// SC16, float path: same filtering pipeline as `Uc8Float`, `I,Q ∈ int16/32768`.
#[derive(Debug, Clone, Copy)]
pub struct Sc16Float {
    dc: DcBlock,
}

impl Sc16Float {
    pub fn new(sample_rate: f64) -> Self {
        Sc16Float {
            dc: DcBlock::new(sample_rate),
        }
    }
}

impl Converter for Sc16Float {
    fn convert(&mut self, raw: &[u8], out: &mut [u16]) -> ConvertStats {
        let n = (raw.len() / 4).min(out.len());
        let mut sum = 0f64;
        for k in 0..n {
            let i = i16::from_le_bytes([raw[k * 4], raw[k * 4 + 1]]) as f64 / 32768.0;
            let q = i16::from_le_bytes([raw[k * 4 + 2], raw[k * 4 + 3]]) as f64 / 32768.0;
            let (i, q) = self.dc.apply(i, q);
            let mag = (i * i + q * q).sqrt().min(1.0);
            out[k] = (mag * 65535.0).round() as u16;
            sum += mag;
        }
        ConvertStats {
            mean_level: if n > 0 { (sum / n as f64) as f32 } else { 0.0 },
            mean_power: 0.0,
        }
    }
}

/// SC16Q11, float path: `I,Q ∈ int16/2048` (Q11 fixed point).
#[derive(Debug, Clone, Copy)]
pub struct Sc16Q11Float {
    dc: DcBlock,
}

impl Sc16Q11Float {
    pub fn new(sample_rate: f64) -> Self {
        Sc16Q11Float {
            dc: DcBlock::new(sample_rate),
        }
    }
}

impl Converter for Sc16Q11Float {
    fn convert(&mut self, raw: &[u8], out: &mut [u16]) -> ConvertStats {
        let n = (raw.len() / 4).min(out.len());
        let mut sum = 0f64;
        for k in 0..n {
            let i = i16::from_le_bytes([raw[k * 4], raw[k * 4 + 1]]) as f64 / 2048.0;
            let q = i16::from_le_bytes([raw[k * 4 + 2], raw[k * 4 + 3]]) as f64 / 2048.0;
            let (i, q) = self.dc.apply(i, q);
            let mag = (i * i + q * q).sqrt().min(1.0);
            out[k] = (mag * 65535.0).round() as u16;
            sum += mag;
        }
        ConvertStats {
            mean_level: if n > 0 { (sum / n as f64) as f32 } else { 0.0 },
            mean_power: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Select a converter in preference order: the first row matching `format`
/// and at least the requested capability set wins. Integer/table paths are
/// preferred (cheaper) when DC filtering isn't required.
pub fn select_converter(
    format: SampleFormat,
    sample_rate: f64,
    caps: ConverterCaps,
) -> Result<Box<dyn Converter>, AdsbError> {
    match (format, caps.filter_dc, caps.compute_power) {
        (SampleFormat::Uc8, false, false) => Ok(Box::new(Uc8Table)),
        (SampleFormat::Uc8, false, true) => Ok(Box::new(Uc8TablePower)),
        (SampleFormat::Uc8, true, false) => Ok(Box::new(Uc8Float::new(sample_rate))),
        (SampleFormat::Sc16, false, false) => Ok(Box::new(Sc16)),
        (SampleFormat::Sc16, true, false) => Ok(Box::new(Sc16Float::new(sample_rate))),
        // SC16Q11 has only the float path; it always runs the DC blocker
        // regardless of the requested filter_dc, so that flag doesn't gate it.
        (SampleFormat::Sc16Q11, _, false) => Ok(Box::new(Sc16Q11Float::new(sample_rate))),
        // No row in spec.md §4.2's converter table covers block power for
        // the UC8-float or any SC16 path — reject rather than silently
        // return a converter whose `mean_power` is always 0.0.
        (format, filter_dc, compute_power) => Err(AdsbError::UnsupportedConverter {
            format,
            filter_dc,
            compute_power,
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lut_center_is_zero() {
        // (127.5, 127.5) isn't representable, but (127,128)/(128,127) are
        // the closest bytes to center and should be near-zero.
        assert!(lut_lookup(127, 128) < 200);
        assert!(lut_lookup(128, 127) < 200);
    }

    #[test]
    fn test_lut_corner_is_max() {
        assert_eq!(lut_lookup(0, 0), 65535);
        assert_eq!(lut_lookup(255, 255), 65535);
    }

    #[test]
    fn test_lut_symmetry() {
        assert_eq!(lut_lookup(0, 0), lut_lookup(255, 255));
        assert_eq!(lut_lookup(0, 255), lut_lookup(255, 0));
    }

    #[test]
    fn test_uc8_table_matches_lut() {
        let mut conv = Uc8Table;
        let raw = [127u8, 128, 0, 0, 255, 255];
        let mut out = [0u16; 3];
        conv.convert(&raw, &mut out);
        assert_eq!(out[0], lut_lookup(127, 128));
        assert_eq!(out[1], lut_lookup(0, 0));
        assert_eq!(out[2], lut_lookup(255, 255));
    }

    #[test]
    fn test_uc8_table_power_tracks_level() {
        let mut conv = Uc8TablePower;
        let raw = vec![255u8; 4]; // two corner samples
        let mut out = [0u16; 2];
        let stats = conv.convert(&raw, &mut out);
        assert!(stats.mean_power > 0.9);
    }

    #[test]
    fn test_dc_block_removes_constant_offset() {
        let mut dc = DcBlock::new(2_000_000.0);
        let mut last = (0.0, 0.0);
        for _ in 0..10_000 {
            last = dc.apply(0.5, 0.5);
        }
        assert!(last.0.abs() < 0.01, "DC component should decay to ~0, got {}", last.0);
    }

    #[test]
    fn test_sc16_alpha_beta_close_to_sqrt() {
        let approx = alpha_beta_magnitude(3000, 4000);
        let exact = ((3000f64).powi(2) + (4000f64).powi(2)).sqrt();
        assert!((approx - exact).abs() / exact < 0.02);
    }

    #[test]
    fn test_select_converter_uc8_plain() {
        let conv = select_converter(SampleFormat::Uc8, 2_000_000.0, ConverterCaps::default());
        assert!(conv.is_ok());
    }

    #[test]
    fn test_select_converter_sc16q11() {
        let conv = select_converter(SampleFormat::Sc16Q11, 2_400_000.0, ConverterCaps::default());
        assert!(conv.is_ok());
    }

    #[test]
    fn test_select_converter_rejects_unsupported_power_combos() {
        let caps = ConverterCaps {
            filter_dc: false,
            compute_power: true,
        };
        assert!(select_converter(SampleFormat::Sc16, 2_400_000.0, caps).is_err());
        assert!(select_converter(SampleFormat::Sc16Q11, 2_400_000.0, caps).is_err());

        let caps = ConverterCaps {
            filter_dc: true,
            compute_power: true,
        };
        assert!(select_converter(SampleFormat::Uc8, 2_000_000.0, caps).is_err());
    }
}
