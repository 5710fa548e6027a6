//! Interpolation coefficient tables.
//!
//! Both tables are generated once per [`MixTables::new`] and are read-only
//! afterwards. Indices are derived from the 16-bit fractional part of a
//! voice position through the shift/mask constants below, which keep every
//! lookup in range.

use alloc::vec::Vec;
use core::f64::consts::PI;

/// Cubic spline coefficient precision.
pub const SPLINE_QUANTBITS: u32 = 14;
pub const SPLINE_QUANTSCALE: i32 = 1 << SPLINE_QUANTBITS;
/// Number of fractional buckets.
pub const SPLINE_FRACBITS: u32 = 10;
pub const SPLINE_LUTLEN: usize = 1 << SPLINE_FRACBITS;
/// `(frac >> SPLINE_FRACSHIFT) & SPLINE_FRACMASK` is a bucket index times 4.
pub const SPLINE_FRACSHIFT: u32 = 16 - SPLINE_FRACBITS - 2;
pub const SPLINE_FRACMASK: u32 = ((1 << (16 - SPLINE_FRACSHIFT)) - 1) & !3;
pub const SPLINE_8SHIFT: u32 = SPLINE_QUANTBITS - 8;
pub const SPLINE_16SHIFT: u32 = SPLINE_QUANTBITS;

/// Windowed-sinc coefficient precision.
pub const WFIR_QUANTBITS: u32 = 15;
pub const WFIR_QUANTSCALE: i32 = 1 << WFIR_QUANTBITS;
pub const WFIR_8SHIFT: u32 = WFIR_QUANTBITS - 8;
pub const WFIR_16BITSHIFT: u32 = WFIR_QUANTBITS;
pub const WFIR_FRACBITS: u32 = 10;
/// Rows in the FIR table: one per half-bucket plus the closing row.
pub const WFIR_LUTLEN: usize = (1 << (WFIR_FRACBITS + 1)) + 1;
pub const WFIR_LOG2WIDTH: u32 = 3;
/// Taps per row.
pub const WFIR_WIDTH: usize = 1 << WFIR_LOG2WIDTH;
/// `((frac + WFIR_FRACHALVE) >> WFIR_FRACSHIFT) & WFIR_FRACMASK` is a row index times 8.
pub const WFIR_FRACSHIFT: u32 = 16 - (WFIR_FRACBITS + 1 + WFIR_LOG2WIDTH);
pub const WFIR_FRACMASK: u32 = ((1 << (17 - WFIR_FRACSHIFT)) - 1) & !(WFIR_WIDTH as u32 - 1);
pub const WFIR_FRACHALVE: u32 = 1 << (16 - (WFIR_FRACBITS + 2));
/// Normalized passband edge.
pub const WFIR_CUTOFF: f64 = 0.90;

/// Window applied to the sinc kernel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FirWindow {
    Hann,
    Hamming,
    #[default]
    BlackmanExact,
    Blackman3T61,
    Blackman3T67,
    Blackman4T92,
    Blackman4T74,
    Kaiser4T,
}

impl FirWindow {
    pub const ALL: [FirWindow; 8] = [
        FirWindow::Hann,
        FirWindow::Hamming,
        FirWindow::BlackmanExact,
        FirWindow::Blackman3T61,
        FirWindow::Blackman3T67,
        FirWindow::Blackman4T92,
        FirWindow::Blackman4T74,
        FirWindow::Kaiser4T,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FirWindow::Hann => "hann",
            FirWindow::Hamming => "hamming",
            FirWindow::BlackmanExact => "blackman_exact",
            FirWindow::Blackman3T61 => "blackman3_t61",
            FirWindow::Blackman3T67 => "blackman3_t67",
            FirWindow::Blackman4T92 => "blackman4_t92",
            FirWindow::Blackman4T74 => "blackman4_t74",
            FirWindow::Kaiser4T => "kaiser4_t",
        }
    }

    /// Window weight at tap position `pos` (0 ..= width - 1).
    fn weight(self, pos: f64) -> f64 {
        let idl = 2.0 * PI / (WFIR_WIDTH as f64 - 1.0);
        let c1 = libm::cos(idl * pos);
        let c2 = libm::cos(2.0 * idl * pos);
        let c3 = libm::cos(3.0 * idl * pos);
        match self {
            FirWindow::Hann => 0.50 - 0.50 * c1,
            FirWindow::Hamming => 0.54 - 0.46 * c1,
            FirWindow::BlackmanExact => 0.42 - 0.50 * c1 + 0.08 * c2,
            FirWindow::Blackman3T61 => 0.44959 - 0.49364 * c1 + 0.05677 * c2,
            FirWindow::Blackman3T67 => 0.42323 - 0.49755 * c1 + 0.07922 * c2,
            FirWindow::Blackman4T92 => 0.35875 - 0.48829 * c1 + 0.14128 * c2 - 0.01168 * c3,
            FirWindow::Blackman4T74 => 0.40217 - 0.49703 * c1 + 0.09392 * c2 - 0.00183 * c3,
            FirWindow::Kaiser4T => 0.40243 - 0.49804 * c1 + 0.09831 * c2 - 0.00122 * c3,
        }
    }
}

impl core::str::FromStr for FirWindow {
    type Err = crate::config::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FirWindow::ALL
            .into_iter()
            .find(|w| w.name().eq_ignore_ascii_case(s))
            .ok_or(crate::config::ConfigError::UnknownWindow)
    }
}

/// Coefficient tables shared by every kernel.
#[derive(Clone, Debug)]
pub struct MixTables {
    /// `SPLINE_LUTLEN` rows of 4 taps for `p[-1..=2]`.
    pub spline: Vec<i32>,
    /// `WFIR_LUTLEN` rows of 8 taps for `p[-3..=4]`.
    pub fir: Vec<i32>,
    window: FirWindow,
}

impl MixTables {
    pub fn new(window: FirWindow) -> Self {
        Self { spline: spline_table(), fir: fir_table(window), window }
    }

    pub fn window(&self) -> FirWindow {
        self.window
    }
}

fn spline_table() -> Vec<i32> {
    let scale = SPLINE_QUANTSCALE as f64;
    let mut lut = Vec::with_capacity(SPLINE_LUTLEN * 4);
    for i in 0..SPLINE_LUTLEN {
        let x = i as f64 / SPLINE_LUTLEN as f64;
        let (x2, x3) = (x * x, x * x * x);
        let coefs = [
            -0.5 * x3 + x2 - 0.5 * x,
            1.5 * x3 - 2.5 * x2 + 1.0,
            -1.5 * x3 + 2.0 * x2 + 0.5 * x,
            0.5 * x3 - 0.5 * x2,
        ];
        let mut row = coefs.map(|c| libm::floor(0.5 + scale * c) as i32);

        // Unity gain: push the rounding error into the dominant tap.
        let sum: i32 = row.iter().sum();
        if sum != SPLINE_QUANTSCALE {
            let mut max = 0;
            for k in 1..4 {
                if row[k] > row[max] {
                    max = k;
                }
            }
            row[max] += SPLINE_QUANTSCALE - sum;
        }
        lut.extend_from_slice(&row);
    }
    lut
}

fn fir_table(window: FirWindow) -> Vec<i32> {
    let half_width = 0.5 * (WFIR_WIDTH as f64 - 1.0);
    let buckets = (1 << WFIR_FRACBITS) as f64;
    let scale = WFIR_QUANTSCALE as f64;
    let mut lut = Vec::with_capacity(WFIR_LUTLEN * WFIR_WIDTH);
    for row in 0..WFIR_LUTLEN {
        let ofs = (row as f64 - buckets) / (2.0 * buckets);
        let mut coefs = [0.0f64; WFIR_WIDTH];
        let mut gain = 0.0;
        for (tap, c) in coefs.iter_mut().enumerate() {
            let pos_u = tap as f64 - ofs;
            let pos = pos_u - half_width;
            *c = if libm::fabs(pos) < 1.0e-8 {
                WFIR_CUTOFF
            } else {
                let x = pos * PI;
                window.weight(pos_u) * libm::sin(WFIR_CUTOFF * x) / x
            };
            gain += *c;
        }
        let norm = 1.0 / gain;
        for c in coefs {
            let q = libm::floor(0.5 + scale * c * norm);
            lut.push(q.clamp(-scale, scale) as i32);
        }
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_masks_stay_in_range() {
        let spline_max = (0xFFFFu32 >> SPLINE_FRACSHIFT) & SPLINE_FRACMASK;
        assert_eq!(SPLINE_FRACMASK, 0xFFC);
        assert!(spline_max as usize + 4 <= SPLINE_LUTLEN * 4);

        let fir_max = ((0xFFFFu32 + WFIR_FRACHALVE) >> WFIR_FRACSHIFT) & WFIR_FRACMASK;
        assert_eq!(WFIR_FRACMASK, 0x7FF8);
        assert!(fir_max as usize + WFIR_WIDTH <= WFIR_LUTLEN * WFIR_WIDTH);
    }

    #[test]
    fn spline_rows_have_unity_gain() {
        let t = MixTables::new(FirWindow::default());
        for row in t.spline.chunks_exact(4) {
            assert_eq!(row.iter().sum::<i32>(), SPLINE_QUANTSCALE);
        }
        // x = 0 passes the centre sample through
        assert_eq!(&t.spline[..4], &[0, SPLINE_QUANTSCALE, 0, 0]);
    }

    #[test]
    fn fir_rows_are_close_to_unity_gain() {
        for window in FirWindow::ALL {
            let t = MixTables::new(window);
            for row in t.fir.chunks_exact(WFIR_WIDTH) {
                let sum: i32 = row.iter().sum();
                assert!((sum - WFIR_QUANTSCALE).abs() <= WFIR_WIDTH as i32, "{window:?}: {sum}");
            }
        }
    }

    #[test]
    fn fir_first_row_peaks_at_centre_tap() {
        let t = MixTables::new(FirWindow::BlackmanExact);
        let row = &t.fir[..WFIR_WIDTH];
        let peak = (0..WFIR_WIDTH).max_by_key(|&k| row[k]).unwrap();
        assert_eq!(peak, 3);
    }

    #[test]
    fn window_names_parse() {
        for w in FirWindow::ALL {
            assert_eq!(w.name().parse::<FirWindow>().unwrap(), w);
        }
        assert!("bartlett".parse::<FirWindow>().is_err());
    }
}
