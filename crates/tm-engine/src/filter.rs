//! Resonant two-pole lowpass filter, IT flavour.

use core::f32::consts::PI;

/// Fixed-point precision of the filter coefficients.
pub const FILTER_PRECISION: u32 = 13;

/// Cutoff modifier used when no filter envelope is active.
pub const NEUTRAL_MODIFIER: i32 = 256;

/// Bounds applied to the feedback history before it is multiplied.
const HISTORY_MIN: i32 = -65536;
const HISTORY_MAX: i32 = 65534;

/// Filter coefficients plus per-channel history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Filter {
    pub a0: i32,
    pub b0: i32,
    pub b1: i32,
    /// `[channel][y1, y2]`
    pub history: [[i32; 2]; 2],
}

impl Filter {
    /// Run one input through the filter for `channel` (0 or 1).
    #[inline(always)]
    pub fn apply(&mut self, x: i32, channel: usize) -> i32 {
        let h = &mut self.history[channel & 1];
        let y1 = h[0].clamp(HISTORY_MIN, HISTORY_MAX) as i64;
        let y2 = h[1].clamp(HISTORY_MIN, HISTORY_MAX) as i64;
        let acc = x as i64 * self.a0 as i64
            + y1 * self.b0 as i64
            + y2 * self.b1 as i64
            + (1 << (FILTER_PRECISION - 1));
        let y = (acc >> FILTER_PRECISION) as i32;
        h[1] = h[0];
        h[0] = y;
        y
    }

    pub fn reset_history(&mut self) {
        self.history = [[0; 2]; 2];
    }

    /// Recompute coefficients for `cutoff`/`resonance` (0-127).
    ///
    /// `modifier` scales the cutoff: [`NEUTRAL_MODIFIER`] leaves it alone,
    /// 0 closes the filter and 512 doubles the exponent.
    pub fn set_coefficients(&mut self, cutoff: u8, resonance: u8, modifier: i32, mix_frequency: u32) {
        let fc = cutoff_frequency(cutoff, modifier, mix_frequency) as f32 * 2.0 * PI / mix_frequency.max(1) as f32;
        let dmpfac = libm::powf(10.0, -((24.0 / 128.0) * resonance as f32) / 20.0);
        let d = ((1.0 - 2.0 * dmpfac) * fc).min(2.0);
        let d = (2.0 * dmpfac - d) / fc;
        let e = libm::powf(1.0 / fc, 2.0);

        let norm = 1.0 + d + e;
        let scale = (1 << FILTER_PRECISION) as f32;
        self.a0 = (scale / norm) as i32;
        self.b0 = (scale * (d + e + e) / norm) as i32;
        self.b1 = (scale * -e / norm) as i32;
    }
}

/// Cutoff in Hz for an IT cutoff value, clamped to 120..=20000 and to Nyquist.
pub fn cutoff_frequency(cutoff: u8, modifier: i32, mix_frequency: u32) -> u32 {
    let exponent = 0.25 + (cutoff as i32 * (modifier + 256)) as f32 / (24.0 * 512.0);
    let hz = (110.0 * libm::powf(2.0, exponent)) as u32;
    hz.clamp(120, 20000).min(mix_frequency / 2)
}

/// True when the voice's cutoff/resonance need the filter at all.
pub fn filter_enabled(cutoff: u8, resonance: u8) -> bool {
    cutoff < 127 || resonance > 0
}
