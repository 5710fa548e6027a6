//! Output equalizer: peaking biquads applied to the mix buffer.

use core::f32::consts::PI;

use crate::config::{EqBand, EQ_BANDS};

/// Bandwidth of every band.
const Q: f32 = 1.0;

/// One peaking filter section with direct form I state per output channel.
#[derive(Clone, Copy, Debug)]
struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    /// `[channel][x1, x2, y1, y2]`
    state: [[f32; 4]; 2],
    active: bool,
}

impl Default for Biquad {
    fn default() -> Self {
        Self { b0: 1.0, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0, state: [[0.0; 4]; 2], active: false }
    }
}

impl Biquad {
    fn configure_peaking(&mut self, sample_rate: f32, freq: f32, gain_db: f32) {
        if gain_db == 0.0 || freq <= 0.0 || freq >= sample_rate / 2.0 {
            *self = Self::default();
            return;
        }
        let a = libm::powf(10.0, gain_db / 40.0);
        let w0 = 2.0 * PI * freq / sample_rate;
        let (sin_w0, cos_w0) = (libm::sinf(w0), libm::cosf(w0));
        let alpha = sin_w0 / (2.0 * Q);

        let a0 = 1.0 + alpha / a;
        self.b0 = (1.0 + alpha * a) / a0;
        self.b1 = (-2.0 * cos_w0) / a0;
        self.b2 = (1.0 - alpha * a) / a0;
        self.a1 = (-2.0 * cos_w0) / a0;
        self.a2 = (1.0 - alpha / a) / a0;
        self.active = true;
    }

    #[inline]
    fn process(&mut self, x: f32, channel: usize) -> f32 {
        let s = &mut self.state[channel];
        let y = self.b0 * x + self.b1 * s[0] + self.b2 * s[1] - self.a1 * s[2] - self.a2 * s[3];
        *s = [x, s[0], y, s[2]];
        y
    }
}

/// Four-band equalizer over the interleaved stereo accumulator.
#[derive(Clone, Debug, Default)]
pub struct Equalizer {
    bands: [Biquad; EQ_BANDS],
}

impl Equalizer {
    pub fn new(bands: &[EqBand; EQ_BANDS], sample_rate: u32) -> Self {
        let mut eq = Self::default();
        eq.configure(bands, sample_rate);
        eq
    }

    /// Recompute coefficients. Filter state is cleared.
    pub fn configure(&mut self, bands: &[EqBand; EQ_BANDS], sample_rate: u32) {
        for (section, band) in self.bands.iter_mut().zip(bands) {
            *section = Biquad::default();
            section.configure_peaking(sample_rate as f32, band.frequency, band.gain_db);
        }
    }

    pub fn is_active(&self) -> bool {
        self.bands.iter().any(|b| b.active)
    }

    /// Filter interleaved stereo frames in place.
    pub fn process(&mut self, buffer: &mut [i32]) {
        if !self.is_active() {
            return;
        }
        for frame in buffer.chunks_exact_mut(2) {
            for (channel, value) in frame.iter_mut().enumerate() {
                let mut x = *value as f32;
                for band in self.bands.iter_mut().filter(|b| b.active) {
                    x = band.process(x, channel);
                }
                *value = x.clamp(i32::MIN as f32, i32::MAX as f32) as i32;
            }
        }
    }
}
