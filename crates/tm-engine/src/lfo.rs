//! Low-frequency oscillators for vibrato, tremolo, panbrello and auto-vibrato.
//!
//! One cycle is 256 positions and the output range is -64..=64.

use core::f64::consts::PI;

use tm_ir::Waveform;

/// Oscillator output at `position`.
///
/// `seed` feeds the random waveform and is advanced only when it is used,
/// so playback stays deterministic from a fresh start.
pub fn wave_value(waveform: Waveform, position: u8, seed: &mut u32) -> i32 {
    match waveform {
        Waveform::Sine => libm::round(64.0 * libm::sin(position as f64 * 2.0 * PI / 256.0)) as i32,
        Waveform::RampDown => 64 - (position as i32 >> 1),
        Waveform::Square => {
            if position < 128 {
                64
            } else {
                -64
            }
        }
        Waveform::Random => {
            *seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
            ((*seed >> 16) & 0x7F) as i32 - 64
        }
    }
}

/// Seed used by every channel after a reset.
pub const RANDOM_SEED: u32 = 0x1234_5678;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_quarter_points() {
        let mut seed = RANDOM_SEED;
        assert_eq!(wave_value(Waveform::Sine, 0, &mut seed), 0);
        assert_eq!(wave_value(Waveform::Sine, 64, &mut seed), 64);
        assert_eq!(wave_value(Waveform::Sine, 192, &mut seed), -64);
        assert_eq!(seed, RANDOM_SEED);
    }

    #[test]
    fn ramp_and_square_ranges() {
        let mut seed = 0;
        assert_eq!(wave_value(Waveform::RampDown, 0, &mut seed), 64);
        assert_eq!(wave_value(Waveform::RampDown, 255, &mut seed), -63);
        assert_eq!(wave_value(Waveform::Square, 127, &mut seed), 64);
        assert_eq!(wave_value(Waveform::Square, 128, &mut seed), -64);
    }

    #[test]
    fn random_is_repeatable_and_bounded() {
        let mut a = RANDOM_SEED;
        let mut b = RANDOM_SEED;
        for _ in 0..100 {
            let x = wave_value(Waveform::Random, 0, &mut a);
            assert_eq!(x, wave_value(Waveform::Random, 0, &mut b));
            assert!((-64..64).contains(&x));
        }
    }
}
