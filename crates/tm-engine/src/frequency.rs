//! Note, frequency and increment conversion for sample playback.
//!
//! Frequencies are plain Hz. A sample's `c5_speed` is the rate at which
//! note 60 (C-5) plays; other notes shift by equal-tempered semitones.
//! Slides run either on a linear scale (1/64 semitone units) or on the
//! Amiga period scale, depending on the song's `LINEAR_SLIDES` flag.

/// The note that plays a sample at its `c5_speed`.
const REFERENCE_NOTE: i16 = 60;

/// `period * frequency` on the Amiga scale (1712 * 8363).
pub const AMIGA_CONSTANT: u64 = 1712 * 8363;

/// Linear slide units per octave (64 per semitone).
pub const UNITS_PER_OCTAVE: f64 = 768.0;

/// Highest frequency a slide can reach.
pub const MAX_FREQUENCY: u32 = 0x00FF_FFFF;

/// Frequency of `note` for a sample whose C-5 plays at `c5_speed` Hz.
pub fn note_to_frequency(note: u8, c5_speed: u32) -> u32 {
    if c5_speed == 0 {
        return 0;
    }
    shift_frequency(c5_speed, note as i16 - REFERENCE_NOTE)
}

/// 16.16 fixed-point step through the sample for a frequency at `mix_frequency`.
pub fn frequency_to_increment(frequency: u32, mix_frequency: u32) -> i32 {
    if mix_frequency == 0 {
        return 0;
    }
    let inc = ((frequency as u64) << 16) / mix_frequency as u64;
    inc.min(i32::MAX as u64) as i32
}

/// Slide `frequency` by `units`; positive is up.
///
/// Linear mode multiplies by `2^(units / 768)`. Amiga mode subtracts
/// `units` from the period `AMIGA_CONSTANT / frequency`.
pub fn slide_frequency(frequency: u32, units: i32, linear: bool) -> u32 {
    if frequency == 0 || units == 0 {
        return frequency;
    }
    let f = if linear {
        let scaled = frequency as f64 * libm::exp2(units as f64 / UNITS_PER_OCTAVE);
        libm::round(scaled) as u64
    } else {
        let period = (AMIGA_CONSTANT / frequency as u64) as i64 - units as i64;
        AMIGA_CONSTANT / period.max(1) as u64
    };
    f.clamp(1, MAX_FREQUENCY as u64) as u32
}

/// Snap `frequency` to the nearest semitone relative to `c5_speed`.
pub fn quantize_to_semitone(frequency: u32, c5_speed: u32) -> u32 {
    if frequency == 0 || c5_speed == 0 {
        return frequency;
    }
    let semitones = libm::round(12.0 * libm::log2(frequency as f64 / c5_speed as f64));
    libm::round(c5_speed as f64 * libm::exp2(semitones / 12.0)) as u32
}

/// Shift a frequency by a number of semitones using 12-TET.
/// Positive = higher pitch, negative = lower pitch.
pub fn shift_frequency(base_freq: u32, semitones: i16) -> u32 {
    // Fractional octave from the table, whole octaves by shifting.
    let octaves = semitones.div_euclid(12);
    let remainder = semitones.rem_euclid(12) as usize;

    // semitone_multiplier[n] = round(2^(n/12) * 65536)
    const SEMITONE_MUL: [u32; 12] = [
        65536,  // 0:  1.0
        69433,  // 1:  2^(1/12)
        73562,  // 2:  2^(2/12)
        77936,  // 3:  2^(3/12)
        82570,  // 4:  2^(4/12)
        87480,  // 5:  2^(5/12)
        92682,  // 6:  2^(6/12)
        98193,  // 7:  2^(7/12)
        104032, // 8:  2^(8/12)
        110218, // 9:  2^(9/12)
        116772, // 10: 2^(10/12)
        123715, // 11: 2^(11/12)
    ];

    let scaled = base_freq as u64 * SEMITONE_MUL[remainder] as u64;
    let freq = scaled >> 16;

    let shifted = if octaves >= 0 {
        freq << (octaves as u32).min(31)
    } else {
        freq >> ((-octaves) as u32).min(63)
    };
    shifted.min(MAX_FREQUENCY as u64) as u32
}
