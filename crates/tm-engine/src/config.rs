//! Mixer configuration.

use core::str::FromStr;

use crate::tables::FirWindow;

/// Lowest accepted output rate.
pub const MIN_SAMPLE_RATE: u32 = 8000;
/// Rates above this are clamped.
pub const MAX_SAMPLE_RATE: u32 = 192_000;
/// Hard ceiling on simultaneously mixed voices.
pub const MAX_VOICES: usize = 256;
/// Number of equalizer bands.
pub const EQ_BANDS: usize = 4;

/// Configuration problems reported by [`MixerConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("sample rate {0} Hz is below the 8000 Hz minimum")]
    SampleRate(u32),
    #[error("unsupported bit depth {0}")]
    BitDepth(u8),
    #[error("unsupported channel count {0}")]
    Channels(u8),
    #[error("voice limit must be between 1 and 256, got {0}")]
    VoiceLimit(usize),
    #[error("tempo factor must be non-zero")]
    TempoFactor,
    #[error("unknown interpolation mode")]
    UnknownInterpolation,
    #[error("unknown FIR window")]
    UnknownWindow,
}

/// Output sample format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub enum BitDepth {
    /// Unsigned 8-bit
    Bits8,
    #[default]
    Bits16,
    /// Packed 3-byte little endian
    Bits24,
    Bits32,
}

impl BitDepth {
    pub fn bytes(self) -> usize {
        match self {
            BitDepth::Bits8 => 1,
            BitDepth::Bits16 => 2,
            BitDepth::Bits24 => 3,
            BitDepth::Bits32 => 4,
        }
    }

    pub fn bits(self) -> u8 {
        self.bytes() as u8 * 8
    }

    /// Byte value of silence.
    pub fn silence(self) -> u8 {
        match self {
            BitDepth::Bits8 => 0x80,
            _ => 0,
        }
    }
}

impl TryFrom<u8> for BitDepth {
    type Error = ConfigError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            8 => Ok(BitDepth::Bits8),
            16 => Ok(BitDepth::Bits16),
            24 => Ok(BitDepth::Bits24),
            32 => Ok(BitDepth::Bits32),
            other => Err(ConfigError::BitDepth(other)),
        }
    }
}

impl From<BitDepth> for u8 {
    fn from(depth: BitDepth) -> u8 {
        depth.bits()
    }
}

/// Resampling interpolation, in kernel table order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum Interpolation {
    Nearest = 0,
    Linear = 1,
    #[default]
    Spline = 2,
    Fir = 3,
}

impl Interpolation {
    pub const ALL: [Interpolation; 4] =
        [Interpolation::Nearest, Interpolation::Linear, Interpolation::Spline, Interpolation::Fir];

    pub fn name(self) -> &'static str {
        match self {
            Interpolation::Nearest => "nearest",
            Interpolation::Linear => "linear",
            Interpolation::Spline => "spline",
            Interpolation::Fir => "fir",
        }
    }
}

impl FromStr for Interpolation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALIASES: [(&str, Interpolation); 3] = [
            ("none", Interpolation::Nearest),
            ("cubic", Interpolation::Spline),
            ("sinc", Interpolation::Fir),
        ];
        Interpolation::ALL
            .into_iter()
            .map(|mode| (mode.name(), mode))
            .chain(ALIASES)
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|(_, mode)| mode)
            .ok_or(ConfigError::UnknownInterpolation)
    }
}

/// How often the song restarts after reaching its end.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Repeat {
    #[default]
    Never,
    Times(u32),
    Forever,
}

/// One peaking equalizer band.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EqBand {
    /// Centre frequency in Hz
    pub frequency: f32,
    /// Gain in dB; 0 bypasses the band
    pub gain_db: f32,
}

impl EqBand {
    pub const fn flat(frequency: f32) -> Self {
        Self { frequency, gain_db: 0.0 }
    }
}

/// Mixer configuration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MixerConfig {
    /// Output rate in Hz
    pub sample_rate: u32,
    pub bit_depth: BitDepth,
    /// 1 (mono) or 2 (stereo)
    pub channels: u8,
    pub interpolation: Interpolation,
    pub fir_window: FirWindow,
    /// Maximum number of voices mixed per pass
    pub voice_limit: usize,
    /// Smooth volume changes over `ramp_length_us`
    pub ramping: bool,
    pub ramp_length_us: u32,
    /// Phase-invert the right side of surround voices
    pub surround: bool,
    pub reverse_stereo: bool,
    /// Scales tick length; 128 is nominal
    pub tempo_factor: u32,
    pub repeat: Repeat,
    pub equalizer: [EqBand; EQ_BANDS],
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            bit_depth: BitDepth::Bits16,
            channels: 2,
            interpolation: Interpolation::Spline,
            fir_window: FirWindow::default(),
            voice_limit: 64,
            ramping: true,
            ramp_length_us: 1460,
            surround: true,
            reverse_stereo: false,
            tempo_factor: 128,
            repeat: Repeat::Never,
            equalizer: [
                EqBand::flat(100.0),
                EqBand::flat(1000.0),
                EqBand::flat(4000.0),
                EqBand::flat(10000.0),
            ],
        }
    }
}

impl MixerConfig {
    /// Check the configuration, clamping what can be clamped.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.sample_rate < MIN_SAMPLE_RATE {
            return Err(ConfigError::SampleRate(self.sample_rate));
        }
        self.sample_rate = self.sample_rate.min(MAX_SAMPLE_RATE);
        if !matches!(self.channels, 1 | 2) {
            return Err(ConfigError::Channels(self.channels));
        }
        if self.voice_limit == 0 || self.voice_limit > MAX_VOICES {
            return Err(ConfigError::VoiceLimit(self.voice_limit));
        }
        if self.tempo_factor == 0 {
            return Err(ConfigError::TempoFactor);
        }
        Ok(self)
    }

    /// Bytes in one output frame.
    pub fn frame_bytes(&self) -> usize {
        self.bit_depth.bytes() * self.channels as usize
    }

    /// Ramp length in output frames.
    pub fn ramp_samples(&self) -> i32 {
        let frames = self.ramp_length_us as u64 * self.sample_rate as u64 / 1_000_000;
        (frames as i32).max(8)
    }
}
