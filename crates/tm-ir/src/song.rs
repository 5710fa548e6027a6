//! Song structure and sequencing types.

use alloc::vec::Vec;
use arrayvec::ArrayString;
use bitflags::bitflags;

use crate::instrument::Instrument;
use crate::pattern::Pattern;
use crate::sample::Sample;

bitflags! {
    /// Song-wide playback behaviour switches.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SongFlags: u8 {
        /// Pitch slides in 1/64 semitone steps instead of Amiga periods.
        const LINEAR_SLIDES = 1 << 0;
        /// IT "old effects": vibrato depth, tremor timing and sample offset quirks.
        const OLD_EFFECTS = 1 << 1;
        /// The instrument column addresses instruments rather than samples.
        const INSTRUMENT_MODE = 1 << 2;
    }
}

/// A complete song.
#[derive(Clone, Debug)]
pub struct Song {
    /// Song title
    pub title: ArrayString<32>,
    /// Initial tempo in BPM (32-255); 0 ends playback at once
    pub initial_tempo: u8,
    /// Initial speed (ticks per row, 1-255)
    pub initial_speed: u8,
    /// Global volume (0-128)
    pub global_volume: u8,
    /// Mixing volume (0-128)
    pub mixing_volume: u8,
    /// Stereo separation (0-128, 128 = full)
    pub pan_separation: u8,
    pub flags: SongFlags,
    /// Order list
    pub order: Vec<OrderEntry>,
    /// Pattern pool, indexed by `OrderEntry::Pattern`
    pub patterns: Vec<Pattern>,
    /// Instruments
    pub instruments: Vec<Instrument>,
    /// Samples
    pub samples: Vec<Sample>,
    /// Per-channel settings
    pub channels: Vec<ChannelSettings>,
}

impl Default for Song {
    fn default() -> Self {
        Self {
            title: ArrayString::new(),
            initial_tempo: 125,
            initial_speed: 6,
            global_volume: 128,
            mixing_volume: 48,
            pan_separation: 128,
            flags: SongFlags::LINEAR_SLIDES,
            order: Vec::new(),
            patterns: Vec::new(),
            instruments: Vec::new(),
            samples: Vec::new(),
            channels: Vec::new(),
        }
    }
}

impl Song {
    /// Create a new empty song.
    pub fn new(title: &str) -> Self {
        let mut song = Self::default();
        let _ = song.title.try_push_str(title);
        song
    }

    /// Create a song with a given number of centered channels.
    pub fn with_channels(title: &str, num_channels: u8) -> Self {
        let mut song = Self::new(title);
        song.channels = (0..num_channels).map(|_| ChannelSettings::default()).collect();
        song
    }

    /// Sample by 1-based sample number.
    pub fn sample(&self, number: u8) -> Option<&Sample> {
        (number as usize).checked_sub(1).and_then(|i| self.samples.get(i))
    }

    /// Instrument by 1-based instrument number.
    pub fn instrument(&self, number: u8) -> Option<&Instrument> {
        (number as usize).checked_sub(1).and_then(|i| self.instruments.get(i))
    }

    /// Pattern index at an order position, if that entry names a pattern.
    pub fn pattern_at(&self, order: usize) -> Option<u8> {
        match self.order.get(order) {
            Some(OrderEntry::Pattern(p)) => Some(*p),
            _ => None,
        }
    }

    /// Rebuild every sample's loop lookahead windows.
    pub fn prepare_samples(&mut self) {
        for sample in &mut self.samples {
            sample.prepare();
        }
    }
}

/// An entry in the order list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderEntry {
    /// Play pattern with this index
    Pattern(u8),
    /// Skip marker (+++), continue to next
    Skip,
    /// End of song marker (---)
    End,
}

/// Per-channel settings.
#[derive(Clone, Copy, Debug)]
pub struct ChannelSettings {
    /// Initial panning (0-64, 32 = center)
    pub initial_pan: u8,
    /// Initial volume (0-64)
    pub initial_vol: u8,
    /// Start in surround
    pub surround: bool,
    /// Is the channel muted?
    pub muted: bool,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            initial_pan: 32,
            initial_vol: 64,
            surround: false,
            muted: false,
        }
    }
}
