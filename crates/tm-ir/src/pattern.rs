//! Pattern and cell types for tracker sequences.

use alloc::vec::Vec;
use core::fmt;

use crate::effects::{Effect, VolumeCommand};

/// Highest playable note number (B-9).
pub const NOTE_MAX: u8 = 119;

const NOTE_NAMES: [&str; 12] = ["C-", "C#", "D-", "D#", "E-", "F-", "F#", "G-", "G#", "A-", "A#", "B-"];

/// The note column of a cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Note {
    #[default]
    None,
    /// Note number 0-119; 60 is C-5
    On(u8),
    /// Key off (`===`): release sustain and envelope loops
    Off,
    /// Note cut (`^^^`)
    Cut,
    /// Note fade (`~~~`)
    Fade,
}

impl Note {
    /// The note number of a playable note.
    pub fn key(self) -> Option<u8> {
        match self {
            Note::On(n) if n <= NOTE_MAX => Some(n),
            _ => None,
        }
    }
}

/// Tracker notation: `C-5`, `===`, `^^^`, `~~~` or `...`.
impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Note::On(n) if n <= NOTE_MAX => write!(f, "{}{}", NOTE_NAMES[(n % 12) as usize], n / 12),
            Note::On(_) => f.write_str("???"),
            Note::None => f.write_str("..."),
            Note::Off => f.write_str("==="),
            Note::Cut => f.write_str("^^^"),
            Note::Fade => f.write_str("~~~"),
        }
    }
}

/// One channel of one row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cell {
    pub note: Note,
    /// Instrument (or sample, outside instrument mode) number; 0 keeps the previous one
    pub instrument: u8,
    pub volume: VolumeCommand,
    pub effect: Effect,
}

impl Cell {
    pub const fn empty() -> Self {
        Self {
            note: Note::None,
            instrument: 0,
            volume: VolumeCommand::None,
            effect: Effect::None,
        }
    }

    /// A note with its instrument and nothing else.
    pub const fn note(note: u8, instrument: u8) -> Self {
        Self { note: Note::On(note), instrument, ..Self::empty() }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }
}

/// A block of `rows × channels` cells, stored row-major.
#[derive(Clone, Debug)]
pub struct Pattern {
    /// Number of rows (1-256)
    pub rows: u16,
    pub channels: u8,
    pub data: Vec<Cell>,
}

impl Pattern {
    pub fn new(rows: u16, channels: u8) -> Self {
        Self {
            rows,
            channels,
            data: alloc::vec![Cell::empty(); rows as usize * channels as usize],
        }
    }

    fn index(&self, row: u16, channel: u8) -> usize {
        debug_assert!(row < self.rows && channel < self.channels);
        row as usize * self.channels as usize + channel as usize
    }

    pub fn cell(&self, row: u16, channel: u8) -> &Cell {
        &self.data[self.index(row, channel)]
    }

    pub fn cell_mut(&mut self, row: u16, channel: u8) -> &mut Cell {
        let i = self.index(row, channel);
        &mut self.data[i]
    }

    /// Cell lookup for playback: anything outside the pattern reads as `None`.
    pub fn get(&self, row: u16, channel: usize) -> Option<&Cell> {
        if row >= self.rows || channel >= self.channels as usize {
            return None;
        }
        self.data.get(row as usize * self.channels as usize + channel)
    }
}
