//! Instrument and envelope types.

use alloc::vec::Vec;
use arrayvec::ArrayString;

/// Number of playable notes (C-0 to B-9).
pub const NOTE_COUNT: usize = 120;

/// An instrument definition.
#[derive(Clone, Debug)]
pub struct Instrument {
    /// Instrument name
    pub name: ArrayString<26>,
    /// Sample mapping: note (0-119) -> sample number (1-based, 0 = no sample)
    pub sample_map: [u8; NOTE_COUNT],
    /// Note mapping: note (0-119) -> note actually played
    pub note_map: [u8; NOTE_COUNT],
    /// Volume envelope (values 0-64)
    pub volume_envelope: Option<Envelope>,
    /// Panning envelope (values -32 to +32, 0 is the channel's own pan)
    pub panning_envelope: Option<Envelope>,
    /// Pitch envelope (values -32 to +32), or filter envelope when `pitch_is_filter`
    pub pitch_envelope: Option<Envelope>,
    /// Route the pitch envelope to the filter cutoff instead of the pitch
    pub pitch_is_filter: bool,
    /// Fadeout speed (0-1024, 0 = no fade)
    pub fadeout: u16,
    /// Global volume (0-128)
    pub global_volume: u8,
    /// Default panning (0-64), applied on note-on when set
    pub default_pan: Option<u8>,
    /// Pitch-pan separation (-32 to +32)
    pub pitch_pan_separation: i8,
    /// Note at which pitch-pan separation is neutral
    pub pitch_pan_center: u8,
    /// Initial filter cutoff (0-127)
    pub filter_cutoff: Option<u8>,
    /// Initial filter resonance (0-127)
    pub filter_resonance: Option<u8>,
    /// What happens when a new note is played on a channel already playing this instrument
    pub new_note_action: NewNoteAction,
    /// Duplicate note checking mode
    pub duplicate_check: DuplicateCheck,
    /// What happens to a detected duplicate
    pub duplicate_action: DuplicateAction,
    /// MIDI channel (0-15) for external note notifications
    pub midi_channel: Option<u8>,
    /// MIDI program (0-127) passed along with note-on notifications
    pub midi_program: Option<u8>,
}

impl Default for Instrument {
    fn default() -> Self {
        let mut note_map = [0u8; NOTE_COUNT];
        for (i, n) in note_map.iter_mut().enumerate() {
            *n = i as u8;
        }
        Self {
            name: ArrayString::new(),
            sample_map: [0; NOTE_COUNT],
            note_map,
            volume_envelope: None,
            panning_envelope: None,
            pitch_envelope: None,
            pitch_is_filter: false,
            fadeout: 0,
            global_volume: 128,
            default_pan: None,
            pitch_pan_separation: 0,
            pitch_pan_center: 60,
            filter_cutoff: None,
            filter_resonance: None,
            new_note_action: NewNoteAction::Cut,
            duplicate_check: DuplicateCheck::Off,
            duplicate_action: DuplicateAction::Cut,
            midi_channel: None,
            midi_program: None,
        }
    }
}

impl Instrument {
    /// Create a new instrument with default settings.
    pub fn new(name: &str) -> Self {
        let mut inst = Self::default();
        let _ = inst.name.try_push_str(name);
        inst
    }

    /// Set all notes to map to a single sample number (1-based).
    pub fn set_single_sample(&mut self, sample: u8) {
        self.sample_map.fill(sample);
    }

    /// Resolve a pattern note to `(played note, sample number)`.
    pub fn map_note(&self, note: u8) -> Option<(u8, u8)> {
        let i = note as usize;
        let sample = *self.sample_map.get(i)?;
        Some((self.note_map[i], sample))
    }
}

/// Action when a new note triggers on a channel already playing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NewNoteAction {
    /// Cut the previous note immediately
    #[default]
    Cut,
    /// Continue the previous note (background)
    Continue,
    /// Send note-off to previous note
    Off,
    /// Fade out the previous note
    Fade,
}

/// Duplicate note checking mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DuplicateCheck {
    /// No duplicate checking
    #[default]
    Off,
    /// Check for duplicate notes
    Note,
    /// Check for duplicate samples
    Sample,
    /// Check for duplicate instruments
    Instrument,
}

/// What a duplicate check does to the older voice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DuplicateAction {
    #[default]
    Cut,
    Off,
    Fade,
}

/// A node-index range inside an envelope (inclusive).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnvelopeRange {
    pub start: u8,
    pub end: u8,
}

/// An envelope (volume, panning, or pitch).
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    /// Envelope points, ticks non-decreasing, first at tick 0
    pub points: Vec<EnvelopePoint>,
    /// Sustain loop, held until key-off
    pub sustain: Option<EnvelopeRange>,
    /// Regular loop
    pub loop_range: Option<EnvelopeRange>,
    /// Is the envelope enabled?
    pub enabled: bool,
}

impl Envelope {
    /// An enabled envelope from `(tick, value)` nodes.
    pub fn from_points(points: &[(u16, i8)]) -> Self {
        Self {
            points: points.iter().map(|&(tick, value)| EnvelopePoint { tick, value }).collect(),
            enabled: true,
            ..Self::default()
        }
    }

    /// Tick of the node at `index`, or the last node's tick when out of range.
    pub fn tick_of(&self, index: u8) -> u16 {
        self.points
            .get(index as usize)
            .or(self.points.last())
            .map_or(0, |p| p.tick)
    }

    pub fn last_tick(&self) -> u16 {
        self.points.last().map_or(0, |p| p.tick)
    }

    pub fn last_value(&self) -> i8 {
        self.points.last().map_or(0, |p| p.value)
    }

    /// Linear interpolation between the nodes bracketing `tick`.
    ///
    /// Before the first node it reads the first value, past the last node
    /// it holds the last one. Of several nodes on one tick the last wins.
    pub fn value_at(&self, tick: u16) -> i8 {
        let next = self.points.partition_point(|p| p.tick <= tick);
        let (Some(a), Some(b)) = (next.checked_sub(1).map(|i| self.points[i]), self.points.get(next)) else {
            return match next {
                0 => self.points.first().map_or(0, |p| p.value),
                _ => self.last_value(),
            };
        };
        let span = (b.tick - a.tick) as i32;
        let step = (b.value as i32 - a.value as i32) * (tick - a.tick) as i32;
        (a.value as i32 + step / span) as i8
    }
}

/// A point in an envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnvelopePoint {
    /// Tick position (0-65535)
    pub tick: u16,
    /// Value (0-64 for volume, -32 to +32 otherwise)
    pub value: i8,
}
