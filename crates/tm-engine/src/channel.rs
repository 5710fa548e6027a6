//! Channel state for tracker playback.
//!
//! A channel remembers effect parameters between rows and produces the
//! per-tick modulation that the processor applies to its foreground voice.

use tm_ir::{Cell, ChannelSettings, Waveform};

use crate::lfo::RANDOM_SEED;

/// Effect memory and per-tick modulation of one song channel.
#[derive(Clone, Debug)]
pub struct ChannelState {
    /// Cell read on the current row (or held back by a note delay)
    pub cell: Cell,
    /// Last note played, before the instrument's note map
    pub note: u8,
    /// Last instrument (or sample, in sample mode) number
    pub instrument: u8,
    /// Panning (0-256)
    pub panning: i32,
    /// Channel volume (0-64)
    pub channel_volume: i32,
    pub surround: bool,
    pub muted: bool,

    // Effect memory
    pub volume_slide: u8,
    pub channel_volume_slide: u8,
    pub global_volume_slide: u8,
    pub pan_slide: u8,
    /// Shared by E and F
    pub porta: u8,
    pub tone_porta: u8,
    pub vibrato_speed: u8,
    pub vibrato_depth: u8,
    pub tremolo_speed: u8,
    pub tremolo_depth: u8,
    pub panbrello_speed: u8,
    pub panbrello_depth: u8,
    pub tremor: (u8, u8),
    pub arpeggio: (u8, u8),
    pub offset: u8,
    pub high_offset: u8,
    pub retrigger: u8,
    pub tempo_slide: u8,
    pub volume_column_slide: u8,
    pub vibrato_waveform: Waveform,
    pub tremolo_waveform: Waveform,
    pub panbrello_waveform: Waveform,
    pub glissando: bool,

    // Oscillator and counter state
    pub vibrato_position: u8,
    pub tremolo_position: u8,
    pub panbrello_position: u8,
    pub tremor_count: u8,
    pub retrigger_count: u8,
    pub pattern_loop_row: u16,
    pub pattern_loop_count: u8,
    /// Tick at which the held-back cell is dispatched (SDx)
    pub note_delay: Option<u8>,
    /// Tick at which the note is cut (SCx)
    pub note_cut: Option<u8>,
    pub rng: u32,

    // Per-tick modulation, recomputed every tick
    /// Pitch offset in slide units, positive is up
    pub vibrato_delta: i32,
    /// Volume offset on the 0-256 scale
    pub tremolo_delta: i32,
    /// Pan offset on the 0-256 scale
    pub panbrello_delta: i32,
    /// Semitones added by arpeggio
    pub arpeggio_shift: i16,
    pub tremor_mute: bool,
    /// Tone portamento ran this tick
    pub porta_active: bool,
}

impl ChannelState {
    /// Create a channel from the song's initial settings.
    pub fn new(settings: &ChannelSettings) -> Self {
        Self {
            cell: Cell::empty(),
            note: 0,
            instrument: 0,
            panning: pan_64_to_256(settings.initial_pan),
            channel_volume: settings.initial_vol.min(64) as i32,
            surround: settings.surround,
            muted: settings.muted,
            volume_slide: 0,
            channel_volume_slide: 0,
            global_volume_slide: 0,
            pan_slide: 0,
            porta: 0,
            tone_porta: 0,
            vibrato_speed: 0,
            vibrato_depth: 0,
            tremolo_speed: 0,
            tremolo_depth: 0,
            panbrello_speed: 0,
            panbrello_depth: 0,
            tremor: (0, 0),
            arpeggio: (0, 0),
            offset: 0,
            high_offset: 0,
            retrigger: 0,
            tempo_slide: 0,
            volume_column_slide: 0,
            vibrato_waveform: Waveform::Sine,
            tremolo_waveform: Waveform::Sine,
            panbrello_waveform: Waveform::Sine,
            glissando: false,
            vibrato_position: 0,
            tremolo_position: 0,
            panbrello_position: 0,
            tremor_count: 0,
            retrigger_count: 0,
            pattern_loop_row: 0,
            pattern_loop_count: 0,
            note_delay: None,
            note_cut: None,
            rng: RANDOM_SEED,
            vibrato_delta: 0,
            tremolo_delta: 0,
            panbrello_delta: 0,
            arpeggio_shift: 0,
            tremor_mute: false,
            porta_active: false,
        }
    }

    /// Clear temporary per-tick modulation before applying effects.
    pub fn clear_modulation(&mut self) {
        self.vibrato_delta = 0;
        self.tremolo_delta = 0;
        self.panbrello_delta = 0;
        self.arpeggio_shift = 0;
        self.tremor_mute = false;
        self.porta_active = false;
    }

    /// Restart oscillators for a new note.
    pub fn retrigger_oscillators(&mut self) {
        self.vibrato_position = 0;
        self.tremolo_position = 0;
        self.panbrello_position = 0;
        self.tremor_count = 0;
        self.retrigger_count = 0;
    }
}

/// Convert a 0-64 pan to the 0-256 scale.
pub fn pan_64_to_256(pan: u8) -> i32 {
    (pan.min(64) as i32) * 4
}
