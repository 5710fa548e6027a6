//! Voice: the unit of sample playback the mixer walks.
//!
//! Voices `0..channels` follow the song's channels. The rest hold notes
//! that a new-note action sent to the background.

use bitflags::bitflags;
use tm_ir::{LoopSlot, LoopType, NewNoteAction, Sample, SampleLoop};

use crate::envelope::EnvelopeCursor;
use crate::filter::NEUTRAL_MODIFIER;
use crate::kernels::{MixState, VOLUME_RAMP_PRECISION};

/// Fade-out volume of a voice that is not fading.
pub const FADEOUT_MAX: i32 = 65536;

bitflags! {
    /// Playback state bits of a voice.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct VoiceFlags: u32 {
        /// A loop is active
        const LOOP = 1 << 0;
        /// The active loop is bidirectional
        const PING_PONG = 1 << 1;
        /// Currently playing backwards
        const BACKWARD = 1 << 2;
        /// The active loop is the sustain loop
        const SUSTAIN_LOOP = 1 << 3;
        /// Passed the loop end at least once
        const WRAPPED = 1 << 4;
        const KEY_OFF = 1 << 5;
        const NOTE_FADE = 1 << 6;
        const SURROUND = 1 << 7;
        const MUTE = 1 << 8;
        /// Resonant filter engaged
        const FILTER = 1 << 9;
        /// Use the short ramp for the next volume change
        const FAST_RAMP = 1 << 10;
        const VOL_ENV = 1 << 11;
        const PAN_ENV = 1 << 12;
        const PITCH_ENV = 1 << 13;
        /// Triggered since the last processed tick
        const NEW_NOTE = 1 << 14;
    }
}

/// Coarse lifecycle, used to pick a background slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum VoiceState {
    Free,
    Fading,
    Released,
    Playing,
}

/// A single voice producing audio from a sample.
#[derive(Clone, Debug)]
pub struct Voice {
    /// Sample number (1-based, 0 = none).
    pub sample: u8,
    /// Instrument number (1-based, 0 = sample mode).
    pub instrument: u8,
    /// Note being played after the instrument's note map.
    pub note: u8,
    pub mix: MixState,
    /// Playback end in frames: the sample length or the active loop end.
    pub length: u32,
    pub loop_start: u32,
    pub loop_end: u32,
    pub flags: VoiceFlags,

    /// Current frequency in Hz, before per-tick modulation.
    pub frequency: u32,
    /// Tone portamento destination.
    pub porta_target: u32,
    pub c5_speed: u32,

    /// Note volume (0-64)
    pub volume: i32,
    /// Channel volume (0-64)
    pub channel_volume: i32,
    /// Instrument times sample global volume (0-64)
    pub instrument_volume: i32,
    /// Panning (0-256)
    pub panning: i32,
    /// Result of the last volume pass (0-0x4000)
    pub final_volume: i32,
    /// Result of the last panning pass (0-256)
    pub final_panning: i32,
    /// Ramp destinations computed for the current tick.
    pub left_target: i32,
    pub right_target: i32,
    /// Frames left in the current ramp.
    pub ramp_remaining: i32,
    /// DC level left behind by the last mixed frame.
    pub left_offset: i32,
    pub right_offset: i32,
    /// 0-65536
    pub fadeout_volume: i32,

    pub vol_env: EnvelopeCursor,
    pub pan_env: EnvelopeCursor,
    pub pitch_env: EnvelopeCursor,

    pub cutoff: u8,
    pub resonance: u8,
    pub filter_modifier: i32,

    /// Auto-vibrato depth, 8 fractional bits
    pub autovib_depth: i32,
    pub autovib_position: u8,

    pub nna: NewNoteAction,
    /// Channel a background voice was moved from.
    pub parent: Option<u8>,
    /// Meter value (0-128)
    pub vu: u8,
}

impl Default for Voice {
    fn default() -> Self {
        Self {
            sample: 0,
            instrument: 0,
            note: 0,
            mix: MixState::default(),
            length: 0,
            loop_start: 0,
            loop_end: 0,
            flags: VoiceFlags::empty(),
            frequency: 0,
            porta_target: 0,
            c5_speed: 0,
            volume: 0,
            channel_volume: 64,
            instrument_volume: 64,
            panning: 128,
            final_volume: 0,
            final_panning: 128,
            left_target: 0,
            right_target: 0,
            ramp_remaining: 0,
            left_offset: 0,
            right_offset: 0,
            fadeout_volume: FADEOUT_MAX,
            vol_env: EnvelopeCursor::default(),
            pan_env: EnvelopeCursor::default(),
            pitch_env: EnvelopeCursor::default(),
            cutoff: 127,
            resonance: 0,
            filter_modifier: NEUTRAL_MODIFIER,
            autovib_depth: 0,
            autovib_position: 0,
            nna: NewNoteAction::Cut,
            parent: None,
            vu: 0,
        }
    }
}

impl Voice {
    /// A voice with a sample that has not run off its end.
    pub fn is_active(&self) -> bool {
        self.sample != 0 && self.length > 0
    }

    /// Holds a DC level that still has to drain.
    pub fn has_offset(&self) -> bool {
        self.left_offset != 0 || self.right_offset != 0
    }

    pub fn state(&self) -> VoiceState {
        if !self.is_active() {
            VoiceState::Free
        } else if self.flags.contains(VoiceFlags::NOTE_FADE) {
            VoiceState::Fading
        } else if self.flags.contains(VoiceFlags::KEY_OFF) {
            VoiceState::Released
        } else {
            VoiceState::Playing
        }
    }

    /// Which loop's lookahead windows apply.
    pub fn loop_slot(&self) -> LoopSlot {
        if self.flags.contains(VoiceFlags::SUSTAIN_LOOP) {
            LoopSlot::Sustain
        } else {
            LoopSlot::Normal
        }
    }

    /// Point the voice at `sample` and pick its active loop.
    pub fn attach_sample(&mut self, number: u8, sample: &Sample) {
        self.sample = number;
        self.c5_speed = sample.c5_speed;
        self.flags.remove(VoiceFlags::WRAPPED | VoiceFlags::BACKWARD);
        self.select_loop(sample);
    }

    /// Active loop for the current key state: sustain while held, then the normal loop.
    fn select_loop(&mut self, sample: &Sample) {
        let held = !self.flags.contains(VoiceFlags::KEY_OFF);
        let (lp, sustain) = if held && sample.has_sustain_loop() {
            (sample.sustain_loop, true)
        } else {
            (sample.sample_loop, false)
        };
        self.flags.set(VoiceFlags::SUSTAIN_LOOP, sustain);
        self.apply_loop(&lp, sample.len() as u32);
    }

    fn apply_loop(&mut self, lp: &SampleLoop, sample_len: u32) {
        if lp.is_active() {
            self.loop_start = lp.start;
            self.loop_end = lp.end;
            self.length = lp.end;
            self.flags.insert(VoiceFlags::LOOP);
            self.flags.set(VoiceFlags::PING_PONG, lp.kind == LoopType::PingPong);
        } else {
            self.loop_start = 0;
            self.loop_end = 0;
            self.length = sample_len;
            self.flags.remove(VoiceFlags::LOOP | VoiceFlags::PING_PONG);
        }
        if !self.flags.contains(VoiceFlags::PING_PONG) {
            self.flags.remove(VoiceFlags::BACKWARD);
        }
    }

    /// Release the key: leave the sustain loop, and fade if nothing else will.
    pub fn key_off(&mut self, sample: Option<&Sample>) {
        self.flags.insert(VoiceFlags::KEY_OFF);
        if self.flags.contains(VoiceFlags::SUSTAIN_LOOP) {
            self.flags.remove(VoiceFlags::SUSTAIN_LOOP | VoiceFlags::WRAPPED);
            if let Some(sample) = sample {
                self.apply_loop(&sample.sample_loop, sample.len() as u32);
            }
        }
        if self.instrument != 0 && !self.flags.contains(VoiceFlags::VOL_ENV) {
            self.flags.insert(VoiceFlags::NOTE_FADE);
        }
    }

    pub fn note_fade(&mut self) {
        self.flags.insert(VoiceFlags::NOTE_FADE);
    }

    /// Silence quickly, then stop once the ramp lands.
    pub fn cut(&mut self) {
        self.volume = 0;
        self.fadeout_volume = 0;
        self.flags.insert(VoiceFlags::NOTE_FADE | VoiceFlags::FAST_RAMP);
    }

    /// Drop the sample. The DC offset stays so it can drain.
    pub fn stop_sample(&mut self) {
        self.sample = 0;
        self.length = 0;
        self.mix.position = 0;
        self.mix.increment = 0;
        self.mix.left_vol = 0;
        self.mix.right_vol = 0;
        self.mix.left_ramp = 0;
        self.mix.right_ramp = 0;
        self.mix.left_ramp_volume = 0;
        self.mix.right_ramp_volume = 0;
        self.ramp_remaining = 0;
        self.final_volume = 0;
        self.flags.remove(
            VoiceFlags::LOOP | VoiceFlags::PING_PONG | VoiceFlags::BACKWARD | VoiceFlags::WRAPPED,
        );
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Move the mixer volumes toward `left_target`/`right_target`.
    ///
    /// Without ramping the volumes jump. Otherwise the step is chosen so
    /// the accumulator lands exactly on the target after the ramp.
    pub fn start_ramp(&mut self, ramp_samples: i32, ramping: bool) {
        let (new_l, new_r) = (self.left_target, self.right_target);
        let len = if self.flags.contains(VoiceFlags::FAST_RAMP) {
            (ramp_samples >> 2).max(8)
        } else {
            ramp_samples.max(1)
        };
        self.flags.remove(VoiceFlags::FAST_RAMP);

        let (cur_l, cur_r) = (self.mix.left_vol, self.mix.right_vol);
        if !ramping || (new_l == cur_l && new_r == cur_r) {
            self.finish_ramp();
            return;
        }

        let ramp_l = ((new_l - cur_l) << VOLUME_RAMP_PRECISION) / len;
        let ramp_r = ((new_r - cur_r) << VOLUME_RAMP_PRECISION) / len;
        let start_l = new_l - ((ramp_l * len) >> VOLUME_RAMP_PRECISION);
        let start_r = new_r - ((ramp_r * len) >> VOLUME_RAMP_PRECISION);

        self.mix.left_ramp = ramp_l;
        self.mix.right_ramp = ramp_r;
        self.mix.left_ramp_volume = start_l << VOLUME_RAMP_PRECISION;
        self.mix.right_ramp_volume = start_r << VOLUME_RAMP_PRECISION;
        self.mix.left_vol = start_l;
        self.mix.right_vol = start_r;
        self.ramp_remaining = len;
    }

    /// Snap to the ramp destination.
    pub fn finish_ramp(&mut self) {
        self.mix.left_vol = self.left_target;
        self.mix.right_vol = self.right_target;
        self.mix.left_ramp = 0;
        self.mix.right_ramp = 0;
        self.mix.left_ramp_volume = self.left_target << VOLUME_RAMP_PRECISION;
        self.mix.right_ramp_volume = self.right_target << VOLUME_RAMP_PRECISION;
        self.ramp_remaining = 0;
    }
}
