//! Note dispatch and the per-tick voice update.
//!
//! `dispatch_cell` turns a pattern cell into voice changes: new notes,
//! new-note actions, duplicate checks, key-off and cuts. `process_voices`
//! runs once per tick over every active voice and derives what the mixer
//! needs: final volume and panning, the playback increment, filter
//! coefficients and the volume ramp.

use tm_ir::{
    Cell, DuplicateAction, DuplicateCheck, Effect, Instrument, NewNoteAction, Note, Sample, NOTE_MAX,
    SongFlags, VolumeCommand,
};
use tracing::{debug, trace};

use crate::envelope::{SIGNED_RANGE, VOLUME_RANGE};
use crate::filter::{filter_enabled, NEUTRAL_MODIFIER};
use crate::frequency::{
    frequency_to_increment, note_to_frequency, quantize_to_semitone, shift_frequency,
    slide_frequency,
};
use crate::lfo::wave_value;
use crate::engine::Engine;
use crate::voice::{Voice, VoiceFlags, FADEOUT_MAX};

/// What a new-note action or duplicate check does to an older voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceAction {
    Cut,
    Off,
    Fade,
}

impl VoiceAction {
    pub fn apply(self, voice: &mut Voice, sample: Option<&Sample>) {
        match self {
            VoiceAction::Cut => voice.cut(),
            VoiceAction::Off => voice.key_off(sample),
            VoiceAction::Fade => voice.note_fade(),
        }
    }
}

impl From<DuplicateAction> for VoiceAction {
    fn from(action: DuplicateAction) -> Self {
        match action {
            DuplicateAction::Cut => VoiceAction::Cut,
            DuplicateAction::Off => VoiceAction::Off,
            DuplicateAction::Fade => VoiceAction::Fade,
        }
    }
}

/// Resolved target of a note-on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct NoteTarget {
    /// Note after the instrument's note map
    note: u8,
    /// 1-based sample number
    sample: u8,
    /// 1-based instrument number, 0 in sample mode
    instrument: u8,
}

/// Pitch envelope value to linear slide units (32 units per step, ±16 semitones).
const PITCH_ENV_UNITS: i32 = 32;

fn is_porta(cell: &Cell) -> bool {
    matches!(cell.effect, Effect::TonePorta(_) | Effect::TonePortaVolSlide(_))
        || matches!(cell.volume, VolumeCommand::TonePorta(_))
}

impl Engine {
    /// Resolve a note and instrument number to the sample that will play.
    fn resolve_note(&self, note: u8, instrument: u8) -> Option<NoteTarget> {
        if self.song.flags.contains(SongFlags::INSTRUMENT_MODE) {
            let (mapped, sample) = self.song.instrument(instrument)?.map_note(note)?;
            Some(NoteTarget { note: mapped, sample, instrument })
        } else {
            Some(NoteTarget { note, sample: instrument, instrument: 0 })
        }
        .filter(|t| self.song.sample(t.sample).is_some_and(|s| !s.is_empty()))
    }

    /// Apply the note, instrument and volume column of a cell, then its effect.
    pub(crate) fn dispatch_cell(&mut self, ch: usize, cell: Cell) {
        let Some(chan) = self.channels.get_mut(ch) else {
            return;
        };
        if cell.instrument != 0 {
            chan.instrument = cell.instrument;
        }
        let instrument = chan.instrument;

        match cell.note {
            Note::On(note) if note <= NOTE_MAX => {
                self.channels[ch].note = note;
                let active = self.voices.as_slice()[ch].is_active();
                if is_porta(&cell) && active {
                    self.set_porta_target(ch, note, instrument, cell.instrument != 0);
                } else {
                    self.trigger_note(ch, note, instrument, &cell);
                }
            }
            Note::Off => {
                let voice = &mut self.voices.as_mut_slice()[ch];
                voice.key_off(self.song.sample(voice.sample));
                self.midi_note_off(ch);
            }
            Note::Cut => {
                self.voices.as_mut_slice()[ch].cut();
                self.midi_note_off(ch);
            }
            Note::Fade => {
                self.voices.as_mut_slice()[ch].note_fade();
                self.midi_note_off(ch);
            }
            Note::On(note) => debug!(ch, note, "note out of range ignored"),
            Note::None => {
                if cell.instrument != 0 {
                    self.reset_to_default_volume(ch);
                }
            }
        }

        self.row_volume(ch, cell.volume);
        self.row_effect(ch, cell.effect);
    }

    /// An instrument number without a note restores the sample's volume.
    fn reset_to_default_volume(&mut self, ch: usize) {
        let voice = &mut self.voices.as_mut_slice()[ch];
        if let Some(sample) = self.song.sample(voice.sample) {
            voice.volume = sample.default_volume.min(64) as i32;
        }
    }

    /// Tone portamento: retarget the playing voice instead of restarting it.
    fn set_porta_target(&mut self, ch: usize, note: u8, instrument: u8, reset_volume: bool) {
        let Some(target) = self.resolve_note(note, instrument) else {
            return;
        };
        let voice = &mut self.voices.as_mut_slice()[ch];
        voice.porta_target = note_to_frequency(target.note, voice.c5_speed);
        if reset_volume {
            if let Some(sample) = self.song.sample(voice.sample) {
                voice.volume = sample.default_volume.min(64) as i32;
            }
        }
    }

    /// Start a note on channel `ch`'s foreground voice.
    fn trigger_note(&mut self, ch: usize, note: u8, instrument: u8, cell: &Cell) {
        let Some(target) = self.resolve_note(note, instrument) else {
            trace!(channel = ch, note, instrument, "note without a playable sample");
            return;
        };

        if self.voices.as_slice()[ch].is_active() {
            self.new_note_action(ch);
        }
        self.duplicate_check(ch, target);
        self.midi_note_off(ch);

        let old_effects = self.song.flags.contains(SongFlags::OLD_EFFECTS);
        let Some(sample) = self.song.sample(target.sample) else {
            return;
        };
        let inst = self.song.instrument(target.instrument);
        let chan = &mut self.channels[ch];
        let voice = &mut self.voices.as_mut_slice()[ch];

        let (cutoff, resonance, previous_volume) = (voice.cutoff, voice.resonance, voice.volume);
        let was_playing = voice.sample != 0;
        *voice = Voice::default();
        voice.flags = VoiceFlags::NEW_NOTE;
        voice.flags.set(VoiceFlags::SURROUND, chan.surround);
        voice.attach_sample(target.sample, sample);
        voice.instrument = target.instrument;
        voice.note = target.note;
        voice.frequency = note_to_frequency(target.note, sample.c5_speed);
        voice.porta_target = voice.frequency;
        voice.volume = if cell.instrument != 0 || !was_playing {
            sample.default_volume.min(64) as i32
        } else {
            previous_volume
        };
        voice.channel_volume = chan.channel_volume;
        voice.instrument_volume = match inst {
            Some(inst) => inst.global_volume.min(128) as i32 * sample.global_volume.min(64) as i32 >> 7,
            None => sample.global_volume.min(64) as i32,
        };
        voice.cutoff = cutoff;
        voice.resonance = resonance;
        voice.fadeout_volume = FADEOUT_MAX;

        if let Some(pan) = inst.and_then(|i| i.default_pan).or(sample.default_pan) {
            chan.panning = crate::channel::pan_64_to_256(pan);
            chan.surround = false;
            voice.flags.remove(VoiceFlags::SURROUND);
        }
        voice.panning = chan.panning;

        if let Some(inst) = inst {
            apply_instrument(voice, inst);
        }

        // Sample offset applies to the freshly started note only.
        if let Effect::SampleOffset(param) = cell.effect {
            let byte = if param != 0 { param } else { chan.offset };
            let offset = ((chan.high_offset as u32) << 16) | ((byte as u32) << 8);
            if (offset as usize) < sample.len() {
                voice.mix.position = (offset as i64) << 16;
            } else if old_effects {
                voice.mix.position = (sample.len().saturating_sub(1) as i64) << 16;
            }
        }

        chan.retrigger_oscillators();
        chan.note_cut = None;

        let velocity = (voice.volume * 2).min(127) as u8;
        if let Some((inst, midi_channel)) = inst.and_then(|i| Some((i, i.midi_channel?))) {
            self.midi_notes[ch] = Some((midi_channel, target.note));
            if let Some(hooks) = self.hooks.as_mut() {
                hooks.note_on(ch as u8, midi_channel, inst.midi_program, target.note, velocity);
            }
        }
        trace!(channel = ch, note = target.note, sample = target.sample, "note on");
    }

    /// Move the foreground voice to a background slot and apply its action.
    fn new_note_action(&mut self, ch: usize) {
        let instrument_mode = self.song.flags.contains(SongFlags::INSTRUMENT_MODE);
        let slot = self.voices.allocate_background();
        let voices = self.voices.as_mut_slice();
        let old = voices[ch].clone();
        let nna = if instrument_mode { old.nna } else { NewNoteAction::Cut };

        let bg = &mut voices[slot];
        if bg.is_active() {
            trace!(slot, "stealing background voice");
        }
        *bg = old;
        bg.parent = Some(ch as u8);
        bg.flags.remove(VoiceFlags::NEW_NOTE);
        match nna {
            NewNoteAction::Cut => VoiceAction::Cut.apply(bg, None),
            NewNoteAction::Continue => {}
            NewNoteAction::Off => {
                let sample = self.song.sample(bg.sample);
                VoiceAction::Off.apply(bg, sample);
            }
            NewNoteAction::Fade => VoiceAction::Fade.apply(bg, None),
        }
    }

    /// Apply the new instrument's duplicate action to matching background voices.
    fn duplicate_check(&mut self, ch: usize, target: NoteTarget) {
        let Some(inst) = self.song.instrument(target.instrument) else {
            return;
        };
        let (check, action) = (inst.duplicate_check, VoiceAction::from(inst.duplicate_action));
        if check == DuplicateCheck::Off {
            return;
        }
        let song = &self.song;
        for voice in self
            .voices
            .children_of(ch as u8)
            .filter(|v| v.instrument == target.instrument)
        {
            let duplicate = match check {
                DuplicateCheck::Note => voice.note == target.note,
                DuplicateCheck::Sample => voice.sample == target.sample,
                DuplicateCheck::Instrument => true,
                DuplicateCheck::Off => false,
            };
            if duplicate {
                let sample = song.sample(voice.sample);
                action.apply(voice, sample);
            }
        }
    }

    /// Qxy: restart the foreground voice's sample.
    pub(crate) fn retrigger_voice(&mut self, ch: usize) {
        let voice = &mut self.voices.as_mut_slice()[ch];
        if let Some(sample) = self.song.sample(voice.sample) {
            voice.attach_sample(voice.sample, sample);
            voice.mix.position = 0;
            voice.flags.insert(VoiceFlags::FAST_RAMP);
        }
    }

    pub(crate) fn midi_note_off(&mut self, ch: usize) {
        if let Some((midi_channel, note)) = self.midi_notes.get_mut(ch).and_then(Option::take) {
            if let Some(hooks) = self.hooks.as_mut() {
                hooks.note_off(ch as u8, midi_channel, note);
            }
        }
    }

    /// Per-tick update of every active voice.
    pub(crate) fn process_voices(&mut self) {
        let linear = self.song.flags.contains(SongFlags::LINEAR_SLIDES);
        let mix_frequency = self.ctx.config.sample_rate;
        let global_volume = self.play.global_volume;
        let mixing_volume = self.song.mixing_volume.min(128) as i32;
        let separation = self.song.pan_separation.min(128) as i32;
        let surround = self.ctx.config.surround;
        let reverse = self.ctx.config.reverse_stereo;
        let (ramp_samples, ramping) = (self.ctx.ramp_samples, self.ctx.config.ramping);
        let channels = self.voices.channels();

        for id in 0..self.voices.len() {
            let voice = &mut self.voices.as_mut_slice()[id];
            if !voice.is_active() {
                continue;
            }
            let Some(sample) = self.song.sample(voice.sample) else {
                voice.stop_sample();
                continue;
            };
            let inst = self.song.instrument(voice.instrument);
            let chan = (id < channels).then(|| &mut self.channels[id]);

            // Volume
            let mut vol = voice.volume * 4;
            let mut pan = voice.panning;
            let mut porta_glissando = false;
            if let Some(chan) = chan {
                voice.channel_volume = chan.channel_volume;
                voice.panning = chan.panning;
                voice.flags.set(VoiceFlags::SURROUND, chan.surround);
                voice.flags.set(VoiceFlags::MUTE, chan.muted);
                pan = (chan.panning + chan.panbrello_delta).clamp(0, 256);
                vol = (vol + chan.tremolo_delta).clamp(0, 256);
                if chan.tremor_mute {
                    vol = 0;
                }
                porta_glissando = chan.porta_active && chan.glissando;
            }

            if let Some(env) = inst.and_then(|i| i.volume_envelope.as_ref()) {
                if voice.flags.contains(VoiceFlags::VOL_ENV) {
                    let key_off = voice.flags.contains(VoiceFlags::KEY_OFF);
                    vol = vol * voice.vol_env.step(env, key_off, VOLUME_RANGE) >> 6;
                    if voice.vol_env.is_silent_hold(env, key_off) {
                        voice.flags.insert(VoiceFlags::NOTE_FADE);
                        voice.fadeout_volume = 0;
                    }
                }
            }
            if voice.flags.contains(VoiceFlags::NOTE_FADE) {
                let fadeout = inst.map_or(0, |i| i.fadeout as i32);
                if fadeout > 0 {
                    voice.fadeout_volume = (voice.fadeout_volume - (fadeout << 6)).max(0);
                }
                vol = (vol as i64 * voice.fadeout_volume as i64 >> 16) as i32;
            }
            let final_volume =
                (vol as i64 * global_volume as i64 * voice.channel_volume as i64 * voice.instrument_volume as i64)
                    >> 13;
            voice.final_volume = (final_volume as i32).clamp(0, 0x4000);

            // Panning
            if let Some(env) = inst.and_then(|i| i.panning_envelope.as_ref()) {
                if voice.flags.contains(VoiceFlags::PAN_ENV) {
                    let key_off = voice.flags.contains(VoiceFlags::KEY_OFF);
                    let e = voice.pan_env.step(env, key_off, SIGNED_RANGE);
                    let room = if pan >= 128 { 256 - pan } else { pan };
                    pan += e * room / 32;
                }
            }
            if let Some(inst) = inst.filter(|i| i.pitch_pan_separation != 0) {
                let delta = (voice.note as i32 - inst.pitch_pan_center as i32) * inst.pitch_pan_separation as i32 / 2;
                pan += delta;
            }
            pan = pan.clamp(0, 256);
            if voice.flags.contains(VoiceFlags::SURROUND) {
                pan = 128;
            }
            let pan_changed = pan != voice.final_panning || voice.flags.contains(VoiceFlags::NEW_NOTE);
            voice.final_panning = pan;

            // Frequency
            let mut pitch = PitchModulation {
                glissando: porta_glissando.then_some(voice.c5_speed),
                ..PitchModulation::default()
            };
            if let Some(chan) = (id < channels).then(|| &self.channels[id]) {
                pitch.arpeggio = chan.arpeggio_shift;
                pitch.vibrato = chan.vibrato_delta;
            }
            if let Some(av) = sample.vibrato.filter(|av| av.depth > 0) {
                let full = (av.depth as i32) << 8;
                voice.autovib_depth = if av.rate == 0 { full } else { (voice.autovib_depth + av.rate as i32).min(full) };
                let mut seed = self.channels.get(id).map_or(crate::lfo::RANDOM_SEED, |c| c.rng);
                let wave = wave_value(av.waveform, voice.autovib_position, &mut seed);
                voice.autovib_position = voice.autovib_position.wrapping_add(av.speed);
                pitch.auto_vibrato = wave * (voice.autovib_depth >> 8) >> 6;
            }
            let mut freq = pitch.apply(voice.frequency, linear);
            voice.filter_modifier = NEUTRAL_MODIFIER;
            let mut filter_env = false;
            if let Some(inst) = inst {
                if let (Some(env), true) = (inst.pitch_envelope.as_ref(), voice.flags.contains(VoiceFlags::PITCH_ENV)) {
                    let key_off = voice.flags.contains(VoiceFlags::KEY_OFF);
                    let e = voice.pitch_env.step(env, key_off, SIGNED_RANGE);
                    if inst.pitch_is_filter {
                        voice.filter_modifier = NEUTRAL_MODIFIER + e * 8;
                        filter_env = true;
                    } else {
                        freq = slide_frequency(freq, e * PITCH_ENV_UNITS, true);
                    }
                }
            }

            let mut increment = frequency_to_increment(freq, mix_frequency);
            if voice.flags.contains(VoiceFlags::BACKWARD) {
                increment = -increment;
            }
            voice.mix.increment = increment;
            if voice.flags.contains(VoiceFlags::LOOP)
                && (increment.unsigned_abs() >> 16) + 1 >= voice.loop_end - voice.loop_start
            {
                voice.flags.remove(VoiceFlags::LOOP | VoiceFlags::PING_PONG | VoiceFlags::BACKWARD);
                voice.mix.increment = increment.abs();
            }

            // Filter
            if filter_env || filter_enabled(voice.cutoff, voice.resonance) {
                if !voice.flags.contains(VoiceFlags::FILTER) {
                    voice.mix.filter.reset_history();
                    voice.flags.insert(VoiceFlags::FILTER);
                }
                voice
                    .mix
                    .filter
                    .set_coefficients(voice.cutoff, voice.resonance, voice.filter_modifier, mix_frequency);
            } else {
                voice.flags.remove(VoiceFlags::FILTER);
            }

            // Volume ramp
            let realvol = voice.final_volume * mixing_volume >> 9;
            let mut p = 128 + (pan - 128) * separation / 128;
            if reverse {
                p = 256 - p;
            }
            let (mut left, mut right) = (realvol * (256 - p) >> 8, realvol * p >> 8);
            if surround && voice.flags.contains(VoiceFlags::SURROUND) {
                right = -right;
            }
            if voice.flags.contains(VoiceFlags::MUTE) {
                (left, right) = (0, 0);
            }
            voice.left_target = left;
            voice.right_target = right;
            voice.start_ramp(ramp_samples, ramping);
            if !voice.mix.is_ramping()
                && voice.flags.contains(VoiceFlags::NOTE_FADE)
                && voice.fadeout_volume == 0
            {
                voice.stop_sample();
            }

            if pan_changed {
                if let (Some(midi_channel), Some(hooks)) =
                    (inst.and_then(|i| i.midi_channel), self.hooks.as_mut())
                {
                    hooks.pan(midi_channel, (pan / 2).min(127) as u8);
                }
            }
            voice.flags.remove(VoiceFlags::NEW_NOTE);
        }
    }
}

/// Envelope, filter and new-note settings carried by an instrument.
fn apply_instrument(voice: &mut Voice, inst: &Instrument) {
    let enabled = |env: &Option<tm_ir::Envelope>| env.as_ref().is_some_and(|e| e.enabled && !e.points.is_empty());
    voice.flags.set(VoiceFlags::VOL_ENV, enabled(&inst.volume_envelope));
    voice.flags.set(VoiceFlags::PAN_ENV, enabled(&inst.panning_envelope));
    voice.flags.set(VoiceFlags::PITCH_ENV, enabled(&inst.pitch_envelope));
    if let Some(cutoff) = inst.filter_cutoff {
        voice.cutoff = cutoff.min(127);
    }
    if let Some(resonance) = inst.filter_resonance {
        voice.resonance = resonance.min(127);
    }
    voice.nna = inst.new_note_action;
}

/// Pitch modulation gathered for one voice on one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct PitchModulation {
    /// Semitones
    pub arpeggio: i16,
    /// Linear slide units, always linear
    pub auto_vibrato: i32,
    /// Slide units in the song's slide mode
    pub vibrato: i32,
    /// Snap to semitones relative to this C-5 speed
    pub glissando: Option<u32>,
}

impl PitchModulation {
    /// Arpeggio, auto-vibrato, note vibrato, then glissando.
    pub fn apply(self, frequency: u32, linear: bool) -> u32 {
        let mut freq = frequency;
        if self.arpeggio != 0 {
            freq = shift_frequency(freq, self.arpeggio);
        }
        freq = slide_frequency(freq, self.auto_vibrato, true);
        freq = slide_frequency(freq, self.vibrato, linear);
        if let Some(c5_speed) = self.glissando {
            freq = quantize_to_semitone(freq, c5_speed);
        }
        freq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const C5: u32 = 8363;

    #[test]
    fn glissando_snaps_after_vibrato() {
        let small = PitchModulation { vibrato: 20, glissando: Some(C5), ..PitchModulation::default() };
        assert_eq!(small.apply(C5, true), C5);
        assert_eq!(frequency_to_increment(small.apply(C5, true), C5), 0x1_0000);

        // 40 units is most of a semitone (64), so it rounds up
        let large = PitchModulation { vibrato: 40, ..small };
        assert_eq!(large.apply(C5, true), 8860);
    }

    #[test]
    fn vibrato_without_glissando_is_unquantized() {
        let pitch = PitchModulation { vibrato: 20, ..PitchModulation::default() };
        assert_eq!(pitch.apply(C5, true), 8515);
    }

    #[test]
    fn auto_vibrato_precedes_amiga_vibrato() {
        let pitch = PitchModulation { auto_vibrato: 64, vibrato: 100, ..PitchModulation::default() };
        let auto_first = slide_frequency(slide_frequency(C5, 64, true), 100, false);
        let note_first = slide_frequency(slide_frequency(C5, 100, false), 64, true);
        assert_ne!(auto_first, note_first);
        assert_eq!(pitch.apply(C5, false), auto_first);
    }

    #[test]
    fn arpeggio_shifts_before_snapping() {
        let pitch = PitchModulation { arpeggio: 12, vibrato: 10, glissando: Some(C5), ..PitchModulation::default() };
        assert_eq!(pitch.apply(C5, true), 2 * C5);
    }
}
