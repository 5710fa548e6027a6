//! Effect column and volume column handling.
//!
//! Row handlers run once when a row is read: they update effect memory and
//! perform one-shot changes. Tick handlers run on the following ticks of the
//! row and drive slides and oscillators. Both also run on the first tick
//! for the parts of continuous effects (fine slides, oscillator output)
//! that IT applies there.

use tm_ir::{Effect, NewNoteAction, SongFlags, VolumeCommand, Waveform};

use crate::engine::Engine;
use crate::frequency::slide_frequency;
use crate::lfo::wave_value;
use crate::processor::VoiceAction;
use crate::voice::VoiceFlags;
use crate::voice_pool::MAX_CHANNELS;

/// Tone portamento speeds addressed by the volume column.
const VOLUME_PORTA_SPEEDS: [u8; 10] = [0, 1, 4, 8, 16, 32, 64, 96, 128, 255];

/// Lowest and highest tempo reachable by a tempo slide.
const TEMPO_RANGE: (u8, u8) = (32, 255);

/// A decoded `xy` slide parameter (D, N, P, W).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Slide {
    None,
    /// `x0`: up by x on every tick but the first
    Up(i32),
    /// `0y`: down by y on every tick but the first
    Down(i32),
    /// `xF`: up by x on the first tick
    FineUp(i32),
    /// `Fy`: down by y on the first tick
    FineDown(i32),
}

impl Slide {
    pub(crate) fn decode(param: u8) -> Self {
        let (x, y) = ((param >> 4) as i32, (param & 0x0F) as i32);
        match (x, y) {
            (0, 0) => Slide::None,
            (0, y) => Slide::Down(y),
            (x, 0) => Slide::Up(x),
            (x, 0xF) => Slide::FineUp(x),
            (0xF, y) => Slide::FineDown(y),
            _ => Slide::None,
        }
    }

    /// Change applied on this tick.
    pub(crate) fn amount(self, first_tick: bool) -> i32 {
        match (self, first_tick) {
            (Slide::Up(x), false) => x,
            (Slide::Down(y), false) => -y,
            (Slide::FineUp(x), true) => x,
            (Slide::FineDown(y), true) => -y,
            _ => 0,
        }
    }
}

/// Slide units for an E/F parameter on this tick; positive is the slide direction.
pub(crate) fn porta_units(param: u8, first_tick: bool) -> i32 {
    match (param, first_tick) {
        (0xF0..=0xFF, true) => (param & 0x0F) as i32 * 4,
        (0xE0..=0xEF, true) => (param & 0x0F) as i32,
        (0x00..=0xDF, false) => param as i32 * 4,
        _ => 0,
    }
}

/// New volume after a Qxy retrigger with volume selector `x`.
pub(crate) fn retrigger_volume(volume: i32, x: u8) -> i32 {
    let v = match x {
        1..=5 => volume - (1 << (x - 1)),
        6 => volume * 2 / 3,
        7 => volume / 2,
        9..=0xD => volume + (1 << (x - 9)),
        0xE => volume * 3 / 2,
        0xF => volume * 2,
        _ => volume,
    };
    v.clamp(0, 64)
}

/// Use `param` unless it is zero, then fall back to (and update) `memory`.
fn remember(memory: &mut u8, param: u8) -> u8 {
    if param != 0 {
        *memory = param;
    }
    *memory
}

impl Engine {
    /// Apply the effect column when the row is read.
    pub(crate) fn row_effect(&mut self, ch: usize, effect: Effect) {
        let flags = self.song.flags;
        let Some(chan) = self.channels.get_mut(ch) else {
            return;
        };
        let voice = &mut self.voices.as_mut_slice()[ch];
        let play = &mut self.play;

        match effect {
            Effect::None => {}
            Effect::SetSpeed(speed) => {
                if speed > 0 {
                    play.speed = speed;
                }
            }
            Effect::PositionJump(order) => {
                play.jump_order = Some(order as usize);
            }
            Effect::PatternBreak(row) => {
                play.break_row = Some(row as u16);
            }
            Effect::SetTempo(param) => {
                if param >= 0x20 {
                    play.tempo = param;
                } else {
                    remember(&mut chan.tempo_slide, param);
                }
            }
            Effect::VolumeSlide(param) => {
                let p = remember(&mut chan.volume_slide, param);
                voice.volume = (voice.volume + Slide::decode(p).amount(true)).clamp(0, 64);
            }
            Effect::SetChannelVolume(v) => {
                if v <= 64 {
                    chan.channel_volume = v as i32;
                }
            }
            Effect::ChannelVolumeSlide(param) => {
                let p = remember(&mut chan.channel_volume_slide, param);
                chan.channel_volume = (chan.channel_volume + Slide::decode(p).amount(true)).clamp(0, 64);
            }
            Effect::SetGlobalVolume(v) => {
                if v <= 128 {
                    play.global_volume = v as i32;
                }
            }
            Effect::GlobalVolumeSlide(param) => {
                let p = remember(&mut chan.global_volume_slide, param);
                play.global_volume = (play.global_volume + Slide::decode(p).amount(true)).clamp(0, 128);
            }
            Effect::Tremolo { speed, depth } => {
                remember(&mut chan.tremolo_speed, speed);
                remember(&mut chan.tremolo_depth, depth);
            }
            Effect::Tremor { on, off } => {
                if on != 0 || off != 0 {
                    chan.tremor = (on, off);
                }
            }
            Effect::PortaDown(param) | Effect::PortaUp(param) => {
                let p = remember(&mut chan.porta, param);
                let units = porta_units(p, true);
                let units = if matches!(effect, Effect::PortaDown(_)) { -units } else { units };
                voice.frequency = slide_frequency(voice.frequency, units, flags.contains(SongFlags::LINEAR_SLIDES));
            }
            Effect::TonePorta(param) => {
                remember(&mut chan.tone_porta, param);
            }
            Effect::Vibrato { speed, depth } | Effect::FineVibrato { speed, depth } => {
                remember(&mut chan.vibrato_speed, speed);
                remember(&mut chan.vibrato_depth, depth);
            }
            Effect::Arpeggio { x, y } => {
                if x != 0 || y != 0 {
                    chan.arpeggio = (x, y);
                }
            }
            Effect::VibratoVolSlide(param) | Effect::TonePortaVolSlide(param) => {
                let p = remember(&mut chan.volume_slide, param);
                voice.volume = (voice.volume + Slide::decode(p).amount(true)).clamp(0, 64);
            }
            Effect::SampleOffset(param) => {
                remember(&mut chan.offset, param);
            }
            Effect::Retrigger(param) => {
                remember(&mut chan.retrigger, param);
            }
            Effect::PanningSlide(param) => {
                let p = remember(&mut chan.pan_slide, param);
                chan.panning = (chan.panning - Slide::decode(p).amount(true) * 4).clamp(0, 256);
            }
            Effect::SetPan(pan) => {
                chan.panning = pan as i32 * 256 / 255;
                chan.surround = false;
            }
            Effect::Panbrello { speed, depth } => {
                remember(&mut chan.panbrello_speed, speed);
                remember(&mut chan.panbrello_depth, depth);
            }
            Effect::Glissando(on) => chan.glissando = on,
            Effect::SetVibratoWaveform(w) => chan.vibrato_waveform = Waveform::from_param(w),
            Effect::SetTremoloWaveform(w) => chan.tremolo_waveform = Waveform::from_param(w),
            Effect::SetPanbrelloWaveform(w) => chan.panbrello_waveform = Waveform::from_param(w),
            Effect::FinePatternDelay(ticks) => {
                play.frame_delay = play.frame_delay.saturating_add(ticks);
            }
            Effect::InstrumentControl(x) => self.instrument_control(ch, x),
            Effect::SetPanPosition(x) => {
                chan.panning = ((x.min(15) as i32) * 256 + 7) / 15;
                chan.surround = false;
            }
            Effect::Surround(on) => chan.surround = on,
            Effect::HighOffset(x) => chan.high_offset = x & 0x0F,
            Effect::PatternLoop(count) => {
                if count == 0 {
                    chan.pattern_loop_row = play.row;
                } else if chan.pattern_loop_count == 0 {
                    chan.pattern_loop_count = count;
                    play.loop_row = Some(chan.pattern_loop_row);
                } else {
                    chan.pattern_loop_count -= 1;
                    if chan.pattern_loop_count > 0 {
                        play.loop_row = Some(chan.pattern_loop_row);
                    } else {
                        chan.pattern_loop_row = play.row.saturating_add(1);
                    }
                }
            }
            Effect::NoteCut(tick) => chan.note_cut = Some(tick.max(1)),
            // Held back before the row is dispatched
            Effect::NoteDelay(_) => {}
            Effect::PatternDelay(rows) => {
                if play.pattern_delay.is_none() {
                    play.pattern_delay = Some(rows);
                }
            }
            Effect::MidiMacro(param) => {
                match param {
                    0x00..=0x7F => voice.cutoff = param,
                    0x80..=0x8F => voice.resonance = (param & 0x0F) * 8,
                    _ => {}
                }
                if let Some(hooks) = self.hooks.as_mut() {
                    hooks.macro_sent(ch as u8, param);
                }
            }
        }
    }

    /// Apply the effect column on a tick after the first.
    pub(crate) fn tick_effect(&mut self, ch: usize, effect: Effect, tick: u32) {
        let linear = self.song.flags.contains(SongFlags::LINEAR_SLIDES);
        let Some(chan) = self.channels.get_mut(ch) else {
            return;
        };
        let voice = &mut self.voices.as_mut_slice()[ch];
        let play = &mut self.play;

        match effect {
            Effect::SetTempo(param) if param < 0x20 => {
                let p = chan.tempo_slide;
                let delta = (p & 0x0F) as i32;
                let tempo = if p & 0xF0 == 0x10 { play.tempo as i32 + delta } else { play.tempo as i32 - delta };
                play.tempo = tempo.clamp(TEMPO_RANGE.0 as i32, TEMPO_RANGE.1 as i32) as u8;
            }
            Effect::VolumeSlide(_) => {
                voice.volume = (voice.volume + Slide::decode(chan.volume_slide).amount(false)).clamp(0, 64);
            }
            Effect::ChannelVolumeSlide(_) => {
                let d = Slide::decode(chan.channel_volume_slide).amount(false);
                chan.channel_volume = (chan.channel_volume + d).clamp(0, 64);
            }
            Effect::GlobalVolumeSlide(_) => {
                let d = Slide::decode(chan.global_volume_slide).amount(false);
                play.global_volume = (play.global_volume + d).clamp(0, 128);
            }
            Effect::PanningSlide(_) => {
                let d = Slide::decode(chan.pan_slide).amount(false);
                chan.panning = (chan.panning - d * 4).clamp(0, 256);
            }
            Effect::PortaDown(_) => {
                voice.frequency = slide_frequency(voice.frequency, -porta_units(chan.porta, false), linear);
            }
            Effect::PortaUp(_) => {
                voice.frequency = slide_frequency(voice.frequency, porta_units(chan.porta, false), linear);
            }
            Effect::TonePorta(_) => self.tone_porta(ch),
            Effect::TonePortaVolSlide(_) => {
                voice.volume = (voice.volume + Slide::decode(chan.volume_slide).amount(false)).clamp(0, 64);
                self.tone_porta(ch);
            }
            Effect::VibratoVolSlide(_) => {
                voice.volume = (voice.volume + Slide::decode(chan.volume_slide).amount(false)).clamp(0, 64);
                chan.vibrato_position = chan.vibrato_position.wrapping_add(chan.vibrato_speed.wrapping_mul(4));
            }
            Effect::Vibrato { .. } | Effect::FineVibrato { .. } => {
                chan.vibrato_position = chan.vibrato_position.wrapping_add(chan.vibrato_speed.wrapping_mul(4));
            }
            Effect::Tremolo { .. } => {
                chan.tremolo_position = chan.tremolo_position.wrapping_add(chan.tremolo_speed.wrapping_mul(4));
            }
            Effect::Panbrello { .. } => {
                chan.panbrello_position = chan.panbrello_position.wrapping_add(chan.panbrello_speed);
            }
            Effect::Retrigger(_) => {
                let interval = (chan.retrigger & 0x0F).max(1);
                chan.retrigger_count = chan.retrigger_count.saturating_add(1);
                if chan.retrigger_count >= interval {
                    chan.retrigger_count = 0;
                    voice.volume = retrigger_volume(voice.volume, chan.retrigger >> 4);
                    self.retrigger_voice(ch);
                }
            }
            Effect::NoteCut(_) => {
                if chan.note_cut.is_some_and(|t| t as u32 == tick) {
                    chan.note_cut = None;
                    voice.volume = 0;
                    voice.flags.insert(VoiceFlags::FAST_RAMP);
                }
            }
            Effect::NoteDelay(_) => {
                if chan.note_delay.is_some_and(|t| t as u32 == tick) {
                    chan.note_delay = None;
                    let cell = chan.cell;
                    self.dispatch_cell(ch, cell);
                }
            }
            _ => {}
        }
    }

    /// Apply the volume column when the row is read.
    pub(crate) fn row_volume(&mut self, ch: usize, cmd: VolumeCommand) {
        let Some(chan) = self.channels.get_mut(ch) else {
            return;
        };
        let voice = &mut self.voices.as_mut_slice()[ch];
        match cmd {
            VolumeCommand::Volume(v) => voice.volume = v.min(64) as i32,
            VolumeCommand::Panning(p) => {
                chan.panning = crate::channel::pan_64_to_256(p);
                chan.surround = false;
            }
            VolumeCommand::FineVolSlideUp(x) => {
                let x = remember(&mut chan.volume_column_slide, x) as i32;
                voice.volume = (voice.volume + x).min(64);
            }
            VolumeCommand::FineVolSlideDown(x) => {
                let x = remember(&mut chan.volume_column_slide, x) as i32;
                voice.volume = (voice.volume - x).max(0);
            }
            VolumeCommand::VolumeSlideUp(x) | VolumeCommand::VolumeSlideDown(x) => {
                remember(&mut chan.volume_column_slide, x);
            }
            VolumeCommand::PortaDown(x) | VolumeCommand::PortaUp(x) => {
                remember(&mut chan.porta, x.saturating_mul(4));
            }
            VolumeCommand::TonePorta(i) => {
                let speed = VOLUME_PORTA_SPEEDS[(i as usize).min(VOLUME_PORTA_SPEEDS.len() - 1)];
                remember(&mut chan.tone_porta, speed);
            }
            VolumeCommand::Vibrato(depth) => {
                remember(&mut chan.vibrato_depth, depth);
            }
            VolumeCommand::None => {}
        }
    }

    /// Apply the volume column on a tick after the first.
    pub(crate) fn tick_volume(&mut self, ch: usize, cmd: VolumeCommand) {
        let linear = self.song.flags.contains(SongFlags::LINEAR_SLIDES);
        let Some(chan) = self.channels.get_mut(ch) else {
            return;
        };
        let voice = &mut self.voices.as_mut_slice()[ch];
        match cmd {
            VolumeCommand::VolumeSlideUp(_) => {
                voice.volume = (voice.volume + chan.volume_column_slide as i32).min(64);
            }
            VolumeCommand::VolumeSlideDown(_) => {
                voice.volume = (voice.volume - chan.volume_column_slide as i32).max(0);
            }
            VolumeCommand::PortaDown(_) => {
                voice.frequency = slide_frequency(voice.frequency, -porta_units(chan.porta, false), linear);
            }
            VolumeCommand::PortaUp(_) => {
                voice.frequency = slide_frequency(voice.frequency, porta_units(chan.porta, false), linear);
            }
            VolumeCommand::TonePorta(_) => self.tone_porta(ch),
            VolumeCommand::Vibrato(_) => {
                chan.vibrato_position = chan.vibrato_position.wrapping_add(chan.vibrato_speed.wrapping_mul(4));
            }
            _ => {}
        }
    }

    /// Compute the channel's oscillator outputs for this tick.
    ///
    /// Runs after the row or tick handlers, on every tick of the row.
    pub(crate) fn modulation(&mut self, ch: usize, tick: u32) {
        let old_effects = self.song.flags.contains(SongFlags::OLD_EFFECTS);
        let Some(chan) = self.channels.get_mut(ch) else {
            return;
        };
        let cell = chan.cell;

        let vibrato = match (cell.effect, cell.volume) {
            (Effect::Vibrato { .. } | Effect::VibratoVolSlide(_), _) | (_, VolumeCommand::Vibrato(_)) => Some(4),
            (Effect::FineVibrato { .. }, _) => Some(1),
            _ => None,
        };
        if let Some(scale) = vibrato {
            let wave = wave_value(chan.vibrato_waveform, chan.vibrato_position, &mut chan.rng);
            let depth = chan.vibrato_depth as i32 * scale;
            chan.vibrato_delta = if old_effects { -((wave * depth) >> 5) } else { (wave * depth) >> 6 };
        }

        match cell.effect {
            Effect::Tremolo { .. } => {
                let wave = wave_value(chan.tremolo_waveform, chan.tremolo_position, &mut chan.rng);
                chan.tremolo_delta = (wave * chan.tremolo_depth as i32) >> 4;
            }
            Effect::Panbrello { .. } => {
                let wave = wave_value(chan.panbrello_waveform, chan.panbrello_position, &mut chan.rng);
                chan.panbrello_delta = (wave * chan.panbrello_depth as i32 + 2) >> 3;
            }
            Effect::Arpeggio { .. } => {
                chan.arpeggio_shift = match tick % 3 {
                    1 => chan.arpeggio.0 as i16,
                    2 => chan.arpeggio.1 as i16,
                    _ => 0,
                };
            }
            Effect::Tremor { .. } => {
                let extra = u8::from(old_effects);
                let on = chan.tremor.0.max(1) + extra;
                let off = chan.tremor.1.max(1) + extra;
                chan.tremor_mute = chan.tremor_count >= on;
                chan.tremor_count += 1;
                if chan.tremor_count >= on + off {
                    chan.tremor_count = 0;
                }
            }
            _ => {}
        }
    }

    /// Slide the foreground voice toward its portamento target.
    fn tone_porta(&mut self, ch: usize) {
        let linear = self.song.flags.contains(SongFlags::LINEAR_SLIDES);
        let Some(chan) = self.channels.get_mut(ch) else {
            return;
        };
        let voice = &mut self.voices.as_mut_slice()[ch];
        let units = chan.tone_porta as i32 * 4;
        let target = voice.porta_target;
        chan.porta_active = true;
        if target == 0 || units == 0 {
            return;
        }
        voice.frequency = if voice.frequency < target {
            slide_frequency(voice.frequency, units, linear).min(target)
        } else if voice.frequency > target {
            slide_frequency(voice.frequency, -units, linear).max(target)
        } else {
            target
        };
    }

    /// S7x: past-note actions, NNA override and envelope switches.
    fn instrument_control(&mut self, ch: usize, x: u8) {
        let voice = &mut self.voices.as_mut_slice()[ch];
        match x {
            0 => self.past_notes(ch, VoiceAction::Cut),
            1 => self.past_notes(ch, VoiceAction::Off),
            2 => self.past_notes(ch, VoiceAction::Fade),
            3 => voice.nna = NewNoteAction::Cut,
            4 => voice.nna = NewNoteAction::Continue,
            5 => voice.nna = NewNoteAction::Off,
            6 => voice.nna = NewNoteAction::Fade,
            7 => voice.flags.remove(VoiceFlags::VOL_ENV),
            8 => voice.flags.insert(VoiceFlags::VOL_ENV),
            9 => voice.flags.remove(VoiceFlags::PAN_ENV),
            0xA => voice.flags.insert(VoiceFlags::PAN_ENV),
            0xB => voice.flags.remove(VoiceFlags::PITCH_ENV),
            0xC => voice.flags.insert(VoiceFlags::PITCH_ENV),
            _ => {}
        }
    }

    /// Apply `action` to every background voice that came from `ch`.
    pub(crate) fn past_notes(&mut self, ch: usize, action: VoiceAction) {
        let song = &self.song;
        for voice in self.voices.as_mut_slice()[MAX_CHANNELS..]
            .iter_mut()
            .filter(|v| v.parent == Some(ch as u8) && v.is_active())
        {
            let sample = song.sample(voice.sample);
            action.apply(voice, sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slide_decoding() {
        assert_eq!(Slide::decode(0x00), Slide::None);
        assert_eq!(Slide::decode(0x04), Slide::Down(4));
        assert_eq!(Slide::decode(0x30), Slide::Up(3));
        assert_eq!(Slide::decode(0x2F), Slide::FineUp(2));
        assert_eq!(Slide::decode(0xF5), Slide::FineDown(5));
        assert_eq!(Slide::decode(0xFF), Slide::FineUp(15));
        assert_eq!(Slide::decode(0x23), Slide::None);
    }

    #[test]
    fn fine_slides_only_on_first_tick() {
        assert_eq!(Slide::FineUp(2).amount(true), 2);
        assert_eq!(Slide::FineUp(2).amount(false), 0);
        assert_eq!(Slide::Down(3).amount(true), 0);
        assert_eq!(Slide::Down(3).amount(false), -3);
    }

    #[test]
    fn porta_units_by_range() {
        assert_eq!(porta_units(0x10, false), 64);
        assert_eq!(porta_units(0x10, true), 0);
        assert_eq!(porta_units(0xF3, true), 12);
        assert_eq!(porta_units(0xE3, true), 3);
        assert_eq!(porta_units(0xE3, false), 0);
    }

    #[test]
    fn retrigger_volume_table() {
        assert_eq!(retrigger_volume(32, 0), 32);
        assert_eq!(retrigger_volume(32, 3), 28);
        assert_eq!(retrigger_volume(30, 6), 20);
        assert_eq!(retrigger_volume(32, 7), 16);
        assert_eq!(retrigger_volume(60, 0xD), 64);
        assert_eq!(retrigger_volume(2, 5), 0);
        assert_eq!(retrigger_volume(20, 0xE), 30);
    }
}
