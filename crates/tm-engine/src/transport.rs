//! Transport control: start, stop, seek and reconfigure.

use tm_ir::OrderEntry;
use tracing::{debug, info};

use crate::channel::ChannelState;
use crate::config::{ConfigError, MixerConfig};
use crate::engine::Engine;
use crate::scheduler::PlayState;
use crate::tables::MixTables;
use crate::voice::VoiceFlags;
use crate::voice_pool::MAX_CHANNELS;

/// What the transport is doing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportState {
    #[default]
    Stopped,
    /// Following the order list
    Playing,
    /// Repeating one pattern
    PatternLoop,
    /// Playing one row of a pattern, then holding
    SingleStep,
}

/// Rejected transport requests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("order {0} does not name a playable pattern")]
    Order(usize),
    #[error("pattern {0} does not exist")]
    Pattern(u8),
    #[error("row {row} is past the end of pattern {pattern}")]
    Row { pattern: u8, row: u16 },
    #[error("channel {0} does not exist")]
    Channel(usize),
}

/// Snapshot of playback for displays, taken after each render.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackStatus {
    pub state: TransportState,
    pub paused: bool,
    pub finished: bool,
    pub order: usize,
    pub pattern: u8,
    pub row: u16,
    pub speed: u8,
    pub tempo: u8,
    /// Voices mixed in the last pass
    pub voices: usize,
    pub vu_left: u8,
    pub vu_right: u8,
}

impl Engine {
    /// Play the song from the top.
    pub fn start(&mut self) {
        self.reset();
        self.play.transport = TransportState::Playing;
        info!(title = self.song.title.as_str(), "playback started");
    }

    /// Play the song from `order`, `row`.
    pub fn start_at_order(&mut self, order: usize, row: u16) -> Result<(), TransportError> {
        let pattern = self.check_order(order)?;
        self.check_row(pattern, row)?;
        self.reset();
        self.play.order = order;
        self.play.row = row;
        self.play.transport = TransportState::Playing;
        info!(order, row, "playback started");
        Ok(())
    }

    /// Play from the first order naming `pattern`, or loop it when no order does.
    pub fn start_at_pattern(&mut self, pattern: u8, row: u16) -> Result<(), TransportError> {
        let order = self
            .song
            .order
            .iter()
            .position(|entry| *entry == OrderEntry::Pattern(pattern));
        match order {
            Some(order) => self.start_at_order(order, row),
            None => self.loop_pattern(pattern, row),
        }
    }

    /// Repeat `pattern` from `row` until stopped.
    pub fn loop_pattern(&mut self, pattern: u8, row: u16) -> Result<(), TransportError> {
        self.check_row(pattern, row)?;
        self.reset();
        self.play.pattern = pattern;
        self.play.row = row;
        self.play.transport = TransportState::PatternLoop;
        info!(pattern, row, "pattern loop started");
        Ok(())
    }

    /// Dispatch one row of `pattern`, then hold with ticks running.
    ///
    /// Voices already sounding keep playing unless the engine was stopped.
    pub fn single_step(&mut self, pattern: u8, row: u16) -> Result<(), TransportError> {
        self.check_row(pattern, row)?;
        if self.play.transport == TransportState::Stopped || self.play.finished {
            self.reset();
        }
        self.rewind_to(row);
        self.play.pattern = pattern;
        self.play.paused = false;
        self.play.transport = TransportState::SingleStep;
        debug!(pattern, row, "single step");
        Ok(())
    }

    /// Hold the current row. Voices keep sounding.
    pub fn pause(&mut self) {
        if self.play.transport != TransportState::Stopped {
            self.play.paused = true;
        }
    }

    pub fn resume(&mut self) {
        self.play.paused = false;
    }

    /// Jump to `order`, `row` without touching the voices.
    pub fn seek(&mut self, order: usize, row: u16) -> Result<(), TransportError> {
        let pattern = self.check_order(order)?;
        self.check_row(pattern, row)?;
        self.rewind_to(row);
        self.play.order = order;
        self.play.pattern = pattern;
        self.play.finished = false;
        debug!(order, row, "seek");
        Ok(())
    }

    /// Stop playback and return to a fresh state.
    pub fn stop(&mut self) {
        self.reset();
        info!("playback stopped");
    }

    /// End playback on reaching `order`, `row`.
    pub fn set_stop_at(&mut self, position: Option<(usize, u16)>) {
        self.play.stop_at = position;
    }

    pub fn set_channel_mute(&mut self, channel: usize, muted: bool) -> Result<(), TransportError> {
        let chan = self.channels.get_mut(channel).ok_or(TransportError::Channel(channel))?;
        chan.muted = muted;
        Ok(())
    }

    /// Apply a new mixer configuration. Playback continues.
    pub fn reinit(&mut self, config: MixerConfig) -> Result<(), ConfigError> {
        let config = config.validate()?;
        if config.fir_window != self.ctx.tables.window() {
            self.ctx.tables = MixTables::new(config.fir_window);
        }
        self.ctx.ramp_samples = config.ramp_samples();
        self.eq.configure(&config.equalizer, config.sample_rate);

        let rate = config.sample_rate;
        for voice in self.voices.as_mut_slice() {
            if voice.flags.contains(VoiceFlags::FILTER) {
                let (cutoff, resonance, modifier) = (voice.cutoff, voice.resonance, voice.filter_modifier);
                voice.mix.filter.set_coefficients(cutoff, resonance, modifier, rate);
            }
        }
        self.ctx.config = config;
        self.update_tick_length();
        if let Some(hooks) = self.hooks.as_mut() {
            hooks.reinit(rate);
        }
        info!(sample_rate = rate, interpolation = self.ctx.config.interpolation.name(), "mixer reconfigured");
        Ok(())
    }

    pub fn status(&self) -> PlaybackStatus {
        PlaybackStatus {
            state: self.play.transport,
            paused: self.play.paused,
            finished: self.play.finished,
            order: self.play.order,
            pattern: self.play.pattern,
            row: self.play.row,
            speed: self.play.speed,
            tempo: self.play.tempo,
            voices: self.mixed_voices,
            vu_left: self.vu[0],
            vu_right: self.vu[1],
        }
    }

    pub fn is_playing(&self) -> bool {
        self.play.transport != TransportState::Stopped && !self.play.finished
    }

    /// Silence everything and rebuild the play state from the song.
    fn reset(&mut self) {
        for ch in 0..MAX_CHANNELS {
            self.midi_note_off(ch);
        }
        if let Some(hooks) = self.hooks.as_mut() {
            hooks.all_notes_off();
        }
        self.mix_buffer.fill(0);
        self.dc = [0; 2];
        self.vu = [0; 2];
        self.mixed_voices = 0;
        self.voices.reset_all();
        for (chan, settings) in self.channels.iter_mut().zip(&self.song.channels) {
            *chan = ChannelState::new(settings);
        }
        self.eq.configure(&self.ctx.config.equalizer, self.ctx.config.sample_rate);

        let stop_at = self.play.stop_at;
        self.play = PlayState::new(self.song.initial_speed, self.song.initial_tempo, self.song.global_volume);
        self.play.stop_at = stop_at;
        self.update_tick_length();
    }

    /// Make the next tick read `row` as a fresh row.
    fn rewind_to(&mut self, row: u16) {
        let p = &mut self.play;
        p.row = row;
        p.started = false;
        p.tick_count = 1;
        p.row_count = 1;
        p.tick_samples_left = 0;
        p.break_row = None;
        p.jump_order = None;
        p.loop_row = None;
        p.pattern_delay = None;
    }

    fn check_order(&self, order: usize) -> Result<u8, TransportError> {
        match self.song.pattern_at(order) {
            Some(pattern) if (pattern as usize) < self.song.patterns.len() => Ok(pattern),
            _ => Err(TransportError::Order(order)),
        }
    }

    fn check_row(&self, pattern: u8, row: u16) -> Result<(), TransportError> {
        if pattern as usize >= self.song.patterns.len() {
            return Err(TransportError::Pattern(pattern));
        }
        if row >= self.pattern_rows(pattern) {
            return Err(TransportError::Row { pattern, row });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_ir::{Pattern, Song};

    fn engine() -> Engine {
        let mut song = Song::with_channels("t", 2);
        song.patterns = vec![Pattern::new(4, 2), Pattern::new(8, 2)];
        song.order = vec![OrderEntry::Pattern(1), OrderEntry::Skip, OrderEntry::Pattern(0)];
        Engine::new(song, MixerConfig::default()).unwrap()
    }

    #[test]
    fn start_sets_playing() {
        let mut e = engine();
        e.start();
        assert_eq!(e.status().state, TransportState::Playing);
        e.stop();
        assert_eq!(e.status().state, TransportState::Stopped);
    }

    #[test]
    fn start_at_order_validates() {
        let mut e = engine();
        assert_eq!(e.start_at_order(1, 0), Err(TransportError::Order(1)));
        assert_eq!(e.start_at_order(9, 0), Err(TransportError::Order(9)));
        assert_eq!(e.start_at_order(2, 4), Err(TransportError::Row { pattern: 0, row: 4 }));
        assert_eq!(e.start_at_order(2, 3), Ok(()));
        assert_eq!((e.play.order, e.play.row), (2, 3));
    }

    #[test]
    fn start_at_pattern_finds_order_or_loops() {
        let mut e = engine();
        e.start_at_pattern(0, 1).unwrap();
        assert_eq!((e.play.order, e.play.transport), (2, TransportState::Playing));

        let mut song = e.song().clone();
        song.order = vec![OrderEntry::Pattern(1)];
        let mut e = Engine::new(song, MixerConfig::default()).unwrap();
        e.start_at_pattern(0, 1).unwrap();
        assert_eq!((e.play.pattern, e.play.transport), (0, TransportState::PatternLoop));
        assert_eq!(e.start_at_pattern(5, 0), Err(TransportError::Pattern(5)));
    }

    #[test]
    fn pause_needs_a_running_transport() {
        let mut e = engine();
        e.pause();
        assert!(!e.status().paused);
        e.start();
        e.pause();
        assert!(e.status().paused);
        e.resume();
        assert!(!e.status().paused);
    }

    #[test]
    fn stop_keeps_the_stop_position() {
        let mut e = engine();
        e.set_stop_at(Some((2, 0)));
        e.start();
        e.stop();
        assert_eq!(e.play.stop_at, Some((2, 0)));
    }

    #[test]
    fn channel_mute_is_bounds_checked() {
        let mut e = engine();
        assert_eq!(e.set_channel_mute(1, true), Ok(()));
        assert!(e.channels()[1].muted);
        assert_eq!(e.set_channel_mute(2, true), Err(TransportError::Channel(2)));
    }

    #[test]
    fn reinit_is_idempotent() {
        let mut e = engine();
        let cfg = MixerConfig { sample_rate: 44100, ..MixerConfig::default() };
        e.reinit(cfg.clone()).unwrap();
        let first = (e.ctx.ramp_samples, e.play.samples_per_tick, e.ctx.tables.fir.clone());
        e.reinit(cfg).unwrap();
        assert_eq!(first, (e.ctx.ramp_samples, e.play.samples_per_tick, e.ctx.tables.fir.clone()));
        assert_eq!(e.play.samples_per_tick, 882);
    }

    #[test]
    fn reinit_rejects_bad_config() {
        let mut e = engine();
        let cfg = MixerConfig { sample_rate: 100, ..MixerConfig::default() };
        assert_eq!(e.reinit(cfg), Err(ConfigError::SampleRate(100)));
        assert_eq!(e.config().sample_rate, 48000);
    }
}
