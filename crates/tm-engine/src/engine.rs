//! The playback engine: song, play state, voices and mixer state in one place.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use tm_ir::Song;
use tracing::debug;

use crate::channel::ChannelState;
use crate::config::{ConfigError, MixerConfig, MAX_VOICES};
use crate::eq::Equalizer;
use crate::hooks::PlaybackHooks;
use crate::mixer::MIX_BUFFER_FRAMES;
use crate::scheduler::PlayState;
use crate::tables::MixTables;
use crate::voice::Voice;
use crate::voice_pool::{VoicePool, MAX_CHANNELS};

/// Mixer-wide values the kernels and the voice pass read.
#[derive(Clone, Debug)]
pub struct MixerContext {
    pub config: MixerConfig,
    /// Default volume ramp length in frames
    pub ramp_samples: i32,
    pub tables: MixTables,
}

impl MixerContext {
    pub fn new(config: MixerConfig) -> Self {
        Self {
            ramp_samples: config.ramp_samples(),
            tables: MixTables::new(config.fir_window),
            config,
        }
    }
}

/// The main playback engine.
///
/// Owns the song for the duration of playback. Nothing on the render
/// path allocates; every buffer is sized here.
pub struct Engine {
    pub(crate) song: Song,
    pub(crate) ctx: MixerContext,
    pub(crate) play: PlayState,
    pub(crate) voices: VoicePool,
    pub(crate) channels: Vec<ChannelState>,
    /// Interleaved stereo accumulator
    pub(crate) mix_buffer: Vec<i32>,
    /// Voices picked for the current pass
    pub(crate) mix_list: heapless::Vec<u16, MAX_VOICES>,
    /// Global DC level left by stopped voices
    pub(crate) dc: [i32; 2],
    pub(crate) eq: Equalizer,
    /// Output meters (0-128), left and right
    pub(crate) vu: [u8; 2],
    /// Voices mixed in the last pass
    pub(crate) mixed_voices: usize,
    pub(crate) hooks: Option<Box<dyn PlaybackHooks>>,
    /// MIDI channel and note sounding on each song channel
    pub(crate) midi_notes: [Option<(u8, u8)>; MAX_CHANNELS],
}

impl Engine {
    /// Create an engine for `song`. The engine starts stopped.
    pub fn new(mut song: Song, config: MixerConfig) -> Result<Self, ConfigError> {
        let config = config.validate()?;
        song.prepare_samples();
        if song.channels.len() > MAX_CHANNELS {
            debug!(channels = song.channels.len(), "song has more channels than the engine plays");
        }

        let channels = song.channels.iter().take(MAX_CHANNELS).map(ChannelState::new).collect::<Vec<_>>();
        let play = PlayState::new(song.initial_speed, song.initial_tempo, song.global_volume);
        let mut engine = Self {
            voices: VoicePool::new(channels.len()),
            channels,
            play,
            eq: Equalizer::new(&config.equalizer, config.sample_rate),
            ctx: MixerContext::new(config),
            mix_buffer: vec![0; MIX_BUFFER_FRAMES * 2],
            mix_list: heapless::Vec::new(),
            dc: [0; 2],
            vu: [0; 2],
            mixed_voices: 0,
            hooks: None,
            midi_notes: [None; MAX_CHANNELS],
            song,
        };
        engine.update_tick_length();
        Ok(engine)
    }

    /// Install hooks for MIDI and macro notifications.
    pub fn set_hooks(&mut self, hooks: Box<dyn PlaybackHooks>) {
        self.hooks = Some(hooks);
    }

    pub fn song(&self) -> &Song {
        &self.song
    }

    pub fn config(&self) -> &MixerConfig {
        &self.ctx.config
    }

    pub fn play_state(&self) -> &PlayState {
        &self.play
    }

    pub fn channels(&self) -> &[ChannelState] {
        &self.channels
    }

    pub fn voice(&self, id: usize) -> Option<&Voice> {
        self.voices.get(id)
    }

    /// Voices still playing a sample.
    pub fn active_voices(&self) -> usize {
        self.voices.active_count()
    }

    /// Output meters, left and right (0-128).
    pub fn vu(&self) -> (u8, u8) {
        (self.vu[0], self.vu[1])
    }

    /// Bytes in one output frame.
    pub fn frame_bytes(&self) -> usize {
        self.ctx.config.frame_bytes()
    }
}
