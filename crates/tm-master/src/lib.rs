//! Headless player for trakmix.
//!
//! Owns the engine behind a lock shared with the audio callback, and
//! provides offline rendering to WAV for the CLI and the tests.

mod config;
mod demo;
mod wav;

use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Split};
use ringbuf::{HeapCons, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tm_audio::{AudioError, AudioOutput, CpalOutput};
use tm_engine::{ConfigError, Engine, TransportError};
use tracing::{debug, info, warn};

// Re-export common types so callers don't need tm-ir/tm-engine directly.
pub use config::{PlayerConfig, RenderConfig};
pub use demo::{chip, demo, sweep, DEMO_NAMES};
pub use tm_engine::{MixerConfig, PlaybackStatus, TransportState};
pub use tm_ir::Song;
pub use wav::{pcm_to_wav, write_wav, WavSpec};

/// Frames rendered per offline pass.
const RENDER_CHUNK_FRAMES: usize = 4096;

/// Status snapshots buffered between polls.
const STATUS_QUEUE: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("audio output: {0}")]
    Audio(#[from] AudioError),
    #[error("config file: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("config write: {0}")]
    ConfigWrite(#[from] toml::ser::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Headless player: owns a song inside an engine and manages playback.
pub struct Player {
    engine: Arc<Mutex<Engine>>,
    output: Option<CpalOutput>,
    finished: Option<Arc<AtomicBool>>,
    status: Option<HeapCons<PlaybackStatus>>,
    last_status: PlaybackStatus,
}

impl Player {
    pub fn new(song: Song, config: MixerConfig) -> Result<Self, PlayerError> {
        let engine = Engine::new(song, config)?;
        let last_status = engine.status();
        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
            output: None,
            finished: None,
            status: None,
            last_status,
        })
    }

    /// Shared handle to the engine, for transport calls.
    pub fn engine(&self) -> Arc<Mutex<Engine>> {
        self.engine.clone()
    }

    // --- Real-time playback ---

    /// Play on the default output device from `order`.
    ///
    /// The engine is reconfigured to the device rate first.
    pub fn play(&mut self, order: usize) -> Result<(), PlayerError> {
        self.stop()?;

        let mut output = CpalOutput::new()?;
        {
            let mut engine = self.engine.lock();
            let mut config = engine.config().clone();
            if config.sample_rate != output.sample_rate() {
                debug!(from = config.sample_rate, to = output.sample_rate(), "matching device rate");
                config.sample_rate = output.sample_rate();
            }
            engine.reinit(config)?;
            engine.start_at_order(order, 0)?;
        }

        let (producer, consumer) = HeapRb::<PlaybackStatus>::new(STATUS_QUEUE).split();
        output.build_stream(self.engine.clone(), producer)?;
        output.start()?;
        info!(rate = output.sample_rate(), "real-time playback started");

        self.finished = Some(output.finished_flag());
        self.output = Some(output);
        self.status = Some(consumer);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), PlayerError> {
        if let Some(mut output) = self.output.take() {
            if let Err(err) = output.stop() {
                warn!(%err, "failed to pause output stream");
            }
        }
        self.engine.lock().stop();
        self.finished = None;
        self.status = None;
        Ok(())
    }

    pub fn pause(&self) {
        self.engine.lock().pause();
    }

    pub fn resume(&self) {
        self.engine.lock().resume();
    }

    pub fn is_playing(&self) -> bool {
        self.output.is_some() && !self.is_finished()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.as_ref().is_some_and(|f| f.load(Ordering::Relaxed))
    }

    /// Latest status published by the audio callback.
    pub fn status(&mut self) -> PlaybackStatus {
        if let Some(queue) = self.status.as_mut() {
            while let Some(status) = queue.try_pop() {
                self.last_status = status;
            }
        }
        self.last_status
    }

    // --- Offline rendering ---

    /// Render the song from the top as engine-format PCM, at most `max_frames` frames.
    pub fn render_pcm(&self, max_frames: usize) -> Result<Vec<u8>, PlayerError> {
        let (song, config) = {
            let engine = self.engine.lock();
            (engine.song().clone(), engine.config().clone())
        };
        render_song(song, config, max_frames)
    }

    pub fn render_to_wav(&self, max_seconds: u32) -> Result<Vec<u8>, PlayerError> {
        let config = self.engine.lock().config().clone();
        let max_frames = config.sample_rate as usize * max_seconds as usize;
        let pcm = self.render_pcm(max_frames)?;
        Ok(pcm_to_wav(&pcm, wav_spec(&config)))
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// WAV layout matching the engine's output format.
pub fn wav_spec(config: &MixerConfig) -> WavSpec {
    WavSpec {
        sample_rate: config.sample_rate,
        channels: config.channels as u16,
        bits_per_sample: config.bit_depth.bits() as u16,
    }
}

/// Render `song` with a fresh engine until it ends or `max_frames` is reached.
pub fn render_song(song: Song, config: MixerConfig, max_frames: usize) -> Result<Vec<u8>, PlayerError> {
    let mut engine = Engine::new(song, config)?;
    engine.start();

    let frame_bytes = engine.frame_bytes();
    let mut pcm = Vec::with_capacity(max_frames.min(RENDER_CHUNK_FRAMES * 64) * frame_bytes);
    let mut chunk = vec![0u8; RENDER_CHUNK_FRAMES * frame_bytes];
    let mut frames = 0;
    while frames < max_frames {
        let wanted = (max_frames - frames).min(RENDER_CHUNK_FRAMES) * frame_bytes;
        let got = engine.render(&mut chunk[..wanted]);
        pcm.extend_from_slice(&chunk[..got]);
        frames += got / frame_bytes;
        if got < wanted {
            break;
        }
    }
    debug!(frames, "offline render finished");
    Ok(pcm)
}
