//! Playback engine for trakmix.
//!
//! Walks a [`tm_ir::Song`] tick by tick, turns its cells into voice
//! parameters and mixes the voices into interleaved PCM bytes.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod channel;
pub mod config;
mod effects;
mod engine;
mod envelope;
mod eq;
mod filter;
mod frequency;
mod hooks;
mod kernels;
mod lfo;
mod mixer;
mod processor;
mod render;
pub mod scheduler;
pub mod tables;
mod transport;
mod voice;
mod voice_pool;

pub use channel::ChannelState;
pub use config::{BitDepth, ConfigError, EqBand, Interpolation, MixerConfig, Repeat, EQ_BANDS, MAX_VOICES};
pub use engine::{Engine, MixerContext};
pub use eq::Equalizer;
pub use frequency::{frequency_to_increment, note_to_frequency};
pub use hooks::{NoHooks, PlaybackHooks};
pub use mixer::MIX_BUFFER_FRAMES;
pub use processor::VoiceAction;
pub use render::{convert, vu_level};
pub use scheduler::{samples_per_tick, PlayState};
pub use tables::FirWindow;
pub use transport::{PlaybackStatus, TransportError, TransportState};
pub use voice::{Voice, VoiceFlags, VoiceState};
pub use voice_pool::{VoicePool, MAX_CHANNELS};
