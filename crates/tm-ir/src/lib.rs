//! Song data model for the trakmix playback engine.
//!
//! Songs are built in memory (there are no file loaders here) and handed
//! to `tm-engine`, which owns them for the duration of playback.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod effects;
mod instrument;
mod pattern;
mod sample;
pub mod song;

pub use effects::{Effect, VolumeCommand, Waveform};
pub use instrument::{
    DuplicateAction, DuplicateCheck, Envelope, EnvelopePoint, EnvelopeRange, Instrument,
    NewNoteAction, NOTE_COUNT,
};
pub use pattern::{Cell, Note, Pattern, NOTE_MAX};
pub use sample::{
    AutoVibrato, LoopEdge, LoopSlot, LoopType, PcmBuffer, Sample, SampleData, SampleLoop,
    LOOKAHEAD, WINDOW_FRAMES,
};
pub use song::{ChannelSettings, OrderEntry, Song, SongFlags};
