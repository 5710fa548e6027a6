//! VoicePool: fixed voice slots and background allocation.

use alloc::vec::Vec;

use crate::config::MAX_VOICES;
use crate::voice::{Voice, VoiceState};

/// Identifier for a voice slot in the pool.
pub type VoiceId = usize;

/// Foreground voices, one per song channel, come first.
pub const MAX_CHANNELS: usize = 64;

/// All voice slots, allocated once.
#[derive(Clone, Debug)]
pub struct VoicePool {
    slots: Vec<Voice>,
    channels: usize,
}

impl VoicePool {
    /// Create a pool for a song with `channels` channels.
    pub fn new(channels: usize) -> Self {
        Self {
            slots: (0..MAX_VOICES).map(|_| Voice::default()).collect(),
            channels: channels.min(MAX_CHANNELS),
        }
    }

    /// Number of foreground slots.
    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, id: VoiceId) -> Option<&Voice> {
        self.slots.get(id)
    }

    pub fn get_mut(&mut self, id: VoiceId) -> Option<&mut Voice> {
        self.slots.get_mut(id)
    }

    pub fn as_slice(&self) -> &[Voice] {
        &self.slots
    }

    pub fn as_mut_slice(&mut self) -> &mut [Voice] {
        &mut self.slots
    }

    /// Pick a background slot for a voice leaving the foreground.
    ///
    /// Preference: a free slot, then the quietest fading voice, then a
    /// released voice, then the quietest background voice of any kind.
    pub fn allocate_background(&self) -> VoiceId {
        let background = || self.slots.iter().enumerate().skip(MAX_CHANNELS);

        if let Some((id, _)) =
            background().find(|(_, v)| v.state() == VoiceState::Free && !v.has_offset())
        {
            return id;
        }
        if let Some((id, _)) = background().find(|(_, v)| v.state() == VoiceState::Free) {
            return id;
        }
        let quietest = |state: Option<VoiceState>| {
            background()
                .filter(|(_, v)| state.map_or(true, |s| v.state() == s))
                .min_by_key(|(_, v)| v.final_volume)
                .map(|(id, _)| id)
        };
        quietest(Some(VoiceState::Fading))
            .or_else(|| quietest(Some(VoiceState::Released)))
            .or_else(|| quietest(None))
            .unwrap_or(MAX_CHANNELS)
    }

    /// Background voices that were moved off `channel`.
    pub fn children_of(&mut self, channel: u8) -> impl Iterator<Item = &mut Voice> + '_ {
        self.slots[MAX_CHANNELS..]
            .iter_mut()
            .filter(move |v| v.parent == Some(channel) && v.is_active())
    }

    /// Count of voices still playing a sample.
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|v| v.is_active()).count()
    }

    /// Return every slot to its initial state.
    pub fn reset_all(&mut self) {
        for voice in &mut self.slots {
            voice.reset();
        }
    }
}
