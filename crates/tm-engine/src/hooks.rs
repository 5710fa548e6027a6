//! Side-channel notifications for external MIDI gear and UIs.

/// Receives playback side effects. All methods default to doing nothing.
///
/// Hooks are called from the render path with the engine locked, so
/// implementations must not block or allocate.
pub trait PlaybackHooks: Send {
    /// A note started on an instrument that has a MIDI channel, with the
    /// instrument's program if it names one.
    fn note_on(&mut self, _channel: u8, _midi_channel: u8, _program: Option<u8>, _note: u8, _velocity: u8) {}

    fn note_off(&mut self, _channel: u8, _midi_channel: u8, _note: u8) {}

    /// Panning (0-127) of the voice on a MIDI-routed instrument.
    fn pan(&mut self, _midi_channel: u8, _pan: u8) {}

    /// A Zxx macro was played on `channel`.
    fn macro_sent(&mut self, _channel: u8, _param: u8) {}

    fn all_notes_off(&mut self) {}

    /// The mixer was reconfigured.
    fn reinit(&mut self, _mix_frequency: u32) {}
}

/// Hooks that ignore everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl PlaybackHooks for NoHooks {}
