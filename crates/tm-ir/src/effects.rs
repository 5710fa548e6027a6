//! Effect command types for tracker patterns.
//!
//! Parameters are stored raw, the way they appear in the pattern. Nibble
//! packed commands (slides, retrigger, tempo slides) are decoded by the
//! engine, since the meaning of a zero parameter depends on effect memory.

/// Oscillator shape for vibrato, tremolo, panbrello and auto-vibrato.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Waveform {
    #[default]
    Sine,
    RampDown,
    Square,
    Random,
}

impl Waveform {
    /// Decode the low two bits of an S3x/S4x/S5x parameter.
    pub const fn from_param(param: u8) -> Self {
        match param & 3 {
            0 => Waveform::Sine,
            1 => Waveform::RampDown,
            2 => Waveform::Square,
            _ => Waveform::Random,
        }
    }
}

/// Volume column command (IT style).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VolumeCommand {
    #[default]
    None,
    /// Set volume (0-64)
    Volume(u8),
    /// Set panning (0-64, 32 = center)
    Panning(u8),
    FineVolSlideUp(u8),
    FineVolSlideDown(u8),
    VolumeSlideUp(u8),
    VolumeSlideDown(u8),
    PortaDown(u8),
    PortaUp(u8),
    /// Tone portamento, index into the volume-column speed table (0-9)
    TonePorta(u8),
    /// Vibrato depth, uses the channel's last vibrato speed
    Vibrato(u8),
}

/// Effect column command, one variant per IT effect letter (and S sub-command).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Effect {
    #[default]
    None,

    // === Song control ===
    /// Axx: set ticks per row
    SetSpeed(u8),
    /// Bxx: jump to order
    PositionJump(u8),
    /// Cxx: break to row of next pattern
    PatternBreak(u8),
    /// Txx: set tempo (>= 0x20), T0x slide down, T1x slide up
    SetTempo(u8),

    // === Volume ===
    /// Dxy: volume slide (DxF / DFy fine)
    VolumeSlide(u8),
    /// Mxx: set channel volume (0-64)
    SetChannelVolume(u8),
    /// Nxy: channel volume slide
    ChannelVolumeSlide(u8),
    /// Vxx: set global volume (0-128)
    SetGlobalVolume(u8),
    /// Wxy: global volume slide
    GlobalVolumeSlide(u8),
    /// Rxy: tremolo
    Tremolo { speed: u8, depth: u8 },
    /// Ixy: tremor, x ticks on and y ticks off
    Tremor { on: u8, off: u8 },

    // === Pitch ===
    /// Exx: pitch slide down (EFx fine, EEx extra fine)
    PortaDown(u8),
    /// Fxx: pitch slide up (FFx fine, FEx extra fine)
    PortaUp(u8),
    /// Gxx: slide toward the target note
    TonePorta(u8),
    /// Hxy: vibrato
    Vibrato { speed: u8, depth: u8 },
    /// Uxy: fine vibrato (quarter depth)
    FineVibrato { speed: u8, depth: u8 },
    /// Jxy: cycle between note, note+x, note+y each tick
    Arpeggio { x: u8, y: u8 },
    /// Kxy: vibrato + volume slide
    VibratoVolSlide(u8),
    /// Lxy: tone portamento + volume slide
    TonePortaVolSlide(u8),

    // === Sample playback ===
    /// Oxx: start at offset xx * 256 (plus SAx high offset)
    SampleOffset(u8),
    /// Qxy: retrigger every y ticks, x selects the volume change
    Retrigger(u8),

    // === Panning ===
    /// Pxy: panning slide
    PanningSlide(u8),
    /// Xxx: set panning (0-255)
    SetPan(u8),
    /// Yxy: panbrello
    Panbrello { speed: u8, depth: u8 },

    // === S sub-commands ===
    /// S1x: glissando on/off
    Glissando(bool),
    /// S3x: vibrato waveform
    SetVibratoWaveform(u8),
    /// S4x: tremolo waveform
    SetTremoloWaveform(u8),
    /// S5x: panbrello waveform
    SetPanbrelloWaveform(u8),
    /// S6x: extend the row by x ticks
    FinePatternDelay(u8),
    /// S7x: past-note actions, NNA override, envelope toggles
    InstrumentControl(u8),
    /// S8x: set panning (0-15)
    SetPanPosition(u8),
    /// S91/S90: surround on/off
    Surround(bool),
    /// SAx: high sample offset
    HighOffset(u8),
    /// SBx: pattern loop (x = 0 sets the loop start)
    PatternLoop(u8),
    /// SCx: cut the note at tick x
    NoteCut(u8),
    /// SDx: delay the note until tick x
    NoteDelay(u8),
    /// SEx: repeat the row x times
    PatternDelay(u8),

    // === External ===
    /// Zxx: MIDI macro
    MidiMacro(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waveform_uses_low_bits() {
        assert_eq!(Waveform::from_param(0), Waveform::Sine);
        assert_eq!(Waveform::from_param(5), Waveform::RampDown);
        assert_eq!(Waveform::from_param(3), Waveform::Random);
    }
}
