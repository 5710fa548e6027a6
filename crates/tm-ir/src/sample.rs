//! Sample data types.
//!
//! PCM is stored with guard frames on both sides and with a pair of
//! lookahead windows per loop, so interpolation kernels can read a few
//! frames around any playable position without bounds juggling.

use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::effects::Waveform;

/// Frames of guard data kept on each side of the PCM and around loop edges.
pub const LOOKAHEAD: usize = 4;

/// Frames in one loop-edge window: `2 * LOOKAHEAD` either side of the edge.
pub const WINDOW_FRAMES: usize = 4 * LOOKAHEAD;

/// Loop playback mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopType {
    #[default]
    None,
    Forward,
    /// Bidirectional loop
    PingPong,
}

/// A loop region in frames, `start..end`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SampleLoop {
    pub start: u32,
    pub end: u32,
    pub kind: LoopType,
}

impl SampleLoop {
    pub const NONE: Self = Self { start: 0, end: 0, kind: LoopType::None };

    pub const fn new(start: u32, end: u32, kind: LoopType) -> Self {
        Self { start, end, kind }
    }

    /// Returns true if the loop has a type and a non-empty region.
    pub fn is_active(&self) -> bool {
        self.kind != LoopType::None && self.end > self.start
    }

    pub fn is_ping_pong(&self) -> bool {
        self.kind == LoopType::PingPong
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Logical frame index of the first entry of the window around `edge`.
    pub fn window_origin(&self, edge: LoopEdge) -> i64 {
        let at = match edge {
            LoopEdge::End => self.end,
            LoopEdge::Start => self.start,
        };
        at as i64 - 2 * LOOKAHEAD as i64
    }

    /// Clip the region to a sample of `len` frames. Degenerate regions disable the loop.
    fn clamped(self, len: usize) -> Self {
        let len = len as u32;
        let end = self.end.min(len);
        let start = self.start.min(end);
        if self.kind == LoopType::None || end <= start {
            return Self { start, end, kind: LoopType::None };
        }
        Self { start, end, kind: self.kind }
    }

    /// Map a logical frame near `edge` to the frame that playback reads there.
    ///
    /// Frames past the loop end follow the wrap (forward) or mirror
    /// (ping-pong) path; frames before the start likewise, as seen by a
    /// voice that has already wrapped once.
    fn source_frame(&self, pos: i64, edge: LoopEdge) -> i64 {
        let (start, end) = (self.start as i64, self.end as i64);
        let len = end - start;
        let folded = |p: i64| {
            if self.is_ping_pong() {
                let q = (p - start).rem_euclid(2 * len);
                if q < len { start + q } else { start + 2 * len - 1 - q }
            } else {
                start + (p - start).rem_euclid(len)
            }
        };
        match edge {
            LoopEdge::End if pos < end => pos,
            LoopEdge::Start if pos >= start && pos < end => pos,
            _ => folded(pos),
        }
    }
}

/// Which loop a lookahead window belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopSlot {
    Normal = 0,
    Sustain = 1,
}

/// Which edge of a loop a lookahead window covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopEdge {
    End = 0,
    Start = 1,
}

/// Guarded, interleaved PCM storage.
#[derive(Clone, Debug, Default)]
pub struct PcmBuffer<T> {
    channels: u8,
    frames: usize,
    /// `[guard][frames][guard]`; each guard repeats the nearest edge frame.
    padded: Vec<T>,
    /// Per loop slot: the end window followed by the start window.
    windows: [Vec<T>; 2],
}

impl<T: Copy + Default> PcmBuffer<T> {
    /// Build a mono buffer.
    pub fn mono(pcm: &[T]) -> Self {
        Self::from_interleaved(pcm, 1)
    }

    /// Build a stereo buffer from separate channels. Extra frames on the longer side are dropped.
    pub fn stereo(left: &[T], right: &[T]) -> Self {
        let frames = left.len().min(right.len());
        let mut data = Vec::with_capacity(frames * 2);
        for (l, r) in left.iter().zip(right.iter()) {
            data.push(*l);
            data.push(*r);
        }
        Self::from_interleaved(&data, 2)
    }

    fn from_interleaved(data: &[T], channels: u8) -> Self {
        let ch = channels as usize;
        let frames = data.len() / ch;
        let mut padded = Vec::with_capacity((frames + 2 * LOOKAHEAD) * ch);

        let first: &[T] = if frames > 0 { &data[..ch] } else { &[] };
        let last: &[T] = if frames > 0 { &data[(frames - 1) * ch..frames * ch] } else { &[] };
        for _ in 0..LOOKAHEAD {
            push_frame(&mut padded, first, ch);
        }
        padded.extend_from_slice(&data[..frames * ch]);
        for _ in 0..LOOKAHEAD {
            push_frame(&mut padded, last, ch);
        }
        Self { channels, frames, padded, windows: [Vec::new(), Vec::new()] }
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Interleaved data including the guard frames; frame 0 starts at `LOOKAHEAD * channels`.
    pub fn padded(&self) -> &[T] {
        &self.padded
    }

    /// The window covering `edge` of the loop in `slot`, interleaved, `WINDOW_FRAMES` long.
    ///
    /// Empty when the loop was inactive at the last [`Sample::prepare`].
    pub fn window(&self, slot: LoopSlot, edge: LoopEdge) -> &[T] {
        let data = &self.windows[slot as usize];
        let len = WINDOW_FRAMES * self.channels as usize;
        let start = edge as usize * len;
        data.get(start..start + len).unwrap_or(&[])
    }

    /// Value of one channel of one frame, holding the edge frames outside the data.
    pub fn value(&self, frame: i64, channel: usize) -> T {
        if self.frames == 0 {
            return T::default();
        }
        let frame = frame.clamp(0, self.frames as i64 - 1) as usize;
        let ch = self.channels as usize;
        self.padded[(frame + LOOKAHEAD) * ch + channel.min(ch - 1)]
    }

    fn rebuild_windows(&mut self, slot: LoopSlot, lp: &SampleLoop) {
        let mut data = Vec::new();
        if lp.is_active() {
            let ch = self.channels as usize;
            data.reserve(2 * WINDOW_FRAMES * ch);
            for edge in [LoopEdge::End, LoopEdge::Start] {
                let origin = lp.window_origin(edge);
                for i in 0..WINDOW_FRAMES as i64 {
                    let src = lp.source_frame(origin + i, edge);
                    for c in 0..ch {
                        data.push(self.value(src, c));
                    }
                }
            }
        }
        self.windows[slot as usize] = data;
    }
}

fn push_frame<T: Copy + Default>(out: &mut Vec<T>, frame: &[T], channels: usize) {
    if frame.is_empty() {
        out.extend(core::iter::repeat(T::default()).take(channels));
    } else {
        out.extend_from_slice(frame);
    }
}

/// Sample audio data.
#[derive(Clone, Debug)]
pub enum SampleData {
    Pcm8(PcmBuffer<i8>),
    Pcm16(PcmBuffer<i16>),
}

impl SampleData {
    /// Number of frames.
    pub fn len(&self) -> usize {
        match self {
            SampleData::Pcm8(b) => b.frames(),
            SampleData::Pcm16(b) => b.frames(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of interleaved channels (1 or 2).
    pub fn channels(&self) -> u8 {
        match self {
            SampleData::Pcm8(b) => b.channels(),
            SampleData::Pcm16(b) => b.channels(),
        }
    }

    pub fn is_stereo(&self) -> bool {
        self.channels() == 2
    }

    fn rebuild_windows(&mut self, slot: LoopSlot, lp: &SampleLoop) {
        match self {
            SampleData::Pcm8(b) => b.rebuild_windows(slot, lp),
            SampleData::Pcm16(b) => b.rebuild_windows(slot, lp),
        }
    }
}

/// Sample auto-vibrato.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AutoVibrato {
    /// Position increment per tick
    pub speed: u8,
    /// Maximum depth (0-64)
    pub depth: u8,
    /// Depth ramp-up per tick (0 = full depth immediately)
    pub rate: u8,
    pub waveform: Waveform,
}

/// A sample definition.
#[derive(Clone, Debug)]
pub struct Sample {
    /// Sample name
    pub name: ArrayString<26>,
    /// Audio data
    pub data: SampleData,
    /// Main loop
    pub sample_loop: SampleLoop,
    /// Sustain loop, active until key-off
    pub sustain_loop: SampleLoop,
    /// Default volume (0-64)
    pub default_volume: u8,
    /// Default panning (0-64), applied on note-on when set
    pub default_pan: Option<u8>,
    /// Global volume (0-64)
    pub global_volume: u8,
    /// Playback rate of C-5 in Hz
    pub c5_speed: u32,
    /// Auto-vibrato settings
    pub vibrato: Option<AutoVibrato>,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            name: ArrayString::new(),
            data: SampleData::Pcm8(PcmBuffer::default()),
            sample_loop: SampleLoop::NONE,
            sustain_loop: SampleLoop::NONE,
            default_volume: 64,
            default_pan: None,
            global_volume: 64,
            c5_speed: 8363,
            vibrato: None,
        }
    }
}

impl Sample {
    /// Create a new empty sample.
    pub fn new(name: &str) -> Self {
        let mut sample = Self::default();
        let _ = sample.name.try_push_str(name);
        sample
    }

    pub fn from_pcm8(name: &str, pcm: &[i8]) -> Self {
        Self::with_data(name, SampleData::Pcm8(PcmBuffer::mono(pcm)))
    }

    pub fn from_pcm16(name: &str, pcm: &[i16]) -> Self {
        Self::with_data(name, SampleData::Pcm16(PcmBuffer::mono(pcm)))
    }

    pub fn from_stereo16(name: &str, left: &[i16], right: &[i16]) -> Self {
        Self::with_data(name, SampleData::Pcm16(PcmBuffer::stereo(left, right)))
    }

    fn with_data(name: &str, data: SampleData) -> Self {
        let mut sample = Self::new(name);
        sample.data = data;
        sample
    }

    /// Set the main loop and rebuild the lookahead windows.
    pub fn with_loop(mut self, start: u32, end: u32, kind: LoopType) -> Self {
        self.sample_loop = SampleLoop::new(start, end, kind);
        self.prepare();
        self
    }

    /// Set the sustain loop and rebuild the lookahead windows.
    pub fn with_sustain_loop(mut self, start: u32, end: u32, kind: LoopType) -> Self {
        self.sustain_loop = SampleLoop::new(start, end, kind);
        self.prepare();
        self
    }

    /// Get the length of the sample in frames.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the sample has no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if the sample has a loop.
    pub fn has_loop(&self) -> bool {
        self.sample_loop.is_active()
    }

    pub fn has_sustain_loop(&self) -> bool {
        self.sustain_loop.is_active()
    }

    /// Clip loop points to the data and rebuild the loop lookahead windows.
    ///
    /// Must be called after editing loop points by hand.
    pub fn prepare(&mut self) {
        let len = self.len();
        self.sample_loop = self.sample_loop.clamped(len);
        self.sustain_loop = self.sustain_loop.clamped(len);
        let (normal, sustain) = (self.sample_loop, self.sustain_loop);
        self.data.rebuild_windows(LoopSlot::Normal, &normal);
        self.data.rebuild_windows(LoopSlot::Sustain, &sustain);
    }
}
