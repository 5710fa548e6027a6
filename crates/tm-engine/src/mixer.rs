//! Voice selection and the mixing loop.
//!
//! Each pass fills the mix buffer with the decaying global DC level, then
//! mixes voices loudest first. A voice is mixed in runs: a run ends at a
//! loop edge, at the point where the interpolation taps would leave the
//! current source slice, or when the volume ramp finishes.

use tm_ir::{LoopEdge, PcmBuffer, SampleData, Song, LOOKAHEAD};

use crate::engine::{Engine, MixerContext};
use crate::kernels::{kernel_for, PcmSample};
use crate::voice::{Voice, VoiceFlags};

/// Frames mixed per pass.
pub const MIX_BUFFER_FRAMES: usize = 512;

const LOOKAHEAD_FRAMES: i64 = LOOKAHEAD as i64;

/// Upper bound on a single run, shrinking with the step size.
const RUN_BUDGET: i64 = 16384;

impl Engine {
    /// Mix `frames` frames (at most [`MIX_BUFFER_FRAMES`]) into the mix buffer.
    ///
    /// Returns the number of voices that were mixed.
    pub(crate) fn mix_pass(&mut self, frames: usize) -> usize {
        let frames = frames.min(MIX_BUFFER_FRAMES);
        let out = &mut self.mix_buffer[..frames * 2];
        fill_dc(out, &mut self.dc);

        self.mix_list.clear();
        for (id, voice) in self.voices.as_slice().iter().enumerate() {
            if voice.is_active() || voice.has_offset() {
                // Capacity matches the pool size.
                let _ = self.mix_list.push(id as u16);
            }
        }
        let limit = self.ctx.config.voice_limit;
        if self.mix_list.len() > limit {
            sort_by_volume(&mut self.mix_list, self.voices.as_slice());
        }

        let voices = self.voices.as_mut_slice();
        let mut mixed = 0;
        for (rank, &id) in self.mix_list.iter().enumerate() {
            let voice = &mut voices[id as usize];
            if rank < limit {
                mix_voice(voice, &self.song, out, &self.ctx, &mut self.dc);
                mixed += 1;
            } else {
                skip_voice(voice, frames, &mut self.dc);
            }
        }
        mixed
    }
}

/// Stable insertion sort of voice ids by descending final volume.
pub(crate) fn sort_by_volume(list: &mut [u16], voices: &[Voice]) {
    let volume = |id: u16| voices[id as usize].final_volume;
    for i in 1..list.len() {
        let mut j = i;
        while j > 0 && volume(list[j - 1]) < volume(list[j]) {
            list.swap(j - 1, j);
            j -= 1;
        }
    }
}

/// One step of DC decay toward zero; returns the new level.
#[inline]
pub(crate) fn drain(level: &mut i32) -> i32 {
    let step = (*level + ((level.wrapping_neg() >> 31) & 0xFF)) >> 8;
    *level -= step;
    *level
}

fn fill_dc(out: &mut [i32], dc: &mut [i32; 2]) {
    for frame in out.chunks_exact_mut(2) {
        frame[0] = drain(&mut dc[0]);
        frame[1] = drain(&mut dc[1]);
    }
}

/// Let a stopped voice's DC level decay into `out`, then hand the rest to the global level.
fn drain_offsets(voice: &mut Voice, out: &mut [i32], dc: &mut [i32; 2]) {
    if !voice.has_offset() {
        return;
    }
    for frame in out.chunks_exact_mut(2) {
        frame[0] = frame[0].saturating_add(drain(&mut voice.left_offset));
        frame[1] = frame[1].saturating_add(drain(&mut voice.right_offset));
    }
    dc[0] = dc[0].saturating_add(voice.left_offset);
    dc[1] = dc[1].saturating_add(voice.right_offset);
    voice.left_offset = 0;
    voice.right_offset = 0;
}

fn mix_voice(voice: &mut Voice, song: &Song, out: &mut [i32], ctx: &MixerContext, dc: &mut [i32; 2]) {
    let frames = out.len() / 2;
    let mut done = 0;

    if let Some(sample) = song.sample(voice.sample).filter(|_| voice.is_active()) {
        while done < frames {
            let n = run_length(voice, frames - done);
            if n == 0 {
                voice.stop_sample();
                break;
            }
            let chunk = &mut out[done * 2..(done + n) * 2];
            let last = chunk.len() - 2;
            let before = (chunk[last], chunk[last + 1]);
            match &sample.data {
                SampleData::Pcm8(buf) => run_kernel(voice, buf, chunk, ctx),
                SampleData::Pcm16(buf) => run_kernel(voice, buf, chunk, ctx),
            }
            voice.left_offset = chunk[last].wrapping_sub(before.0);
            voice.right_offset = chunk[last + 1].wrapping_sub(before.1);
            done += n;

            if voice.ramp_remaining > 0 {
                voice.ramp_remaining -= n as i32;
                if voice.ramp_remaining <= 0 {
                    voice.finish_ramp();
                    if voice.flags.contains(VoiceFlags::NOTE_FADE) && voice.fadeout_volume == 0 {
                        voice.stop_sample();
                        break;
                    }
                }
            }
        }
    } else if voice.is_active() {
        voice.stop_sample();
    }

    if !voice.is_active() {
        drain_offsets(voice, &mut out[done * 2..], dc);
    }
    voice.vu = ((voice.mix.vu_peak as i64 * voice.final_volume as i64) >> 22).min(128) as u8;
    voice.mix.vu_peak = 0;
}

/// Advance a voice over the limit without mixing it.
fn skip_voice(voice: &mut Voice, frames: usize, dc: &mut [i32; 2]) {
    if voice.ramp_remaining > 0 {
        voice.finish_ramp();
    }
    let mut done = 0;
    while done < frames && voice.is_active() {
        let n = run_length(voice, frames - done);
        if n == 0 {
            voice.stop_sample();
            break;
        }
        voice.mix.position += voice.mix.increment as i64 * n as i64;
        done += n;
    }
    if voice.flags.contains(VoiceFlags::NOTE_FADE) && voice.fadeout_volume == 0 {
        voice.stop_sample();
    }
    dc[0] = dc[0].saturating_add(voice.left_offset);
    dc[1] = dc[1].saturating_add(voice.right_offset);
    voice.left_offset = 0;
    voice.right_offset = 0;
    voice.vu = 0;
}

fn run_kernel<T: PcmSample>(voice: &mut Voice, buf: &PcmBuffer<T>, out: &mut [i32], ctx: &MixerContext) {
    let (data, origin) = source_slice(voice, buf);
    let kernel = kernel_for::<T>(
        buf.channels() == 2,
        ctx.config.interpolation,
        voice.flags.contains(VoiceFlags::FILTER),
        voice.mix.is_ramping(),
    );
    let shift = origin << 16;
    voice.mix.position -= shift;
    kernel(&mut voice.mix, data, out, &ctx.tables);
    voice.mix.position += shift;
}

/// The slice the voice reads from at its current position, and the frame index of its first entry.
///
/// Near a loop edge the loop's lookahead window replaces the sample data,
/// so the taps see the wrapped or mirrored continuation.
fn source_slice<'a, T: PcmSample>(voice: &Voice, buf: &'a PcmBuffer<T>) -> (&'a [T], i64) {
    let main = (buf.padded(), -LOOKAHEAD_FRAMES);
    if !voice.flags.contains(VoiceFlags::LOOP) {
        return main;
    }
    let pos = voice.mix.position >> 16;
    let (start, end) = (voice.loop_start as i64, voice.loop_end as i64);
    let wrapped = voice.flags.intersects(VoiceFlags::WRAPPED | VoiceFlags::BACKWARD);
    let (edge, at) = if pos >= end - LOOKAHEAD_FRAMES {
        (LoopEdge::End, end)
    } else if wrapped && pos < start + LOOKAHEAD_FRAMES {
        (LoopEdge::Start, start)
    } else {
        return main;
    };
    let window = buf.window(voice.loop_slot(), edge);
    if window.is_empty() {
        return main;
    }
    (window, at - 2 * LOOKAHEAD_FRAMES)
}

/// Apply loop wrapping, then count the frames the voice can mix in one run.
///
/// Returns 0 when a one-shot voice has run off its end.
pub(crate) fn run_length(voice: &mut Voice, max_frames: usize) -> usize {
    let flags = voice.flags;
    let looping = flags.contains(VoiceFlags::LOOP);
    let (start, end) = (voice.loop_start as i64, voice.loop_end as i64);
    let mut pos = voice.mix.position;

    if looping && end > start {
        let len = end - start;
        if flags.contains(VoiceFlags::BACKWARD) && pos < start << 16 {
            pos = ((2 * start) << 16) - pos;
            pos = pos.min((end << 16) - 1);
            voice.flags.remove(VoiceFlags::BACKWARD);
            voice.mix.increment = voice.mix.increment.abs();
        }
        if pos >= end << 16 {
            if flags.contains(VoiceFlags::PING_PONG) {
                pos = ((2 * end - 1) << 16) - pos;
                pos = pos.max(start << 16);
                voice.flags.insert(VoiceFlags::BACKWARD);
                voice.mix.increment = -voice.mix.increment.abs();
            } else {
                pos = (start << 16) + (pos - (start << 16)) % (len << 16);
            }
            voice.flags.insert(VoiceFlags::WRAPPED);
        }
    } else if pos < 0 || pos >> 16 >= voice.length as i64 {
        return 0;
    }
    voice.mix.position = pos;

    let inc = voice.mix.increment as i64;
    let mut cap = (RUN_BUDGET / ((inc.abs() >> 16) + 1)).max(2).min(max_frames as i64);
    if voice.ramp_remaining > 0 {
        cap = cap.min(voice.ramp_remaining as i64);
    }
    if inc == 0 {
        return cap as usize;
    }

    let frame = pos >> 16;
    let count = if inc > 0 {
        let boundary = if !looping {
            voice.length as i64
        } else if frame >= end - LOOKAHEAD_FRAMES {
            end
        } else if voice.flags.contains(VoiceFlags::WRAPPED) && frame < start + LOOKAHEAD_FRAMES {
            (start + LOOKAHEAD_FRAMES).min(end - LOOKAHEAD_FRAMES)
        } else {
            end - LOOKAHEAD_FRAMES
        };
        ((boundary << 16) - pos - 1) / inc + 1
    } else {
        let boundary = if frame >= end - LOOKAHEAD_FRAMES {
            (end - LOOKAHEAD_FRAMES).max(start)
        } else if frame < start + LOOKAHEAD_FRAMES {
            start
        } else {
            start + LOOKAHEAD_FRAMES
        };
        (pos - (boundary << 16)) / -inc + 1
    };
    count.clamp(1, cap) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_ir::{LoopType, Sample};

    fn voice_on(sample: &Sample, increment: i32) -> Voice {
        let mut v = Voice::default();
        v.attach_sample(1, sample);
        v.mix.increment = increment;
        v
    }

    #[test]
    fn one_shot_runs_to_its_end() {
        let s = Sample::from_pcm8("s", &[1; 100]);
        let mut v = voice_on(&s, 1 << 16);
        assert_eq!(run_length(&mut v, 512), 100);
        v.mix.position = 99 << 16;
        assert_eq!(run_length(&mut v, 512), 1);
        v.mix.position = 100 << 16;
        assert_eq!(run_length(&mut v, 512), 0);
    }

    #[test]
    fn run_is_capped_by_request_and_ramp() {
        let s = Sample::from_pcm8("s", &[1; 1000]);
        let mut v = voice_on(&s, 1 << 16);
        assert_eq!(run_length(&mut v, 50), 50);
        v.ramp_remaining = 7;
        assert_eq!(run_length(&mut v, 50), 7);
    }

    #[test]
    fn forward_loop_runs_stop_before_the_edge_window() {
        let s = Sample::from_pcm8("s", &[1; 64]).with_loop(16, 48, LoopType::Forward);
        let mut v = voice_on(&s, 1 << 16);
        assert_eq!(run_length(&mut v, 512), 44);
        v.mix.position = 44 << 16;
        assert_eq!(run_length(&mut v, 512), 4);
    }

    #[test]
    fn forward_loop_wraps() {
        let s = Sample::from_pcm8("s", &[1; 64]).with_loop(16, 48, LoopType::Forward);
        let mut v = voice_on(&s, 1 << 16);
        v.mix.position = (48 << 16) + 0x8000;
        let n = run_length(&mut v, 512);
        assert_eq!(v.mix.position, (16 << 16) + 0x8000);
        assert!(v.flags.contains(VoiceFlags::WRAPPED));
        // Still inside the start window
        assert_eq!(n, 4);
    }

    #[test]
    fn ping_pong_reflects_at_both_ends() {
        let s = Sample::from_pcm8("s", &[1; 64]).with_loop(16, 48, LoopType::PingPong);
        let mut v = voice_on(&s, 1 << 16);
        v.mix.position = 48 << 16;
        run_length(&mut v, 512);
        assert_eq!(v.mix.position, 47 << 16);
        assert!(v.flags.contains(VoiceFlags::BACKWARD));
        assert!(v.mix.increment < 0);

        v.mix.position = (16 << 16) - 0x4000;
        run_length(&mut v, 512);
        assert_eq!(v.mix.position, (16 << 16) + 0x4000);
        assert!(!v.flags.contains(VoiceFlags::BACKWARD));
        assert!(v.mix.increment > 0);
    }

    #[test]
    fn backward_runs_stop_at_window_boundaries() {
        let s = Sample::from_pcm8("s", &[1; 64]).with_loop(16, 48, LoopType::PingPong);
        let mut v = voice_on(&s, -(1 << 16));
        v.flags.insert(VoiceFlags::BACKWARD | VoiceFlags::WRAPPED);
        v.mix.position = 47 << 16;
        assert_eq!(run_length(&mut v, 512), 4);
        v.mix.position = 43 << 16;
        assert_eq!(run_length(&mut v, 512), 24);
        v.mix.position = 19 << 16;
        assert_eq!(run_length(&mut v, 512), 4);
    }

    #[test]
    fn source_slice_switches_to_loop_windows() {
        let s = Sample::from_pcm16("s", &(0..64).collect::<Vec<i16>>()).with_loop(16, 48, LoopType::Forward);
        let SampleData::Pcm16(buf) = &s.data else { unreachable!() };
        let mut v = voice_on(&s, 1 << 16);
        assert_eq!(source_slice(&v, buf).1, -4);
        v.mix.position = 45 << 16;
        assert_eq!(source_slice(&v, buf).1, 40);
        v.mix.position = 17 << 16;
        assert_eq!(source_slice(&v, buf).1, -4);
        v.flags.insert(VoiceFlags::WRAPPED);
        assert_eq!(source_slice(&v, buf).1, 8);
    }

    #[test]
    fn drain_reaches_zero_from_both_sides() {
        for start in [1000, -1000, 1, -1, 255, -256] {
            let mut level = start;
            let mut steps = 0;
            while level != 0 {
                let before = level;
                drain(&mut level);
                assert!(level.abs() < before.abs());
                steps += 1;
                assert!(steps < 4096);
            }
        }
    }

    #[test]
    fn voices_sort_loudest_first_and_stable() {
        let mut voices = vec![Voice::default(); 4];
        for (v, vol) in voices.iter_mut().zip([10, 30, 10, 20]) {
            v.final_volume = vol;
        }
        let mut list = [0u16, 1, 2, 3];
        sort_by_volume(&mut list, &voices);
        assert_eq!(list, [1, 3, 0, 2]);
    }

    #[test]
    fn stopped_voice_offset_moves_to_global_dc() {
        let mut v = Voice::default();
        v.left_offset = 1 << 20;
        let mut out = vec![0i32; 8];
        let mut dc = [0; 2];
        drain_offsets(&mut v, &mut out, &mut dc);
        assert!(!v.has_offset());
        assert!(out[0] > 0 && out[6] < out[0]);
        assert_eq!(dc[0], out[6]);
    }
}
