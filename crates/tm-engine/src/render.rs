//! Output rendering: tick pacing, mix passes and sample format conversion.

use crate::config::BitDepth;
use crate::engine::Engine;
use crate::mixer::MIX_BUFFER_FRAMES;
use crate::transport::TransportState;

/// Accumulator headroom: values are clipped to this before conversion.
const CLIP_MAX: i32 = (1 << 27) - 1;
const CLIP_MIN: i32 = -(1 << 27);

/// Meter floor in dB.
const VU_FLOOR_DB: f32 = -40.0;

impl Engine {
    /// Render interleaved frames into `out` in the configured format.
    ///
    /// Returns the number of bytes of audio written. Whatever is left of
    /// `out` (a partial trailing frame, or everything after the song
    /// ended) is filled with silence.
    ///
    /// With the `alloc_check` feature every call runs under
    /// `assert_no_alloc`.
    pub fn render(&mut self, out: &mut [u8]) -> usize {
        #[cfg(feature = "alloc_check")]
        return assert_no_alloc::assert_no_alloc(|| self.render_pass(out));
        #[cfg(not(feature = "alloc_check"))]
        self.render_pass(out)
    }

    fn render_pass(&mut self, out: &mut [u8]) -> usize {
        let config = &self.ctx.config;
        let (depth, stereo) = (config.bit_depth, config.channels == 2);
        let frame_bytes = config.frame_bytes();
        let frames = out.len() / frame_bytes;

        let mut written = 0;
        let mut peak = [0i32; 2];
        if self.is_playing() {
            while written < frames {
                if self.play.tick_samples_left == 0 {
                    if !self.process_tick() {
                        self.play.transport = TransportState::Stopped;
                        break;
                    }
                    self.play.tick_samples_left = self.play.samples_per_tick;
                }
                let n = (frames - written)
                    .min(self.play.tick_samples_left as usize)
                    .min(MIX_BUFFER_FRAMES);

                self.mixed_voices = self.mix_pass(n);
                let buffer = &mut self.mix_buffer[..n * 2];
                if self.eq.is_active() {
                    self.eq.process(buffer);
                }
                for frame in buffer.chunks_exact_mut(2) {
                    for (side, value) in frame.iter_mut().enumerate() {
                        *value = (*value).clamp(CLIP_MIN, CLIP_MAX);
                        peak[side] = peak[side].max(value.saturating_abs());
                    }
                }
                let dst = &mut out[written * frame_bytes..(written + n) * frame_bytes];
                convert(buffer, dst, depth, stereo);

                written += n;
                self.play.tick_samples_left -= n as u32;
            }
        }

        self.vu = [vu_level(peak[0]), vu_level(peak[1])];
        let bytes = written * frame_bytes;
        out[bytes..].fill(depth.silence());
        bytes
    }
}

/// Meter reading (0-128) over -40..0 dB of full scale.
pub fn vu_level(peak: i32) -> u8 {
    if peak <= 0 {
        return 0;
    }
    let db = 20.0 * libm::log10f(peak as f32 / CLIP_MAX as f32);
    let level = (db - VU_FLOOR_DB) * 128.0 / -VU_FLOOR_DB;
    level.clamp(0.0, 128.0) as u8
}

/// Write clipped stereo frames from `mix` as little-endian samples.
pub fn convert(mix: &[i32], out: &mut [u8], depth: BitDepth, stereo: bool) {
    let bytes = depth.bytes();
    let mut dst = out.chunks_exact_mut(bytes);
    for frame in mix.chunks_exact(2) {
        let (l, r) = (frame[0], frame[1]);
        if stereo {
            for (value, slot) in [l, r].into_iter().zip(dst.by_ref()) {
                write_sample(value, slot, depth);
            }
        } else if let Some(slot) = dst.next() {
            write_sample((l + r) >> 1, slot, depth);
        }
    }
}

#[inline]
fn write_sample(acc: i32, slot: &mut [u8], depth: BitDepth) {
    match depth {
        BitDepth::Bits8 => slot[0] = ((acc >> 20) + 0x80) as u8,
        BitDepth::Bits16 => slot.copy_from_slice(&((acc >> 12) as i16).to_le_bytes()),
        BitDepth::Bits24 => slot.copy_from_slice(&(acc >> 4).to_le_bytes()[..3]),
        BitDepth::Bits32 => slot.copy_from_slice(&(acc << 4).to_le_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_conversions() {
        let mix = [CLIP_MAX, CLIP_MIN, 1 << 12, -(1 << 12)];
        let mut out = [0u8; 4];
        convert(&mix[..2], &mut out[..2], BitDepth::Bits8, true);
        assert_eq!(&out[..2], &[0xFF, 0x00]);

        let mut out = [0u8; 8];
        convert(&mix, &mut out, BitDepth::Bits16, true);
        assert_eq!(out, [0xFF, 0x7F, 0x00, 0x80, 0x01, 0x00, 0xFF, 0xFF]);

        let mut out = [0u8; 6];
        convert(&mix[..2], &mut out, BitDepth::Bits24, true);
        assert_eq!(out, [0xFF, 0xFF, 0x7F, 0x00, 0x00, 0x80]);

        let mut out = [0u8; 4];
        convert(&mix[2..3].repeat(2), &mut out, BitDepth::Bits32, false);
        assert_eq!(i32::from_le_bytes(out), 1 << 16);
    }

    #[test]
    fn mono_folds_both_sides() {
        let mut out = [0u8; 2];
        convert(&[3 << 12, 1 << 12], &mut out, BitDepth::Bits16, false);
        assert_eq!(i16::from_le_bytes(out), 2);
    }

    #[test]
    fn vu_spans_forty_db() {
        assert_eq!(vu_level(0), 0);
        assert_eq!(vu_level(CLIP_MAX), 128);
        assert!((63..=64).contains(&vu_level(CLIP_MAX / 10)));
        assert_eq!(vu_level(CLIP_MAX / 1000), 0);
    }
}
