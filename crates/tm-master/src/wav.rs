//! WAV encoding for engine output in any of its PCM formats.

use std::io::Write;

/// Layout of the PCM bytes being wrapped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WavSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl WavSpec {
    fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }
}

/// Write a canonical 44-byte header followed by `pcm`.
///
/// `pcm` is used as is: unsigned for 8-bit, signed little endian otherwise,
/// which is what the engine renders.
pub fn write_wav(w: &mut impl Write, pcm: &[u8], spec: WavSpec) -> std::io::Result<()> {
    let data_size = pcm.len() as u32;
    write_riff_header(w, data_size)?;
    write_fmt_chunk(w, spec)?;
    w.write_all(b"data")?;
    w.write_all(&data_size.to_le_bytes())?;
    w.write_all(pcm)
}

pub fn pcm_to_wav(pcm: &[u8], spec: WavSpec) -> Vec<u8> {
    let mut buf = Vec::with_capacity(44 + pcm.len());
    // Writes into a Vec cannot fail.
    let _ = write_wav(&mut buf, pcm, spec);
    buf
}

fn write_riff_header(w: &mut impl Write, data_size: u32) -> std::io::Result<()> {
    w.write_all(b"RIFF")?;
    w.write_all(&(36 + data_size).to_le_bytes())?;
    w.write_all(b"WAVE")
}

fn write_fmt_chunk(w: &mut impl Write, spec: WavSpec) -> std::io::Result<()> {
    let block_align = spec.block_align();
    w.write_all(b"fmt ")?;
    w.write_all(&16u32.to_le_bytes())?;
    // PCM
    w.write_all(&1u16.to_le_bytes())?;
    w.write_all(&spec.channels.to_le_bytes())?;
    w.write_all(&spec.sample_rate.to_le_bytes())?;
    w.write_all(&(spec.sample_rate * block_align as u32).to_le_bytes())?;
    w.write_all(&block_align.to_le_bytes())?;
    w.write_all(&spec.bits_per_sample.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u16_at(buf: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([buf[at], buf[at + 1]])
    }

    fn u32_at(buf: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
    }

    #[test]
    fn header_describes_24_bit_mono() {
        let pcm = [1u8, 2, 3, 4, 5, 6];
        let spec = WavSpec { sample_rate: 44100, channels: 1, bits_per_sample: 24 };
        let wav = pcm_to_wav(&pcm, spec);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32_at(&wav, 4), 36 + 6);
        assert_eq!(&wav[8..16], b"WAVEfmt ");
        assert_eq!(u16_at(&wav, 22), 1);
        assert_eq!(u32_at(&wav, 24), 44100);
        assert_eq!(u32_at(&wav, 28), 44100 * 3);
        assert_eq!(u16_at(&wav, 32), 3);
        assert_eq!(u16_at(&wav, 34), 24);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32_at(&wav, 40), 6);
        assert_eq!(&wav[44..], &pcm);
    }
}
