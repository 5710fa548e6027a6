//! Output sample formats, checked with a sample routed unchanged to the left side.

use tm_engine::{BitDepth, Engine, Interpolation, MixerConfig};
use tm_ir::{Cell, OrderEntry, Pattern, Sample, Song};

const PROBE: [i16; 8] = [0, 256, -256, 12800, -12800, 32512, -32768, 1024];

fn probe_song() -> Song {
    let mut sample = Sample::from_pcm16("probe", &PROBE);
    sample.c5_speed = 48000;
    sample.default_pan = Some(0);

    let mut song = Song::with_channels("probe", 1);
    song.mixing_volume = 128;
    song.samples = vec![sample];
    let mut pattern = Pattern::new(16, 1);
    *pattern.cell_mut(0, 0) = Cell::note(60, 1);
    song.patterns = vec![pattern];
    song.order = vec![OrderEntry::Pattern(0)];
    song
}

fn render_probe(bit_depth: BitDepth, channels: u8) -> Vec<u8> {
    let config = MixerConfig {
        bit_depth,
        channels,
        interpolation: Interpolation::Nearest,
        ramping: false,
        ..MixerConfig::default()
    };
    let mut engine = Engine::new(probe_song(), config).unwrap();
    engine.start();
    let mut out = vec![0u8; PROBE.len() * engine.frame_bytes()];
    assert_eq!(engine.render(&mut out), out.len());
    out
}

#[test]
fn eight_bit_is_offset_binary() {
    let out = render_probe(BitDepth::Bits8, 2);
    let left: Vec<u8> = out.chunks_exact(2).map(|f| f[0]).collect();
    let expected: Vec<u8> = PROBE.iter().map(|&s| ((s >> 8) + 0x80) as u8).collect();
    assert_eq!(left, expected);
    assert!(out.chunks_exact(2).all(|f| f[1] == 0x80));
}

#[test]
fn twenty_four_bit_is_packed() {
    let out = render_probe(BitDepth::Bits24, 2);
    for (frame, &s) in out.chunks_exact(6).zip(&PROBE) {
        let left = i32::from_le_bytes([0, frame[0], frame[1], frame[2]]) >> 8;
        assert_eq!(left, (s as i32) << 8);
        assert_eq!(&frame[3..], &[0, 0, 0]);
    }
}

#[test]
fn thirty_two_bit_fills_the_word() {
    let out = render_probe(BitDepth::Bits32, 2);
    for (frame, &s) in out.chunks_exact(8).zip(&PROBE) {
        let left = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        assert_eq!(left, (s as i32) << 16);
    }
}

#[test]
fn mono_averages_both_sides() {
    let out = render_probe(BitDepth::Bits16, 1);
    let mono: Vec<i16> = out.chunks_exact(2).map(|f| i16::from_le_bytes([f[0], f[1]])).collect();
    let expected: Vec<i16> = PROBE.iter().map(|&s| s >> 1).collect();
    assert_eq!(mono, expected);
}

#[test]
fn empty_song_is_silent_in_every_format() {
    let mut song = Song::with_channels("silent", 4);
    song.patterns = vec![Pattern::new(64, 4)];
    song.order = vec![OrderEntry::Pattern(0)];

    for bit_depth in [BitDepth::Bits8, BitDepth::Bits16, BitDepth::Bits24, BitDepth::Bits32] {
        for channels in [1, 2] {
            for interpolation in Interpolation::ALL {
                let config = MixerConfig { bit_depth, channels, interpolation, ..MixerConfig::default() };
                let mut engine = Engine::new(song.clone(), config).unwrap();
                engine.start();
                let mut out = vec![0x55u8; 4096 * engine.frame_bytes()];
                assert_eq!(engine.render(&mut out), out.len());
                assert!(
                    out.iter().all(|&b| b == bit_depth.silence()),
                    "{bit_depth:?} x{channels} {interpolation:?}"
                );
            }
        }
    }
}
