//! Playback behaviour checked through rendered output and transport status.
//!
//! Most songs here use a one-sample setup that routes the sample straight
//! to the left output: hard left pan, full mixing volume, no ramping,
//! nearest-neighbour resampling at the output rate. Under those settings a
//! 16-bit render reproduces the sample values exactly.

use std::sync::{Arc, Mutex};

use tm_engine::{Engine, Interpolation, MixerConfig, PlaybackHooks, Repeat, TransportState, VoiceFlags};
use tm_ir::{
    Cell, Effect, Envelope, Instrument, LoopType, OrderEntry, Pattern, Sample, Song, SongFlags, VolumeCommand,
};

const RATE: u32 = 48000;
/// Frames per tick at tempo 125.
const TICK: usize = 960;

fn exact_config() -> MixerConfig {
    MixerConfig {
        sample_rate: RATE,
        interpolation: Interpolation::Nearest,
        ramping: false,
        ..MixerConfig::default()
    }
}

fn left_sample(pcm: &[i16]) -> Sample {
    let mut sample = Sample::from_pcm16("probe", pcm);
    sample.c5_speed = RATE;
    sample.default_pan = Some(0);
    sample
}

/// A song with `channels` channels, one sample and one pattern per entry of `rows`.
fn song(channels: u8, sample: Sample, rows: &[u16]) -> Song {
    let mut song = Song::with_channels("test", channels);
    song.mixing_volume = 128;
    song.samples = vec![sample];
    song.patterns = rows.iter().map(|&r| Pattern::new(r, channels)).collect();
    song.order = (0..rows.len() as u8).map(OrderEntry::Pattern).collect();
    song
}

fn started(song: Song, config: MixerConfig) -> Engine {
    let mut engine = Engine::new(song, config).unwrap();
    engine.start();
    engine
}

/// Render `frames` frames; returns the bytes written.
fn render_frames(engine: &mut Engine, frames: usize) -> Vec<u8> {
    let mut out = vec![0u8; frames * engine.frame_bytes()];
    let written = engine.render(&mut out);
    out.truncate(written);
    out
}

/// Render until the song stops, returning the number of frames produced.
fn frames_until_end(engine: &mut Engine) -> usize {
    let mut total = 0;
    let mut out = vec![0u8; 4096 * engine.frame_bytes()];
    for _ in 0..10_000 {
        let written = engine.render(&mut out);
        total += written / engine.frame_bytes();
        if written < out.len() {
            return total;
        }
    }
    panic!("song never ended");
}

fn left_channel(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(4).map(|f| i16::from_le_bytes([f[0], f[1]])).collect()
}

fn right_channel(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(4).map(|f| i16::from_le_bytes([f[2], f[3]])).collect()
}

#[test]
fn unity_gain_reproduces_the_sample() {
    let pcm: Vec<i16> = (0..256).map(|i| (i * 200 - 25600) as i16).collect();
    let mut song = song(1, left_sample(&pcm), &[64]);
    *song.patterns[0].cell_mut(0, 0) = Cell::note(60, 1);

    let mut engine = started(song, exact_config());
    let out = render_frames(&mut engine, pcm.len());
    assert_eq!(left_channel(&out), pcm);
    assert!(right_channel(&out).iter().all(|&s| s == 0));
}

#[test]
fn song_end_returns_a_short_render() {
    let mut engine = started(song(1, left_sample(&[0; 16]), &[2]), exact_config());
    let mut out = vec![0xAAu8; 20_000 * 4];
    let written = engine.render(&mut out);

    assert_eq!(written, 2 * 6 * TICK * 4);
    assert!(out[written..].iter().all(|&b| b == 0));
    let status = engine.status();
    assert_eq!(status.state, TransportState::Stopped);
    assert!(status.finished);
    assert_eq!(engine.render(&mut out), 0);
}

#[test]
fn volume_column_sets_final_volume() {
    let mut song = song(1, left_sample(&[1000; 4096]), &[8]);
    let cell = song.patterns[0].cell_mut(0, 0);
    *cell = Cell::note(60, 1);
    cell.volume = VolumeCommand::Volume(32);

    let mut engine = started(song, exact_config());
    render_frames(&mut engine, 16);
    let voice = engine.voice(0).unwrap();
    // 32 * 4 * global 128 * channel 64 * sample 64 >> 13
    assert_eq!(voice.final_volume, 0x2000);
}

#[test]
fn order_list_steps_over_skip_markers() {
    let mut song = song(1, left_sample(&[0; 16]), &[1]);
    song.order = vec![OrderEntry::Skip, OrderEntry::Skip, OrderEntry::Pattern(0), OrderEntry::End, OrderEntry::Pattern(0)];

    let mut engine = started(song, exact_config());
    render_frames(&mut engine, TICK);
    assert_eq!(engine.status().order, 2);
    assert_eq!(engine.status().pattern, 0);
    // Only the single row before the end marker plays
    assert_eq!(TICK + frames_until_end(&mut engine), 6 * TICK);
}

#[test]
fn missing_pattern_ends_the_song() {
    let mut song = song(1, left_sample(&[0; 16]), &[1, 1]);
    song.order = vec![OrderEntry::Pattern(0), OrderEntry::Pattern(9), OrderEntry::Pattern(1)];

    let mut engine = started(song, exact_config());
    assert_eq!(frames_until_end(&mut engine), 6 * TICK);
}

#[test]
fn all_skip_order_list_is_an_immediate_end() {
    let mut song = song(1, left_sample(&[0; 16]), &[1]);
    song.order = vec![OrderEntry::Skip, OrderEntry::Skip];
    let config = MixerConfig { repeat: Repeat::Forever, ..exact_config() };

    let mut engine = started(song, config);
    let mut out = vec![0x11u8; 64];
    assert_eq!(engine.render(&mut out), 0);
    assert!(out.iter().all(|&b| b == 0));
    assert!(engine.status().finished);
}

#[test]
fn repeat_count_replays_the_song() {
    let config = MixerConfig { repeat: Repeat::Times(1), ..exact_config() };
    let mut engine = started(song(1, left_sample(&[0; 16]), &[1]), config);
    assert_eq!(frames_until_end(&mut engine), 2 * 6 * TICK);
}

#[test]
fn pattern_break_lands_on_the_requested_row() {
    let mut song = song(1, left_sample(&[0; 16]), &[4, 4]);
    song.patterns[0].cell_mut(0, 0).effect = Effect::PatternBreak(2);

    let mut engine = started(song, exact_config());
    render_frames(&mut engine, 6 * TICK + 1);
    let status = engine.status();
    assert_eq!((status.order, status.row), (1, 2));
    // Rows played: 0 of the first pattern, then rows 2 and 3 of the second
    assert_eq!(6 * TICK + 1 + frames_until_end(&mut engine), 3 * 6 * TICK);
}

#[test]
fn position_jump_skips_orders() {
    let mut song = song(1, left_sample(&[0; 16]), &[4, 4, 2]);
    song.patterns[0].cell_mut(0, 0).effect = Effect::PositionJump(2);

    let mut engine = started(song, exact_config());
    assert_eq!(frames_until_end(&mut engine), 3 * 6 * TICK);
}

#[test]
fn pattern_loop_repeats_rows() {
    let mut song = song(1, left_sample(&[0; 16]), &[3]);
    song.patterns[0].cell_mut(0, 0).effect = Effect::PatternLoop(0);
    song.patterns[0].cell_mut(1, 0).effect = Effect::PatternLoop(1);

    let mut engine = started(song, exact_config());
    // Rows 0, 1, 0, 1, 2
    assert_eq!(frames_until_end(&mut engine), 5 * 6 * TICK);
}

#[test]
fn note_delay_holds_the_trigger() {
    let mut song = song(1, left_sample(&[1000; 20_000]), &[4]);
    let cell = song.patterns[0].cell_mut(0, 0);
    *cell = Cell::note(60, 1);
    cell.effect = Effect::NoteDelay(3);

    let mut engine = started(song, exact_config());
    let silent = render_frames(&mut engine, 3 * TICK);
    assert_eq!(engine.active_voices(), 0);
    assert!(silent.iter().all(|&b| b == 0));

    let sounding = render_frames(&mut engine, 1);
    assert_eq!(engine.active_voices(), 1);
    assert_eq!(left_channel(&sounding), vec![1000]);
}

#[test]
fn note_cut_silences_on_its_tick() {
    let mut song = song(1, left_sample(&[1000; 20_000]), &[4]);
    let cell = song.patterns[0].cell_mut(0, 0);
    *cell = Cell::note(60, 1);
    cell.effect = Effect::NoteCut(2);

    let mut engine = started(song, exact_config());
    let before = render_frames(&mut engine, 2 * TICK);
    assert!(left_channel(&before).iter().all(|&s| s == 1000));
    assert!(engine.voice(0).unwrap().volume > 0);

    render_frames(&mut engine, 1);
    assert_eq!(engine.voice(0).unwrap().volume, 0);
    assert_eq!(engine.voice(0).unwrap().final_volume, 0);
}

#[test]
fn voice_limit_keeps_the_loudest_voices() {
    let mut song = song(4, left_sample(&[1000; 20_000]), &[8]);
    for (ch, vol) in [64u8, 8, 48, 16].into_iter().enumerate() {
        let cell = song.patterns[0].cell_mut(0, ch as u8);
        *cell = Cell::note(60, 1);
        cell.volume = VolumeCommand::Volume(vol);
    }

    let config = MixerConfig { voice_limit: 2, ..exact_config() };
    let mut engine = started(song, config);
    let out = render_frames(&mut engine, 64);
    assert_eq!(engine.status().voices, 2);
    // Each voice contributes 1000 * vol / 64; only 64 and 48 are mixed
    assert!(left_channel(&out).iter().all(|&s| s == 1750));
}

#[test]
fn stopped_sample_drains_to_silence() {
    let mut song = song(1, left_sample(&[16000; 100]), &[64]);
    *song.patterns[0].cell_mut(0, 0) = Cell::note(60, 1);

    let mut engine = started(song, exact_config());
    let out = left_channel(&render_frames(&mut engine, 4200));
    assert!(out[..100].iter().all(|&s| s == 16000));
    // The level decays instead of stepping to zero
    assert!(out[100] > 15000);
    assert!(out[100..400].windows(2).all(|w| w[1] <= w[0]));
    assert!(out[4100..].iter().all(|&s| s == 0));
}

#[test]
fn muted_channel_is_silent() {
    let mut song = song(2, left_sample(&[1000; 20_000]), &[8]);
    *song.patterns[0].cell_mut(0, 0) = Cell::note(60, 1);
    *song.patterns[0].cell_mut(0, 1) = Cell::note(60, 1);

    let mut engine = started(song, exact_config());
    engine.set_channel_mute(1, true).unwrap();
    let out = render_frames(&mut engine, 32);
    assert!(left_channel(&out).iter().all(|&s| s == 1000));
    assert!(engine.set_channel_mute(5, true).is_err());
}

#[test]
fn tempo_zero_ends_the_song() {
    let mut song = song(1, left_sample(&[1000; 4096]), &[8]);
    *song.patterns[0].cell_mut(0, 0) = Cell::note(60, 1);
    song.initial_tempo = 0;

    let mut engine = started(song, exact_config());
    let mut out = vec![0x55u8; 4096 * 4];
    assert_eq!(engine.render(&mut out), 0);
    assert!(out.iter().all(|&b| b == 0));
    let status = engine.status();
    assert!(status.finished);
    assert_eq!(status.state, TransportState::Stopped);
}

#[test]
fn ping_pong_loop_mirrors_at_both_ends() {
    let pcm: Vec<i16> = (0..16).map(|i| i * 100).collect();
    let sample = left_sample(&pcm).with_loop(4, 16, LoopType::PingPong);
    let mut song = song(1, sample, &[8]);
    *song.patterns[0].cell_mut(0, 0) = Cell::note(60, 1);

    let mut engine = started(song, exact_config());
    let out = left_channel(&render_frames(&mut engine, 40));
    assert_eq!(out[..16], pcm[..]);
    // The last loop frame repeats on the turn, the first one does not
    let backward: Vec<i16> = pcm[4..].iter().rev().copied().collect();
    assert_eq!(out[16..28], backward[..]);
    assert_eq!(out[28..39], pcm[5..]);
    assert_eq!(out[39], 1500);
}

#[test]
fn loop_shorter_than_one_step_plays_once() {
    let pcm: Vec<i16> = (0..64).map(|i| i * 100).collect();
    let mut sample = left_sample(&pcm).with_loop(10, 13, LoopType::Forward);
    // Two frames per output frame
    sample.c5_speed = 2 * RATE;
    let mut song = song(1, sample, &[8]);
    *song.patterns[0].cell_mut(0, 0) = Cell::note(60, 1);

    let mut engine = started(song, exact_config());
    let first = left_channel(&render_frames(&mut engine, 1));
    assert_eq!(first, vec![0]);
    let voice = engine.voice(0).unwrap();
    assert!(!voice.flags.contains(VoiceFlags::LOOP));
    assert_eq!(voice.mix.increment, 2 << 16);

    let rest = left_channel(&render_frames(&mut engine, 31));
    let expected: Vec<i16> = pcm.iter().skip(2).step_by(2).copied().collect();
    assert_eq!(rest, expected);
    render_frames(&mut engine, 8);
    assert_eq!(engine.active_voices(), 0);
}

fn instrument_song(instrument: Instrument) -> Song {
    let mut sample = left_sample(&[1000; 20_000]);
    sample.default_pan = None;
    let mut song = song(1, sample, &[8]);
    song.flags.insert(SongFlags::INSTRUMENT_MODE);
    song.instruments = vec![instrument];
    *song.patterns[0].cell_mut(0, 0) = Cell::note(60, 1);
    song
}

#[test]
fn panning_envelope_moves_toward_the_edge() {
    let mut inst = Instrument::new("right");
    inst.set_single_sample(1);
    inst.panning_envelope = Some(Envelope::from_points(&[(0, 32), (10, 32)]));

    let mut engine = started(instrument_song(inst), exact_config());
    let out = render_frames(&mut engine, 64);
    assert!(left_channel(&out).iter().all(|&s| s == 0));
    assert!(right_channel(&out).iter().all(|&s| s == 1000));
}

#[derive(Clone, Default)]
struct NoteLog(Arc<Mutex<Vec<(u8, u8, Option<u8>, u8)>>>);

impl PlaybackHooks for NoteLog {
    fn note_on(&mut self, channel: u8, midi_channel: u8, program: Option<u8>, note: u8, _velocity: u8) {
        self.0.lock().unwrap().push((channel, midi_channel, program, note));
    }
}

#[test]
fn midi_note_on_carries_the_program() {
    let mut inst = Instrument::new("midi");
    inst.set_single_sample(1);
    inst.midi_channel = Some(3);
    inst.midi_program = Some(42);

    let log = NoteLog::default();
    let mut engine = Engine::new(instrument_song(inst), exact_config()).unwrap();
    engine.set_hooks(Box::new(log.clone()));
    engine.start();
    render_frames(&mut engine, 16);
    assert_eq!(*log.0.lock().unwrap(), vec![(0, 3, Some(42), 60)]);
}
