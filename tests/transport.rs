//! Transport control against whole songs.

use tm_engine::{Engine, MixerConfig, TransportError, TransportState};
use tm_ir::{OrderEntry, Pattern, Song};
use tm_master::{chip, sweep};

const TICK: usize = 960;

fn render(engine: &mut Engine, frames: usize) -> Vec<u8> {
    let mut out = vec![0u8; frames * engine.frame_bytes()];
    let written = engine.render(&mut out);
    out.truncate(written);
    out
}

/// Two orders of an empty 4-row and 8-row pattern.
fn empty_song() -> Song {
    let mut song = Song::with_channels("empty", 2);
    song.patterns = vec![Pattern::new(4, 2), Pattern::new(8, 2)];
    song.order = vec![OrderEntry::Pattern(0), OrderEntry::Pattern(1)];
    song
}

#[test]
fn restart_after_stop_is_bit_identical() {
    let mut engine = Engine::new(chip(), MixerConfig::default()).unwrap();
    engine.start();
    let first = render(&mut engine, 48000);

    engine.stop();
    assert!(!engine.is_playing());
    engine.start();
    let second = render(&mut engine, 48000);

    assert_eq!(first.len(), second.len());
    assert!(first == second, "restarted render differs");
}

#[test]
fn reinit_with_the_same_config_changes_nothing() {
    let config = MixerConfig::default();
    let mut reference = Engine::new(sweep(), config.clone()).unwrap();
    let mut reconfigured = Engine::new(sweep(), config.clone()).unwrap();
    reference.start();
    reconfigured.start();

    let a = render(&mut reference, 10_000);
    let b = render(&mut reconfigured, 10_000);
    assert!(a == b);

    reconfigured.reinit(config.clone()).unwrap();
    reconfigured.reinit(config).unwrap();
    let a = render(&mut reference, 20_000);
    let b = render(&mut reconfigured, 20_000);
    assert!(a == b, "reinit disturbed playback");
}

#[test]
fn reinit_rescales_ticks_to_the_new_rate() {
    let mut engine = Engine::new(empty_song(), MixerConfig::default()).unwrap();
    engine.start();
    render(&mut engine, 6 * TICK);
    assert_eq!(engine.status().row, 0);

    let config = MixerConfig { sample_rate: 22050, ..MixerConfig::default() };
    engine.reinit(config).unwrap();
    // One row at 22050 Hz is six ticks of 441 frames
    render(&mut engine, 6 * 441);
    assert_eq!(engine.status().row, 1);
    render(&mut engine, 1);
    assert_eq!(engine.status().row, 2);

    let bad = MixerConfig { channels: 3, ..MixerConfig::default() };
    assert!(engine.reinit(bad).is_err());
    assert_eq!(engine.config().sample_rate, 22050);
}

#[test]
fn pause_holds_the_row() {
    let mut engine = Engine::new(empty_song(), MixerConfig::default()).unwrap();
    engine.start();
    render(&mut engine, TICK);
    engine.pause();
    render(&mut engine, 20 * TICK);
    let status = engine.status();
    assert!(status.paused);
    assert_eq!((status.order, status.row), (0, 0));

    engine.resume();
    render(&mut engine, 6 * TICK);
    assert_eq!(engine.status().row, 1);
}

#[test]
fn seek_moves_without_restarting() {
    let mut engine = Engine::new(empty_song(), MixerConfig::default()).unwrap();
    engine.start();
    render(&mut engine, 2 * TICK);
    engine.seek(1, 5).unwrap();
    render(&mut engine, 1);
    let status = engine.status();
    assert_eq!((status.order, status.pattern, status.row), (1, 1, 5));
    assert_eq!(status.state, TransportState::Playing);

    assert_eq!(engine.seek(2, 0), Err(TransportError::Order(2)));
    assert_eq!(engine.seek(0, 4), Err(TransportError::Row { pattern: 0, row: 4 }));
}

#[test]
fn single_step_plays_one_row_then_holds() {
    let mut engine = Engine::new(empty_song(), MixerConfig::default()).unwrap();
    engine.single_step(1, 3).unwrap();
    render(&mut engine, 30 * TICK);
    let status = engine.status();
    assert_eq!(status.state, TransportState::SingleStep);
    assert!(status.paused);
    assert_eq!((status.pattern, status.row), (1, 3));
}

#[test]
fn pattern_loop_wraps_inside_the_pattern() {
    let mut engine = Engine::new(empty_song(), MixerConfig::default()).unwrap();
    engine.loop_pattern(0, 2).unwrap();
    // Rows 2, 3, then back to 0 and 1
    render(&mut engine, 3 * 6 * TICK + 1);
    let status = engine.status();
    assert_eq!(status.state, TransportState::PatternLoop);
    assert_eq!((status.pattern, status.row), (0, 1));
    assert!(engine.is_playing());
}

#[test]
fn stop_position_ends_the_song() {
    let mut engine = Engine::new(empty_song(), MixerConfig::default()).unwrap();
    engine.set_stop_at(Some((1, 2)));
    engine.start();
    let mut out = vec![0u8; 200 * TICK * 4];
    let written = engine.render(&mut out);
    // Four rows of the first pattern and two of the second
    assert_eq!(written, 6 * 6 * TICK * 4);
    assert!(engine.status().finished);
}

#[test]
fn stopped_engine_renders_silence() {
    let config = MixerConfig { bit_depth: tm_engine::BitDepth::Bits8, ..MixerConfig::default() };
    let mut engine = Engine::new(chip(), config).unwrap();
    let mut out = vec![0u8; 512];
    assert_eq!(engine.render(&mut out), 0);
    assert!(out.iter().all(|&b| b == 0x80));
}
