//! Allocation-free render path tests.
//!
//! These tests verify that `Engine::render()` does not allocate once
//! playback is running. They render the demo songs for several seconds to
//! catch allocations triggered by envelopes, new note actions, filters or
//! sample loop edges.
//!
//! Runs under plain `cargo test`; no feature flags needed.

use assert_no_alloc::{assert_no_alloc, AllocDisabler};

#[cfg(debug_assertions)]
#[global_allocator]
static A: AllocDisabler = AllocDisabler;

use tm_engine::{Engine, Interpolation, MixerConfig, Repeat};
use tm_ir::Song;

/// Render `song` for `seconds`, aborting on any heap allocation.
fn assert_render_alloc_free(song: Song, config: MixerConfig, seconds: usize) {
    let frames = config.sample_rate as usize * seconds;
    let mut engine = Engine::new(song, config).unwrap();
    engine.start();
    let mut out = vec![0u8; 1024 * engine.frame_bytes()];

    assert_no_alloc(|| {
        for _ in 0..frames / 1024 {
            engine.render(&mut out);
        }
    });
}

#[test]
fn chip_alloc_free() {
    let config = MixerConfig { repeat: Repeat::Forever, ..MixerConfig::default() };
    assert_render_alloc_free(tm_master::chip(), config, 5);
}

#[test]
fn sweep_alloc_free() {
    assert_render_alloc_free(tm_master::sweep(), MixerConfig::default(), 5);
}

#[test]
fn fir_with_equalizer_alloc_free() {
    let mut config = MixerConfig { interpolation: Interpolation::Fir, voice_limit: 8, ..MixerConfig::default() };
    config.equalizer[0].gain_db = 4.0;
    config.equalizer[3].gain_db = -6.0;
    assert_render_alloc_free(tm_master::chip(), config, 5);
}

#[test]
fn transport_changes_alloc_free() {
    let mut engine = Engine::new(tm_master::chip(), MixerConfig::default()).unwrap();
    let mut out = vec![0u8; 1024 * engine.frame_bytes()];
    // First calls register their log callsites
    engine.start();
    engine.render(&mut out);
    engine.seek(1, 8).unwrap();
    engine.stop();
    engine.start();

    assert_no_alloc(|| {
        for step in 0..200 {
            engine.render(&mut out);
            match step % 50 {
                10 => engine.pause(),
                20 => engine.resume(),
                30 => {
                    let _ = engine.seek(1, 8);
                }
                40 => engine.stop(),
                49 => engine.start(),
                _ => {}
            }
        }
    });
}
