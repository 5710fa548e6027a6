//! trakmix CLI: play or export a built-in demo song.
//!
//! Usage:
//!   tm-cli [chip|sweep] [--wav output.wav] [--config mixer.toml]
//!          [--rate HZ] [--bits 8|16|24|32] [--mono] [--interp MODE]
//!          [--voices N] [--seconds N] [--order N]
//!
//! Logging follows `RUST_LOG` (default `info`).

use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use std::{env, fs};

use tm_engine::{BitDepth, Interpolation, TransportState};
use tm_master::{demo, Player, PlayerConfig, DEMO_NAMES};
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let flag = |name: &str| args.iter().position(|a| a == name).and_then(|i| args.get(i + 1)).cloned();

    let name = args.first().filter(|a| !a.starts_with("--")).map_or("chip", String::as_str);
    let song = demo(name).unwrap_or_else(|| {
        eprintln!("Unknown demo {name:?}; available: {}", DEMO_NAMES.join(", "));
        std::process::exit(1);
    });

    let mut config = match flag("--config") {
        Some(path) => PlayerConfig::load(Path::new(&path)).unwrap_or_else(|e| fail(&format!("Failed to load {path}"), e)),
        None => PlayerConfig::default(),
    };
    if let Some(rate) = flag("--rate") {
        config.mixer.sample_rate = parse(&rate, "--rate");
    }
    if let Some(bits) = flag("--bits") {
        config.mixer.bit_depth =
            BitDepth::try_from(parse::<u8>(&bits, "--bits")).unwrap_or_else(|e| fail("Bad --bits", e));
    }
    if args.iter().any(|a| a == "--mono") {
        config.mixer.channels = 1;
    }
    if let Some(mode) = flag("--interp") {
        config.mixer.interpolation = Interpolation::from_str(&mode).unwrap_or_else(|e| fail("Bad --interp", e));
    }
    if let Some(voices) = flag("--voices") {
        config.mixer.voice_limit = parse(&voices, "--voices");
    }
    if let Some(seconds) = flag("--seconds") {
        config.render.max_seconds = parse(&seconds, "--seconds");
    }
    let order = flag("--order").map_or(0, |o| parse::<usize>(&o, "--order"));
    debug!(demo = name, ?config, "configuration resolved");

    println!("Title:    {}", song.title);
    println!("Channels: {}", song.channels.len());
    println!("Patterns: {}", song.patterns.len());
    println!("Orders:   {}", song.order.len());
    println!("Tempo:    {} BPM, Speed: {}", song.initial_tempo, song.initial_speed);
    println!();

    let max_seconds = config.render.max_seconds;
    let mut player = Player::new(song, config.mixer).unwrap_or_else(|e| fail("Bad mixer configuration", e));
    match flag("--wav") {
        Some(wav) => render_to_wav(&player, &wav, max_seconds),
        None => play_audio(&mut player, order),
    }
}

fn play_audio(player: &mut Player, order: usize) {
    player.play(order).unwrap_or_else(|e| fail("Playback failed", e));
    println!("Playing...");
    println!();

    while player.is_playing() {
        let status = player.status();
        if status.state != TransportState::Stopped {
            print!(
                "\rOrd: {:02X} | Pat: {:02X} | Row: {:02X} | Voices: {:3} | VU {:3}/{:3}",
                status.order, status.pattern, status.row, status.voices, status.vu_left, status.vu_right
            );
            let _ = std::io::stdout().flush();
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    let _ = player.stop();

    println!("\rDone.{:60}", "");
}

fn render_to_wav(player: &Player, path: &str, max_seconds: u32) {
    println!("Rendering to {path} (at most {max_seconds} s)...");

    let wav = player.render_to_wav(max_seconds).unwrap_or_else(|e| fail("Render failed", e));
    println!("Rendered {} bytes", wav.len());

    fs::write(path, &wav).unwrap_or_else(|e| fail(&format!("Failed to write {path}"), e));
    println!("Done.");
}

fn parse<T: FromStr>(value: &str, flag: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        eprintln!("Bad value for {flag}: {value}");
        std::process::exit(1);
    })
}

fn fail(what: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("{what}: {err}");
    std::process::exit(1);
}
