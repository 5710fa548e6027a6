//! Built-in songs for trying the engine without a file loader.

use tm_ir::{
    Cell, Effect, Envelope, EnvelopeRange, Instrument, LoopType, NewNoteAction, Note, OrderEntry,
    Pattern, Sample, Song, SongFlags, VolumeCommand,
};

/// Names accepted by [`demo`].
pub const DEMO_NAMES: [&str; 2] = ["chip", "sweep"];

/// Build a demo song by name.
pub fn demo(name: &str) -> Option<Song> {
    match name {
        "chip" => Some(chip()),
        "sweep" => Some(sweep()),
        _ => None,
    }
}

fn square() -> Sample {
    let pcm: Vec<i8> = (0..32).map(|i| if i < 16 { 96 } else { -96 }).collect();
    Sample::from_pcm8("square", &pcm).with_loop(0, 32, LoopType::Forward)
}

fn saw(kind: LoopType) -> Sample {
    let pcm: Vec<i16> = (0..64).map(|i| (i * 1024 - 32768) as i16).collect();
    let mut sample = Sample::from_pcm16("saw", &pcm).with_loop(0, 64, kind);
    sample.c5_speed = 8363 * 2;
    sample
}

fn sine() -> Sample {
    let pcm: Vec<i16> = (0..64)
        .map(|i| ((i as f64 * std::f64::consts::TAU / 64.0).sin() * 24000.0) as i16)
        .collect();
    let mut sample = Sample::from_pcm16("sine", &pcm).with_loop(0, 64, LoopType::Forward);
    sample.c5_speed = 8363 * 2;
    sample
}

/// Decaying noise burst.
fn noise() -> Sample {
    const LEN: i32 = 2400;
    let mut seed = 0x2545_f491u32;
    let pcm: Vec<i8> = (0..LEN)
        .map(|i| {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
            let raw = (seed >> 24) as i8 as i32;
            (raw * (LEN - i) / LEN) as i8
        })
        .collect();
    Sample::from_pcm8("noise", &pcm)
}

fn instrument(name: &str, sample: u8) -> Instrument {
    let mut inst = Instrument::new(name);
    inst.set_single_sample(sample);
    inst
}

/// Four channels: lead, bass, drums and a filtered pad.
pub fn chip() -> Song {
    let mut song = Song::with_channels("chip", 4);
    song.flags |= SongFlags::INSTRUMENT_MODE;
    song.samples = vec![square(), saw(LoopType::Forward), noise(), sine()];

    let mut lead = instrument("lead", 1);
    let mut env = Envelope::from_points(&[(0, 64), (4, 48), (12, 40), (40, 0)]);
    env.sustain = Some(EnvelopeRange { start: 2, end: 2 });
    lead.volume_envelope = Some(env);
    lead.fadeout = 256;
    lead.new_note_action = NewNoteAction::Fade;

    let mut pad = instrument("pad", 4);
    pad.filter_cutoff = Some(80);
    pad.filter_resonance = Some(24);
    pad.default_pan = Some(48);

    song.instruments = vec![lead, instrument("bass", 2), instrument("drum", 3), pad];

    let melody = [60u8, 64, 67, 72, 71, 67, 64, 62];
    let bass = [36u8, 41, 43, 39];
    song.patterns = (0..2u8)
        .map(|n| {
            let shift = n * 5;
            let mut p = Pattern::new(32, 4);
            for (i, &note) in melody.iter().enumerate() {
                let row = i as u16 * 4;
                *p.cell_mut(row, 0) = Cell::note(note + shift, 1);
                p.cell_mut(row + 2, 0).effect = Effect::Vibrato { speed: 6, depth: 4 };
            }
            p.cell_mut(30, 0).note = Note::Off;
            for (i, &note) in bass.iter().enumerate() {
                let row = i as u16 * 8;
                let cell = p.cell_mut(row, 1);
                *cell = Cell::note(note + shift, 2);
                cell.volume = VolumeCommand::Volume(48);
                p.cell_mut(row + 4, 1).effect = Effect::Arpeggio { x: 0, y: 7 };
            }
            for row in (0..32).step_by(4) {
                let cell = p.cell_mut(row, 2);
                *cell = Cell::note(60, 3);
                if row % 8 == 4 {
                    cell.volume = VolumeCommand::Volume(32);
                }
            }
            *p.cell_mut(0, 3) = Cell::note(48 + shift, 4);
            let glide = p.cell_mut(16, 3);
            *glide = Cell::note(55 + shift, 0);
            glide.effect = Effect::TonePorta(8);
            p.cell_mut(24, 3).effect = Effect::VolumeSlide(0x02);
            p
        })
        .collect();
    song.order = vec![OrderEntry::Pattern(0), OrderEntry::Pattern(1), OrderEntry::Pattern(0), OrderEntry::End];
    song
}

/// One held ping-pong saw under a resonant filter envelope.
pub fn sweep() -> Song {
    let mut song = Song::with_channels("sweep", 1);
    song.flags |= SongFlags::INSTRUMENT_MODE;
    song.samples = vec![saw(LoopType::PingPong)];

    let mut inst = instrument("sweep", 1);
    inst.pitch_envelope = Some(Envelope::from_points(&[(0, -32), (96, 24), (192, -16)]));
    inst.pitch_is_filter = true;
    inst.filter_cutoff = Some(64);
    inst.filter_resonance = Some(96);
    inst.fadeout = 128;
    song.instruments = vec![inst];

    let mut p = Pattern::new(64, 1);
    *p.cell_mut(0, 0) = Cell::note(48, 1);
    p.cell_mut(32, 0).effect = Effect::Panbrello { speed: 4, depth: 12 };
    p.cell_mut(48, 0).note = Note::Off;
    song.patterns = vec![p];
    song.order = vec![OrderEntry::Pattern(0)];
    song
}
