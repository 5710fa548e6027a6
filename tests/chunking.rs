//! Output must not depend on how the caller slices its buffers.

use proptest::prelude::*;
use tm_engine::{Engine, MixerConfig};

const FRAMES: usize = 30_000;

fn render_in_chunks(chunks: &[usize]) -> Vec<u8> {
    let mut engine = Engine::new(tm_master::chip(), MixerConfig::default()).unwrap();
    engine.start();
    let frame_bytes = engine.frame_bytes();

    let mut pcm = Vec::with_capacity(FRAMES * frame_bytes);
    let mut sizes = chunks.iter().cycle();
    while pcm.len() < FRAMES * frame_bytes {
        let frames = (*sizes.next().unwrap()).min(FRAMES - pcm.len() / frame_bytes);
        let mut out = vec![0u8; frames * frame_bytes];
        let written = engine.render(&mut out);
        assert_eq!(written, out.len());
        pcm.extend_from_slice(&out);
    }
    pcm
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn chunk_sizes_do_not_change_output(chunks in prop::collection::vec(1usize..3000, 1..8)) {
        let reference = render_in_chunks(&[FRAMES]);
        let chunked = render_in_chunks(&chunks);
        prop_assert!(reference == chunked);
    }
}
