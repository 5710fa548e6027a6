//! CPAL-based audio output backend.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::traits::Producer;
use ringbuf::HeapProd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tm_engine::{BitDepth, Engine, PlaybackStatus};
use tracing::{debug, error, trace};

use crate::traits::{AudioError, AudioOutput};

/// Frames rendered per engine lock inside the callback.
const CHUNK_FRAMES: usize = 1024;

/// Largest engine frame: stereo 32-bit.
const MAX_FRAME_BYTES: usize = 8;

/// CPAL-based audio output.
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    running: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl CpalOutput {
    /// Open the default output device in stereo at its default rate.
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let mut config: StreamConfig = device.default_output_config()?.into();
        // The callback writes stereo pairs
        config.channels = 2;
        debug!(rate = config.sample_rate.0, "opened output device");

        Ok(Self {
            device,
            config,
            stream: None,
            running: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Set once the engine rendered short, meaning the song ended.
    pub fn finished_flag(&self) -> Arc<AtomicBool> {
        self.finished.clone()
    }

    /// Build the stream. The callback pulls audio from `engine` under its
    /// lock and publishes a status snapshot after every callback.
    pub fn build_stream(
        &mut self,
        engine: Arc<Mutex<Engine>>,
        mut status: HeapProd<PlaybackStatus>,
    ) -> Result<(), AudioError> {
        let running = self.running.clone();
        let finished = self.finished.clone();
        let device_channels = self.config.channels as usize;
        let mut scratch = vec![0u8; CHUNK_FRAMES * MAX_FRAME_BYTES];

        let stream = self.device.build_output_stream(
            &self.config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if !running.load(Ordering::Relaxed) || finished.load(Ordering::Relaxed) {
                    data.fill(0.0);
                    return;
                }

                let mut engine = engine.lock();
                let (depth, engine_channels) = (engine.config().bit_depth, engine.config().channels as usize);
                let frame_bytes = engine.frame_bytes();
                for chunk in data.chunks_mut(CHUNK_FRAMES * device_channels) {
                    let wanted = chunk.len() / device_channels * frame_bytes;
                    let got = engine.render(&mut scratch[..wanted]);
                    pcm_to_f32(&scratch[..wanted], depth, engine_channels, chunk, device_channels);
                    if got < wanted {
                        finished.store(true, Ordering::Relaxed);
                    }
                }
                publish_status(&mut status, engine.status());
            },
            |err| error!(%err, "audio stream error"),
            None,
        )?;

        self.stream = Some(stream);
        Ok(())
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn channels(&self) -> u16 {
        self.config.channels
    }

    fn start(&mut self) -> Result<(), AudioError> {
        let stream = self.stream.as_ref().ok_or(AudioError::NoStream)?;
        self.finished.store(false, Ordering::Relaxed);
        self.running.store(true, Ordering::Relaxed);
        stream.play()?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(stream) = &self.stream {
            stream.pause()?;
        }
        Ok(())
    }
}

/// Decode engine output bytes into device samples.
///
/// Mono sources are copied to both device channels; device channels past
/// the second are zeroed.
pub fn pcm_to_f32(
    pcm: &[u8],
    depth: BitDepth,
    source_channels: usize,
    out: &mut [f32],
    device_channels: usize,
) {
    let bytes = depth.bytes();
    let frames = pcm.chunks_exact(bytes * source_channels);
    for (frame, dst) in frames.zip(out.chunks_mut(device_channels)) {
        let left = decode(&frame[..bytes], depth);
        let right = if source_channels > 1 { decode(&frame[bytes..2 * bytes], depth) } else { left };
        for (i, sample) in dst.iter_mut().enumerate() {
            *sample = match i {
                0 => left,
                1 => right,
                _ => 0.0,
            };
        }
    }
}

fn decode(bytes: &[u8], depth: BitDepth) -> f32 {
    match depth {
        BitDepth::Bits8 => (bytes[0] as f32 - 128.0) / 128.0,
        BitDepth::Bits16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32768.0,
        BitDepth::Bits24 => {
            let v = i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8;
            v as f32 / 8_388_608.0
        }
        BitDepth::Bits32 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32 / 2_147_483_648.0,
    }
}

/// Offer a status snapshot to the controller. The queue is lossy: when the
/// controller falls behind the snapshot is dropped.
fn publish_status(queue: &mut HeapProd<PlaybackStatus>, snapshot: PlaybackStatus) -> bool {
    let pushed = queue.try_push(snapshot).is_ok();
    if !pushed {
        trace!(row = snapshot.row, "status queue full, snapshot dropped");
    }
    pushed
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::{Consumer, Split};
    use ringbuf::HeapRb;

    #[test]
    fn full_status_queue_drops_snapshots() {
        let (mut prod, mut cons) = HeapRb::<PlaybackStatus>::new(1).split();
        let first = PlaybackStatus { row: 1, ..PlaybackStatus::default() };
        let second = PlaybackStatus { row: 2, ..PlaybackStatus::default() };
        assert!(publish_status(&mut prod, first));
        assert!(!publish_status(&mut prod, second));
        assert_eq!(cons.try_pop(), Some(first));
        assert_eq!(cons.try_pop(), None);
    }

    #[test]
    fn decodes_every_depth() {
        assert_eq!(decode(&[0x80], BitDepth::Bits8), 0.0);
        assert_eq!(decode(&[0x00], BitDepth::Bits8), -1.0);
        assert_eq!(decode(&[0x00, 0x40], BitDepth::Bits16), 0.5);
        assert_eq!(decode(&[0x00, 0x00, 0xC0], BitDepth::Bits24), -0.5);
        assert_eq!(decode(&[0, 0, 0, 0x40], BitDepth::Bits32), 0.5);
    }

    #[test]
    fn mono_is_duplicated_and_extra_channels_zeroed() {
        let pcm = [0x00, 0x40];
        let mut out = [9.0f32; 3];
        pcm_to_f32(&pcm, BitDepth::Bits16, 1, &mut out, 3);
        assert_eq!(out, [0.5, 0.5, 0.0]);
    }

    #[test]
    fn silence_bytes_decode_to_zero() {
        let pcm = [0x80u8; 4];
        let mut out = [1.0f32; 4];
        pcm_to_f32(&pcm, BitDepth::Bits8, 2, &mut out, 2);
        assert_eq!(out, [0.0; 4]);
    }
}
