//! Audio output trait and error types.

/// Error type for audio operations.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no audio output device available")]
    NoDevice,
    #[error("device configuration: {0}")]
    DeviceConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("stream create: {0}")]
    StreamCreate(#[from] cpal::BuildStreamError),
    #[error("stream start: {0}")]
    Play(#[from] cpal::PlayStreamError),
    #[error("stream pause: {0}")]
    Pause(#[from] cpal::PauseStreamError),
    #[error("no stream has been built")]
    NoStream,
}

/// Trait for audio output backends.
pub trait AudioOutput {
    /// Device rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Device channels per frame.
    fn channels(&self) -> u16;

    /// Start playback.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Stop playback.
    fn stop(&mut self) -> Result<(), AudioError>;
}
