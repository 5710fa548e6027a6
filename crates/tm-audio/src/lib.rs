//! Audio output backends for trakmix.

mod cpal_backend;
mod traits;

pub use cpal_backend::{pcm_to_f32, CpalOutput};
pub use traits::{AudioError, AudioOutput};
