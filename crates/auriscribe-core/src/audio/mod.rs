//! Audio capture and voice activity detection.
//!
//! ```text
//! AudioCapture (cpal + rubato) -> 16kHz mono frames -> VadProcessor -> host chunk queue
//! ```

mod capture;
mod devices;
pub mod error;
mod types;
mod vad;

pub use capture::{AudioCapture, FRAME_SAMPLES, TARGET_SAMPLE_RATE};
pub use devices::list_audio_devices;
pub use error::AudioError;
pub use types::AudioDeviceInfo;
pub use vad::{VadConfig, VadProcessor, VadResult, VadState};
