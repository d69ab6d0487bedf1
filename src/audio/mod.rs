/// Audio capture and streaming
pub mod capture;

/// Audio device enumeration and management
pub mod device;

/// Audio-related error types
pub mod error;

/// Speaker output capability
pub mod output;

/// Outbound capture pipeline
pub mod pipeline;

/// Inbound playback queue
pub mod playback;

/// Audio resampling
pub mod resampler;

// Re-export commonly used types
pub use capture::{CaptureDevice, CpalCaptureDevice, MockCaptureDevice, MockCaptureHandle};
pub use device::{AudioDevice, list_input_devices, list_output_devices};
pub use error::{AudioError, AudioResult};
pub use output::{AudioOutput, CpalAudioOutput, MockAudioOutput};
pub use pipeline::CapturePipeline;
pub use playback::PlaybackQueue;
pub use resampler::AudioResampler;
