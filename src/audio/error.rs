use thiserror::Error;

/// Audio-related errors
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio device found
    #[error("No audio device found")]
    DeviceNotFound,

    /// Microphone access denied by the host
    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    /// Failed to build audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildFailed(String),

    /// Audio stream error
    #[error("Audio stream error: {0}")]
    StreamError(String),

    /// Resampling failed
    #[error("Resampling failed: {0}")]
    ResampleFailed(String),

    /// One inbound chunk could not be decoded
    #[error("Failed to decode audio chunk: {0}")]
    DecodeFailed(String),

    /// Device name is invalid
    #[error("Device name is invalid UTF-8")]
    InvalidDeviceName,

    /// Failed to get device configuration
    #[error("Failed to get device configuration: {0}")]
    ConfigError(String),

    /// cpal error
    #[error("cpal error: {0}")]
    CpalError(#[from] cpal::DevicesError),

    /// Default config error
    #[error("Default config error: {0}")]
    DefaultConfigError(#[from] cpal::DefaultStreamConfigError),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;

impl From<cpal::BuildStreamError> for AudioError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => {
                AudioError::PermissionDenied("device not available".to_string())
            }
            other => AudioError::StreamBuildFailed(other.to_string()),
        }
    }
}
