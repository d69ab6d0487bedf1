use crate::audio::device::find_input_device;
use crate::audio::error::{AudioError, AudioResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Microphone capability
///
/// Injected seam over the capture hardware so the pipeline is mockable and
/// portable across hosts. Acquisition happens at `start`; a denied
/// capability surfaces there as [`AudioError::PermissionDenied`]. `stop`
/// releases the hardware. Mute never goes through this trait: a muted
/// pipeline keeps the device acquired and drops slices instead.
pub trait CaptureDevice: Send {
    /// Acquire the microphone and begin capturing
    ///
    /// Captured mono f32 samples are delivered through `sender` in
    /// callback-sized batches. Returns the device's native sample rate.
    ///
    /// # Errors
    /// Returns [`AudioError::PermissionDenied`] if access is denied, or
    /// another `AudioError` if the device cannot be opened.
    fn start(&mut self, sender: mpsc::Sender<Vec<f32>>) -> AudioResult<u32>;

    /// Stop capturing and release the hardware
    ///
    /// Safe to call when not capturing.
    fn stop(&mut self);

    /// Check if the device is currently acquired and capturing
    fn is_capturing(&self) -> bool;
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is owned by exactly one `CpalCaptureDevice` and only
/// ever dropped or queried from whichever thread currently owns that
/// device; it is never accessed concurrently.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Microphone capture via cpal
///
/// Opens the default (or named) input device at its native configuration,
/// downmixes to mono, and forwards samples without blocking the audio
/// thread.
pub struct CpalCaptureDevice {
    /// Optional device id; None selects the host default
    device_id: Option<String>,
    /// The audio input stream (None when stopped)
    stream: Option<SendableStream>,
    /// Native sample rate of the last acquired device
    sample_rate: u32,
}

impl CpalCaptureDevice {
    /// Create a capture device for the host default microphone
    pub fn new() -> Self {
        Self {
            device_id: None,
            stream: None,
            sample_rate: 0,
        }
    }

    /// Create a capture device for a specific input device
    pub fn with_device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            stream: None,
            sample_rate: 0,
        }
    }
}

impl Default for CpalCaptureDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDevice for CpalCaptureDevice {
    fn start(&mut self, sender: mpsc::Sender<Vec<f32>>) -> AudioResult<u32> {
        if self.stream.is_some() {
            warn!("Capture already started");
            return Ok(self.sample_rate);
        }

        let host = cpal::default_host();
        let device = match &self.device_id {
            Some(id) => find_input_device(&host, id)?,
            None => host
                .default_input_device()
                .ok_or(AudioError::DeviceNotFound)?,
        };

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio input device: {}", device_name);

        let config = device.default_input_config()?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels();

        info!("Device config: {} Hz, {} channels", sample_rate, channels);

        let stream_config = StreamConfig {
            channels,
            sample_rate: config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mono = downmix_to_mono(data, channels as usize);
                // try_send so the audio thread never blocks; a full channel
                // drops this batch, which is expected under load
                let _ = sender.try_send(mono);
            },
            move |err| {
                error!("Audio stream error: {}", err);
            },
            None,
        )?;

        stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.stream = Some(SendableStream(stream));
        self.sample_rate = sample_rate;
        info!("Audio capture started");

        Ok(sample_rate)
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            info!("Stopping audio capture");
            drop(stream);
            debug!("Audio capture stopped, device released");
        }
    }

    fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for CpalCaptureDevice {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Mock capture device for tests
///
/// Lets tests inject captured samples by hand and observe whether the
/// hardware capability is currently held, without touching real devices.
pub struct MockCaptureDevice {
    sample_rate: u32,
    deny_permission: bool,
    shared: std::sync::Arc<MockCaptureShared>,
}

#[derive(Default)]
struct MockCaptureShared {
    acquired: std::sync::atomic::AtomicBool,
    sender: std::sync::Mutex<Option<mpsc::Sender<Vec<f32>>>>,
}

/// Test-side handle onto a [`MockCaptureDevice`]
#[derive(Clone)]
pub struct MockCaptureHandle {
    shared: std::sync::Arc<MockCaptureShared>,
}

impl MockCaptureDevice {
    /// Create a mock capturing at the given native rate
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            deny_permission: false,
            shared: std::sync::Arc::new(MockCaptureShared::default()),
        }
    }

    /// Make `start` fail as if the host denied microphone access
    pub fn deny_permission(mut self) -> Self {
        self.deny_permission = true;
        self
    }

    /// Get a handle for feeding samples and inspecting acquisition
    pub fn handle(&self) -> MockCaptureHandle {
        MockCaptureHandle {
            shared: std::sync::Arc::clone(&self.shared),
        }
    }
}

impl MockCaptureHandle {
    /// Whether the mock currently holds the capture capability
    pub fn is_acquired(&self) -> bool {
        self.shared
            .acquired
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Inject a batch of captured samples; returns false if not capturing
    pub async fn feed(&self, samples: Vec<f32>) -> bool {
        let sender = self.shared.sender.lock().unwrap().clone();
        match sender {
            Some(tx) => tx.send(samples).await.is_ok(),
            None => false,
        }
    }
}

impl CaptureDevice for MockCaptureDevice {
    fn start(&mut self, sender: mpsc::Sender<Vec<f32>>) -> AudioResult<u32> {
        if self.deny_permission {
            return Err(AudioError::PermissionDenied("denied by test".to_string()));
        }
        *self.shared.sender.lock().unwrap() = Some(sender);
        self.shared
            .acquired
            .store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(self.sample_rate)
    }

    fn stop(&mut self) {
        *self.shared.sender.lock().unwrap() = None;
        self.shared
            .acquired
            .store(false, std::sync::atomic::Ordering::SeqCst);
    }

    fn is_capturing(&self) -> bool {
        self.shared
            .acquired
            .load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Average interleaved channels down to mono
fn downmix_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }

    data.chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
