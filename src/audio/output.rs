use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    HeapRb,
    traits::{Consumer, Producer, Split},
};
use tokio::sync::{Mutex, Notify};
use tracing::{error, info};

use crate::audio::device::find_output_device;
use crate::audio::error::{AudioError, AudioResult};

/// Audio output capability
///
/// Injected seam over the playback hardware. `play` submits one decoded
/// chunk and resolves only once the chunk has finished rendering, which is
/// what gives the playback queue its strict serial ordering.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Render one chunk of mono i16 PCM to completion
    ///
    /// # Errors
    /// Returns `AudioError` if the chunk cannot be submitted
    async fn play(&self, samples: Vec<i16>) -> AudioResult<()>;

    /// Sample rate this output renders at
    fn sample_rate(&self) -> u32;
}

/// Wrapper for cpal::Stream to make it Send + Sync.
///
/// SAFETY: after construction the stream is never touched again; it is
/// only held to keep the callback alive and dropped by the owning
/// `CpalAudioOutput`, so no concurrent access can occur.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}
unsafe impl Sync for SendableStream {}

/// Speaker playback via cpal
///
/// Keeps one long-lived output stream whose callback pulls samples from a
/// lock-free ring buffer. `play` pushes a chunk into the buffer and awaits
/// until the callback has consumed it, so chunks render strictly one at a
/// time.
pub struct CpalAudioOutput {
    producer: Mutex<ringbuf::HeapProd<i16>>,
    /// Samples pushed but not yet rendered; isize because pushes and the
    /// callback's subtraction race benignly
    pending: Arc<AtomicIsize>,
    drained: Arc<Notify>,
    sample_rate: u32,
    _stream: SendableStream,
}

impl CpalAudioOutput {
    /// Open the host default output device at the given sample rate
    ///
    /// # Errors
    /// Returns `AudioError` if no output device exists or the stream
    /// cannot be built at the requested rate.
    pub fn new(sample_rate: u32) -> AudioResult<Self> {
        Self::build(sample_rate, None)
    }

    /// Open a specific output device at the given sample rate
    pub fn with_device(sample_rate: u32, device_id: impl Into<String>) -> AudioResult<Self> {
        Self::build(sample_rate, Some(device_id.into()))
    }

    fn build(sample_rate: u32, device_id: Option<String>) -> AudioResult<Self> {
        let host = cpal::default_host();
        let device = match &device_id {
            Some(id) => find_output_device(&host, id)?,
            None => host
                .default_output_device()
                .ok_or(AudioError::DeviceNotFound)?,
        };

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio output device: {}", device_name);

        // One second of buffer is plenty for 100ms chunks
        let rb = HeapRb::<i16>::new(sample_rate as usize);
        let (producer, mut consumer) = rb.split();

        let pending = Arc::new(AtomicIsize::new(0));
        let drained = Arc::new(Notify::new());

        let config = StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let pending_cb = Arc::clone(&pending);
        let drained_cb = Arc::clone(&drained);
        let mut scratch = vec![0i16; 8192];

        let stream = device
            .build_output_stream(
                &config,
                move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if scratch.len() < out.len() {
                        scratch.resize(out.len(), 0);
                    }
                    let popped = consumer.pop_slice(&mut scratch[..out.len()]);
                    for (dst, src) in out.iter_mut().zip(scratch.iter()) {
                        *dst = *src as f32 / 32768.0;
                    }
                    for dst in out.iter_mut().skip(popped) {
                        *dst = 0.0;
                    }
                    if popped > 0 {
                        let left =
                            pending_cb.fetch_sub(popped as isize, Ordering::SeqCst) - popped as isize;
                        if left <= 0 {
                            drained_cb.notify_waiters();
                        }
                    }
                },
                move |err| {
                    error!("Audio output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::ConfigError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        Ok(Self {
            producer: Mutex::new(producer),
            pending,
            drained,
            sample_rate,
            _stream: SendableStream(stream),
        })
    }
}

#[async_trait]
impl AudioOutput for CpalAudioOutput {
    async fn play(&self, samples: Vec<i16>) -> AudioResult<()> {
        // Push the whole chunk, yielding while the ring buffer is full
        {
            let mut producer = self.producer.lock().await;
            let mut offset = 0;
            while offset < samples.len() {
                let pushed = producer.push_slice(&samples[offset..]);
                if pushed > 0 {
                    self.pending.fetch_add(pushed as isize, Ordering::SeqCst);
                    offset += pushed;
                } else {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            }
        }

        // Resolve only once the callback has rendered everything
        loop {
            if self.pending.load(Ordering::SeqCst) <= 0 {
                break;
            }
            let notified = self.drained.notified();
            if self.pending.load(Ordering::SeqCst) <= 0 {
                break;
            }
            notified.await;
        }

        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Mock audio output for tests
///
/// Records every chunk it finishes rendering, simulates render time with a
/// configurable delay, and flags any overlapping playback so ordering
/// violations show up as assertion failures.
pub struct MockAudioOutput {
    sample_rate: u32,
    delay: Duration,
    played: std::sync::Mutex<Vec<Vec<i16>>>,
    active: AtomicUsize,
    overlap: AtomicBool,
}

impl MockAudioOutput {
    /// Create a mock that renders instantly
    pub fn new() -> Self {
        Self {
            sample_rate: 16000,
            delay: Duration::ZERO,
            played: std::sync::Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            overlap: AtomicBool::new(false),
        }
    }

    /// Simulate per-chunk render time
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Chunks rendered to completion, in completion order
    pub fn played(&self) -> Vec<Vec<i16>> {
        self.played.lock().unwrap().clone()
    }

    /// Number of chunks rendered to completion
    pub fn play_count(&self) -> usize {
        self.played.lock().unwrap().len()
    }

    /// Whether two chunks were ever rendering at the same time
    pub fn overlap_detected(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }
}

impl Default for MockAudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioOutput for MockAudioOutput {
    async fn play(&self, samples: Vec<i16>) -> AudioResult<()> {
        if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlap.store(true, Ordering::SeqCst);
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.played.lock().unwrap().push(samples);
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
