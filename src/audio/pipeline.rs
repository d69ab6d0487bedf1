use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audio::capture::CaptureDevice;
use crate::audio::error::AudioResult;
use crate::audio::resampler::AudioResampler;
use crate::state::ControlFlags;

/// Duration of one outbound audio slice in milliseconds
const SLICE_MS: u32 = 100;

/// Outbound capture pipeline
///
/// Pulls raw samples from the injected [`CaptureDevice`], resamples them to
/// the wire rate, slices them into fixed 100ms chunks of i16 PCM, Base64
/// encodes each slice, and hands it to the outbound channel.
///
/// Two drop points, consulted per completed slice:
/// - microphone mute: the slice is produced and discarded before
///   transmission, keeping the hardware acquired so unmuting never
///   re-triggers a permission prompt;
/// - channel not ready (full or closed): the slice is silently dropped;
///   there is no outbound buffering.
pub struct CapturePipeline {
    /// Injected microphone capability
    device: Box<dyn CaptureDevice>,
    /// Mute flags shared with the session
    flags: Arc<ControlFlags>,
    /// Wire sample rate (typically 16000)
    wire_rate: u32,
    /// Processing task handle
    processing_task: Option<JoinHandle<()>>,
    /// Stop signal sender
    stop_signal: Option<tokio::sync::oneshot::Sender<()>>,
    /// Whether the pipeline is currently running
    is_running: bool,
}

impl CapturePipeline {
    /// Create a pipeline over the given capture device
    pub fn new(device: Box<dyn CaptureDevice>, flags: Arc<ControlFlags>, wire_rate: u32) -> Self {
        Self {
            device,
            flags,
            wire_rate,
            processing_task: None,
            stop_signal: None,
            is_running: false,
        }
    }

    /// Acquire the microphone and start producing slices
    ///
    /// # Arguments
    /// * `outbound` - channel receiving Base64-encoded slices
    ///
    /// # Errors
    /// Returns [`crate::audio::AudioError::PermissionDenied`] if the host
    /// denies microphone access, or another `AudioError` if the device or
    /// resampler cannot be set up. On error nothing is left running.
    pub fn start(&mut self, outbound: mpsc::Sender<String>) -> AudioResult<()> {
        if self.is_running {
            warn!("Capture pipeline already running");
            return Ok(());
        }

        info!("Starting capture pipeline");

        let (raw_tx, raw_rx) = mpsc::channel::<Vec<f32>>(100);

        let input_rate = self.device.start(raw_tx)?;

        let resampler = if input_rate != self.wire_rate {
            match AudioResampler::new(input_rate, self.wire_rate) {
                Ok(r) => Some(r),
                Err(e) => {
                    self.device.stop();
                    return Err(e);
                }
            }
        } else {
            None
        };

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel();

        let flags = Arc::clone(&self.flags);
        let target_samples = (self.wire_rate * SLICE_MS / 1000) as usize;

        let processing_task = tokio::spawn(async move {
            Self::processing_loop(raw_rx, outbound, stop_rx, resampler, flags, target_samples)
                .await;
        });

        self.processing_task = Some(processing_task);
        self.stop_signal = Some(stop_tx);
        self.is_running = true;

        info!(input_rate, "Capture pipeline started");
        Ok(())
    }

    /// Stop capturing and release the microphone
    ///
    /// Safe to call when not running.
    pub async fn stop(&mut self) {
        if !self.is_running {
            return;
        }

        info!("Stopping capture pipeline");

        self.device.stop();

        if let Some(stop_tx) = self.stop_signal.take() {
            let _ = stop_tx.send(());
        }

        if let Some(task) = self.processing_task.take() {
            let _ = task.await;
        }

        self.is_running = false;
        info!("Capture pipeline stopped");
    }

    /// Check if the pipeline is running
    pub fn is_running(&self) -> bool {
        self.is_running
    }

    /// Processing loop: resample, slice, gate on mute, encode, hand off
    async fn processing_loop(
        mut raw_rx: mpsc::Receiver<Vec<f32>>,
        outbound: mpsc::Sender<String>,
        mut stop_rx: tokio::sync::oneshot::Receiver<()>,
        mut resampler: Option<AudioResampler>,
        flags: Arc<ControlFlags>,
        target_samples: usize,
    ) {
        let mut resample_pending = Vec::new();
        let mut pcm_buffer: Vec<i16> = Vec::new();

        debug!(target_samples, "Processing loop started");

        loop {
            tokio::select! {
                Some(samples) = raw_rx.recv() => {
                    let resampled = match resampler.as_mut() {
                        Some(r) => match r.process_buffered(&samples, &mut resample_pending) {
                            Ok(out) => out,
                            Err(e) => {
                                error!("Resampling error: {}", e);
                                continue;
                            }
                        },
                        None => samples,
                    };

                    if resampled.is_empty() {
                        continue;
                    }

                    pcm_buffer.extend(Self::f32_to_i16_pcm(&resampled));

                    while pcm_buffer.len() >= target_samples {
                        let slice: Vec<i16> = pcm_buffer.drain(..target_samples).collect();

                        // Mute gate: slice produced, dropped before transmission
                        if flags.microphone_muted() {
                            debug!("Microphone muted, dropping slice");
                            continue;
                        }

                        let encoded = Self::encode_base64(&Self::i16_to_bytes(&slice));

                        // try_send: no outbound buffering
                        if let Err(e) = outbound.try_send(encoded) {
                            debug!("Outbound channel not ready, dropping slice: {}", e);
                        }
                    }
                }

                _ = &mut stop_rx => {
                    debug!("Stop signal received");
                    break;
                }

                else => {
                    debug!("Capture channel closed");
                    break;
                }
            }
        }

        debug!("Processing loop finished");
    }

    /// Convert f32 samples (range: -1.0 to 1.0) to i16 PCM
    fn f32_to_i16_pcm(samples: &[f32]) -> Vec<i16> {
        samples
            .iter()
            .map(|&sample| (sample.clamp(-1.0, 1.0) * 32767.0) as i16)
            .collect()
    }

    /// Convert i16 samples to little-endian bytes
    fn i16_to_bytes(samples: &[i16]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }

    /// Base64 encode PCM bytes
    fn encode_base64(data: &[u8]) -> String {
        STANDARD.encode(data)
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        if self.is_running {
            self.device.stop();

            if let Some(stop_tx) = self.stop_signal.take() {
                let _ = stop_tx.send(());
            }
        }
    }
}
