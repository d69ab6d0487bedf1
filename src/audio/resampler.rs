use crate::audio::error::{AudioError, AudioResult};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::{debug, info};

/// Audio resampler for converting between sample rates
///
/// Converts captured audio from the device's native rate to the wire rate
/// (16kHz) using Sinc interpolation.
pub struct AudioResampler {
    /// The rubato resampler instance
    resampler: SincFixedIn<f32>,
    /// Input buffer for rubato (channels x samples)
    input_buffer: Vec<Vec<f32>>,
    /// Output buffer for rubato (channels x samples)
    output_buffer: Vec<Vec<f32>>,
    /// Number of input samples per chunk
    chunk_size: usize,
}

impl AudioResampler {
    /// Create a new audio resampler
    ///
    /// # Arguments
    /// * `input_rate` - input sample rate in Hz
    /// * `output_rate` - output sample rate in Hz (typically 16000)
    ///
    /// # Errors
    /// Returns `AudioError::ResampleFailed` if the resampler cannot be created.
    pub fn new(input_rate: u32, output_rate: u32) -> AudioResult<Self> {
        info!("Creating resampler: {} Hz -> {} Hz", input_rate, output_rate);

        let ratio = output_rate as f64 / input_rate as f64;
        debug!("Resample ratio: {:.6}", ratio);

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        // Chunks of ~10ms of input audio
        let chunk_size = (input_rate / 100) as usize;

        let resampler = SincFixedIn::<f32>::new(
            ratio,
            2.0,
            params,
            chunk_size,
            1, // mono
        )
        .map_err(|e| AudioError::ResampleFailed(format!("Failed to create resampler: {}", e)))?;

        let input_buffer = resampler.input_buffer_allocate(true);
        let output_buffer = resampler.output_buffer_allocate(true);

        Ok(Self {
            resampler,
            input_buffer,
            output_buffer,
            chunk_size,
        })
    }

    /// Resample buffered audio, carrying the remainder between calls
    ///
    /// Samples that do not fill a whole chunk stay in `pending` until the
    /// next call, so no audio is dropped at chunk boundaries.
    ///
    /// # Arguments
    /// * `input` - new mono samples at the input rate
    /// * `pending` - carry-over buffer owned by the caller
    ///
    /// # Returns
    /// All output samples produced by whole chunks of input.
    pub fn process_buffered(
        &mut self,
        input: &[f32],
        pending: &mut Vec<f32>,
    ) -> AudioResult<Vec<f32>> {
        pending.extend_from_slice(input);

        let mut output = Vec::new();

        while pending.len() >= self.chunk_size {
            let chunk: Vec<f32> = pending.drain(..self.chunk_size).collect();
            self.input_buffer[0].clear();
            self.input_buffer[0].extend_from_slice(&chunk);

            let (_, out_len) = self
                .resampler
                .process_into_buffer(&self.input_buffer, &mut self.output_buffer, None)
                .map_err(|e| AudioError::ResampleFailed(e.to_string()))?;

            output.extend_from_slice(&self.output_buffer[0][..out_len]);
        }

        Ok(output)
    }

    /// Number of input samples consumed per resampler chunk
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}
