//! Sample processing for the capture callback
//!
//! Folds interleaved device frames to mono, resamples to the STT target rate
//! when the device rate differs, and ships fixed-size chunks over the capture
//! channel. The processor is owned by the cpal callback closure, so no
//! locking is involved.

use super::types::AudioChunk;
use super::STT_SAMPLE_RATE;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Output chunk size in samples (0.1 seconds at 16 kHz)
pub(crate) const CHUNK_SIZE: usize = 1600;

/// Per-stream sample pipeline
pub(crate) struct SampleProcessor {
    channels: usize,
    resampler: Option<SincFixedIn<f32>>,
    /// Device-rate samples awaiting a full resampler input block
    input_buffer: Vec<i16>,
    input_chunk_size: usize,
    /// Target-rate samples awaiting a full output chunk
    output_buffer: Vec<i16>,
    chunk_tx: mpsc::Sender<AudioChunk>,
}

impl SampleProcessor {
    /// Build a processor for a stream at `device_rate` Hz with `channels`
    /// interleaved channels. A resampler is only constructed when the device
    /// rate differs from [`STT_SAMPLE_RATE`].
    pub(crate) fn new(
        device_rate: u32,
        channels: usize,
        chunk_tx: mpsc::Sender<AudioChunk>,
    ) -> Self {
        let (resampler, input_chunk_size) = if device_rate != STT_SAMPLE_RATE {
            let input_frames =
                (CHUNK_SIZE as f64 * device_rate as f64 / STT_SAMPLE_RATE as f64).ceil() as usize;
            let params = SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            };
            match SincFixedIn::<f32>::new(
                STT_SAMPLE_RATE as f64 / device_rate as f64,
                2.0,
                params,
                input_frames,
                1, // mono
            ) {
                Ok(resampler) => (Some(resampler), input_frames),
                Err(e) => {
                    error!("Failed to create resampler, capturing at device rate: {}", e);
                    (None, CHUNK_SIZE)
                }
            }
        } else {
            (None, CHUNK_SIZE)
        };

        Self {
            channels,
            resampler,
            input_buffer: Vec::with_capacity(input_chunk_size * 2),
            input_chunk_size,
            output_buffer: Vec::with_capacity(CHUNK_SIZE * 2),
            chunk_tx,
        }
    }

    /// Feed interleaved device samples through the pipeline
    pub(crate) fn push(&mut self, data: &[i16]) {
        if self.channels > 1 {
            let channels = self.channels;
            let mono = data.chunks(channels).map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            });
            self.input_buffer.extend(mono);
        } else {
            self.input_buffer.extend_from_slice(data);
        }

        if self.resampler.is_some() {
            self.drain_through_resampler();
        } else {
            self.output_buffer.append(&mut self.input_buffer);
        }

        self.flush_chunks();
    }

    fn drain_through_resampler(&mut self) {
        while self.input_buffer.len() >= self.input_chunk_size {
            let block: Vec<f32> = self
                .input_buffer
                .drain(..self.input_chunk_size)
                .map(|s| s as f32 / 32768.0)
                .collect();

            let Some(resampler) = self.resampler.as_mut() else {
                return;
            };
            match resampler.process(&[block], None) {
                Ok(resampled) => {
                    self.output_buffer.extend(
                        resampled[0]
                            .iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16),
                    );
                }
                Err(e) => {
                    error!("Resampling error: {}", e);
                }
            }
        }
    }

    fn flush_chunks(&mut self) {
        while self.output_buffer.len() >= CHUNK_SIZE {
            let samples: Vec<i16> = self.output_buffer.drain(..CHUNK_SIZE).collect();
            let chunk = AudioChunk {
                samples,
                sample_rate: STT_SAMPLE_RATE,
            };
            // try_send keeps the audio callback non-blocking
            if let Err(e) = self.chunk_tx.try_send(chunk) {
                warn!("Audio buffer overflow - chunk dropped: {}", e);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_passthrough_chunks_at_target_rate() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut processor = SampleProcessor::new(STT_SAMPLE_RATE, 1, tx);

        processor.push(&[100i16; CHUNK_SIZE + 10]);

        let chunk = rx.try_recv().expect("one full chunk expected");
        assert_eq!(chunk.samples.len(), CHUNK_SIZE);
        assert_eq!(chunk.sample_rate, STT_SAMPLE_RATE);
        assert!(rx.try_recv().is_err(), "remainder stays buffered");
    }

    #[test]
    fn test_stereo_frames_fold_to_mono() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut processor = SampleProcessor::new(STT_SAMPLE_RATE, 2, tx);

        // Interleaved L/R pairs averaging to 150
        let frame: Vec<i16> = [100i16, 200]
            .iter()
            .copied()
            .cycle()
            .take(CHUNK_SIZE * 2)
            .collect();
        processor.push(&frame);

        let chunk = rx.try_recv().expect("one full chunk expected");
        assert_eq!(chunk.samples.len(), CHUNK_SIZE);
        assert!(chunk.samples.iter().all(|&s| s == 150));
    }

    #[test]
    fn test_no_chunk_until_enough_samples() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut processor = SampleProcessor::new(STT_SAMPLE_RATE, 1, tx);

        processor.push(&[0i16; CHUNK_SIZE - 1]);
        assert!(rx.try_recv().is_err());

        processor.push(&[0i16; 1]);
        assert!(rx.try_recv().is_ok());
    }
}
