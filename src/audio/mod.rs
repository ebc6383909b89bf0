//! Microphone capture, WAV encoding, and speech playback
//!
//! Capture runs on a dedicated thread via cpal, resampled to 16 kHz mono
//! PCM16 and chunked over an mpsc channel. One capture handle corresponds to
//! one recording span; nothing persists past the span.

mod playback;
mod resampler;
mod types;
pub(crate) mod wav;

pub use playback::SpeechPlayer;
pub use types::{AudioCaptureError, AudioCaptureHandle, AudioChunk};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use resampler::SampleProcessor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Target sample rate for speech-to-text uploads
pub const STT_SAMPLE_RATE: u32 = 16000;

/// Start microphone capture on a dedicated thread.
///
/// Returns the capture handle and the chunk channel for the span. The channel
/// closes when the handle is stopped and the device released, so draining it
/// to completion yields exactly the samples of one recording.
///
/// # Errors
/// Fails when no input device is available, the device rejects every
/// configuration, or the stream cannot be opened - the platform's way of
/// reporting a denied or missing microphone.
pub(crate) fn start_capture(
) -> Result<(AudioCaptureHandle, mpsc::Receiver<AudioChunk>), AudioCaptureError> {
    let is_capturing = Arc::new(AtomicBool::new(true));
    let is_capturing_clone = is_capturing.clone();

    let (chunk_tx, chunk_rx) = mpsc::channel(600);

    let thread_handle = thread::spawn(move || {
        if let Err(e) = run_capture(is_capturing_clone, chunk_tx) {
            error!("Audio capture error: {}", e);
        }
    });

    let handle = AudioCaptureHandle {
        is_capturing,
        thread_handle: Some(thread_handle),
    };

    Ok((handle, chunk_rx))
}

/// Run capture on the current thread until the handle is stopped (blocking)
fn run_capture(
    is_capturing: Arc<AtomicBool>,
    chunk_tx: mpsc::Sender<AudioChunk>,
) -> Result<(), AudioCaptureError> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or(AudioCaptureError::NoInputDevice)?;

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    info!("Using audio input device: {}", device_name);

    // Prefer a config that supports the STT rate natively, otherwise take the
    // highest supported rate and resample.
    let supported_configs = device
        .supported_input_configs()
        .map_err(|e| AudioCaptureError::ConfigError(e.to_string()))?;

    let mut best_config = None;
    let mut found_target_rate = false;
    for config in supported_configs {
        if config.channels() == 0 {
            continue;
        }
        if config.min_sample_rate().0 <= STT_SAMPLE_RATE
            && config.max_sample_rate().0 >= STT_SAMPLE_RATE
        {
            best_config = Some(config.with_sample_rate(cpal::SampleRate(STT_SAMPLE_RATE)));
            found_target_rate = true;
            break;
        } else if best_config.is_none() {
            best_config = Some(config.with_max_sample_rate());
        }
    }
    let supported_config = best_config.ok_or(AudioCaptureError::NoSupportedConfig)?;

    if !found_target_rate {
        warn!(
            "{}Hz not supported, capturing at {}Hz and resampling",
            STT_SAMPLE_RATE,
            supported_config.sample_rate().0
        );
    }

    let config: cpal::StreamConfig = supported_config.into();
    let sample_rate = config.sample_rate.0;
    let channels = config.channels as usize;
    info!("Audio config: {} channels, {} Hz", channels, sample_rate);

    let is_capturing_stream = is_capturing.clone();
    let err_callback = |err| {
        error!("Audio stream error: {}", err);
    };

    // The sample processor lives inside the callback closure; one stream, one
    // owner, no locking.
    let stream = match device.default_input_config()?.sample_format() {
        SampleFormat::I16 => {
            let mut processor = SampleProcessor::new(sample_rate, channels, chunk_tx);
            device.build_input_stream(
                &config,
                move |data: &[i16], _| {
                    if !is_capturing_stream.load(Ordering::SeqCst) {
                        return;
                    }
                    processor.push(data);
                },
                err_callback,
                None,
            )?
        }
        SampleFormat::F32 => {
            let mut processor = SampleProcessor::new(sample_rate, channels, chunk_tx);
            device.build_input_stream(
                &config,
                move |data: &[f32], _| {
                    if !is_capturing_stream.load(Ordering::SeqCst) {
                        return;
                    }
                    let samples: Vec<i16> = data
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
                        .collect();
                    processor.push(&samples);
                },
                err_callback,
                None,
            )?
        }
        sample_format => {
            return Err(AudioCaptureError::UnsupportedFormat(format!(
                "{:?}",
                sample_format
            )));
        }
    };

    stream.play()?;
    info!("Audio capture started");

    while is_capturing.load(Ordering::SeqCst) {
        thread::sleep(std::time::Duration::from_millis(100));
    }

    drop(stream);
    Ok(())
}
