//! Direct playback to the default output device

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};

use super::capture::resample;
use super::playback::{AudioSink, PLAYBACK_FAILED};
use crate::{Error, Result};

/// Decodes MP3 clips and plays them through cpal
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeakerSink;

impl SpeakerSink {
    /// Check that an output device exists
    ///
    /// # Errors
    ///
    /// Returns error if there is no default output device
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;
        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio playback initialized"
        );
        Ok(Self)
    }
}

#[async_trait]
impl AudioSink for SpeakerSink {
    async fn play(&self, audio: &[u8]) -> Result<()> {
        let (samples, rate) = decode_mp3(audio)?;
        if samples.is_empty() {
            return Ok(());
        }

        tokio::task::spawn_blocking(move || play_blocking(&samples, rate))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "playback task failed");
                Error::Playback(PLAYBACK_FAILED.to_string())
            })?
            .map_err(|e| {
                tracing::error!(error = %e, "audio playback failed");
                Error::Playback(PLAYBACK_FAILED.to_string())
            })
    }

    fn name(&self) -> &'static str {
        "speaker"
    }
}

fn play_blocking(samples: &[f32], source_rate: u32) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;
    let supported = device
        .default_output_config()
        .map_err(|e| Error::Audio(e.to_string()))?;
    if supported.sample_format() != SampleFormat::F32 {
        return Err(Error::Audio(format!(
            "unsupported output format {:?}",
            supported.sample_format()
        )));
    }

    let config: StreamConfig = supported.config();
    let channels = usize::from(config.channels);
    let device_rate = config.sample_rate.0;
    let samples = Arc::new(resample(samples, source_rate, device_rate));
    let total = samples.len();

    let position = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicBool::new(false));
    let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();

    let stream = {
        let samples = Arc::clone(&samples);
        let position = Arc::clone(&position);
        let failed = Arc::clone(&failed);
        let done_data = done_tx.clone();
        let done_err = done_tx.clone();
        device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let pos = position.fetch_add(1, Ordering::Relaxed);
                        let sample = samples.get(pos).copied().unwrap_or(0.0);
                        frame.fill(sample);
                        if pos == total {
                            let _ = done_data.send(());
                        }
                    }
                },
                move |err| {
                    tracing::error!(error = %err, "audio playback error");
                    failed.store(true, Ordering::SeqCst);
                    let _ = done_err.send(());
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?
    };
    drop(done_tx);

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let duration_ms = u64::try_from(total)
        .map_or(u64::MAX, |n| n.saturating_mul(1000) / u64::from(device_rate.max(1)));
    let timeout = Duration::from_millis(duration_ms.saturating_add(1000));
    if done_rx.recv_timeout(timeout).is_err() {
        tracing::warn!("playback did not signal completion in time");
    }

    // Let the device drain its last buffer
    std::thread::sleep(Duration::from_millis(100));
    drop(stream);

    if failed.load(Ordering::SeqCst) {
        return Err(Error::Audio("output stream error".to_string()));
    }

    tracing::debug!(samples = total, "playback complete");
    Ok(())
}

/// Decode MP3 bytes to mono f32 samples and their sample rate
fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                rate = u32::try_from(frame.sample_rate).unwrap_or(rate);
                let channels = frame.channels.max(1);
                #[allow(clippy::cast_precision_loss)]
                let scale = 32768.0 * channels as f32;
                samples.extend(
                    frame
                        .data
                        .chunks(channels)
                        .map(|chunk| chunk.iter().map(|&s| f32::from(s)).sum::<f32>() / scale),
                );
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => {
                tracing::error!(error = %e, "mp3 decode failed");
                return Err(Error::Playback(PLAYBACK_FAILED.to_string()));
            }
        }
    }

    Ok((samples, rate))
}
