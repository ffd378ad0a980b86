//! Microphone capture
//!
//! cpal streams are not `Send`, so the stream lives on a dedicated thread
//! and hands mono 16kHz chunks to async code over a channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use tokio::sync::{mpsc, oneshot};

use crate::{Error, Result};

/// Sample rate delivered to consumers (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Handle to a running capture thread
///
/// Capture stops when the handle is stopped or dropped.
#[derive(Debug)]
pub struct MicCapture {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MicCapture {
    /// Open the default input device and start streaming
    ///
    /// # Errors
    ///
    /// Returns error if no input device is available or the stream cannot
    /// be started
    pub async fn start() -> Result<(Self, mpsc::UnboundedReceiver<Vec<f32>>)> {
        let (chunks_tx, chunks_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("aac-mic".to_string())
            .spawn(move || capture_thread(&chunks_tx, ready_tx, &thread_stop))?;

        let capture = Self {
            stop,
            thread: Some(thread),
        };

        match ready_rx.await {
            Ok(Ok(())) => Ok((capture, chunks_rx)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Audio("capture thread exited during startup".to_string())),
        }
    }

    /// Stop the stream; buffered chunks remain readable from the receiver
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("capture thread panicked");
            }
            tracing::debug!("audio capture stopped");
        }
    }

    /// Ask the thread to stop without waiting for it
    pub fn signal_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

fn capture_thread(
    chunks: &mpsc::UnboundedSender<Vec<f32>>,
    ready: oneshot::Sender<Result<()>>,
    stop: &AtomicBool,
) {
    let stream = match open_stream(chunks.clone()) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready.send(Err(Error::Audio(e.to_string())));
        return;
    }
    let _ = ready.send(Ok(()));
    tracing::debug!("audio capture started");

    while !stop.load(Ordering::SeqCst) && !chunks.is_closed() {
        std::thread::sleep(Duration::from_millis(50));
    }

    drop(stream);
}

fn open_stream(chunks: mpsc::UnboundedSender<Vec<f32>>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

    // Prefer native mono 16kHz; otherwise take the device default and convert
    let supported = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.sample_format() == SampleFormat::F32
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
        .map(|c| c.with_sample_rate(SampleRate(SAMPLE_RATE)));
    let supported = match supported {
        Some(c) => c,
        None => device
            .default_input_config()
            .map_err(|e| Error::Audio(e.to_string()))?,
    };

    let format = supported.sample_format();
    let config: StreamConfig = supported.config();
    let channels = usize::from(config.channels);
    let rate = config.sample_rate.0;

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = rate,
        channels,
        ?format,
        "audio capture initialized"
    );

    let on_error = |err: cpal::StreamError| tracing::error!(error = %err, "audio capture error");

    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = chunks.send(resample(&downmix(data, channels), rate, SAMPLE_RATE));
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let data: Vec<f32> = data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                let _ = chunks.send(resample(&downmix(&data, channels), rate, SAMPLE_RATE));
            },
            on_error,
            None,
        ),
        other => {
            return Err(Error::Audio(format!("unsupported sample format {other:?}")));
        }
    };

    stream.map_err(|e| Error::Audio(e.to_string()))
}

/// Average interleaved frames down to one channel
#[allow(clippy::cast_precision_loss)]
pub(crate) fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Linear-interpolation resampling
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub(crate) fn resample(samples: &[f32], from: u32, to: u32) -> Vec<f32> {
    if from == to || samples.is_empty() || from == 0 || to == 0 {
        return samples.to_vec();
    }

    let ratio = f64::from(from) / f64::from(to);
    let out_len = ((samples.len() as f64) / ratio).round() as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            let frac = (pos - pos.floor()) as f32;
            let a = samples[idx.min(last)];
            let b = samples[(idx + 1).min(last)];
            (b - a).mul_add(frac, a)
        })
        .collect()
}

/// Convert f32 samples to 16-bit PCM WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let pcm = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(pcm)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
