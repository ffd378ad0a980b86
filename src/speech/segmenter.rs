//! Energy-based utterance segmentation
//!
//! Splits a continuous microphone stream into utterances so each one can be
//! sent to a short-audio recognition endpoint. Speech starts when a chunk's
//! RMS energy crosses the threshold and ends after a run of quiet samples.

/// Minimum RMS energy to consider a chunk speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum utterance length (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Trailing silence that ends an utterance (in samples)
const SILENCE_SAMPLES: usize = 8000; // 0.5 seconds

/// Upper bound on a single utterance; short-audio endpoints reject longer clips
const MAX_UTTERANCE_SAMPLES: usize = 16000 * 30;

/// Accumulates audio and yields completed utterances
#[derive(Debug, Default)]
pub struct UtteranceSegmenter {
    in_speech: bool,
    buffer: Vec<f32>,
    silence: usize,
}

impl UtteranceSegmenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of mono 16kHz samples
    ///
    /// Returns the buffered utterance once enough trailing silence follows
    /// it. Blips shorter than the minimum length are dropped.
    pub fn push(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        if samples.is_empty() {
            return None;
        }

        let energy = rms_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        if !self.in_speech {
            if is_speech {
                self.in_speech = true;
                self.buffer.clear();
                self.buffer.extend_from_slice(samples);
                self.silence = 0;
                tracing::trace!(energy, "speech onset");
            }
            return None;
        }

        self.buffer.extend_from_slice(samples);
        if is_speech {
            self.silence = 0;
        } else {
            self.silence += samples.len();
        }

        if self.silence > SILENCE_SAMPLES || self.buffer.len() >= MAX_UTTERANCE_SAMPLES {
            let speech_len = self.buffer.len().saturating_sub(self.silence);
            let utterance = self.take();
            if speech_len > MIN_SPEECH_SAMPLES {
                tracing::debug!(samples = utterance.len(), "utterance complete");
                return Some(utterance);
            }
            tracing::trace!(samples = speech_len, "discarding short blip");
        }

        None
    }

    /// Flush whatever speech is buffered, e.g. when capture stops
    pub fn finish(&mut self) -> Option<Vec<f32>> {
        if !self.in_speech {
            return None;
        }
        let speech_len = self.buffer.len().saturating_sub(self.silence);
        let utterance = self.take();
        (speech_len > MIN_SPEECH_SAMPLES).then_some(utterance)
    }

    /// Whether an utterance is currently being accumulated
    #[must_use]
    pub const fn in_speech(&self) -> bool {
        self.in_speech
    }

    fn take(&mut self) -> Vec<f32> {
        self.in_speech = false;
        self.silence = 0;
        std::mem::take(&mut self.buffer)
    }
}

/// RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
