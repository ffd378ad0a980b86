//! Speech input and output
//!
//! Recognition and playback vendors sit behind small capability traits:
//! [`RecognitionProvider`]/[`Recognizer`] for speech-to-text and
//! [`AudioSink`] for playing synthesized audio. [`SpeechSession`] drives a
//! recognizer through its start/stop lifecycle and [`Speaker`] turns text
//! into audible speech via the backend TTS endpoint.

pub mod azure;
#[cfg(feature = "audio")]
mod capture;
mod playback;
pub mod segmenter;
mod session;
#[cfg(feature = "audio")]
mod speaker;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use azure::AzureSpeechProvider;
#[cfg(feature = "audio")]
pub use capture::{MicCapture, SAMPLE_RATE, samples_to_wav};
pub use playback::{AudioSink, ExternalPlayerSink, PLAYBACK_FAILED, Speaker, known_players};
pub use segmenter::UtteranceSegmenter;
pub use session::{SessionState, SpeechSession, TranscriptState};
#[cfg(feature = "audio")]
pub use speaker::SpeakerSink;

use crate::Result;
use crate::api::SpeechToken;

/// Language used when none is configured
pub const DEFAULT_LANGUAGE: &str = "en-GB";

/// Whether a finalized result carries recognized speech
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionOutcome {
    /// Speech was recognized; the text is usable
    RecognizedSpeech,
    /// Audio was processed but nothing usable was recognized
    NoMatch,
}

/// Event emitted by a running recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Partial hypothesis for the utterance in progress
    Recognizing(String),
    /// Finalized result for one utterance
    Recognized {
        text: String,
        outcome: RecognitionOutcome,
    },
    /// Recognition was aborted by the provider
    Canceled(String),
    /// Provider ended the session on its own
    SessionStopped,
}

/// Channel a recognizer reports events on
pub type EventSender = mpsc::UnboundedSender<RecognitionEvent>;

/// A configured continuous recognizer
#[async_trait]
pub trait Recognizer: Send {
    /// Begin continuous recognition, reporting on `events`
    ///
    /// # Errors
    ///
    /// Returns error if recognition cannot start (e.g. no microphone)
    async fn start_continuous(&mut self, events: EventSender) -> Result<()>;

    /// Stop recognition and wait for in-flight work to wind down
    ///
    /// # Errors
    ///
    /// Returns error if the provider reports a failure while stopping
    async fn stop_continuous(&mut self) -> Result<()>;

    /// Release any resources still held
    fn close(&mut self);
}

/// Creates recognizers from short-lived credentials
#[async_trait]
pub trait RecognitionProvider: Send + Sync {
    /// Configure a recognizer for `language` using `token`
    ///
    /// # Errors
    ///
    /// Returns error if the recognizer cannot be configured
    async fn open(&self, token: &SpeechToken, language: &str) -> Result<Box<dyn Recognizer>>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}
