//! Cloud speech recognition over the short-audio REST endpoint
//!
//! The microphone stream is cut into utterances locally and each one is
//! posted as a 16kHz WAV clip using the bearer token minted by the backend.

use serde::Deserialize;
use url::Url;

use super::{RecognitionEvent, RecognitionOutcome, RecognitionProvider, Recognizer};
use crate::api::SpeechToken;
use crate::{Error, Result};

const CONTENT_TYPE: &str = "audio/wav; codecs=audio/pcm; samplerate=16000";

/// Recognition result body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecognitionResponse {
    recognition_status: String,
    #[serde(default)]
    display_text: String,
}

/// Opens REST recognizers for the region named in each token
#[derive(Debug, Clone, Default)]
pub struct AzureSpeechProvider {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl AzureSpeechProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Post clips to `endpoint` instead of the regional host
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Recognition URL for `region` and `language`
    ///
    /// # Errors
    ///
    /// Returns error if the resulting URL is invalid
    pub fn recognition_url(&self, region: &str, language: &str) -> Result<Url> {
        let base = self.endpoint.clone().unwrap_or_else(|| {
            format!(
                "https://{region}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1"
            )
        });
        Url::parse_with_params(&base, &[("language", language), ("format", "simple")])
            .map_err(|e| Error::Config(format!("invalid speech endpoint {base}: {e}")))
    }
}

#[async_trait::async_trait]
impl RecognitionProvider for AzureSpeechProvider {
    async fn open(&self, token: &SpeechToken, language: &str) -> Result<Box<dyn Recognizer>> {
        let url = self.recognition_url(&token.region, language)?;
        tracing::debug!(region = %token.region, language, "configuring speech recognizer");
        open_recognizer(self.client.clone(), url, token.token.clone())
    }

    fn name(&self) -> &'static str {
        "azure"
    }
}

#[cfg(feature = "audio")]
#[allow(clippy::unnecessary_wraps)]
fn open_recognizer(client: reqwest::Client, url: Url, token: String) -> Result<Box<dyn Recognizer>> {
    Ok(Box::new(live::MicRecognizer::new(client, url, token)))
}

#[cfg(not(feature = "audio"))]
#[allow(clippy::needless_pass_by_value)]
fn open_recognizer(_client: reqwest::Client, _url: Url, _token: String) -> Result<Box<dyn Recognizer>> {
    Err(Error::Speech(
        "speech recognition requires the audio feature".to_string(),
    ))
}

/// Recognize one WAV clip
///
/// HTTP failures (e.g. an expired token) come back as
/// [`RecognitionEvent::Canceled`] so the session can report them.
///
/// # Errors
///
/// Returns error if the request cannot be sent or the service reports an
/// internal recognition error
pub async fn transcribe(
    client: &reqwest::Client,
    url: &Url,
    token: &str,
    wav: Vec<u8>,
) -> Result<RecognitionEvent> {
    let response = client
        .post(url.clone())
        .bearer_auth(token)
        .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
        .header(reqwest::header::ACCEPT, "application/json")
        .body(wav)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %body, "speech recognition request failed");
        let reason = if status == reqwest::StatusCode::UNAUTHORIZED {
            "authentication failed".to_string()
        } else {
            format!(
                "{} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or_default()
            )
        };
        return Ok(RecognitionEvent::Canceled(reason));
    }

    let result: RecognitionResponse = response.json().await?;
    tracing::trace!(status = %result.recognition_status, "recognition result");

    match result.recognition_status.as_str() {
        "Success" => Ok(RecognitionEvent::Recognized {
            text: result.display_text,
            outcome: RecognitionOutcome::RecognizedSpeech,
        }),
        "NoMatch" | "InitialSilenceTimeout" | "BabbleTimeout" => Ok(RecognitionEvent::Recognized {
            text: String::new(),
            outcome: RecognitionOutcome::NoMatch,
        }),
        other => Err(Error::Speech(format!("recognition failed: {other}"))),
    }
}

#[cfg(feature = "audio")]
mod live {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use url::Url;

    use super::transcribe;
    use crate::Result;
    use crate::speech::{
        EventSender, MicCapture, RecognitionEvent, Recognizer, SAMPLE_RATE, UtteranceSegmenter,
        samples_to_wav,
    };

    /// Time allowed for the last utterance to be transcribed on stop
    const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

    /// Microphone-backed continuous recognizer
    pub struct MicRecognizer {
        client: reqwest::Client,
        url: Url,
        token: String,
        capture: Option<MicCapture>,
        worker: Option<JoinHandle<()>>,
        stopping: Arc<AtomicBool>,
    }

    impl MicRecognizer {
        pub fn new(client: reqwest::Client, url: Url, token: String) -> Self {
            Self {
                client,
                url,
                token,
                capture: None,
                worker: None,
                stopping: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl Recognizer for MicRecognizer {
        async fn start_continuous(&mut self, events: EventSender) -> Result<()> {
            let (capture, chunks) = MicCapture::start().await?;
            self.capture = Some(capture);
            self.stopping.store(false, Ordering::SeqCst);

            self.worker = Some(tokio::spawn(recognize_loop(
                self.client.clone(),
                self.url.clone(),
                self.token.clone(),
                chunks,
                events,
                Arc::clone(&self.stopping),
            )));
            Ok(())
        }

        async fn stop_continuous(&mut self) -> Result<()> {
            self.stopping.store(true, Ordering::SeqCst);
            if let Some(capture) = self.capture.take() {
                // Joining the capture thread blocks briefly
                tokio::task::spawn_blocking(move || {
                    let mut capture = capture;
                    capture.stop();
                })
                .await
                .ok();
            }

            if let Some(mut worker) = self.worker.take() {
                if tokio::time::timeout(DRAIN_TIMEOUT, &mut worker).await.is_err() {
                    tracing::warn!("recognizer did not drain in time");
                    worker.abort();
                }
            }
            Ok(())
        }

        fn close(&mut self) {
            self.stopping.store(true, Ordering::SeqCst);
            if let Some(capture) = self.capture.take() {
                capture.signal_stop();
            }
            if let Some(worker) = self.worker.take() {
                worker.abort();
            }
        }
    }

    async fn recognize_loop(
        client: reqwest::Client,
        url: Url,
        token: String,
        mut chunks: mpsc::UnboundedReceiver<Vec<f32>>,
        events: EventSender,
        stopping: Arc<AtomicBool>,
    ) {
        let mut segmenter = UtteranceSegmenter::new();

        while let Some(chunk) = chunks.recv().await {
            if let Some(utterance) = segmenter.push(&chunk) {
                if !recognize(&client, &url, &token, &utterance, &events).await {
                    return;
                }
            }
        }

        if let Some(utterance) = segmenter.finish() {
            recognize(&client, &url, &token, &utterance, &events).await;
        }

        if !stopping.load(Ordering::SeqCst) {
            tracing::warn!("microphone stream ended unexpectedly");
            let _ = events.send(RecognitionEvent::SessionStopped);
        }
    }

    /// Transcribe one utterance; returns false once the session is canceled
    async fn recognize(
        client: &reqwest::Client,
        url: &Url,
        token: &str,
        utterance: &[f32],
        events: &EventSender,
    ) -> bool {
        let wav = match samples_to_wav(utterance, SAMPLE_RATE) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode utterance");
                return true;
            }
        };

        match transcribe(client, url, token, wav).await {
            Ok(event) => {
                let canceled = matches!(event, RecognitionEvent::Canceled(_));
                let _ = events.send(event);
                !canceled
            }
            Err(e) => {
                let _ = events.send(RecognitionEvent::Canceled(e.to_string()));
                false
            }
        }
    }
}
