//! Continuous speech recognition session
//!
//! Lifecycle: `Idle → Starting → Listening → Stopping → Idle`, with `Error`
//! entered when starting fails. A single recognizer is held at a time and
//! start/stop are mutually exclusive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::{RecognitionEvent, RecognitionOutcome, RecognitionProvider, Recognizer};
use crate::api::SpeechTokenSource;

/// Time allowed for results emitted while stopping to be applied
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle state of a [`SpeechSession`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Listening,
    Stopping,
    Error,
}

/// Observable transcript and lifecycle state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptState {
    pub state: SessionState,
    /// Hypothesis for the utterance in progress
    pub interim_text: String,
    /// Most recent finalized utterance
    pub final_text: String,
    /// Incremented for every accepted final utterance, including repeats
    pub final_seq: u64,
    pub error: Option<String>,
}

impl TranscriptState {
    /// Whether recognition is (about to be) running
    #[must_use]
    pub const fn listening(&self) -> bool {
        matches!(self.state, SessionState::Starting | SessionState::Listening)
    }
}

struct Inner {
    tokens: Arc<dyn SpeechTokenSource>,
    provider: Arc<dyn RecognitionProvider>,
    language: String,
    /// Held for the whole of a start or a stop
    lifecycle: tokio::sync::Mutex<()>,
    recognizer: tokio::sync::Mutex<Option<Box<dyn Recognizer>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    stopping: AtomicBool,
    state: watch::Sender<TranscriptState>,
}

/// One speech-to-text session per consuming view
///
/// Dropping the session stops recognition.
pub struct SpeechSession {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SpeechSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechSession")
            .field("provider", &self.inner.provider.name())
            .field("language", &self.inner.language)
            .field("state", &self.inner.state.borrow().state)
            .finish_non_exhaustive()
    }
}

impl SpeechSession {
    pub fn new(
        tokens: Arc<dyn SpeechTokenSource>,
        provider: Arc<dyn RecognitionProvider>,
        language: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(TranscriptState::default());
        Self {
            inner: Arc::new(Inner {
                tokens,
                provider,
                language: language.into(),
                lifecycle: tokio::sync::Mutex::new(()),
                recognizer: tokio::sync::Mutex::new(None),
                pump: Mutex::new(None),
                stopping: AtomicBool::new(false),
                state,
            }),
        }
    }

    /// Fetch a token, open a recognizer and begin continuous recognition
    ///
    /// Failures are recorded in [`TranscriptState::error`] rather than
    /// returned. Calling this while already starting or listening does
    /// nothing; calling it while a stop is in progress waits for the stop
    /// to finish first.
    pub async fn start(&self) {
        self.inner.start().await;
    }

    /// Stop recognition and release the recognizer
    ///
    /// Safe to call repeatedly and concurrently; overlapping calls return
    /// immediately while the first one completes.
    pub async fn stop(&self) {
        Inner::stop(&self.inner).await;
    }

    /// Current state snapshot
    #[must_use]
    pub fn snapshot(&self) -> TranscriptState {
        self.inner.state.borrow().clone()
    }

    /// Whether recognition is (about to be) running
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.inner.state.borrow().listening()
    }

    /// Receive a notification on every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TranscriptState> {
        self.inner.state.subscribe()
    }
}

impl Drop for SpeechSession {
    fn drop(&mut self) {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let inner = Arc::clone(&self.inner);
            handle.spawn(async move { Inner::stop(&inner).await });
        } else if let Ok(mut pump) = self.inner.pump.lock() {
            if let Some(pump) = pump.take() {
                pump.abort();
            }
        }
    }
}

impl Inner {
    async fn start(self: &Arc<Self>) {
        let _lifecycle = self.lifecycle.lock().await;
        if self.state.borrow().listening() {
            tracing::debug!("speech session already running");
            return;
        }

        self.state.send_modify(|s| {
            s.state = SessionState::Starting;
            s.error = None;
            s.interim_text.clear();
            s.final_text.clear();
        });

        if let Err(e) = self.try_start().await {
            tracing::warn!(error = %e, "failed to start recognition");
            let message = e.to_string();
            self.state.send_modify(|s| {
                s.state = SessionState::Error;
                s.error = Some(if message.is_empty() {
                    "Failed to start recognition".to_string()
                } else {
                    message
                });
            });
        }
    }

    async fn try_start(self: &Arc<Self>) -> crate::Result<()> {
        let token = self.tokens.speech_token().await?;

        let mut slot = self.recognizer.lock().await;
        let recognizer = slot.insert(self.provider.open(&token, &self.language).await?);

        let (tx, rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(pump_events(Arc::downgrade(self), rx));
        if let Ok(mut current) = self.pump.lock() {
            if let Some(old) = current.replace(pump) {
                old.abort();
            }
        }

        self.state.send_modify(|s| s.state = SessionState::Listening);

        if let Err(e) = recognizer.start_continuous(tx).await {
            if let Some(mut failed) = slot.take() {
                failed.close();
            }
            self.abort_pump();
            return Err(e);
        }

        tracing::info!(
            provider = self.provider.name(),
            language = %self.language,
            "speech recognition started"
        );
        Ok(())
    }

    async fn stop(self: &Arc<Self>) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            tracing::trace!("stop already in progress");
            return;
        }

        let _lifecycle = self.lifecycle.lock().await;
        let taken = self.recognizer.lock().await.take();
        match taken {
            None => {
                self.state.send_if_modified(|s| {
                    if s.listening() {
                        s.state = SessionState::Idle;
                        true
                    } else {
                        false
                    }
                });
            }
            Some(mut recognizer) => {
                self.state.send_modify(|s| s.state = SessionState::Stopping);

                if let Err(e) = recognizer.stop_continuous().await {
                    tracing::debug!(error = %e, "recognizer reported error while stopping");
                }
                recognizer.close();
                drop(recognizer);
                self.drain_pump().await;

                self.state.send_modify(|s| {
                    s.state = SessionState::Idle;
                    s.interim_text.clear();
                });
                tracing::info!("speech recognition stopped");
            }
        }

        self.stopping.store(false, Ordering::SeqCst);
    }

    /// Let the pump apply anything sent before the recognizer was released
    async fn drain_pump(&self) {
        let pump = self.pump.lock().ok().and_then(|mut pump| pump.take());
        if let Some(mut pump) = pump {
            if tokio::time::timeout(PUMP_DRAIN_TIMEOUT, &mut pump).await.is_err() {
                tracing::debug!("event pump still busy after stop");
                pump.abort();
            }
        }
    }

    fn abort_pump(&self) {
        if let Ok(mut pump) = self.pump.lock() {
            if let Some(pump) = pump.take() {
                pump.abort();
            }
        }
    }
}

/// Apply recognizer events to the session state
async fn pump_events(session: Weak<Inner>, mut events: mpsc::UnboundedReceiver<RecognitionEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = session.upgrade() else {
            return;
        };

        match event {
            RecognitionEvent::Recognizing(text) => {
                inner.state.send_modify(|s| s.interim_text = text);
            }
            RecognitionEvent::Recognized { text, outcome } => {
                let text = text.trim();
                if outcome == RecognitionOutcome::RecognizedSpeech && !text.is_empty() {
                    tracing::debug!(transcript = text, "final transcript");
                    inner.state.send_modify(|s| {
                        s.final_text = text.to_string();
                        s.final_seq += 1;
                        s.interim_text.clear();
                    });
                } else {
                    tracing::trace!(?outcome, "discarding unrecognized result");
                }
            }
            RecognitionEvent::Canceled(details) => {
                tracing::warn!(details = %details, "speech canceled");
                inner
                    .state
                    .send_modify(|s| s.error = Some(format!("Speech canceled: {details}")));
                stop_unless_pending(inner);
            }
            RecognitionEvent::SessionStopped => {
                tracing::debug!("provider ended session");
                stop_unless_pending(inner);
            }
        }
    }
}

fn stop_unless_pending(inner: Arc<Inner>) {
    if !inner.stopping.load(Ordering::SeqCst) {
        tokio::spawn(async move { Inner::stop(&inner).await });
    }
}
