//! Compose screen
//!
//! Free-text message with ranked phrase suggestions for the typed prefix.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{STATUS_CLEAR_DELAY, STATUS_SPEAK_ERROR, STATUS_SPEAKING, replace_task};
use crate::api::{
    LocationCategory, SuggestionItem, SuggestionsApi, SuggestionsRequest, SuggestionsResponse,
};
use crate::debounce::{DebouncedQuery, QueryState};
use crate::prefs::Preferences;
use crate::speech::Speaker;
use crate::time_bucket::TimeBucket;

/// Keys with a shortcut on the compose screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeKey {
    /// `1`–`9`: apply the n-th suggestion
    Digit(u8),
    /// Apply the top suggestion
    Tab,
    /// Clear the message
    Escape,
    /// Speak the message
    Enter,
}

impl ComposeKey {
    /// Map a typed character to a shortcut
    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '1'..='9' => c
                .to_digit(10)
                .and_then(|d| u8::try_from(d).ok())
                .map(Self::Digit),
            '\t' => Some(Self::Tab),
            '\u{1b}' => Some(Self::Escape),
            '\n' | '\r' => Some(Self::Enter),
            _ => None,
        }
    }
}

/// Client-side state of the compose screen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeState {
    pub message: String,
    pub speaking: bool,
    pub speak_error: Option<String>,
    pub status: String,
}

struct Inner {
    prefs: Preferences,
    suggestions: Arc<dyn SuggestionsApi>,
    speaker: Speaker,
    query: Mutex<DebouncedQuery<SuggestionsResponse>>,
    status_timer: Mutex<Option<JoinHandle<()>>>,
    state: watch::Sender<ComposeState>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        replace_task(&self.status_timer, None);
    }
}

/// Controller for the compose screen
#[derive(Clone)]
pub struct ComposeView {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ComposeView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposeView")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ComposeView {
    pub fn new(
        prefs: Preferences,
        suggestions: Arc<dyn SuggestionsApi>,
        speaker: Speaker,
        debounce: Duration,
    ) -> Self {
        let (state, _) = watch::channel(ComposeState::default());
        Self {
            inner: Arc::new(Inner {
                prefs,
                suggestions,
                speaker,
                query: Mutex::new(DebouncedQuery::with_quiet(debounce)),
                status_timer: Mutex::new(None),
                state,
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> ComposeState {
        self.inner.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ComposeState> {
        self.inner.state.subscribe()
    }

    /// Suggestion request state
    #[must_use]
    pub fn query(&self) -> QueryState<SuggestionsResponse> {
        self.inner
            .query
            .lock()
            .map(|q| q.state())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn subscribe_query(&self) -> Option<watch::Receiver<QueryState<SuggestionsResponse>>> {
        self.inner.query.lock().ok().map(|q| q.subscribe())
    }

    /// Suggestions in the order the backend ranked them
    #[must_use]
    pub fn suggestions(&self) -> Vec<SuggestionItem> {
        self.query()
            .data
            .map(|r| r.suggestions)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn location_category(&self) -> LocationCategory {
        self.inner.prefs.location_category()
    }

    /// Persist the category and re-rank the current prefix for it
    pub fn set_location_category(&self, category: LocationCategory) {
        self.inner.prefs.set_location_category(category);
        if let Ok(mut query) = self.inner.query.lock() {
            query.forget_last_requested();
        }
        self.request_suggestions();
    }

    /// Replace the message text
    pub fn set_message(&self, text: &str) {
        self.inner.state.send_modify(|s| s.message = text.to_string());
        self.request_suggestions();
    }

    /// Clear the message and its suggestions
    pub fn clear(&self) {
        self.set_message("");
    }

    /// Replace the message with the `index`-th suggestion (0-based)
    pub fn apply_suggestion(&self, index: usize) -> bool {
        let Some(item) = self.suggestions().into_iter().nth(index) else {
            return false;
        };
        tracing::debug!(index, text = %item.phrase.text, "applying suggestion");
        self.set_message(&item.phrase.text);
        true
    }

    /// Handle a shortcut key; returns whether it did anything
    pub async fn handle_key(&self, key: ComposeKey) -> bool {
        match key {
            ComposeKey::Digit(n @ 1..=9) => self.apply_suggestion(usize::from(n - 1)),
            ComposeKey::Digit(_) => false,
            ComposeKey::Tab => self.apply_suggestion(0),
            ComposeKey::Escape => {
                self.clear();
                true
            }
            ComposeKey::Enter => self.speak().await,
        }
    }

    /// Speak the message; an empty message does nothing
    pub async fn speak(&self) -> bool {
        let message = self.inner.state.borrow().message.trim().to_string();
        if message.is_empty() {
            return false;
        }

        replace_task(&self.inner.status_timer, None);
        self.inner.state.send_modify(|s| {
            s.speak_error = None;
            s.speaking = true;
            s.status = STATUS_SPEAKING.to_string();
        });

        let result = self.inner.speaker.speak(&message).await;

        self.inner.state.send_modify(|s| {
            s.speaking = false;
            if let Err(e) = &result {
                tracing::warn!(error = %e, "failed to speak message");
                s.speak_error = Some(e.to_string());
                s.status = STATUS_SPEAK_ERROR.to_string();
            }
        });

        let weak = Arc::downgrade(&self.inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(STATUS_CLEAR_DELAY).await;
            if let Some(inner) = weak.upgrade() {
                inner.state.send_modify(|s| s.status.clear());
            }
        });
        replace_task(&self.inner.status_timer, Some(timer));

        result.is_ok()
    }

    fn request_suggestions(&self) {
        let prefix = self.inner.state.borrow().message.trim().to_string();
        let location_category = self.location_category();
        let api = Arc::clone(&self.inner.suggestions);

        let Ok(mut query) = self.inner.query.lock() else {
            return;
        };

        if prefix.is_empty() {
            query.reset();
            return;
        }

        query.update(&prefix, false, move |prefix| async move {
            let request = SuggestionsRequest {
                prefix,
                time_bucket: TimeBucket::now(),
                location_category,
            };
            api.suggest(&request).await
        });
    }
}
