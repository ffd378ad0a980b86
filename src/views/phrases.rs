//! Phrase library screen
//!
//! Thin CRUD over the phrases API. Every mutation is followed by a full
//! reload; nothing is patched locally.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::replace_task;
use crate::Result;
use crate::api::{Phrase, PhraseDraft, PhraseFilter, PhrasesApi};

/// How long a success notice stays visible
pub const NOTICE_DURATION: Duration = Duration::from_millis(2500);

/// Starter library created by [`PhrasesView::seed_demo_if_empty`]
pub const DEMO_PHRASES: &[(&str, &str)] = &[
    ("Can I have water?", "needs"),
    ("Can you help me?", "help"),
    ("I feel sore", "health"),
    ("I need the toilet", "needs"),
    ("I am hungry", "needs"),
    ("I am tired", "feelings"),
    ("Yes", "answers"),
    ("No", "answers"),
    ("Thank you", "social"),
    ("Please", "social"),
    ("I want to go home", "travel"),
    ("I want to play", "activity"),
];

/// Asks the user to confirm a destructive action
pub trait Confirmer: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirmer for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Client-side state of the phrases screen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhrasesState {
    /// Raw filter input
    pub query: String,
    pub category: String,
    pub phrases: Vec<Phrase>,
    pub loading: bool,
    /// Failure from the last load, edit prefill or delete
    pub error: Option<String>,
    /// Transient success message
    pub notice: Option<String>,
    /// Phrase being edited; `editing` is filled once it has loaded
    pub editing_id: Option<String>,
    pub editing: Option<Phrase>,
    /// Failure from the last create or update
    pub form_error: Option<String>,
}

struct Inner {
    api: Arc<dyn PhrasesApi>,
    confirmer: Arc<dyn Confirmer>,
    notice_timer: Mutex<Option<JoinHandle<()>>>,
    state: watch::Sender<PhrasesState>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        replace_task(&self.notice_timer, None);
    }
}

/// Controller for the phrases screen
#[derive(Clone)]
pub struct PhrasesView {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PhrasesView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhrasesView")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl PhrasesView {
    pub fn new(api: Arc<dyn PhrasesApi>, confirmer: Arc<dyn Confirmer>) -> Self {
        let (state, _) = watch::channel(PhrasesState::default());
        Self {
            inner: Arc::new(Inner {
                api,
                confirmer,
                notice_timer: Mutex::new(None),
                state,
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> PhrasesState {
        self.inner.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PhrasesState> {
        self.inner.state.subscribe()
    }

    /// Change the filters and reload
    pub async fn set_filters(&self, query: &str, category: &str) {
        self.inner.state.send_modify(|s| {
            s.query = query.to_string();
            s.category = category.to_string();
        });
        self.load().await;
    }

    /// Reload the list with the current filters
    pub async fn load(&self) -> bool {
        let filter = {
            let s = self.inner.state.borrow();
            PhraseFilter::from_input(&s.query, &s.category)
        };

        self.inner.state.send_modify(|s| {
            s.error = None;
            s.loading = true;
        });

        let result = self.inner.api.list(&filter).await;
        let ok = result.is_ok();

        self.inner.state.send_modify(|s| {
            s.loading = false;
            match result {
                Ok(phrases) => s.phrases = phrases,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to load phrases");
                    s.error = Some(e.to_string());
                }
            }
        });

        ok
    }

    /// Begin editing `id`, fetching it to prefill the form
    pub async fn start_edit(&self, id: &str) -> bool {
        self.inner.state.send_modify(|s| {
            s.error = None;
            s.form_error = None;
            s.editing_id = Some(id.to_string());
            s.editing = None;
        });

        match self.inner.api.get(id).await {
            Ok(phrase) => {
                self.inner.state.send_modify(|s| {
                    // A later start_edit or cancel wins
                    if s.editing_id.as_deref() == Some(phrase.id.as_str()) {
                        s.editing = Some(phrase);
                    }
                });
                true
            }
            Err(e) => {
                tracing::warn!(id, error = %e, "failed to load phrase for editing");
                self.inner.state.send_modify(|s| {
                    s.error = Some(e.to_string());
                    s.editing_id = None;
                });
                false
            }
        }
    }

    pub fn cancel_edit(&self) {
        self.inner.state.send_modify(|s| {
            s.editing_id = None;
            s.editing = None;
            s.form_error = None;
        });
    }

    /// Create a phrase and reload
    ///
    /// # Errors
    ///
    /// Returns the validation or API error; it is also kept in
    /// [`PhrasesState::form_error`]
    pub async fn create(&self, draft: &PhraseDraft) -> Result<Phrase> {
        let created = self
            .submit(async {
                let draft = draft.validate()?;
                self.inner.api.create(&draft).await
            })
            .await?;

        tracing::info!(id = %created.id, "phrase created");
        self.show_notice("Phrase created");
        self.load().await;
        Ok(created)
    }

    /// Save the phrase being edited and reload
    ///
    /// Returns `Ok(None)` when nothing is being edited.
    ///
    /// # Errors
    ///
    /// Returns the validation or API error; it is also kept in
    /// [`PhrasesState::form_error`]
    pub async fn update(&self, draft: &PhraseDraft) -> Result<Option<Phrase>> {
        let Some(id) = self.inner.state.borrow().editing_id.clone() else {
            return Ok(None);
        };

        let updated = self
            .submit(async {
                let draft = draft.validate()?;
                self.inner.api.update(&id, &draft).await
            })
            .await?;

        tracing::info!(id = %updated.id, "phrase updated");
        self.show_notice("Phrase updated");
        self.cancel_edit();
        self.load().await;
        Ok(Some(updated))
    }

    /// Delete `id` after confirmation; returns whether it was deleted
    ///
    /// Declining issues no request and leaves the list untouched.
    pub async fn delete(&self, id: &str) -> bool {
        let text = self
            .inner
            .state
            .borrow()
            .phrases
            .iter()
            .find(|p| p.id == id)
            .map_or_else(|| id.to_string(), |p| p.text.clone());

        if !self.inner.confirmer.confirm(&format!("Delete phrase \"{text}\"?")) {
            tracing::debug!(id, "delete declined");
            return false;
        }

        match self.inner.api.remove(id).await {
            Ok(()) => {
                tracing::info!(id, "phrase deleted");
                self.show_notice("Phrase deleted");
                self.load().await;
                true
            }
            Err(e) => {
                tracing::warn!(id, error = %e, "failed to delete phrase");
                self.inner.state.send_modify(|s| s.error = Some(e.to_string()));
                false
            }
        }
    }

    /// Create the demo phrases one by one if the library is empty
    ///
    /// Returns how many phrases were created.
    ///
    /// # Errors
    ///
    /// Returns error if listing or any create fails; phrases created before
    /// the failure are kept
    pub async fn seed_demo_if_empty(&self) -> Result<usize> {
        let existing = self.inner.api.list(&PhraseFilter::default()).await?;
        if !existing.is_empty() {
            tracing::debug!(count = existing.len(), "library not empty, skipping seed");
            return Ok(0);
        }

        for (text, category) in DEMO_PHRASES {
            self.inner
                .api
                .create(&PhraseDraft::new(*text, *category))
                .await?;
        }

        tracing::info!(count = DEMO_PHRASES.len(), "seeded demo phrases");
        self.load().await;
        Ok(DEMO_PHRASES.len())
    }

    async fn submit<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        self.inner.state.send_modify(|s| s.form_error = None);
        op.await.inspect_err(|e| {
            tracing::warn!(error = %e, "failed to save phrase");
            self.inner.state.send_modify(|s| s.form_error = Some(e.to_string()));
        })
    }

    fn show_notice(&self, message: &str) {
        self.inner
            .state
            .send_modify(|s| s.notice = Some(message.to_string()));

        let weak = Arc::downgrade(&self.inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(NOTICE_DURATION).await;
            if let Some(inner) = weak.upgrade() {
                inner.state.send_modify(|s| s.notice = None);
            }
        });
        replace_task(&self.inner.notice_timer, Some(timer));
    }
}
