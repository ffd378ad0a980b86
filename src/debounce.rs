//! Debounced request primitive shared by the conversation and compose views
//!
//! Every input change cancels the pending quiet-period timer. When the timer
//! elapses the request fires on its own task, so a later input never aborts a
//! request that is already in flight. Each fired request carries a generation
//! number and a response is only applied if no newer request has fired since;
//! older responses are dropped.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::Result;

/// Default quiet period between the last input change and the request
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(250);

/// Observable state of a debounced query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    /// A request is in flight
    pub loading: bool,
    /// Message from the most recent failed request
    pub error: Option<String>,
    /// Result of the most recent successful request
    pub data: Option<T>,
    /// Normalized input of the most recently fired request
    pub requested: Option<String>,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            loading: false,
            error: None,
            data: None,
            requested: None,
        }
    }
}

type Equality = dyn Fn(&str, &str) -> bool + Send + Sync;

struct Shared<T> {
    state: watch::Sender<QueryState<T>>,
    last_requested: Mutex<Option<String>>,
    generation: AtomicU64,
}

impl<T> Shared<T> {
    fn last_requested(&self) -> Option<String> {
        self.last_requested
            .lock()
            .map(|l| l.clone())
            .unwrap_or_default()
    }

    fn set_last_requested(&self, value: Option<String>) {
        if let Ok(mut last) = self.last_requested.lock() {
            *last = value;
        }
    }
}

/// Issues at most one request per quiet period and skips repeats
pub struct DebouncedQuery<T> {
    quiet: Duration,
    same: Arc<Equality>,
    shared: Arc<Shared<T>>,
    pending: Option<JoinHandle<()>>,
}

impl<T> std::fmt::Debug for DebouncedQuery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedQuery")
            .field("quiet", &self.quiet)
            .field("last_requested", &self.shared.last_requested())
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> DebouncedQuery<T> {
    /// Create a query with a custom equality check on normalized inputs
    pub fn new(quiet: Duration, same: impl Fn(&str, &str) -> bool + Send + Sync + 'static) -> Self {
        let (state, _) = watch::channel(QueryState::default());
        Self {
            quiet,
            same: Arc::new(same),
            shared: Arc::new(Shared {
                state,
                last_requested: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
            pending: None,
        }
    }

    /// Create a query comparing trimmed inputs for exact equality
    #[must_use]
    pub fn with_quiet(quiet: Duration) -> Self {
        Self::new(quiet, |a, b| a == b)
    }

    /// Feed a new input value
    ///
    /// Cancels any pending timer. Nothing is scheduled when `suppressed` is
    /// set, when the trimmed input is empty, or when it equals the last
    /// requested input. Otherwise `fetch` runs with the trimmed input once
    /// the quiet period passes without another update.
    ///
    /// Returns whether a request was scheduled.
    pub fn update<F, Fut>(&mut self, input: &str, suppressed: bool, fetch: F) -> bool
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }

        if suppressed {
            tracing::trace!("debounced query suppressed");
            return false;
        }

        let key = input.trim().to_string();
        if key.is_empty() {
            return false;
        }

        if let Some(last) = self.shared.last_requested() {
            if (self.same)(&last, &key) {
                tracing::trace!(input = %key, "input already requested");
                return false;
            }
        }

        let shared = Arc::clone(&self.shared);
        let quiet = self.quiet;

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet).await;

            let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
            shared.set_last_requested(Some(key.clone()));
            shared.state.send_modify(|s| {
                s.loading = true;
                s.error = None;
                s.requested = Some(key.clone());
            });

            tracing::debug!(input = %key, generation, "debounced request fired");

            // Detached from the timer so a later update cannot abort it
            tokio::spawn(async move {
                let result = fetch(key.clone()).await;

                if shared.generation.load(Ordering::SeqCst) != generation {
                    tracing::debug!(input = %key, generation, "discarding superseded response");
                    return;
                }

                shared.state.send_modify(|s| {
                    s.loading = false;
                    match result {
                        Ok(data) => s.data = Some(data),
                        Err(e) => {
                            tracing::warn!(input = %key, error = %e, "debounced request failed");
                            s.error = Some(e.to_string());
                        }
                    }
                });
            });
        }));

        true
    }

    /// Cancel the pending timer, forget the last request and clear state
    ///
    /// Responses to requests already in flight are discarded.
    pub fn reset(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.set_last_requested(None);
        self.shared.state.send_replace(QueryState::default());
    }

    /// Allow the last requested input to fire again, keeping current results
    pub fn forget_last_requested(&mut self) {
        self.shared.set_last_requested(None);
    }

    /// Normalized input of the last fired request
    #[must_use]
    pub fn last_requested(&self) -> Option<String> {
        self.shared.last_requested()
    }

    /// Whether a quiet-period timer is still waiting to fire
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|p| !p.is_finished())
    }

    /// Receive a notification on every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.shared.state.subscribe()
    }
}

impl<T: Clone + Send + Sync + 'static> DebouncedQuery<T> {
    /// Snapshot of the current state
    #[must_use]
    pub fn state(&self) -> QueryState<T> {
        self.shared.state.borrow().clone()
    }
}

impl<T> Drop for DebouncedQuery<T> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    type Calls = Arc<Mutex<Vec<String>>>;

    fn recorder(calls: &Calls) -> impl FnOnce(String) -> std::future::Ready<Result<String>> + Send + 'static {
        let calls = Arc::clone(calls);
        move |q: String| {
            calls.lock().unwrap().push(q.clone());
            std::future::ready(Ok(format!("reply to {q}")))
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(300)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_final_value_fires() {
        let calls: Calls = Arc::default();
        let mut query = DebouncedQuery::with_quiet(DEFAULT_QUIET_PERIOD);

        for input in ["c", "ca", "can", "can I", "can I have water"] {
            assert!(query.update(input, false, recorder(&calls)));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        settle().await;

        assert_eq!(*calls.lock().unwrap(), vec!["can I have water"]);
        let state = query.state();
        assert!(!state.loading);
        assert_eq!(state.data.as_deref(), Some("reply to can I have water"));
        assert_eq!(state.requested.as_deref(), Some("can I have water"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_is_skipped() {
        let calls: Calls = Arc::default();
        let mut query = DebouncedQuery::with_quiet(DEFAULT_QUIET_PERIOD);

        query.update("Juice?", false, recorder(&calls));
        settle().await;

        assert!(!query.update("  Juice?  ", false, recorder(&calls)));
        settle().await;

        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(query.last_requested().as_deref(), Some("Juice?"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppressed_and_empty_inputs() {
        let calls: Calls = Arc::default();
        let mut query = DebouncedQuery::with_quiet(DEFAULT_QUIET_PERIOD);

        assert!(!query.update("water", true, recorder(&calls)));
        assert!(!query.update("   ", false, recorder(&calls)));
        settle().await;
        assert!(calls.lock().unwrap().is_empty());

        assert!(query.update("water", false, recorder(&calls)));
        settle().await;
        assert_eq!(*calls.lock().unwrap(), vec!["water"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppression_cancels_pending_timer() {
        let calls: Calls = Arc::default();
        let mut query = DebouncedQuery::with_quiet(DEFAULT_QUIET_PERIOD);

        query.update("water", false, recorder(&calls));
        assert!(query.is_pending());
        query.update("water", true, recorder(&calls));
        assert!(!query.is_pending());
        settle().await;

        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_response_is_discarded() {
        let mut query: DebouncedQuery<String> = DebouncedQuery::with_quiet(DEFAULT_QUIET_PERIOD);

        query.update("slow", false, |q| async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(q)
        });
        settle().await;
        assert!(query.state().loading);

        query.update("fast", false, |q| async move { Ok(q) });
        settle().await;
        assert_eq!(query.state().data.as_deref(), Some("fast"));

        tokio::time::sleep(Duration::from_secs(3)).await;
        let state = query.state();
        assert_eq!(state.data.as_deref(), Some("fast"));
        assert!(!state.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_is_stored_and_cleared_by_next_request() {
        let mut query: DebouncedQuery<String> = DebouncedQuery::with_quiet(DEFAULT_QUIET_PERIOD);

        query.update("boom", false, |_| async {
            Err(Error::Api {
                status: 503,
                status_text: "Service Unavailable".to_string(),
                body: String::new(),
            })
        });
        settle().await;
        assert_eq!(query.state().error.as_deref(), Some("503 Service Unavailable"));

        query.update("ok", false, |q| async move { Ok(q) });
        settle().await;
        let state = query.state();
        assert_eq!(state.error, None);
        assert_eq!(state.data.as_deref(), Some("ok"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_allows_same_input_again() {
        let calls: Calls = Arc::default();
        let mut query = DebouncedQuery::with_quiet(DEFAULT_QUIET_PERIOD);

        query.update("tea", false, recorder(&calls));
        settle().await;
        query.reset();
        assert_eq!(query.state(), QueryState::default());

        assert!(query.update("tea", false, recorder(&calls)));
        settle().await;
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_equality() {
        let calls: Calls = Arc::default();
        let mut query = DebouncedQuery::new(DEFAULT_QUIET_PERIOD, |a, b| a.eq_ignore_ascii_case(b));

        query.update("Tea", false, recorder(&calls));
        settle().await;
        assert!(!query.update("TEA", false, recorder(&calls)));
    }
}
