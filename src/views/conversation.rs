//! Conversation screen
//!
//! Hears a question (typed, or from a speech session), asks the dialogue
//! service for replies and speaks the one the user picks. Until the service
//! has answered, a small drink heuristic supplies default replies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{STATUS_CLEAR_DELAY, STATUS_SPEAK_ERROR, STATUS_SPEAKING, replace_task};
use crate::api::{
    DialogueApi, DialogueOptionGroup, DialogueReply, DialogueRequest, DialogueResponse,
};
use crate::debounce::{DEFAULT_QUIET_PERIOD, DebouncedQuery, QueryState};
use crate::prefs::{Location, Preferences};
use crate::rules::{self, DRINKS, Drink};
use crate::speech::{Speaker, TranscriptState};
use crate::wake::{DEFAULT_WAKE_WINDOW, WakeOutcome, WakePhraseGate};

/// Status line while the wake window is open
pub const STATUS_WAKE: &str = "Listening for your question…";

/// Spoken when onboarding is tested
pub const TEST_VOICE_TEXT: &str = "Hello. This is your AAC device.";

/// Items shown per option group
pub const MAX_OPTION_ITEMS: usize = 8;

/// Icon for option items no rule matches
pub const FALLBACK_ICON: &str = "•";

/// Timing knobs for the conversation screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationSettings {
    /// Quiet period before a dialogue request fires
    pub debounce: Duration,
    /// How long a bare wake phrase waits for the question
    pub wake_window: Duration,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_QUIET_PERIOD,
            wake_window: DEFAULT_WAKE_WINDOW,
        }
    }
}

/// Client-side state of the conversation screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationState {
    /// Question heard or typed, untrimmed
    pub question: String,
    /// The speech session is capturing
    pub listening: bool,
    pub speaking: bool,
    /// Failure from the last speak attempt
    pub speak_error: Option<String>,
    /// Live status line; empty when idle
    pub status: String,
    /// Extra options panel is expanded
    pub options_open: bool,
    /// Drink offered when the question names none
    pub selected_drink: &'static Drink,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            question: String::new(),
            listening: false,
            speaking: false,
            speak_error: None,
            status: String::new(),
            options_open: false,
            selected_drink: &DRINKS[0],
        }
    }
}

/// One of the three large reply tiles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTile {
    pub icon: Option<String>,
    pub title: String,
    /// Text spoken when the tile is chosen
    pub text: String,
}

/// An item in an option group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionItem {
    pub icon: &'static str,
    /// Capitalised item text
    pub label: String,
}

/// Option group ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionGroupView {
    pub id: String,
    pub title: String,
    pub items: Vec<OptionItem>,
}

impl OptionGroupView {
    /// Item behind the "choose" and "instead" shortcuts
    #[must_use]
    pub fn first(&self) -> Option<&OptionItem> {
        self.items.first()
    }
}

/// `"<Item>, please."`
#[must_use]
pub fn choice_phrase(item: &str) -> String {
    let item = item.trim();
    if item.is_empty() {
        "Please.".to_string()
    } else {
        format!("{item}, please.")
    }
}

/// `"Could I have <item> instead, please?"`
#[must_use]
pub fn instead_phrase(item: &str) -> String {
    let item = item.trim();
    if item.is_empty() {
        "Could I have something else, please?".to_string()
    } else {
        format!("Could I have {} instead, please?", item.to_lowercase())
    }
}

fn drink_yes_phrase(drink: &Drink) -> String {
    format!("Yes please, I'd like {}.", drink.label.to_lowercase())
}

fn drink_instead_phrase(drink: &Drink) -> String {
    format!("Could I have {} instead?", drink.label.to_lowercase())
}

fn capitalise(item: &str) -> String {
    let mut chars = item.chars();
    chars.next().map_or_else(
        || "Item".to_string(),
        |first| first.to_uppercase().chain(chars).collect(),
    )
}

/// Default tiles built from the drink mentioned in `prompt`
#[must_use]
pub fn drink_tiles(prompt: &str, selected: &'static Drink) -> Vec<ReplyTile> {
    let mentioned = rules::detect_drink(prompt);
    let yes = mentioned.unwrap_or(selected);
    let alternative = rules::alternative_drink(mentioned, selected);

    vec![
        ReplyTile {
            icon: Some(yes.icon.to_string()),
            title: format!("Yes ({})", yes.label.to_lowercase()),
            text: drink_yes_phrase(yes),
        },
        ReplyTile {
            icon: None,
            title: "No thanks".to_string(),
            text: "No thank you.".to_string(),
        },
        ReplyTile {
            icon: None,
            title: format!("{} instead", alternative.label),
            text: drink_instead_phrase(alternative),
        },
    ]
}

/// Tiles for the dialogue service's replies; none unless there are three
#[must_use]
pub fn dialogue_tiles(replies: &[DialogueReply]) -> Vec<ReplyTile> {
    if replies.len() < 3 {
        return Vec::new();
    }

    replies
        .iter()
        .take(3)
        .map(|reply| {
            let split = rules::split_icon_label(&reply.label);
            ReplyTile {
                icon: split.icon,
                title: if split.text.is_empty() {
                    "Option".to_string()
                } else {
                    split.text
                },
                text: reply.text.clone(),
            }
        })
        .collect()
}

/// Display model for the dialogue service's option groups
#[must_use]
pub fn option_groups(groups: &[DialogueOptionGroup]) -> Vec<OptionGroupView> {
    groups
        .iter()
        .map(|group| OptionGroupView {
            id: group.id.clone(),
            title: group.title.clone(),
            items: group
                .items
                .iter()
                .take(MAX_OPTION_ITEMS)
                .map(|item| OptionItem {
                    icon: rules::icon_for_text(item).unwrap_or(FALLBACK_ICON),
                    label: capitalise(item),
                })
                .collect(),
        })
        .collect()
}

struct Inner {
    prefs: Preferences,
    dialogue: Arc<dyn DialogueApi>,
    speaker: Speaker,
    settings: ConversationSettings,
    query: Mutex<DebouncedQuery<DialogueResponse>>,
    /// Gate for the name it was built with
    gate: Mutex<Option<(String, WakePhraseGate)>>,
    wake_timer: Mutex<Option<JoinHandle<()>>>,
    status_timer: Mutex<Option<JoinHandle<()>>>,
    state: watch::Sender<ConversationState>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        replace_task(&self.wake_timer, None);
        replace_task(&self.status_timer, None);
    }
}

/// Controller for the conversation screen
#[derive(Clone)]
pub struct ConversationView {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConversationView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationView")
            .field("state", &*self.inner.state.borrow())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl ConversationView {
    pub fn new(
        prefs: Preferences,
        dialogue: Arc<dyn DialogueApi>,
        speaker: Speaker,
        settings: ConversationSettings,
    ) -> Self {
        let (state, _) = watch::channel(ConversationState::default());
        Self {
            inner: Arc::new(Inner {
                prefs,
                dialogue,
                speaker,
                settings,
                query: Mutex::new(DebouncedQuery::with_quiet(settings.debounce)),
                gate: Mutex::new(None),
                wake_timer: Mutex::new(None),
                status_timer: Mutex::new(None),
                state,
            }),
        }
    }

    /// Current screen state
    #[must_use]
    pub fn state(&self) -> ConversationState {
        self.inner.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.inner.state.subscribe()
    }

    /// Dialogue request state (loading, error, latest response)
    #[must_use]
    pub fn dialogue(&self) -> QueryState<DialogueResponse> {
        self.inner
            .query
            .lock()
            .map(|q| q.state())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn subscribe_dialogue(&self) -> Option<watch::Receiver<QueryState<DialogueResponse>>> {
        self.inner.query.lock().ok().map(|q| q.subscribe())
    }

    // -- Onboarding --

    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.inner.prefs.name()
    }

    #[must_use]
    pub fn needs_onboarding(&self) -> bool {
        self.name().is_none()
    }

    /// Store the user's name and greet them
    ///
    /// Blank input is ignored and returns false.
    pub async fn complete_onboarding(&self, input: &str) -> bool {
        let name = input.trim();
        if name.is_empty() {
            return false;
        }

        self.inner.prefs.set_name(name);
        tracing::info!(name, "onboarding complete");
        self.speak(&format!("Hi {name}.")).await;
        true
    }

    /// Speak a fixed sentence so the user can check audio output
    pub async fn test_voice(&self) -> bool {
        self.speak(TEST_VOICE_TEXT).await
    }

    /// Forget the name and everything derived from it
    pub fn reset_name(&self) {
        self.inner.prefs.clear_name();
        self.clear_question();
        if let Ok(mut gate) = self.inner.gate.lock() {
            *gate = None;
        }
        tracing::info!("name reset");
    }

    // -- Question --

    /// The question to answer, or the default drink prompt
    #[must_use]
    pub fn prompt(&self) -> String {
        let question = self.inner.state.borrow().question.trim().to_string();
        if question.is_empty() {
            format!(
                "{}, would you like a drink?",
                self.name().unwrap_or_default()
            )
        } else {
            question
        }
    }

    /// Set the question directly (typed input or an accepted transcript)
    pub fn set_question(&self, text: &str) {
        self.inner.state.send_modify(|s| s.question = text.to_string());
        self.request_replies();
    }

    /// Clear the question, replies and options panel
    pub fn clear_question(&self) {
        self.inner.state.send_modify(|s| {
            s.question.clear();
            s.options_open = false;
        });
        if let Ok(mut query) = self.inner.query.lock() {
            query.reset();
        }
    }

    /// Handle a finalized transcript from the speech session
    ///
    /// In voice mode the transcript must be addressed to the user; otherwise
    /// every transcript becomes the question.
    pub fn hear(&self, transcript: &str) {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return;
        }

        if !self.inner.prefs.voice_mode() {
            self.set_question(transcript);
            return;
        }

        let Some(name) = self.name() else {
            tracing::debug!("ignoring speech before onboarding");
            return;
        };

        let (outcome, window) = {
            let Ok(mut slot) = self.inner.gate.lock() else {
                return;
            };
            if slot.as_ref().is_none_or(|(built_for, _)| *built_for != name) {
                match WakePhraseGate::new(&name, self.inner.settings.wake_window) {
                    Ok(gate) => *slot = Some((name, gate)),
                    Err(e) => {
                        tracing::warn!(error = %e, "cannot build wake phrase gate");
                        return;
                    }
                }
            }
            let Some((_, gate)) = slot.as_mut() else {
                return;
            };
            (gate.hear(transcript, Instant::now()), gate.window())
        };

        match outcome {
            WakeOutcome::Question(question) => {
                replace_task(&self.inner.wake_timer, None);
                self.clear_status(STATUS_WAKE);
                self.set_question(&question);
            }
            WakeOutcome::Armed => {
                self.inner.state.send_modify(|s| s.status = STATUS_WAKE.to_string());
                self.arm_wake_timer(window);
            }
            WakeOutcome::Ignored => {}
        }
    }

    /// Whether the wake window is currently open
    #[must_use]
    pub fn wake_armed(&self) -> bool {
        self.inner
            .gate
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|(_, g)| g.is_armed(Instant::now())))
            .unwrap_or(false)
    }

    /// Track whether the speech session is capturing
    ///
    /// Dialogue requests wait while listening and fire once it stops.
    pub fn set_listening(&self, listening: bool) {
        let changed = self.inner.state.send_if_modified(|s| {
            if s.listening == listening {
                false
            } else {
                s.listening = listening;
                true
            }
        });
        if changed {
            self.request_replies();
        }
    }

    /// Feed this view from a speech session until the session goes away
    #[must_use]
    pub fn follow_speech(&self, mut transcripts: watch::Receiver<TranscriptState>) -> JoinHandle<()> {
        let view = self.clone();
        tokio::spawn(async move {
            let mut seen = transcripts.borrow().final_seq;
            loop {
                let (seq, text, listening) = {
                    let t = transcripts.borrow_and_update();
                    (t.final_seq, t.final_text.clone(), t.listening())
                };
                if seq != seen {
                    seen = seq;
                    view.hear(&text);
                }
                view.set_listening(listening);

                if transcripts.changed().await.is_err() {
                    break;
                }
            }
            view.set_listening(false);
        })
    }

    // -- Replies --

    /// The three reply tiles to show
    ///
    /// Before the dialogue service has answered these are the default drink
    /// tiles. Afterwards they are the service's top three replies, or none
    /// when it returned fewer than three.
    #[must_use]
    pub fn reply_tiles(&self) -> Vec<ReplyTile> {
        match self.dialogue().data {
            Some(response) => dialogue_tiles(&response.top_replies),
            None => drink_tiles(&self.prompt(), self.inner.state.borrow().selected_drink),
        }
    }

    /// Option groups from the latest dialogue response
    #[must_use]
    pub fn option_groups(&self) -> Vec<OptionGroupView> {
        self.dialogue()
            .data
            .map(|response| option_groups(&response.option_groups))
            .unwrap_or_default()
    }

    /// Expand or collapse the options panel; returns the new state
    pub fn toggle_options(&self) -> bool {
        let mut open = false;
        self.inner.state.send_modify(|s| {
            s.options_open = !s.options_open;
            open = s.options_open;
        });
        open
    }

    /// Make `key` the default drink and ask for it
    pub async fn select_drink(&self, key: &str) -> bool {
        let Some(drink) = rules::drink(key) else {
            return false;
        };
        self.inner.state.send_modify(|s| s.selected_drink = drink);
        self.speak(&drink_yes_phrase(drink)).await
    }

    /// Speak `"<Item>, please."`
    pub async fn choose_option(&self, item: &str) -> bool {
        self.speak(&choice_phrase(item)).await
    }

    /// Speak `"Could I have <item> instead, please?"`
    pub async fn choose_instead(&self, item: &str) -> bool {
        self.speak(&instead_phrase(item)).await
    }

    /// Speak the current prompt
    pub async fn speak_prompt(&self) -> bool {
        let prompt = self.prompt();
        self.speak(&prompt).await
    }

    /// Speak `text`, tracking status; returns whether it played
    pub async fn speak(&self, text: &str) -> bool {
        replace_task(&self.inner.status_timer, None);
        self.inner.state.send_modify(|s| {
            s.speak_error = None;
            s.speaking = true;
            s.status = STATUS_SPEAKING.to_string();
        });

        let result = self.inner.speaker.speak(text).await;

        self.inner.state.send_modify(|s| {
            s.speaking = false;
            if let Err(e) = &result {
                tracing::warn!(error = %e, "failed to speak");
                s.speak_error = Some(e.to_string());
                s.status = STATUS_SPEAK_ERROR.to_string();
            }
        });

        let weak = Arc::downgrade(&self.inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(STATUS_CLEAR_DELAY).await;
            if let Some(inner) = weak.upgrade() {
                inner.state.send_if_modified(|s| {
                    let clear = s.status == STATUS_SPEAKING || s.status == STATUS_SPEAK_ERROR;
                    if clear {
                        s.status.clear();
                    }
                    clear
                });
            }
        });
        replace_task(&self.inner.status_timer, Some(timer));

        result.is_ok()
    }

    // -- Preferences --

    #[must_use]
    pub fn location(&self) -> Location {
        self.inner.prefs.location()
    }

    pub fn set_location(&self, location: Location) {
        self.inner.prefs.set_location(location);
    }

    #[must_use]
    pub fn voice_mode(&self) -> bool {
        self.inner.prefs.voice_mode()
    }

    pub fn set_voice_mode(&self, enabled: bool) {
        self.inner.prefs.set_voice_mode(enabled);
        if !enabled {
            if let Ok(mut slot) = self.inner.gate.lock() {
                if let Some((_, gate)) = slot.as_mut() {
                    gate.disarm();
                }
            }
            replace_task(&self.inner.wake_timer, None);
            self.clear_status(STATUS_WAKE);
        }
    }

    #[must_use]
    pub fn show_spoken_text(&self) -> bool {
        self.inner.prefs.show_spoken_text()
    }

    pub fn set_show_spoken_text(&self, show: bool) {
        self.inner.prefs.set_show_spoken_text(show);
    }

    // -- Internals --

    fn request_replies(&self) {
        let Some(user_name) = self.name() else {
            return;
        };
        let (question, listening) = {
            let s = self.inner.state.borrow();
            (s.question.clone(), s.listening)
        };
        let location = self.location().as_str().to_string();
        let dialogue = Arc::clone(&self.inner.dialogue);

        let Ok(mut query) = self.inner.query.lock() else {
            return;
        };
        let memory = query.state().data.and_then(|d| d.memory);

        query.update(&question, listening, move |question_text| async move {
            let request = DialogueRequest {
                user_name,
                question_text,
                context: Some(HashMap::from([("location".to_string(), location)])),
                memory,
            };
            dialogue.replies(&request).await
        });
    }

    fn arm_wake_timer(&self, window: Duration) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let expired = inner
                .gate
                .lock()
                .ok()
                .and_then(|mut slot| slot.as_mut().map(|(_, g)| g.expire(Instant::now())))
                .unwrap_or(false);
            if expired {
                inner.state.send_if_modified(|s| {
                    let clear = s.status == STATUS_WAKE;
                    if clear {
                        s.status.clear();
                    }
                    clear
                });
            }
        });
        replace_task(&self.inner.wake_timer, Some(timer));
    }

    fn clear_status(&self, expected: &str) {
        self.inner.state.send_if_modified(|s| {
            let clear = s.status == expected;
            if clear {
                s.status.clear();
            }
            clear
        });
    }
}
