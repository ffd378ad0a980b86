//! AAC Companion - client for an augmentative and alternative communication
//! assistant backend
//!
//! This library provides the client-side logic of the assistant:
//! - Typed wrappers over the phrases, dialogue, suggestions, speech-token and
//!   TTS endpoints
//! - A speech-to-text session with interim/final transcripts
//! - A wake-phrase gate ("hey <name>") with a timed window
//! - Debounced, stale-safe dialogue and suggestion requests
//! - Screen controllers for conversation, compose and the phrase library
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Front end (aac CLI)                  │
//! │   Conversation  │  Compose  │  Phrases  │  Prefs     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Views                             │
//! │  Debounce  │  Wake gate  │  Speech session  │ TTS   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │              AAC backend (HTTP/JSON)                 │
//! │  Phrases  │  Dialogue  │  Suggestions  │  Speech    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod debounce;
pub mod error;
pub mod prefs;
pub mod rules;
pub mod setup;
pub mod speech;
pub mod time_bucket;
pub mod views;
pub mod wake;

pub use api::ApiClient;
pub use config::Config;
pub use error::{Error, Result};
pub use prefs::{FileStore, Location, MemoryStore, PreferenceStore, Preferences};
pub use time_bucket::TimeBucket;
pub use views::{ComposeView, ConversationView, PhrasesView};
pub use wake::{WakeOutcome, WakePhraseGate};
