//! Screen controllers
//!
//! Each view owns the client-side state of one screen and exposes it as a
//! `watch` channel so any front end (the terminal UI in `main.rs`, or tests)
//! can render it. View methods never hold a lock across an `.await`.

pub mod compose;
pub mod conversation;
pub mod phrases;

use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

pub use compose::{ComposeKey, ComposeState, ComposeView};
pub use conversation::{
    ConversationSettings, ConversationState, ConversationView, OptionGroupView, OptionItem,
    ReplyTile,
};
pub use phrases::{Confirmer, DEMO_PHRASES, PhrasesState, PhrasesView};

/// Status line while text is being spoken
pub const STATUS_SPEAKING: &str = "Speaking";

/// Status line after speaking failed
pub const STATUS_SPEAK_ERROR: &str = "Error speaking";

/// Delay before the speaking status line clears
pub const STATUS_CLEAR_DELAY: Duration = Duration::from_millis(500);

/// Replace the task in `slot`, aborting the one it held
fn replace_task(slot: &Mutex<Option<JoinHandle<()>>>, task: Option<JoinHandle<()>>) {
    if let Ok(mut slot) = slot.lock() {
        if let Some(old) = std::mem::replace(&mut *slot, task) {
            old.abort();
        }
    }
}
