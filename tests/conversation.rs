//! Conversation screen behavior: debounced replies, wake phrase, speaking

use std::sync::Arc;
use std::time::Duration;

use aac_companion::Preferences;
use aac_companion::speech::{SessionState, TranscriptState};
use aac_companion::views::conversation::STATUS_WAKE;
use aac_companion::views::{ConversationSettings, ConversationView, STATUS_SPEAK_ERROR};
use tokio::sync::watch;
use tokio::time::sleep;

mod common;
use common::{FakeDialogue, RecordingSink, echo_speaker};

const QUIET: Duration = Duration::from_millis(250);

struct Harness {
    view: ConversationView,
    prefs: Preferences,
    dialogue: Arc<FakeDialogue>,
    sink: Arc<RecordingSink>,
}

fn setup_with_sink(sink: Arc<RecordingSink>) -> Harness {
    let prefs = Preferences::in_memory();
    prefs.set_name("Sam");
    let dialogue = FakeDialogue::new();
    let view = ConversationView::new(
        prefs.clone(),
        dialogue.clone(),
        echo_speaker(&sink),
        ConversationSettings::default(),
    );
    Harness {
        view,
        prefs,
        dialogue,
        sink,
    }
}

fn setup() -> Harness {
    setup_with_sink(RecordingSink::new())
}

#[tokio::test(start_paused = true)]
async fn test_replies_fetched_after_quiet_period() {
    let h = setup();

    h.view.set_question("Do you want a drink?");
    sleep(QUIET - Duration::from_millis(50)).await;
    assert!(h.dialogue.questions().is_empty());

    sleep(Duration::from_millis(100)).await;
    assert_eq!(h.dialogue.questions(), ["Do you want a drink?"]);

    let request = h.dialogue.requests.lock().unwrap()[0].clone();
    assert_eq!(request.user_name, "Sam");
    assert_eq!(
        request.context.unwrap().get("location").map(String::as_str),
        Some("HOME")
    );
    assert!(request.memory.is_none());

    let titles: Vec<String> = h.view.reply_tiles().into_iter().map(|t| t.title).collect();
    assert_eq!(titles, ["Yes", "No", "Later"]);
}

#[tokio::test(start_paused = true)]
async fn test_rapid_edits_issue_one_request() {
    let h = setup();

    h.view.set_question("Do");
    sleep(Duration::from_millis(100)).await;
    h.view.set_question("Do you want");
    sleep(Duration::from_millis(100)).await;
    h.view.set_question("Do you want tea?");
    sleep(QUIET * 2).await;

    assert_eq!(h.dialogue.questions(), ["Do you want tea?"]);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_question_not_refetched() {
    let h = setup();

    h.view.set_question("Are you cold?");
    sleep(QUIET * 2).await;
    h.view.set_question("  Are you cold?  ");
    sleep(QUIET * 2).await;

    assert_eq!(h.dialogue.questions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_follow_up_carries_memory() {
    let h = setup();

    h.view.set_question("Do you want a drink?");
    sleep(QUIET * 2).await;
    h.view.set_question("Which one?");
    sleep(QUIET * 2).await;

    let requests = h.dialogue.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    let memory = requests[1].memory.clone().unwrap();
    assert_eq!(memory.last_question_text, "Do you want a drink?");
}

#[tokio::test(start_paused = true)]
async fn test_no_request_while_listening() {
    let h = setup();

    h.view.set_listening(true);
    h.view.set_question("Are you hungry?");
    sleep(QUIET * 4).await;
    assert!(h.dialogue.questions().is_empty());

    h.view.set_listening(false);
    sleep(QUIET * 2).await;
    assert_eq!(h.dialogue.questions(), ["Are you hungry?"]);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_response_discarded() {
    let h = setup();
    h.dialogue.delay("Slow question", Duration::from_secs(2));

    h.view.set_question("Slow question");
    sleep(QUIET * 2).await;
    h.view.set_question("Fast question");
    sleep(QUIET * 2).await;
    assert_eq!(
        h.view.dialogue().data.unwrap().intent,
        "asked:Fast question"
    );

    // the slow answer lands later and must not replace the newer one
    sleep(Duration::from_secs(3)).await;
    let state = h.view.dialogue();
    assert_eq!(state.data.unwrap().intent, "asked:Fast question");
    assert!(!state.loading);
}

#[tokio::test(start_paused = true)]
async fn test_no_request_before_onboarding() {
    let h = setup();
    h.prefs.clear_name();

    h.view.set_question("Do you want tea?");
    sleep(QUIET * 2).await;
    assert!(h.dialogue.questions().is_empty());
    assert!(h.view.needs_onboarding());
}

#[tokio::test(start_paused = true)]
async fn test_default_tiles_follow_prompt() {
    let h = setup();

    assert_eq!(h.view.prompt(), "Sam, would you like a drink?");
    let tiles = h.view.reply_tiles();
    assert_eq!(tiles[0].title, "Yes (water)");
    assert_eq!(tiles[2].title, "Orange juice instead");

    h.view.set_question("Would you like some milk?");
    // tiles reflect the question before any reply arrives
    let tiles = h.view.reply_tiles();
    assert_eq!(tiles[0].title, "Yes (milk)");
}

#[tokio::test(start_paused = true)]
async fn test_voice_mode_ignores_unaddressed_speech() {
    let h = setup();
    h.view.set_voice_mode(true);

    h.view.hear("is it raining");
    assert_eq!(h.view.state().question, "");

    h.view.hear("Hey Sam, do you want juice?");
    assert_eq!(h.view.state().question, "do you want juice?");
}

#[tokio::test(start_paused = true)]
async fn test_bare_wake_phrase_opens_window() {
    let h = setup();
    h.view.set_voice_mode(true);

    h.view.hear("hey sam");
    assert_eq!(h.view.state().status, STATUS_WAKE);
    assert!(h.view.wake_armed());

    sleep(Duration::from_secs(3)).await;
    h.view.hear("do you want to go outside");
    let state = h.view.state();
    assert_eq!(state.question, "do you want to go outside");
    assert_eq!(state.status, "");
    assert!(!h.view.wake_armed());
}

#[tokio::test(start_paused = true)]
async fn test_wake_window_expires() {
    let h = setup();
    h.view.set_voice_mode(true);

    h.view.hear("Hey Sam");
    sleep(Duration::from_secs(8)).await;
    assert_eq!(h.view.state().status, "");
    assert!(!h.view.wake_armed());

    h.view.hear("do you want to go outside");
    assert_eq!(h.view.state().question, "");
}

#[tokio::test(start_paused = true)]
async fn test_voice_mode_off_accepts_everything() {
    let h = setup();

    h.view.hear("  is it raining  ");
    assert_eq!(h.view.state().question, "is it raining");
}

#[tokio::test(start_paused = true)]
async fn test_follow_speech_feeds_final_transcripts() {
    let h = setup();
    let (tx, rx) = watch::channel(TranscriptState::default());
    let follower = h.view.follow_speech(rx);

    tx.send_modify(|t| t.state = SessionState::Listening);
    sleep(Duration::from_millis(10)).await;
    assert!(h.view.state().listening);

    tx.send_modify(|t| {
        t.final_text = "Do you want a biscuit?".to_string();
        t.final_seq += 1;
    });
    sleep(Duration::from_millis(10)).await;
    assert_eq!(h.view.state().question, "Do you want a biscuit?");

    // held back until capture stops
    sleep(QUIET * 2).await;
    assert!(h.dialogue.questions().is_empty());

    tx.send_modify(|t| t.state = SessionState::Idle);
    sleep(QUIET * 2).await;
    assert_eq!(h.dialogue.questions(), ["Do you want a biscuit?"]);

    drop(tx);
    follower.await.unwrap();
    assert!(!h.view.state().listening);
}

#[tokio::test(start_paused = true)]
async fn test_speaking_tiles_and_options() {
    let h = setup();

    h.view.set_question("Do you want a drink?");
    sleep(QUIET * 2).await;

    let tile = h.view.reply_tiles()[1].clone();
    assert!(h.view.speak(&tile.text).await);

    let groups = h.view.option_groups();
    assert_eq!(groups[0].title, "Drinks");
    let milk = groups[0].first().unwrap().label.clone();
    assert_eq!(milk, "Milk");
    assert!(h.view.choose_option(&milk).await);
    assert!(h.view.choose_instead(&milk).await);

    assert_eq!(
        h.sink.spoken(),
        [
            "No thank you.",
            "Milk, please.",
            "Could I have milk instead, please?"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_select_drink_changes_default() {
    let h = setup();

    assert!(h.view.select_drink("tea").await);
    assert_eq!(h.sink.spoken(), ["Yes please, I'd like tea."]);
    assert_eq!(h.view.reply_tiles()[0].title, "Yes (tea)");
    assert!(!h.view.select_drink("lemonade").await);
}

#[tokio::test(start_paused = true)]
async fn test_speak_status_clears() {
    let h = setup_with_sink(RecordingSink::broken());

    assert!(!h.view.speak("Hello").await);
    let state = h.view.state();
    assert_eq!(state.status, STATUS_SPEAK_ERROR);
    assert_eq!(state.speak_error.as_deref(), Some("Audio playback failed"));
    assert!(!state.speaking);

    sleep(Duration::from_millis(600)).await;
    assert_eq!(h.view.state().status, "");
}

#[tokio::test(start_paused = true)]
async fn test_onboarding_and_reset() {
    let h = setup();
    h.prefs.clear_name();
    assert!(h.view.needs_onboarding());

    assert!(!h.view.complete_onboarding("   ").await);
    assert!(h.view.complete_onboarding("  Alex ").await);
    assert_eq!(h.view.name().as_deref(), Some("Alex"));
    assert_eq!(h.sink.spoken(), ["Hi Alex."]);

    h.view.set_question("Do you want tea?");
    h.view.reset_name();
    assert!(h.view.needs_onboarding());
    assert_eq!(h.view.state().question, "");
}
