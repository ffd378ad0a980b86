//! Compose screen: debounced suggestions and shortcuts

use std::sync::Arc;
use std::time::Duration;

use aac_companion::Preferences;
use aac_companion::api::LocationCategory;
use aac_companion::views::{ComposeKey, ComposeView};
use tokio::time::sleep;

mod common;
use common::{FakeSuggestions, RecordingSink, echo_speaker};

const QUIET: Duration = Duration::from_millis(250);

fn setup() -> (ComposeView, Arc<FakeSuggestions>, Arc<RecordingSink>, Preferences) {
    let prefs = Preferences::in_memory();
    let suggestions = FakeSuggestions::new();
    let sink = RecordingSink::new();
    let view = ComposeView::new(
        prefs.clone(),
        suggestions.clone(),
        echo_speaker(&sink),
        QUIET,
    );
    (view, suggestions, sink, prefs)
}

#[tokio::test(start_paused = true)]
async fn test_typing_fetches_once_settled() {
    let (view, suggestions, _, _) = setup();

    view.set_message("I");
    sleep(Duration::from_millis(100)).await;
    view.set_message("I want");
    sleep(QUIET * 2).await;

    assert_eq!(suggestions.prefixes(), ["I want"]);
    let request = suggestions.requests.lock().unwrap()[0].clone();
    assert_eq!(request.location_category, LocationCategory::Home);

    let texts: Vec<String> = view
        .suggestions()
        .into_iter()
        .map(|s| s.phrase.text)
        .collect();
    assert_eq!(texts, ["I want please", "I want now"]);
}

#[tokio::test(start_paused = true)]
async fn test_clearing_message_clears_suggestions() {
    let (view, suggestions, _, _) = setup();

    view.set_message("Can I");
    sleep(QUIET * 2).await;
    assert_eq!(view.suggestions().len(), 2);

    assert!(view.handle_key(ComposeKey::Escape).await);
    assert_eq!(view.state().message, "");
    assert!(view.suggestions().is_empty());

    // the same prefix is requested again after a clear
    view.set_message("Can I");
    sleep(QUIET * 2).await;
    assert_eq!(suggestions.prefixes(), ["Can I", "Can I"]);
}

#[tokio::test(start_paused = true)]
async fn test_shortcuts_apply_suggestions() {
    let (view, _, _, _) = setup();

    view.set_message("I need");
    sleep(QUIET * 2).await;

    assert!(view.handle_key(ComposeKey::Digit(2)).await);
    assert_eq!(view.state().message, "I need now");

    sleep(QUIET * 2).await;
    assert!(view.handle_key(ComposeKey::Tab).await);
    assert_eq!(view.state().message, "I need now please");

    assert!(!view.handle_key(ComposeKey::Digit(9)).await);
}

#[tokio::test(start_paused = true)]
async fn test_enter_speaks_message() {
    let (view, _, sink, _) = setup();

    assert!(!view.handle_key(ComposeKey::Enter).await);
    assert!(sink.spoken().is_empty());

    view.set_message("  Hello there  ");
    assert!(view.handle_key(ComposeKey::Enter).await);
    assert_eq!(sink.spoken(), ["Hello there"]);
    assert_eq!(view.state().status, "Speaking");

    sleep(Duration::from_millis(600)).await;
    assert_eq!(view.state().status, "");
}

#[tokio::test(start_paused = true)]
async fn test_location_change_refetches() {
    let (view, suggestions, _, prefs) = setup();

    view.set_message("Can I");
    sleep(QUIET * 2).await;

    view.set_location_category(LocationCategory::School);
    sleep(QUIET * 2).await;

    assert_eq!(prefs.location_category(), LocationCategory::School);
    let categories: Vec<LocationCategory> = suggestions
        .requests
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.location_category)
        .collect();
    assert_eq!(categories, [LocationCategory::Home, LocationCategory::School]);
}
