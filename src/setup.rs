//! Interactive first-run setup wizard (`aac setup`)

use std::path::PathBuf;

use dialoguer::{Confirm, Input, Select};

use crate::Config;
use crate::config::{ConfigFile, config_file_path, load_config_file, save_config_file};
use crate::speech::known_players;

/// Label for "no external player" in the player list
const DEVICE_OUTPUT: &str = "(default audio device)";

/// Run the interactive setup wizard
///
/// # Errors
///
/// Returns error if user input fails or config cannot be written
pub fn run_setup() -> anyhow::Result<()> {
    println!("AAC Companion Setup\n");

    let existing = load_config_file();
    let config_path =
        config_file_path().unwrap_or_else(|| PathBuf::from("~/.config/aac/config.toml"));

    if config_path.exists() {
        println!("Existing config found at {}\n", config_path.display());
    }

    // Current effective values (file layered over defaults) seed each prompt
    let current = Config::from_sources(existing.clone(), |_| None);

    // 1. Backend
    let api_url: String = Input::new()
        .with_prompt("Backend URL")
        .default(current.api_url.clone())
        .validate_with(|input: &String| {
            url::Url::parse(input)
                .map(|_| ())
                .map_err(|e| format!("invalid URL: {e}"))
        })
        .interact_text()?;

    // 2. Speech
    let language: String = Input::new()
        .with_prompt("Recognition language")
        .default(current.language.clone())
        .interact_text()?;

    let voice_input: String = Input::new()
        .with_prompt("TTS voice (leave blank for the backend default)")
        .default(current.tts_voice.clone().unwrap_or_default())
        .allow_empty(true)
        .interact_text()?;
    let tts_voice = Some(voice_input.trim().to_string()).filter(|v| !v.is_empty());

    // 3. Playback
    let mut players: Vec<&str> = vec![DEVICE_OUTPUT];
    players.extend(known_players().filter(|name| which::which(name).is_ok()));

    let default_player = current
        .player
        .as_deref()
        .and_then(|p| players.iter().position(|&l| l == p))
        .unwrap_or(0);

    let player_idx = Select::new()
        .with_prompt("Play speech through")
        .items(&players)
        .default(default_player)
        .interact()?;
    let player = (player_idx > 0).then(|| players[player_idx].to_string());

    // 4. Timing
    let debounce_ms: u64 = Input::new()
        .with_prompt("Delay before fetching replies (ms)")
        .default(existing.ui.debounce_ms.unwrap_or(crate::config::DEFAULT_DEBOUNCE_MS))
        .interact_text()?;

    let wake_window_secs: u64 = Input::new()
        .with_prompt("Seconds to wait for a question after \"hey <name>\"")
        .default(
            existing
                .ui
                .wake_window_secs
                .unwrap_or(crate::config::DEFAULT_WAKE_WINDOW_SECS),
        )
        .interact_text()?;

    // 5. Build and write config
    let mut config_file = ConfigFile::default();
    config_file.api.base_url = Some(api_url);
    config_file.speech.language = Some(language);
    config_file.speech.tts_voice = tts_voice;
    config_file.speech.player = player;
    config_file.ui.debounce_ms = Some(debounce_ms);
    config_file.ui.wake_window_secs = Some(wake_window_secs);
    config_file.storage = existing.storage;

    if config_file == load_config_file() {
        println!("\nNo changes.");
        return Ok(());
    }

    let write = Confirm::new()
        .with_prompt(format!("Write config to {}?", config_path.display()))
        .default(true)
        .interact()?;

    if write {
        save_config_file(&config_file, &config_path)?;
        println!("\nConfig written to {}", config_path.display());
        println!("Run `aac converse` to start.");
    } else {
        println!("\nNothing written.");
    }

    Ok(())
}
