use std::io::Write as _;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use aac_companion::api::{
    DialogueResponse, LocationCategory, Phrase, PhraseDraft, SpeechTokenSource,
    SuggestionsResponse,
};
use aac_companion::debounce::QueryState;
use aac_companion::rules::DRINKS;
use aac_companion::speech::{
    AudioSink, AzureSpeechProvider, ExternalPlayerSink, Speaker, SpeechSession, TranscriptState,
};
use aac_companion::views::{
    ComposeKey, ComposeView, Confirmer, ConversationView, OptionGroupView, PhrasesView, ReplyTile,
};
use aac_companion::{ApiClient, Config, FileStore, Location, Preferences};

/// AAC Companion - conversation replies, phrase suggestions and speech for
/// an AAC assistant backend
#[derive(Parser)]
#[command(name = "aac", version, about)]
struct Cli {
    /// Backend URL (overrides config file and `AAC_API_URL`)
    #[arg(long)]
    api_url: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer questions with suggested replies
    Converse {
        /// Transcribe questions from the microphone
        #[arg(long)]
        listen: bool,
    },
    /// Type a message with phrase suggestions
    Compose,
    /// Manage the phrase library
    Phrases {
        #[command(subcommand)]
        action: PhrasesCommand,
    },
    /// Speak text aloud
    Say {
        /// Text to speak
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Show or change saved preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsCommand,
    },
    /// Fetch a speech service token (checks backend credentials)
    Token,
    /// Interactive first-run setup
    Setup,
}

#[derive(Subcommand)]
enum PhrasesCommand {
    /// List phrases
    List {
        /// Free-text search
        #[arg(short, long)]
        query: Option<String>,
        /// Exact category
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Add a phrase
    Add {
        text: String,
        #[arg(short, long)]
        category: String,
    },
    /// Edit a phrase; omitted fields keep their current value
    Edit {
        id: String,
        #[arg(short, long)]
        text: Option<String>,
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Delete a phrase
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Add the starter phrases if the library is empty
    Seed,
}

#[derive(Subcommand)]
enum PrefsCommand {
    /// Print all preferences
    Show,
    /// Change one preference (an empty name forgets it)
    Set { key: PrefKey, value: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum PrefKey {
    Name,
    Location,
    LocationCategory,
    VoiceMode,
    ShowSpokenText,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; stdout belongs to the UI
    let filter = match cli.verbose {
        0 => "info,aac_companion=info",
        1 => "info,aac_companion=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load();
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }
    tracing::debug!(?config, "loaded configuration");

    let api = Arc::new(ApiClient::new(&config.api_url)?);
    let prefs = Preferences::new(Arc::new(FileStore::open(config.prefs_path.clone())));

    match cli.command {
        Command::Converse { listen } => converse(&config, &api, prefs, listen).await,
        Command::Compose => compose(&config, &api, prefs).await,
        Command::Phrases { action } => phrases(&api, action).await,
        Command::Say { text } => say(&config, &api, &text.join(" ")).await,
        Command::Prefs { action } => prefs_command(&prefs, &config, action),
        Command::Token => token(&api).await,
        Command::Setup => aac_companion::setup::run_setup(),
    }
}

// -- Audio --

/// Pick the output: configured player, then the audio device, then any
/// installed player
fn audio_sink(config: &Config) -> anyhow::Result<Arc<dyn AudioSink>> {
    if let Some(player) = config.player.as_deref() {
        return Ok(Arc::new(ExternalPlayerSink::named(player)?));
    }

    #[cfg(feature = "audio")]
    {
        match aac_companion::speech::SpeakerSink::new() {
            Ok(sink) => return Ok(Arc::new(sink)),
            Err(e) => tracing::debug!(error = %e, "no audio device, trying external players"),
        }
    }

    Ok(Arc::new(ExternalPlayerSink::detect()?))
}

fn speaker(config: &Config, api: &Arc<ApiClient>) -> anyhow::Result<Speaker> {
    let sink = audio_sink(config)?;
    tracing::debug!(sink = sink.name(), voice = ?config.tts_voice, "audio output ready");
    Ok(Speaker::new(api.clone(), sink, config.tts_voice.clone()))
}

async fn say(config: &Config, api: &Arc<ApiClient>, text: &str) -> anyhow::Result<()> {
    if text.trim().is_empty() {
        anyhow::bail!("nothing to say");
    }
    speaker(config, api)?.speak(text).await?;
    Ok(())
}

// -- Conversation --

enum Next {
    Continue,
    Onboard,
    Quit,
}

#[allow(clippy::future_not_send)]
async fn converse(
    config: &Config,
    api: &Arc<ApiClient>,
    prefs: Preferences,
    listen: bool,
) -> anyhow::Result<()> {
    let view = ConversationView::new(
        prefs,
        api.clone(),
        speaker(config, api)?,
        config.conversation_settings(),
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if !onboard(&view, &mut lines).await? {
        return Ok(());
    }

    let session = listen.then(|| {
        SpeechSession::new(
            api.clone(),
            Arc::new(AzureSpeechProvider::new()),
            config.language.clone(),
        )
    });

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();
    if let Some(session) = &session {
        tasks.push(view.follow_speech(session.subscribe()));
        tasks.push(show_transcripts(view.clone(), session.subscribe()));
        start_listening(session).await;
    }
    if let Some(rx) = view.subscribe_dialogue() {
        tasks.push(show_replies(view.clone(), rx));
    }
    tasks.push(show_status(view.subscribe()));

    print_tiles(&view.prompt(), &view.reply_tiles());

    loop {
        prompt("> ")?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match converse_input(&view, session.as_ref(), line.trim()).await {
            Next::Continue => {}
            Next::Onboard => {
                if !onboard(&view, &mut lines).await? {
                    break;
                }
            }
            Next::Quit => break,
        }
    }

    if let Some(session) = &session {
        session.stop().await;
    }
    for task in tasks {
        task.abort();
    }
    Ok(())
}

/// Ask for a name until one is given; false on end of input
async fn onboard<R>(
    view: &ConversationView,
    lines: &mut tokio::io::Lines<R>,
) -> anyhow::Result<bool>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    while view.needs_onboarding() {
        prompt("What is your name? ")?;
        let Some(line) = lines.next_line().await? else {
            return Ok(false);
        };
        view.complete_onboarding(&line).await;
    }
    println!(
        "Hello {}. Type a question, 1-3 to speak a reply, or /help.",
        view.name().unwrap_or_default()
    );
    Ok(true)
}

async fn start_listening(session: &SpeechSession) {
    session.start().await;
    match session.snapshot().error {
        Some(e) => println!("Microphone unavailable: {e}"),
        None => println!("Listening."),
    }
}

#[allow(clippy::too_many_lines)]
async fn converse_input(view: &ConversationView, session: Option<&SpeechSession>, line: &str) -> Next {
    if line.is_empty() {
        return Next::Continue;
    }

    if let Ok(n @ 1..=3) = line.parse::<usize>() {
        match view.reply_tiles().get(n - 1) {
            Some(tile) => {
                view.speak(&tile.text).await;
            }
            None => println!("No reply {n}."),
        }
        return Next::Continue;
    }

    let Some(command) = line.strip_prefix('/') else {
        view.set_question(line);
        return Next::Continue;
    };

    let mut words = command.split_whitespace();
    match (words.next().unwrap_or_default(), words.next(), words.next()) {
        ("q" | "quit", ..) => return Next::Quit,
        ("p" | "prompt", ..) => {
            view.speak_prompt().await;
        }
        ("c" | "clear", ..) => {
            view.clear_question();
            print_tiles(&view.prompt(), &view.reply_tiles());
        }
        ("o" | "options", None, _) => {
            if view.toggle_options() {
                print_options(&view.option_groups());
            }
        }
        ("o" | "options", Some(group), Some(item)) => {
            if let Some(label) = option_label(view, group, item) {
                view.choose_option(&label).await;
            }
        }
        ("i" | "instead", Some(group), Some(item)) => {
            if let Some(label) = option_label(view, group, item) {
                view.choose_instead(&label).await;
            }
        }
        ("d" | "drink", Some(key), _) => {
            if !view.select_drink(key).await {
                println!("Unknown drink {key}.");
            }
        }
        ("d" | "drink", None, _) => {
            let keys: Vec<&str> = DRINKS.iter().map(|d| d.key).collect();
            println!("Drinks: {}", keys.join(", "));
        }
        ("l" | "location", Some(value), _) => match value.parse::<Location>() {
            Ok(location) => {
                view.set_location(location);
                println!("Location: {}", location.label());
            }
            Err(e) => println!("{e}"),
        },
        ("v" | "voice", ..) => {
            let enabled = !view.voice_mode();
            view.set_voice_mode(enabled);
            println!("Voice mode {}.", on_off(enabled));
        }
        ("s" | "show", ..) => {
            let show = !view.show_spoken_text();
            view.set_show_spoken_text(show);
            println!("Show spoken text {}.", on_off(show));
        }
        ("m" | "mic", ..) => match session {
            Some(session) if session.is_listening() => {
                session.stop().await;
                println!("Stopped listening.");
            }
            Some(session) => start_listening(session).await,
            None => println!("Start with --listen to use the microphone."),
        },
        ("t" | "test", ..) => {
            view.test_voice().await;
        }
        ("r" | "reset", ..) => {
            view.reset_name();
            return Next::Onboard;
        }
        _ => print_converse_help(),
    }
    Next::Continue
}

/// Resolve 1-based `group`/`item` indices to an option label
fn option_label(view: &ConversationView, group: &str, item: &str) -> Option<String> {
    let groups = view.option_groups();
    let label = group
        .parse::<usize>()
        .ok()
        .and_then(|g| groups.get(g.checked_sub(1)?))
        .and_then(|g| item.parse::<usize>().ok().and_then(|i| g.items.get(i.checked_sub(1)?)))
        .map(|i| i.label.clone());
    if label.is_none() {
        println!("No option {group} {item}.");
    }
    label
}

fn print_converse_help() {
    println!(
        "  <text>          ask a question
  1-3             speak a reply
  /p              speak the question
  /c              clear the question
  /o              show or hide more options
  /o G I          say option I of group G
  /i G I          ask for option I of group G instead
  /d [drink]      choose a drink (lists drinks without an argument)
  /l home|school|out
  /v              toggle voice mode (\"hey <name>\" before questions)
  /s              toggle showing spoken text
  /m              start or stop the microphone
  /t              test the voice
  /r              change your name
  /q              quit"
    );
}

fn print_tiles(prompt: &str, tiles: &[ReplyTile]) {
    println!("\n{prompt}");
    if tiles.is_empty() {
        println!("  (no replies)");
    }
    for (i, tile) in tiles.iter().enumerate() {
        println!("  {} {} {:<12} {}", i + 1, tile.icon.as_deref().unwrap_or_default(), tile.title, tile.text);
    }
}

fn print_options(groups: &[OptionGroupView]) {
    if groups.is_empty() {
        println!("  (no more options)");
    }
    for (g, group) in groups.iter().enumerate() {
        println!("  {} {}", g + 1, group.title);
        for (i, item) in group.items.iter().enumerate() {
            println!("     {} {} {}", i + 1, item.icon, item.label);
        }
    }
}

fn show_replies(
    view: ConversationView,
    mut rx: watch::Receiver<QueryState<DialogueResponse>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            if state.loading {
                continue;
            }
            if let Some(e) = state.error {
                println!("\n(could not fetch replies: {e})");
                continue;
            }
            print_tiles(&view.prompt(), &view.reply_tiles());
        }
    })
}

fn show_transcripts(
    view: ConversationView,
    mut rx: watch::Receiver<TranscriptState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut seen = rx.borrow().final_seq;
        let mut last_error: Option<String> = None;
        while rx.changed().await.is_ok() {
            let transcript = rx.borrow_and_update().clone();
            if transcript.final_seq != seen {
                seen = transcript.final_seq;
                if view.show_spoken_text() {
                    println!("\nheard: {}", transcript.final_text);
                }
            }
            if transcript.error != last_error {
                if let Some(e) = &transcript.error {
                    println!("\n(speech: {e})");
                }
                last_error = transcript.error;
            }
        }
    })
}

fn show_status(
    mut rx: watch::Receiver<aac_companion::views::ConversationState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last = String::new();
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().status.clone();
            if status != last && !status.is_empty() {
                println!("[{status}]");
            }
            last = status;
        }
    })
}

// -- Compose --

#[allow(clippy::future_not_send)]
async fn compose(config: &Config, api: &Arc<ApiClient>, prefs: Preferences) -> anyhow::Result<()> {
    let view = ComposeView::new(prefs, api.clone(), speaker(config, api)?, config.debounce);
    let renderer = view.subscribe_query().map(|rx| show_suggestions(view.clone(), rx));

    println!(
        "Type a message. Enter on an empty line speaks it; /1-/9 or /tab picks a suggestion, \
         /clear starts over, /loc home|school|work|other sets the place, /q quits."
    );
    println!("Place: {}", view.location_category());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt("> ")?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let Some(command) = line.trim().strip_prefix('/') else {
            if line.trim().is_empty() {
                compose_key(&view, ComposeKey::Enter).await;
            } else {
                view.set_message(&line);
            }
            continue;
        };

        let mut words = command.split_whitespace();
        match (words.next().unwrap_or_default(), words.next()) {
            ("q" | "quit", _) => break,
            ("tab", _) => compose_key(&view, ComposeKey::Tab).await,
            ("clear" | "esc", _) => compose_key(&view, ComposeKey::Escape).await,
            ("loc", Some(value)) => match value.parse::<LocationCategory>() {
                Ok(category) => {
                    view.set_location_category(category);
                    println!("Place: {category}");
                }
                Err(e) => println!("{e}"),
            },
            (key, _) => match key.chars().next().and_then(ComposeKey::from_char) {
                Some(k @ ComposeKey::Digit(_)) if key.len() == 1 => compose_key(&view, k).await,
                _ => println!("Unknown command /{key}."),
            },
        }
    }

    if let Some(renderer) = renderer {
        renderer.abort();
    }
    Ok(())
}

async fn compose_key(view: &ComposeView, key: ComposeKey) {
    if !view.handle_key(key).await {
        return;
    }
    let state = view.state();
    match key {
        ComposeKey::Enter => {
            if let Some(e) = state.speak_error {
                println!("Error speaking: {e}");
            }
        }
        _ => println!("Message: {}", state.message),
    }
}

fn show_suggestions(
    view: ComposeView,
    mut rx: watch::Receiver<QueryState<SuggestionsResponse>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            if state.loading {
                continue;
            }
            if let Some(e) = state.error {
                println!("\n(suggestions unavailable: {e})");
                continue;
            }
            let items = view.suggestions();
            if items.is_empty() {
                continue;
            }
            println!();
            for (i, item) in items.iter().take(9).enumerate() {
                println!(
                    "  {} {} ({})",
                    i + 1,
                    item.phrase.text,
                    item.phrase.category
                );
            }
        }
    })
}

// -- Phrases --

fn confirm_prompt(prompt: &str) -> bool {
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .unwrap_or(false)
}

#[allow(clippy::future_not_send)]
async fn phrases(api: &Arc<ApiClient>, action: PhrasesCommand) -> anyhow::Result<()> {
    let confirmer: Arc<dyn Confirmer> = if matches!(action, PhrasesCommand::Delete { yes: true, .. })
    {
        Arc::new(|_: &str| true)
    } else {
        Arc::new(confirm_prompt)
    };
    let view = PhrasesView::new(api.clone(), confirmer);

    match action {
        PhrasesCommand::List { query, category } => {
            view.set_filters(
                query.as_deref().unwrap_or_default(),
                category.as_deref().unwrap_or_default(),
            )
            .await;
            let state = view.state();
            if let Some(e) = state.error {
                anyhow::bail!("failed to load phrases: {e}");
            }
            print_phrases(&state.phrases);
        }
        PhrasesCommand::Add { text, category } => {
            let phrase = view.create(&PhraseDraft::new(text, category)).await?;
            println!("Phrase created");
            print_phrases(&[phrase]);
        }
        PhrasesCommand::Edit { id, text, category } => {
            if !view.start_edit(&id).await {
                anyhow::bail!(
                    "failed to load phrase {id}: {}",
                    view.state().error.unwrap_or_default()
                );
            }
            let current = view
                .state()
                .editing
                .ok_or_else(|| anyhow::anyhow!("phrase {id} not loaded"))?;
            let draft = PhraseDraft::new(
                text.unwrap_or(current.text),
                category.unwrap_or(current.category),
            );
            if let Some(phrase) = view.update(&draft).await? {
                println!("Phrase updated");
                print_phrases(&[phrase]);
            }
        }
        PhrasesCommand::Delete { id, .. } => {
            view.load().await;
            if view.delete(&id).await {
                println!("Phrase deleted");
            } else if let Some(e) = view.state().error {
                anyhow::bail!("failed to delete phrase {id}: {e}");
            } else {
                println!("Not deleted");
            }
        }
        PhrasesCommand::Seed => match view.seed_demo_if_empty().await? {
            0 => println!("Library already has phrases; nothing added"),
            n => println!("Added {n} starter phrases"),
        },
    }
    Ok(())
}

fn print_phrases(phrases: &[Phrase]) {
    if phrases.is_empty() {
        println!("No phrases.");
        return;
    }
    let width = phrases.iter().map(|p| p.id.len()).max().unwrap_or(0);
    for phrase in phrases {
        println!(
            "{:<width$}  {:<10}  {}",
            phrase.id, phrase.category, phrase.text
        );
    }
}

// -- Preferences --

fn prefs_command(prefs: &Preferences, config: &Config, action: PrefsCommand) -> anyhow::Result<()> {
    match action {
        PrefsCommand::Show => {
            println!("file:              {}", config.prefs_path.display());
            println!(
                "name:              {}",
                prefs.name().unwrap_or_else(|| "(not set)".to_string())
            );
            println!("location:          {}", prefs.location());
            println!("location-category: {}", prefs.location_category());
            println!("voice-mode:        {}", on_off(prefs.voice_mode()));
            println!("show-spoken-text:  {}", on_off(prefs.show_spoken_text()));
        }
        PrefsCommand::Set { key, value } => match key {
            PrefKey::Name if value.trim().is_empty() => prefs.clear_name(),
            PrefKey::Name => prefs.set_name(value.trim()),
            PrefKey::Location => prefs.set_location(value.parse()?),
            PrefKey::LocationCategory => prefs.set_location_category(value.parse()?),
            PrefKey::VoiceMode => prefs.set_voice_mode(parse_switch(&value)?),
            PrefKey::ShowSpokenText => prefs.set_show_spoken_text(parse_switch(&value)?),
        },
    }
    Ok(())
}

fn parse_switch(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => anyhow::bail!("expected on or off, got {other:?}"),
    }
}

const fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

// -- Speech token --

async fn token(api: &ApiClient) -> anyhow::Result<()> {
    let token = api.speech_token().await?;
    let shown: String = token.token.chars().take(8).collect();
    println!("region:     {}", token.region);
    println!("expires in: {}s", token.expires_in_seconds);
    println!("token:      {shown}…");
    Ok(())
}

fn prompt(text: &str) -> anyhow::Result<()> {
    print!("{text}");
    std::io::stdout().flush()?;
    Ok(())
}
