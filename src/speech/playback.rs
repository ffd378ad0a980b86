//! Playing synthesized speech

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use crate::api::TtsApi;
use crate::{Error, Result};

/// Message surfaced when audio could not be played
pub const PLAYBACK_FAILED: &str = "Audio playback failed";

/// Something that can play an encoded (MP3) audio clip to completion
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play `audio` and return once playback has finished
    ///
    /// # Errors
    ///
    /// Returns [`Error::Playback`] if the clip cannot be played
    async fn play(&self, audio: &[u8]) -> Result<()>;

    /// Sink name for logging
    fn name(&self) -> &'static str;
}

/// Known command-line players, in preference order
const PLAYERS: &[(&str, &[&str])] = &[
    ("mpv", &["--no-video", "--really-quiet"]),
    ("ffplay", &["-nodisp", "-autoexit", "-loglevel", "quiet"]),
    ("afplay", &[]),
    ("mpg123", &["-q"]),
];

/// Names of the players [`ExternalPlayerSink::detect`] looks for
pub fn known_players() -> impl Iterator<Item = &'static str> {
    PLAYERS.iter().map(|(name, _)| *name)
}

/// Plays clips by handing a temporary file to an external player
#[derive(Debug, Clone)]
pub struct ExternalPlayerSink {
    program: PathBuf,
    args: Vec<String>,
    staging_dir: Option<PathBuf>,
}

impl ExternalPlayerSink {
    /// Use `program` with `args`; the clip path is appended last
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            staging_dir: None,
        }
    }

    /// Find the first known player on `PATH`
    ///
    /// # Errors
    ///
    /// Returns error if no supported player is installed
    pub fn detect() -> Result<Self> {
        for (name, args) in PLAYERS {
            if let Ok(path) = which::which(name) {
                tracing::debug!(player = %path.display(), "using external audio player");
                return Ok(Self::new(
                    path,
                    args.iter().map(ToString::to_string).collect(),
                ));
            }
        }

        Err(Error::Audio(format!(
            "no audio player found (tried {})",
            PLAYERS
                .iter()
                .map(|(name, _)| *name)
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    /// Resolve a player named in configuration, with default arguments for
    /// known players
    ///
    /// # Errors
    ///
    /// Returns error if the program cannot be found
    pub fn named(program: &str) -> Result<Self> {
        let path = which::which(program)
            .map_err(|e| Error::Audio(format!("audio player {program} not found: {e}")))?;
        let args = PLAYERS
            .iter()
            .find(|(name, _)| *name == program)
            .map(|(_, args)| args.iter().map(ToString::to_string).collect())
            .unwrap_or_default();
        Ok(Self::new(path, args))
    }

    /// Write temporary clips into `dir` instead of the system temp directory
    #[must_use]
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl AudioSink for ExternalPlayerSink {
    async fn play(&self, audio: &[u8]) -> Result<()> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("aac-tts-").suffix(".mp3");
        let mut clip = match &self.staging_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        std::io::Write::write_all(&mut clip, audio)?;

        tracing::debug!(
            player = %self.program.display(),
            bytes = audio.len(),
            "playing clip"
        );

        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(clip.path())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, player = %self.program.display(), "failed to launch player");
                Error::Playback(PLAYBACK_FAILED.to_string())
            })?;

        // Clip is removed when `clip` drops, whichever way playback ended
        if !status.success() {
            tracing::warn!(?status, "player exited with failure");
            return Err(Error::Playback(PLAYBACK_FAILED.to_string()));
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "external"
    }
}

/// Turns text into audible speech via the backend TTS endpoint
#[derive(Clone)]
pub struct Speaker {
    tts: Arc<dyn TtsApi>,
    sink: Arc<dyn AudioSink>,
    voice: Option<String>,
}

impl std::fmt::Debug for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Speaker")
            .field("sink", &self.sink.name())
            .field("voice", &self.voice)
            .finish_non_exhaustive()
    }
}

impl Speaker {
    pub fn new(tts: Arc<dyn TtsApi>, sink: Arc<dyn AudioSink>, voice: Option<String>) -> Self {
        Self { tts, sink, voice }
    }

    /// Synthesize `text` and play it to completion
    ///
    /// # Errors
    ///
    /// Returns the API error if synthesis fails, or [`Error::Playback`] if
    /// the audio cannot be played
    pub async fn speak(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let audio = self.tts.synthesize(text, self.voice.as_deref()).await?;
        tracing::info!(text, bytes = audio.len(), "speaking");
        self.sink.play(&audio).await
    }
}
