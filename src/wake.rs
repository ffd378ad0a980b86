//! Wake-phrase gating for heard speech
//!
//! In voice mode only speech addressed to the user ("hey <name>") counts as
//! a question. Saying the wake phrase alone arms a short window in which the
//! next utterance is taken as the question.

use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;

use crate::{Error, Result};

/// How long the gate stays armed after a bare wake phrase
pub const DEFAULT_WAKE_WINDOW: Duration = Duration::from_secs(7);

/// What to do with a finalized utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeOutcome {
    /// Treat this text as the question
    Question(String),
    /// Bare wake phrase; waiting for the question
    Armed,
    /// Not addressed to the user
    Ignored,
}

/// Matches `"hey <name>"` at the start of an utterance, case-insensitively
#[derive(Debug)]
pub struct WakePhraseGate {
    pattern: Regex,
    window: Duration,
    armed_until: Option<Instant>,
}

impl WakePhraseGate {
    /// Create a gate for `name`
    ///
    /// # Errors
    ///
    /// Returns error if the name is blank
    pub fn new(name: &str, window: Duration) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("wake phrase needs a name".to_string()));
        }

        let name_pattern = name
            .split_whitespace()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"\s+");
        let pattern = Regex::new(&format!(
            r"(?is)^\s*hey[\s,]+{name_pattern}(?:[\s,.!?:;-]+(?P<rest>.*))?$"
        ))
        .map_err(|e| Error::Config(format!("invalid wake phrase pattern: {e}")))?;

        tracing::debug!(name, window_secs = window.as_secs(), "wake phrase gate initialized");

        Ok(Self {
            pattern,
            window,
            armed_until: None,
        })
    }

    /// Text following the wake phrase, or `None` if the phrase is absent
    ///
    /// A bare wake phrase yields `Some("")`.
    #[must_use]
    pub fn strip_wake_phrase<'a>(&self, utterance: &'a str) -> Option<&'a str> {
        let caps = self.pattern.captures(utterance)?;
        Some(caps.name("rest").map_or("", |m| m.as_str().trim()))
    }

    /// Classify a finalized utterance heard at `now`
    pub fn hear(&mut self, utterance: &str, now: Instant) -> WakeOutcome {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return WakeOutcome::Ignored;
        }

        if let Some(rest) = self.strip_wake_phrase(utterance) {
            if rest.is_empty() {
                self.armed_until = Some(now + self.window);
                tracing::info!("wake phrase heard, waiting for question");
                return WakeOutcome::Armed;
            }
            self.armed_until = None;
            tracing::info!(question = rest, "wake phrase with question");
            return WakeOutcome::Question(rest.to_string());
        }

        if self.is_armed(now) {
            self.armed_until = None;
            tracing::info!(question = utterance, "question heard in wake window");
            return WakeOutcome::Question(utterance.to_string());
        }

        self.armed_until = None;
        tracing::trace!(utterance, "ignoring speech without wake phrase");
        WakeOutcome::Ignored
    }

    /// Whether the window is open at `now`
    #[must_use]
    pub fn is_armed(&self, now: Instant) -> bool {
        self.armed_until.is_some_and(|until| now < until)
    }

    /// Close the window if it has run out; returns whether it just closed
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.armed_until {
            Some(until) if now >= until => {
                self.armed_until = None;
                tracing::debug!("wake window expired");
                true
            }
            _ => false,
        }
    }

    /// Close the window immediately
    pub const fn disarm(&mut self) {
        self.armed_until = None;
    }

    /// Configured window length
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(name: &str) -> WakePhraseGate {
        WakePhraseGate::new(name, DEFAULT_WAKE_WINDOW).unwrap()
    }

    #[test]
    fn test_wake_phrase_with_question() {
        let mut gate = gate("Sam");
        let outcome = gate.hear("Hey Sam, can I have water", Instant::now());
        assert_eq!(outcome, WakeOutcome::Question("can I have water".to_string()));
    }

    #[test]
    fn test_case_insensitive() {
        let g = gate("Sam");
        assert_eq!(g.strip_wake_phrase("HEY SAM what's for lunch"), Some("what's for lunch"));
        assert_eq!(g.strip_wake_phrase("hey, sam."), Some(""));
    }

    #[test]
    fn test_name_must_be_whole_word() {
        let g = gate("Sam");
        assert_eq!(g.strip_wake_phrase("Hey Samantha, juice?"), None);
        assert_eq!(g.strip_wake_phrase("Well hey Sam"), None);
    }

    #[test]
    fn test_multi_word_name() {
        let g = gate("Mary  Ann");
        assert_eq!(g.strip_wake_phrase("hey mary ann do you want tea"), Some("do you want tea"));
    }

    #[test]
    fn test_bare_wake_phrase_arms_window() {
        let mut gate = gate("Sam");
        let start = Instant::now();

        assert_eq!(gate.hear("Hey Sam", start), WakeOutcome::Armed);
        assert!(gate.is_armed(start + Duration::from_secs(6)));

        let outcome = gate.hear("water please", start + Duration::from_secs(3));
        assert_eq!(outcome, WakeOutcome::Question("water please".to_string()));
        assert!(!gate.is_armed(start + Duration::from_secs(3)));
    }

    #[test]
    fn test_window_expires() {
        let mut gate = gate("Sam");
        let start = Instant::now();

        gate.hear("Hey Sam", start);
        assert!(!gate.expire(start + Duration::from_secs(6)));
        assert!(gate.expire(start + Duration::from_secs(7)));

        let outcome = gate.hear("water please", start + Duration::from_secs(8));
        assert_eq!(outcome, WakeOutcome::Ignored);
    }

    #[test]
    fn test_custom_window_length() {
        let mut gate = WakePhraseGate::new("Sam", Duration::from_secs(3)).unwrap();
        assert_eq!(gate.window(), Duration::from_secs(3));

        let start = Instant::now();
        gate.hear("hey sam", start);
        assert!(gate.is_armed(start + Duration::from_secs(2)));
        assert!(gate.expire(start + Duration::from_secs(3)));
    }

    #[test]
    fn test_speech_without_wake_phrase_ignored() {
        let mut gate = gate("Sam");
        assert_eq!(gate.hear("is it raining", Instant::now()), WakeOutcome::Ignored);
    }

    #[test]
    fn test_blank_name_rejected() {
        assert!(WakePhraseGate::new("  ", DEFAULT_WAKE_WINDOW).is_err());
    }
}
