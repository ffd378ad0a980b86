//! Wire types for the AAC backend API

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::time_bucket::TimeBucket;
use crate::{Error, Result};

/// A canned phrase in the phrase library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phrase {
    pub id: String,
    pub text: String,
    pub category: String,
}

/// Payload for creating or updating a phrase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseDraft {
    pub text: String,
    pub category: String,
}

impl PhraseDraft {
    /// Build a draft from raw form input
    pub fn new(text: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            category: category.into(),
        }
    }

    /// Trim both fields and reject the draft if either ends up empty
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if text or category is blank
    pub fn validate(&self) -> Result<Self> {
        let text = self.text.trim();
        let category = self.category.trim();

        if text.is_empty() {
            return Err(Error::Validation("Phrase text is required".to_string()));
        }
        if category.is_empty() {
            return Err(Error::Validation("Category is required".to_string()));
        }

        Ok(Self::new(text, category))
    }
}

/// Optional filters for listing phrases
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhraseFilter {
    /// Free-text search
    pub q: Option<String>,
    /// Exact category
    pub category: Option<String>,
}

impl PhraseFilter {
    /// Build a filter from raw input, treating blank values as absent
    #[must_use]
    pub fn from_input(q: &str, category: &str) -> Self {
        let non_blank = |s: &str| {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        };
        Self {
            q: non_blank(q),
            category: non_blank(category),
        }
    }

    /// Query-string pairs for the filters that are set
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = Vec::new();
        if let Some(q) = self.q.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("q", q));
        }
        if let Some(c) = self.category.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("category", c));
        }
        pairs
    }
}

/// One candidate spoken reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueReply {
    pub id: String,
    pub label: String,
    pub text: String,
}

/// A titled group of extra choices (e.g. "Drinks")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueOptionGroup {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub items: Vec<String>,
}

/// Conversation memory echoed back to the dialogue service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueMemory {
    pub last_intent: String,
    pub last_question_text: String,
    #[serde(default)]
    pub last_option_groups: Vec<DialogueOptionGroup>,
}

/// Request body for `/api/dialogue/replies`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueRequest {
    pub user_name: String,
    pub question_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<DialogueMemory>,
}

/// Candidate replies for one question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueResponse {
    pub intent: String,
    #[serde(default)]
    pub top_replies: Vec<DialogueReply>,
    #[serde(default)]
    pub option_groups: Vec<DialogueOptionGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<DialogueMemory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<serde_json::Value>,
}

/// Location context used by the compose screen to bias suggestions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationCategory {
    #[default]
    Home,
    School,
    Work,
    Other,
}

impl LocationCategory {
    pub const ALL: [Self; 4] = [Self::Home, Self::School, Self::Work, Self::Other];

    /// Wire and storage form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Home => "HOME",
            Self::School => "SCHOOL",
            Self::Work => "WORK",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for LocationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocationCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Validation(format!("unknown location category: {s}")))
    }
}

/// Request body for `/api/suggestions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionsRequest {
    pub prefix: String,
    pub time_bucket: TimeBucket,
    pub location_category: LocationCategory,
}

/// Phrase embedded in a suggestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedPhrase {
    /// The backend may send a UUID; it is kept as an opaque string
    pub id: String,
    pub text: String,
    pub category: String,
}

/// A ranked suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionItem {
    pub phrase: SuggestedPhrase,
    pub score: f64,
}

/// Echo of the request parameters the ranking used
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionsMeta {
    pub prefix: String,
    pub time_bucket: TimeBucket,
    pub location_category: LocationCategory,
    pub limit: u32,
}

/// Response from `/api/suggestions`
///
/// `suggestions` keeps the order the backend ranked them in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionsResponse {
    #[serde(default)]
    pub suggestions: Vec<SuggestionItem>,
    pub meta: SuggestionsMeta,
}

/// Short-lived credential for the cloud speech service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechToken {
    pub token: String,
    pub region: String,
    pub expires_in_seconds: u64,
}

/// Request body for `/api/tts`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TtsRequest<'a> {
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<&'a str>,
}
