//! Typed client for the AAC backend HTTP API
//!
//! Each backend concern sits behind its own trait so views can be driven by
//! the real [`ApiClient`] or by an in-process fake.
//!
//! | Endpoint | Trait |
//! |---|---|
//! | `/api/phrases` | [`PhrasesApi`] |
//! | `/api/dialogue/replies` | [`DialogueApi`] |
//! | `/api/suggestions` | [`SuggestionsApi`] |
//! | `/api/speech/token` | [`SpeechTokenSource`] |
//! | `/api/tts` | [`TtsApi`] |

mod dialogue;
mod phrases;
mod speech_token;
mod suggestions;
mod tts;
pub mod types;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

pub use types::{
    DialogueMemory, DialogueOptionGroup, DialogueReply, DialogueRequest, DialogueResponse,
    LocationCategory, Phrase, PhraseDraft, PhraseFilter, SpeechToken, SuggestedPhrase,
    SuggestionItem, SuggestionsMeta, SuggestionsRequest, SuggestionsResponse, TtsRequest,
};

use crate::{Error, Result};

/// Phrase library CRUD
#[async_trait]
pub trait PhrasesApi: Send + Sync {
    /// List phrases matching the filter
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn list(&self, filter: &PhraseFilter) -> Result<Vec<Phrase>>;

    /// Fetch a single phrase
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the phrase does not exist
    async fn get(&self, id: &str) -> Result<Phrase>;

    /// Create a phrase
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn create(&self, draft: &PhraseDraft) -> Result<Phrase>;

    /// Replace a phrase's text and category
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn update(&self, id: &str, draft: &PhraseDraft) -> Result<Phrase>;

    /// Delete a phrase
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn remove(&self, id: &str) -> Result<()>;
}

/// Candidate replies for a heard question
#[async_trait]
pub trait DialogueApi: Send + Sync {
    /// Ask the dialogue service for replies
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn replies(&self, request: &DialogueRequest) -> Result<DialogueResponse>;
}

/// Ranked phrase suggestions for a typed prefix
#[async_trait]
pub trait SuggestionsApi: Send + Sync {
    /// Ask for suggestions
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn suggest(&self, request: &SuggestionsRequest) -> Result<SuggestionsResponse>;
}

/// Issues short-lived cloud speech credentials
#[async_trait]
pub trait SpeechTokenSource: Send + Sync {
    /// Fetch a fresh token
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn speech_token(&self) -> Result<SpeechToken>;
}

/// Server-side speech synthesis
#[async_trait]
pub trait TtsApi: Send + Sync {
    /// Synthesize `text`, returning encoded audio bytes
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<Vec<u8>>;
}

/// HTTP client for the AAC backend
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    /// Create a client for the backend at `base_url` (e.g. `http://localhost:8080`)
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is not a valid absolute URL
    pub fn new(base_url: &str) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        url::Url::parse(trimmed)
            .map_err(|e| Error::Config(format!("invalid API base URL {base_url:?}: {e}")))?;

        Ok(Self {
            base_url: trimmed.to_string(),
            client: reqwest::Client::new(),
        })
    }

    /// Base URL without a trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn endpoint_with_query(&self, path: &str, pairs: &[(&str, &str)]) -> Result<url::Url> {
        let endpoint = self.endpoint(path);
        let parsed = if pairs.is_empty() {
            url::Url::parse(&endpoint)
        } else {
            url::Url::parse_with_params(&endpoint, pairs)
        };
        parsed.map_err(|e| Error::Config(format!("invalid endpoint {endpoint}: {e}")))
    }
}

/// Percent-encode a path segment
fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

/// Turn a non-success response into `Error::Api`, passing success through
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = %status, body = %body, "backend returned error");

    Err(Error::Api {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        body,
    })
}

/// Check status and decode a JSON body
async fn handle_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let response = check_status(response).await?;
    Ok(response.json().await?)
}
