//! Shared test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aac_companion::api::{
    DialogueApi, DialogueMemory, DialogueOptionGroup, DialogueReply, DialogueRequest,
    DialogueResponse, Phrase, PhraseDraft, SuggestedPhrase, SuggestionItem, SuggestionsApi,
    SuggestionsMeta, SuggestionsRequest, SuggestionsResponse, TtsApi,
};
use aac_companion::speech::{AudioSink, PLAYBACK_FAILED, Speaker};
use aac_companion::{Error, Result};
use async_trait::async_trait;
use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

/// Speech token the mock backend hands out
pub const MOCK_TOKEN: &str = "tok-123";

/// One request seen by the mock backend
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub uri: String,
    pub body: Value,
}

/// State behind the mock backend
#[derive(Debug, Default)]
pub struct MockState {
    pub phrases: Mutex<Vec<Phrase>>,
    pub requests: Mutex<Vec<Recorded>>,
    /// Returned instead of the next response, whatever the route
    pub fail_next: Mutex<Option<(StatusCode, String)>>,
    next_id: AtomicU64,
}

impl MockState {
    fn record(&self, method: &str, uri: &Uri, body: Value) {
        self.requests.lock().unwrap().push(Recorded {
            method: method.to_string(),
            uri: uri.to_string(),
            body,
        });
    }
}

/// In-process AAC backend bound to an ephemeral port
pub struct MockBackend {
    pub url: String,
    pub state: Arc<MockState>,
}

impl MockBackend {
    /// Start the mock backend
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = router(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock backend");
        let addr = listener.local_addr().expect("no local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock backend failed");
        });

        Self {
            url: format!("http://{addr}"),
            state,
        }
    }

    /// Add a phrase directly to the library
    pub fn insert_phrase(&self, id: &str, text: &str, category: &str) {
        self.state.phrases.lock().unwrap().push(Phrase {
            id: id.to_string(),
            text: text.to_string(),
            category: category.to_string(),
        });
    }

    pub fn phrases(&self) -> Vec<Phrase> {
        self.state.phrases.lock().unwrap().clone()
    }

    /// Make the next request fail with `status` and `body`
    pub fn fail_next(&self, status: StatusCode, body: &str) {
        *self.state.fail_next.lock().unwrap() = Some((status, body.to_string()));
    }

    /// Requests seen so far whose URI starts with `prefix`
    pub fn requests_to(&self, prefix: &str) -> Vec<Recorded> {
        self.state
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.uri.starts_with(prefix))
            .cloned()
            .collect()
    }
}

fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/api/phrases", get(list_phrases).post(create_phrase))
        .route(
            "/api/phrases/{id}",
            get(get_phrase).put(update_phrase).delete(delete_phrase),
        )
        .route("/api/dialogue/replies", post(dialogue_replies))
        .route("/api/suggestions", post(suggestions))
        .route("/api/speech/token", get(speech_token))
        .route("/api/tts", post(tts))
        .route("/speech/recognition", post(recognition))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            inject_failure,
        ))
        .with_state(state)
}

async fn inject_failure(
    State(state): State<Arc<MockState>>,
    request: Request,
    next: Next,
) -> Response {
    let failure = state.fail_next.lock().unwrap().take();
    if let Some((status, body)) = failure {
        state.record(request.method().as_str(), request.uri(), Value::Null);
        return (status, body).into_response();
    }
    next.run(request).await
}

fn not_found(id: &str) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("phrase {id} not found"))
}

async fn list_phrases(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
    uri: Uri,
) -> Json<Vec<Phrase>> {
    state.record("GET", &uri, Value::Null);

    let q = params.get("q").map(|q| q.to_lowercase());
    let category = params.get("category");
    let phrases = state
        .phrases
        .lock()
        .unwrap()
        .iter()
        .filter(|p| q.as_ref().is_none_or(|q| p.text.to_lowercase().contains(q)))
        .filter(|p| category.is_none_or(|c| &p.category == c))
        .cloned()
        .collect();
    Json(phrases)
}

async fn create_phrase(
    State(state): State<Arc<MockState>>,
    uri: Uri,
    Json(draft): Json<PhraseDraft>,
) -> (StatusCode, Json<Phrase>) {
    state.record("POST", &uri, json!(draft));

    let n = state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    let phrase = Phrase {
        id: format!("p{n}"),
        text: draft.text,
        category: draft.category,
    };
    state.phrases.lock().unwrap().push(phrase.clone());
    (StatusCode::CREATED, Json(phrase))
}

async fn get_phrase(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    uri: Uri,
) -> std::result::Result<Json<Phrase>, (StatusCode, String)> {
    state.record("GET", &uri, Value::Null);

    state
        .phrases
        .lock()
        .unwrap()
        .iter()
        .find(|p| p.id == id)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

async fn update_phrase(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    uri: Uri,
    Json(draft): Json<PhraseDraft>,
) -> std::result::Result<Json<Phrase>, (StatusCode, String)> {
    state.record("PUT", &uri, json!(draft));

    let mut phrases = state.phrases.lock().unwrap();
    let phrase = phrases
        .iter_mut()
        .find(|p| p.id == id)
        .ok_or_else(|| not_found(&id))?;
    phrase.text = draft.text;
    phrase.category = draft.category;
    Ok(Json(phrase.clone()))
}

async fn delete_phrase(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    uri: Uri,
) -> std::result::Result<StatusCode, (StatusCode, String)> {
    state.record("DELETE", &uri, Value::Null);

    let mut phrases = state.phrases.lock().unwrap();
    let before = phrases.len();
    phrases.retain(|p| p.id != id);
    if phrases.len() == before {
        return Err(not_found(&id));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn dialogue_replies(
    State(state): State<Arc<MockState>>,
    uri: Uri,
    Json(body): Json<Value>,
) -> Json<DialogueResponse> {
    state.record("POST", &uri, body.clone());
    let question = body["questionText"].as_str().unwrap_or_default();
    Json(dialogue_response(question))
}

async fn suggestions(
    State(state): State<Arc<MockState>>,
    uri: Uri,
    Json(body): Json<Value>,
) -> std::result::Result<Json<SuggestionsResponse>, (StatusCode, String)> {
    state.record("POST", &uri, body.clone());
    let request: SuggestionsRequest = serde_json::from_value(body)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    Ok(Json(suggestions_response(&request)))
}

async fn speech_token(State(state): State<Arc<MockState>>, uri: Uri) -> Json<Value> {
    state.record("GET", &uri, Value::Null);
    Json(json!({
        "token": MOCK_TOKEN,
        "region": "uksouth",
        "expiresInSeconds": 540,
    }))
}

async fn tts(
    State(state): State<Arc<MockState>>,
    uri: Uri,
    Json(body): Json<Value>,
) -> std::result::Result<Vec<u8>, (StatusCode, String)> {
    state.record("POST", &uri, body.clone());
    let text = body["text"].as_str().unwrap_or_default();
    if text.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "text is required".to_string()));
    }
    Ok(format!("ID3:{text}").into_bytes())
}

async fn recognition(
    State(state): State<Arc<MockState>>,
    uri: Uri,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    state.record("POST", &uri, json!({ "bytes": body.len() }));

    let bearer = format!("Bearer {MOCK_TOKEN}");
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some(bearer.as_str()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let wav = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("audio/wav"));
    if !wav || !body.starts_with(b"RIFF") {
        return (StatusCode::BAD_REQUEST, "expected a WAV clip").into_response();
    }

    Json(json!({
        "RecognitionStatus": "Success",
        "DisplayText": "Do you want a drink?",
        "Offset": 0,
        "Duration": 12_000_000,
    }))
    .into_response()
}

// -- Canned payloads --

/// Dialogue response whose intent echoes `question`
pub fn dialogue_response(question: &str) -> DialogueResponse {
    let reply = |id: &str, label: &str, text: &str| DialogueReply {
        id: id.to_string(),
        label: label.to_string(),
        text: text.to_string(),
    };
    let drinks = DialogueOptionGroup {
        id: "drinks".to_string(),
        title: "Drinks".to_string(),
        items: vec!["milk".to_string(), "apple juice".to_string()],
    };

    DialogueResponse {
        intent: format!("asked:{question}"),
        top_replies: vec![
            reply("yes", "Yes", "Yes please."),
            reply("no", "No", "No thank you."),
            reply("later", "Later", "Maybe later."),
        ],
        option_groups: vec![drinks.clone()],
        memory: Some(DialogueMemory {
            last_intent: format!("asked:{question}"),
            last_question_text: question.to_string(),
            last_option_groups: vec![drinks],
        }),
        debug: None,
    }
}

/// Two suggestions built from the request prefix
pub fn suggestions_response(request: &SuggestionsRequest) -> SuggestionsResponse {
    let item = |n: u32, text: String, score: f64| SuggestionItem {
        phrase: SuggestedPhrase {
            id: format!("s{n}"),
            text,
            category: "needs".to_string(),
        },
        score,
    };

    SuggestionsResponse {
        suggestions: vec![
            item(1, format!("{} please", request.prefix), 0.9),
            item(2, format!("{} now", request.prefix), 0.4),
        ],
        meta: SuggestionsMeta {
            prefix: request.prefix.clone(),
            time_bucket: request.time_bucket,
            location_category: request.location_category,
            limit: 10,
        },
    }
}

// -- In-process fakes --

/// Dialogue service answering from [`dialogue_response`], with optional
/// per-question latency
#[derive(Debug, Default)]
pub struct FakeDialogue {
    pub requests: Mutex<Vec<DialogueRequest>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl FakeDialogue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Delay answers to `question`
    pub fn delay(&self, question: &str, by: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(question.to_string(), by);
    }

    pub fn questions(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.question_text.clone())
            .collect()
    }
}

#[async_trait]
impl DialogueApi for FakeDialogue {
    async fn replies(&self, request: &DialogueRequest) -> Result<DialogueResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let delay = self
            .delays
            .lock()
            .unwrap()
            .get(&request.question_text)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(dialogue_response(&request.question_text))
    }
}

/// Suggestions service answering from [`suggestions_response`]
#[derive(Debug, Default)]
pub struct FakeSuggestions {
    pub requests: Mutex<Vec<SuggestionsRequest>>,
}

impl FakeSuggestions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn prefixes(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prefix.clone())
            .collect()
    }
}

#[async_trait]
impl SuggestionsApi for FakeSuggestions {
    async fn suggest(&self, request: &SuggestionsRequest) -> Result<SuggestionsResponse> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(suggestions_response(request))
    }
}

/// TTS that "synthesizes" the UTF-8 bytes of the text
#[derive(Debug, Default)]
pub struct EchoTts;

#[async_trait]
impl TtsApi for EchoTts {
    async fn synthesize(&self, text: &str, _voice: Option<&str>) -> Result<Vec<u8>> {
        Ok(text.as_bytes().to_vec())
    }
}

/// Sink that records what it was asked to play
#[derive(Debug, Default)]
pub struct RecordingSink {
    played: Mutex<Vec<Vec<u8>>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A sink whose playback always fails
    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            played: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    /// Played clips decoded as text (pairs with [`EchoTts`])
    pub fn spoken(&self) -> Vec<String> {
        self.played
            .lock()
            .unwrap()
            .iter()
            .map(|clip| String::from_utf8_lossy(clip).into_owned())
            .collect()
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn play(&self, audio: &[u8]) -> Result<()> {
        if self.fail {
            return Err(Error::Playback(PLAYBACK_FAILED.to_string()));
        }
        self.played.lock().unwrap().push(audio.to_vec());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Speaker that plays through `sink` via [`EchoTts`]
pub fn echo_speaker(sink: &Arc<RecordingSink>) -> Speaker {
    Speaker::new(Arc::new(EchoTts), sink.clone(), None)
}
