//! HTTP route handlers.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{
        Json,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::stream::Stream;
use futures::StreamExt;
use serde::Serialize;
use serde_json::json;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::config::BotEnv;
use crate::console::{ConsoleLog, LogLevel};
use crate::ollama::{OllamaClient, OllamaError};
use crate::onboarding::{
    self, BotConfig, MAX_RESUME_BYTES, OnboardingForm, RESUME_PROMPT_LIMIT,
};
use crate::runner::{BotRunner, RunError, RunRequest};
use crate::tagwizard::{self, Persona, TagSet, TagWizardRequest};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const BODY_LIMIT: usize = 16 * 1024 * 1024;
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Shared server state: the injected console log plus the bot runner and
/// Ollama client built from the environment.
pub struct AppState {
    pub env: BotEnv,
    pub console: Arc<ConsoleLog>,
    pub runner: BotRunner,
    pub ollama: OllamaClient,
}

impl AppState {
    pub fn new(env: BotEnv, console: Arc<ConsoleLog>) -> Self {
        let runner = BotRunner::new(env.clone(), Arc::clone(&console));
        let ollama = OllamaClient::new(env.ollama_base_url.clone());
        Self {
            env,
            console,
            runner,
            ollama,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    ok: bool,
    bot_workdir_exists: bool,
    config_exists: bool,
    ollama_base_url: String,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let bot_workdir_exists = tokio::fs::try_exists(&state.env.workdir)
        .await
        .unwrap_or(false);
    let config_exists = match state.env.resolved_config_path() {
        Some(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
        None => false,
    };

    Json(HealthResponse {
        ok: bot_workdir_exists && config_exists,
        bot_workdir_exists,
        config_exists,
        ollama_base_url: state.env.ollama_base_url.clone(),
    })
}

async fn run_bot(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RunRequest>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let request = body.map(|Json(r)| r).unwrap_or(RunRequest {
        mode: String::new(),
    });

    match state.runner.run(&request).await {
        Err(RunError::InvalidMode(_)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": "Invalid mode" })),
        ),
        Err(RunError::WorkerNotFound(path)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "ok": false,
                "error": "Python bot not found",
                "details": path.display().to_string(),
            })),
        ),
        Ok(result) => {
            // `code: None` with a failed result means the process never ran.
            let status = if result.code.is_none() && !result.ok {
                StatusCode::INTERNAL_SERVER_ERROR
            } else {
                StatusCode::OK
            };
            (
                status,
                Json(json!({
                    "ok": result.ok,
                    "code": result.code,
                    "output": result.output,
                    "errorOutput": result.error_output,
                })),
            )
        }
    }
}

/// Live console stream: replay the buffered entries, then follow appends,
/// one SSE `data:` event per JSON-encoded entry.
async fn console_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Snapshot and subscription happen under one lock, so nothing appended
    // after the snapshot can be missed by the live receiver.
    let (snapshot, subscription, rx) = state.console.subscribe_with_snapshot();
    let live = UnboundedReceiverStream::new(rx);

    let stream = futures::stream::iter(snapshot)
        .chain(live)
        .filter_map(move |entry| {
            // The subscription is owned by this closure: when the client
            // disconnects the stream drops and the subscriber is removed,
            // on every exit path.
            let _live = &subscription;
            let event = match serde_json::to_string(&entry) {
                Ok(data) => Some(Ok(Event::default().data(data))),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to serialize log entry");
                    None
                }
            };
            futures::future::ready(event)
        });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

async fn save_onboarding(
    State(state): State<Arc<AppState>>,
    body: Option<Json<OnboardingForm>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let form = body.map(|Json(f)| f).unwrap_or_default();
    let config = BotConfig::from_form(form);

    match onboarding::write_config(&state.env.workdir, &config).await {
        Ok(path) => {
            state.console.log(
                LogLevel::Info,
                format!("onboarding config written to {}", path.display()),
            );
            (
                StatusCode::OK,
                Json(json!({ "ok": true, "path": path.display().to_string() })),
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to write onboarding config");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": e.to_string() })),
            )
        }
    }
}

async fn parse_resume(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> (StatusCode, Json<serde_json::Value>) {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut file_name = String::new();
    let mut base_url = state.env.ollama_base_url.clone();
    let mut model = "llama2".to_string();

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                file_name = field.file_name().unwrap_or_default().to_string();
                if let Ok(bytes) = field.bytes().await {
                    file_bytes = Some(bytes.to_vec());
                }
            }
            "ollamaBaseUrl" => {
                if let Ok(value) = field.text().await
                    && !value.is_empty()
                {
                    base_url = value;
                }
            }
            "ollamaModel" => {
                if let Ok(value) = field.text().await
                    && !value.is_empty()
                {
                    model = value;
                }
            }
            _ => {}
        }
    }

    let Some(bytes) = file_bytes else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": "No file uploaded" })),
        );
    };
    if bytes.len() > MAX_RESUME_BYTES {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": "File too large (max 6MB)." })),
        );
    }

    // No PDF text extraction here; a PDF body would decode to binary noise
    // and pass the non-empty check, so it is rejected up front.
    if bytes.starts_with(b"%PDF") || file_name.to_ascii_lowercase().ends_with(".pdf") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": "Unable to read resume text" })),
        );
    }

    let text = onboarding::sanitize_text(&String::from_utf8_lossy(&bytes));
    if text.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": "Unable to read resume text" })),
        );
    }

    let basics = onboarding::extract_basics(&text);

    let client = if base_url == state.ollama.base_url() {
        state.ollama.clone()
    } else {
        OllamaClient::new(base_url)
    };
    let head: String = text.chars().take(RESUME_PROMPT_LIMIT).collect();
    // Model failure degrades to the pattern-matched basics, never an error.
    let ai = client
        .generate_json(&model, &onboarding::resume_prompt(&head))
        .await
        .ok();

    let fields = onboarding::merge_resume_fields(ai, &basics);
    (StatusCode::OK, Json(json!({ "ok": true, "data": fields })))
}

/// Directory component under `uploads/`: lowercase, no separators and no
/// dots, so a crafted `kind` can never traverse out of the uploads tree.
fn sanitize_kind(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(40)
        .collect()
}

fn sanitize_file_name(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(120)
        .collect()
}

async fn upload_files(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> (StatusCode, Json<serde_json::Value>) {
    let mut kind = "uploads".to_string();
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "kind" => {
                if let Ok(value) = field.text().await
                    && !value.is_empty()
                {
                    kind = sanitize_kind(&value);
                }
            }
            "file" | "files" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                match field.bytes().await {
                    Ok(bytes) if bytes.len() > MAX_UPLOAD_BYTES => {
                        return (
                            StatusCode::BAD_REQUEST,
                            Json(json!({ "ok": false, "error": "File too large (max 10MB)." })),
                        );
                    }
                    Ok(bytes) => files.push((file_name, bytes.to_vec())),
                    Err(_) => {}
                }
            }
            _ => {}
        }
    }

    if files.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": "No files uploaded" })),
        );
    }

    let base_dir = state.env.workdir.join("uploads").join(&kind);
    if let Err(e) = tokio::fs::create_dir_all(&base_dir).await {
        tracing::error!(error = %e, "failed to create upload directory");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "ok": false, "error": e.to_string() })),
        );
    }

    let mut saved = Vec::new();
    for (file_name, bytes) in files {
        let unique = format!(
            "{}-{}-{}",
            chrono::Utc::now().timestamp_millis(),
            uuid::Uuid::new_v4(),
            sanitize_file_name(&file_name)
        );
        let target = base_dir.join(unique);
        if let Err(e) = tokio::fs::write(&target, &bytes).await {
            tracing::error!(error = %e, path = %target.display(), "failed to write upload");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": e.to_string() })),
            );
        }
        saved.push(target.display().to_string());
    }

    (StatusCode::OK, Json(json!({ "ok": true, "paths": saved })))
}

const OLLAMA_HINT: &str = "Ensure Ollama is running and OLLAMA_BASE_URL points to it.";

/// Run a wizard completion. A transport or HTTP failure surfaces as 503
/// with a hint; a reply that is not JSON counts as absent model output.
async fn wizard_completion(
    client: &OllamaClient,
    model: &str,
    prompt: &str,
) -> Result<Option<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match client.generate_json(model, prompt).await {
        Ok(value) => Ok(Some(value)),
        Err(OllamaError::Payload) => Ok(None),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "ok": false, "error": e.to_string(), "hint": OLLAMA_HINT })),
        )),
    }
}

async fn tag_wizard(
    State(state): State<Arc<AppState>>,
    body: Option<Json<TagWizardRequest>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let request = body.map(|Json(r)| r).unwrap_or_default();

    let client = match request.ollama_base_url.as_deref() {
        Some(url) if !url.is_empty() && url != state.ollama.base_url() => {
            OllamaClient::new(url.to_string())
        }
        _ => state.ollama.clone(),
    };
    let model = request
        .ollama_model
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "llama2".to_string());
    let profile = request.profile.clone().unwrap_or_else(|| json!({}));

    match request.action.as_str() {
        "questions" => {
            let count = request.mcq_count.unwrap_or(5);
            let prompt = tagwizard::questions_prompt(count, &profile);
            let result = match wizard_completion(&client, &model, &prompt).await {
                Ok(result) => result,
                Err(response) => return response,
            };

            let questions = result
                .and_then(|mut v| v.get_mut("questions").map(serde_json::Value::take))
                .filter(|q| q.as_array().is_some_and(|items| !items.is_empty()));
            match questions {
                Some(questions) => (
                    StatusCode::OK,
                    Json(json!({ "ok": true, "questions": questions })),
                ),
                None => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "ok": false, "error": "Failed to generate questions" })),
                ),
            }
        }
        "score" => {
            let questions = request.questions.clone().unwrap_or_else(|| json!([]));
            let answers = request.answers.clone().unwrap_or_else(|| json!({}));
            let prompt = tagwizard::score_prompt(&profile, &questions, &answers);
            let result = match wizard_completion(&client, &model, &prompt).await {
                Ok(result) => result,
                Err(response) => return response,
            };

            let tags = TagSet::from_model(result.as_ref());
            (StatusCode::OK, Json(json!({ "ok": true, "tags": tags })))
        }
        "persona" => {
            let Some(persona) = request.persona.as_deref().and_then(Persona::parse) else {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "ok": false, "error": "Invalid persona" })),
                );
            };

            let prompt = tagwizard::persona_prompt(persona, &profile);
            let result = match wizard_completion(&client, &model, &prompt).await {
                Ok(result) => result,
                Err(response) => return response,
            };

            let tags = TagSet::from_model(result.as_ref()).or_persona_defaults(persona);
            (StatusCode::OK, Json(json!({ "ok": true, "tags": tags })))
        }
        "variants" => {
            let prompt = tagwizard::variants_prompt(&profile);
            let result = match wizard_completion(&client, &model, &prompt).await {
                Ok(result) => result,
                Err(response) => return response,
            };

            let pick = |key: &str| -> String {
                result
                    .as_ref()
                    .and_then(|v| v.get(key))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            (
                StatusCode::OK,
                Json(json!({
                    "ok": true,
                    "variants": {
                        "short": pick("short"),
                        "medium": pick("medium"),
                        "long": pick("long"),
                    },
                })),
            )
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": "Invalid action" })),
        ),
    }
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/bot", post(run_bot))
        .route("/api/console", get(console_stream))
        .route("/api/onboarding", post(save_onboarding))
        .route("/api/onboarding/parse-resume", post(parse_resume))
        .route("/api/onboarding/upload", post(upload_files))
        .route("/api/onboarding/tag-wizard", post(tag_wizard))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}
