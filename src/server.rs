//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Liveness banner |
//! | `GET`  | `/health` | Status, version and whether a base index is loaded |
//! | `POST` | `/ask` | Multipart: `question`, optional `file` (`.txt`/`.pdf`), optional `session_id` |
//! | `POST` | `/ask/json` | JSON `{"question", "session_id"?}` |
//!
//! Both ask routes return an [`AnswerResult`] and echo the session in the
//! `x-session-id` response header. Uploading without a session id starts a
//! new session.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `invalid_session` (400), `empty_file`
//! (400), `unsupported_file_type` (415), `extraction_failed` (422). A failed
//! model call is not an HTTP error; it produces the fallback answer.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::InputError;
use crate::extract::{self, UploadedInput};
use crate::models::AnswerResult;
use crate::pipeline::AppServices;

pub const SESSION_HEADER: &str = "x-session-id";

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    services: Arc<AppServices>,
}

/// Build providers from `config` and serve until the process is stopped.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let services = Arc::new(AppServices::from_config(config.clone())?);

    // Load the base index before accepting traffic.
    let base = services.pipeline.indexes().base().await;
    let pruned = services.sessions.prune_stale_files().await;
    tracing::info!(
        base_chunks = base.as_ref().map_or(0, |b| b.len()),
        stale_sessions_pruned = pruned,
        uploads_dir = %config.index.uploads_dir.display(),
        "services ready"
    );

    let app = router(services);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// The application router, without a listener.
pub fn router(services: Arc<AppServices>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([axum::http::HeaderName::from_static(SESSION_HEADER)]);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/ask", post(handle_ask))
        .route("/ask/json", post(handle_ask_json))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { services })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<InputError> for AppError {
    fn from(err: InputError) -> Self {
        let status = match &err {
            InputError::UnsupportedFileType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            InputError::ExtractionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            InputError::EmptyQuestion
            | InputError::EmptyFile
            | InputError::InvalidSessionId(_)
            | InputError::Malformed(_) => StatusCode::BAD_REQUEST,
        };
        tracing::debug!(code = err.code(), error = %err, "request rejected");
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET / and /health ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Legal AI Assistant is running" }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    base_index_loaded: bool,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let base = state.services.pipeline.indexes().base().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        base_index_loaded: base.is_some(),
    })
}

// ============ POST /ask ============

/// Parsed multipart form.
#[derive(Default)]
struct AskForm {
    question: Option<String>,
    session_id: Option<String>,
    file: Option<(String, Vec<u8>)>,
}

async fn read_form(mut multipart: Multipart) -> Result<AskForm, InputError> {
    let mut form = AskForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| InputError::Malformed(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "question" => {
                form.question = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| InputError::Malformed(e.to_string()))?,
                );
            }
            "session_id" => {
                form.session_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| InputError::Malformed(e.to_string()))?,
                );
            }
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| InputError::Malformed(e.to_string()))?;
                // Browsers send an empty, unnamed part when no file is chosen.
                if !(file_name.is_empty() && bytes.is_empty()) {
                    form.file = Some((file_name, bytes.to_vec()));
                }
            }
            other => {
                tracing::debug!(field = other, "ignoring unknown form field");
            }
        }
    }
    Ok(form)
}

/// Validate the upload and extract it once, so the pipeline gets plain text.
async fn prepare_upload(file_name: &str, bytes: Vec<u8>) -> Result<UploadedInput, InputError> {
    let input = UploadedInput::from_upload(file_name, bytes)?;
    let text = extract::extract_strict(&input)
        .await
        .map_err(|e| InputError::ExtractionFailed {
            file: file_name.to_string(),
            reason: e.to_string(),
        })?;
    if text.trim().is_empty() {
        return Err(InputError::ExtractionFailed {
            file: file_name.to_string(),
            reason: "no text found".to_string(),
        });
    }
    Ok(UploadedInput::Text(text))
}

fn require_question(question: Option<String>) -> Result<String, InputError> {
    match question {
        Some(q) if !q.trim().is_empty() => Ok(q),
        _ => Err(InputError::EmptyQuestion),
    }
}

async fn handle_ask(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let form = read_form(multipart).await?;
    let question = require_question(form.question)?;
    let upload = match form.file {
        Some((file_name, bytes)) => Some(prepare_upload(&file_name, bytes).await?),
        None => None,
    };

    answer(&state, &question, form.session_id.as_deref(), upload).await
}

// ============ POST /ask/json ============

#[derive(Deserialize)]
struct AskJson {
    question: Option<String>,
    session_id: Option<String>,
}

async fn handle_ask_json(
    State(state): State<AppState>,
    body: Result<Json<AskJson>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = body.map_err(|e| InputError::Malformed(e.body_text()))?;
    let question = require_question(body.question)?;
    answer(&state, &question, body.session_id.as_deref(), None).await
}

async fn answer(
    state: &AppState,
    question: &str,
    session_id: Option<&str>,
    upload: Option<UploadedInput>,
) -> Result<Response, AppError> {
    let services = &state.services;
    let mut scope = services.sessions.open(session_id, upload.is_some()).await?;

    let result: AnswerResult = services
        .pipeline
        .ask_question_with_doc(question, upload.as_ref(), &mut scope)
        .await;

    let mut response = Json(result).into_response();
    if let Some(id) = scope.session_id() {
        if let Ok(value) = HeaderValue::from_str(id) {
            response.headers_mut().insert(SESSION_HEADER, value);
        }
    }
    Ok(response)
}
