//! Session endpoints: lifecycle, sidebar settings and the turn cycle

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, State,
        multipart::{Multipart, MultipartError},
    },
    http::StatusCode,
    routing::{get, post, put},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, ApiState};
use crate::session::{
    AudioInput, ChatModel, CycleReport, CycleRequest, InputKind, Sender, SessionHandle,
    SessionState, TurnOutcome, TurnPhase, process_cycle,
};
use crate::voice::AudioFormat;

/// Build session router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", post(create_session))
        .route("/{id}", get(get_session).delete(delete_session))
        .route("/{id}/credential", put(set_credential))
        .route("/{id}/model", put(set_model))
        .route("/{id}/reset", post(reset_session))
        .route("/{id}/cycle", post(run_cycle))
        .with_state(state)
}

/// A transcript entry as rendered in a chat bubble
#[derive(Debug, Serialize)]
pub struct ChatEntryView {
    pub sender: Sender,
    pub time: String,
    pub text: String,
}

/// Everything the page needs to render a session
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub model: ChatModel,
    pub models: Vec<&'static str>,
    pub has_credential: bool,
    pub reset_pending: bool,
    pub chat: Vec<ChatEntryView>,
}

impl SessionView {
    fn new(id: Uuid, state: &SessionState) -> Self {
        Self {
            id,
            model: state.selected_model,
            models: ChatModel::ALL.iter().map(|m| m.as_str()).collect(),
            has_credential: state.has_credential(),
            reset_pending: state.reset_pending,
            chat: state
                .chat
                .iter()
                .map(|entry| ChatEntryView {
                    sender: entry.sender,
                    time: entry.time_label(),
                    text: entry.text.clone(),
                })
                .collect(),
        }
    }
}

/// Result of one refresh cycle
#[derive(Debug, Serialize)]
pub struct CycleView {
    pub input: InputKind,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub notices: Vec<String>,
    pub phases: Vec<TurnPhase>,
    /// Reply audio as a `data:audio/mpeg;base64,...` URI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech: Option<String>,
    pub session: SessionView,
}

impl CycleView {
    fn new(report: CycleReport, session: SessionView) -> Self {
        let response = match &report.outcome {
            TurnOutcome::Answered { response } => Some(response.clone()),
            _ => None,
        };

        Self {
            input: report.input,
            outcome: report.outcome.label(),
            response,
            notices: report.notices,
            phases: report.phases,
            speech: report
                .speech
                .map(|audio| format!("data:audio/mpeg;base64,{}", BASE64.encode(audio))),
            session,
        }
    }
}

/// Credential update request
#[derive(Debug, Deserialize)]
pub struct CredentialRequest {
    pub api_key: String,
}

/// Model selection request
#[derive(Debug, Deserialize)]
pub struct ModelRequest {
    pub model: String,
}

fn lookup(state: &ApiState, id: &Uuid) -> Result<SessionHandle, ApiError> {
    state
        .sessions
        .get(id)
        .ok_or(ApiError::NotFound("session not found"))
}

/// Start a new session
async fn create_session(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<SessionView>) {
    let (id, handle) = state.sessions.create();
    let session = handle.lock().await;
    (StatusCode::CREATED, Json(SessionView::new(id, &session)))
}

/// Current session view
async fn get_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let handle = lookup(&state, &id)?;
    let session = handle.lock().await;
    Ok(Json(SessionView::new(id, &session)))
}

/// End a session
async fn delete_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("session not found"))
    }
}

/// Set or clear the session credential
async fn set_credential(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<CredentialRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let handle = lookup(&state, &id)?;
    let mut session = handle.lock().await;
    session.set_credential(request.api_key.trim());
    tracing::debug!(session = %id, has_credential = session.has_credential(), "credential updated");
    Ok(Json(SessionView::new(id, &session)))
}

/// Select the chat model
async fn set_model(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ModelRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let model: ChatModel = request
        .model
        .parse()
        .map_err(|e: crate::Error| ApiError::BadRequest(e.to_string()))?;

    let handle = lookup(&state, &id)?;
    let mut session = handle.lock().await;
    session.selected_model = model;
    tracing::debug!(session = %id, model = %model, "model selected");
    Ok(Json(SessionView::new(id, &session)))
}

/// Clear the conversation
async fn reset_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let handle = lookup(&state, &id)?;
    let mut session = handle.lock().await;
    session.reset();
    tracing::info!(session = %id, "conversation reset");
    Ok(Json(SessionView::new(id, &session)))
}

/// Run one refresh cycle with the submitted widget values
///
/// Multipart fields: `text`, `submit`, `audio` (file) and `sample_rate`
/// (for headerless PCM).
async fn run_cycle(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<CycleView>, ApiError> {
    let handle = lookup(&state, &id)?;
    let request = read_cycle_request(multipart).await?;

    // Held for the whole turn: one cycle per session at a time
    let mut session = handle.lock().await;
    let report = process_cycle(&mut session, request, &state.gateways).await;

    tracing::info!(
        session = %id,
        input = ?report.input,
        outcome = report.outcome.label(),
        notices = report.notices.len(),
        "cycle processed"
    );

    let view = SessionView::new(id, &session);
    Ok(Json(CycleView::new(report, view)))
}

async fn read_cycle_request(mut multipart: Multipart) -> Result<CycleRequest, ApiError> {
    let mut request = CycleRequest::default();
    let mut audio: Option<(Vec<u8>, Option<AudioFormat>)> = None;
    let mut sample_rate: Option<u32> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "text" => request.text = field.text().await.map_err(multipart_error)?,
            "submit" => {
                let value = field.text().await.map_err(multipart_error)?;
                request.submitted = matches!(value.trim(), "true" | "1" | "on");
            }
            "audio" => {
                let hint = AudioFormat::from_hint(field.content_type(), field.file_name());
                let data = field.bytes().await.map_err(multipart_error)?;
                audio = Some((data.to_vec(), hint));
            }
            "sample_rate" => {
                let value = field.text().await.map_err(multipart_error)?;
                let rate = value
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|r| *r > 0)
                    .ok_or_else(|| ApiError::BadRequest(format!("invalid sample_rate: {value}")))?;
                sample_rate = Some(rate);
            }
            other => tracing::debug!(field = other, "ignoring unknown multipart field"),
        }
    }

    if let Some((data, hint)) = audio {
        let format = sample_rate
            .map(|sample_rate| AudioFormat::Pcm16 {
                sample_rate,
                channels: 1,
            })
            .or(hint);
        request.audio = Some(AudioInput { data, format });
    }

    Ok(request)
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::BadRequest(e.body_text())
    }
}
