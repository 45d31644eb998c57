use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use cadloop_core::conversation::{
    Conversation, ConversationPatch, ConversationSummary, ConversationTurn, ImageAttachment,
};
use cadloop_core::export::{export, ExportFormat};
use cadloop_core::generation::{collect, GenerateBody, WireEvent};
use cadloop_core::orchestrator::{TurnOutcome, TurnSubmission};
use cadloop_core::sandbox::ExecutionOutcome;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, RenderPayload};
use crate::ws::ws_handler;

/// Text sent with a photo when the user typed nothing.
pub const PHOTO_ONLY_PROMPT: &str = "Create a 3D model of the object in this photo.";

pub fn app(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/generate", post(generate))
        .route("/execute", post(execute))
        .route(
            "/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route("/conversations/import", post(import_conversations))
        .route(
            "/conversations/:id",
            get(get_conversation)
                .put(update_conversation)
                .delete(delete_conversation),
        )
        .route("/conversations/:id/turns", post(submit_turn))
        .route("/conversations/:id/regenerate", post(regenerate_turn))
        .route("/conversations/:id/export", get(export_model));

    let mut router = Router::new()
        .nest("/api", api)
        .route("/ws", get(ws_handler));
    if let Some(dir) = &state.config.server.static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }
    router
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": cadloop_core::version() }))
}

/// One generation call, as JSON or as NDJSON events.
async fn generate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateBody>,
) -> ApiResult<Response> {
    if body.conversation_history.is_empty() {
        return Err(ApiError::bad_request("conversationHistory must not be empty"));
    }
    if let Some(image) = &body.image_attachment {
        image.validate(&state.config.images)?;
    }
    let stream = body.stream;
    let events = state.client.stream(body.into_request());

    if stream {
        let lines = events.map(|event| Ok::<_, Infallible>(WireEvent::from(&event).to_line()));
        return Ok((
            [(CONTENT_TYPE, "application/x-ndjson")],
            Body::from_stream(lines),
        )
            .into_response());
    }

    match collect(events).await {
        Ok(code) => Ok(Json(json!({ "code": code })).into_response()),
        Err(e) => {
            let status = if e.is_configuration() {
                StatusCode::INTERNAL_SERVER_ERROR
            } else {
                StatusCode::BAD_GATEWAY
            };
            warn!(%status, error = %e, "generation failed");
            Ok((status, Json(json!({ "error": e.to_string(), "code": e.code() }))).into_response())
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    code: String,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub render: Option<RenderPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn execute(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExecuteRequest>,
) -> Json<ExecuteResponse> {
    let response = match state.execute(request.code).await {
        ExecutionOutcome::Accepted(shape) => ExecuteResponse {
            ok: true,
            render: Some(state.render(&shape)),
            error: None,
        },
        ExecutionOutcome::Rejected(error) => ExecuteResponse {
            ok: false,
            render: None,
            error: Some(error),
        },
    };
    Json(response)
}

async fn list_conversations(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    Ok(Json(state.store().list()?))
}

#[derive(Debug, Default, Deserialize)]
struct CreateConversation {
    title: Option<String>,
}

async fn create_conversation(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CreateConversation>>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let conversation = match request.title.filter(|t| !t.trim().is_empty()) {
        Some(title) => Conversation::new(title),
        None => Conversation::untitled(),
    };
    let conversation = state.store().create(conversation)?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Conversation>> {
    Ok(Json(state.store().get(id)?))
}

async fn update_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(patch): Json<ConversationPatch>,
) -> ApiResult<Json<Conversation>> {
    if state.turns.is_busy(id) {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            format!("a turn is already in progress for conversation {id}"),
        ));
    }
    let mut conversation = state.store().get(id)?;
    patch.apply_to(&mut conversation);
    Ok(Json(state.store().update(conversation)?))
}

async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.store().delete(id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ImportRequest {
    #[serde(default)]
    sessions: Vec<Conversation>,
}

async fn import_conversations(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ImportRequest>,
) -> ApiResult<Json<Value>> {
    if request.sessions.is_empty() {
        return Err(ApiError::bad_request("No sessions to import"));
    }
    let imported = state.store().import(request.sessions)?;
    info!(imported, "imported conversations");
    Ok(Json(json!({ "imported": imported })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image_attachment: Option<ImageAttachment>,
}

impl TurnRequest {
    pub fn into_turn(self) -> ApiResult<ConversationTurn> {
        let content = self.content.trim();
        let turn = match (content.is_empty(), self.image_attachment) {
            (true, None) => return Err(ApiError::bad_request("content must not be empty")),
            (true, Some(image)) => ConversationTurn::user(PHOTO_ONLY_PROMPT).with_image(image),
            (false, Some(image)) => ConversationTurn::user(content).with_image(image),
            (false, None) => ConversationTurn::user(content),
        };
        Ok(turn)
    }
}

/// Result of a turn as returned to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    pub outcome: &'static str,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render: Option<RenderPayload>,
    pub conversation: Conversation,
}

impl TurnResponse {
    pub fn new(state: &AppState, submission: TurnSubmission) -> Self {
        let outcome = &submission.report.outcome;
        let (script, render) = match outcome {
            TurnOutcome::Accepted { script, shape, .. } => {
                (Some(script.clone()), Some(state.render(shape)))
            }
            _ => (None, None),
        };
        Self {
            outcome: outcome.kind(),
            attempts: outcome.attempts(),
            message: outcome.user_message(),
            script,
            render,
            conversation: submission.conversation,
        }
    }
}

async fn submit_turn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<TurnRequest>,
) -> ApiResult<Json<TurnResponse>> {
    let turn = request.into_turn()?;
    let submission = state.turns.submit(id, turn, None).await?;
    Ok(Json(TurnResponse::new(&state, submission)))
}

async fn regenerate_turn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TurnResponse>> {
    let submission = state.turns.regenerate(id, None).await?;
    Ok(Json(TurnResponse::new(&state, submission)))
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

async fn export_model(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    let format: ExportFormat = query.format.as_deref().unwrap_or("stl").parse()?;
    let conversation = state.store().get(id)?;
    let Some(script) = conversation.current_script else {
        return Err(ApiError::not_found("conversation has no model to export"));
    };

    let shape = match state.execute(script).await {
        ExecutionOutcome::Accepted(shape) => shape,
        ExecutionOutcome::Rejected(error) => {
            return Err(ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, error))
        }
    };
    let kernel = state.executor.kernel().clone();
    let options = *state.mesh_options();
    let bytes = tokio::task::spawn_blocking(move || export(&shape, format, kernel.as_ref(), &options))
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("export aborted: {e}")))??;

    let filename = format!("{}.{}", file_stem(&conversation.title), format.extension());
    info!(%id, %format, bytes = bytes.len(), "exported model");
    Ok((
        [
            (CONTENT_TYPE, format.content_type().to_string()),
            (CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        bytes,
    )
        .into_response())
}

/// Lowercase ASCII slug of a title, `model` when nothing is left.
pub fn file_stem(title: &str) -> String {
    let mut stem = String::new();
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            stem.push(c.to_ascii_lowercase());
        } else if !stem.is_empty() && !stem.ends_with('-') {
            stem.push('-');
        }
    }
    let stem = stem.trim_end_matches('-');
    if stem.is_empty() {
        "model".to_string()
    } else {
        stem.to_string()
    }
}
