//! Prefixed text protocol over `/ws`.
//!
//! Client: `EXECUTE:<script>`, `TURN:{"conversationId", "content", "imageAttachment"?}`.
//! Server: `PROGRESS_UPDATE:{..}`, `RENDER_UPDATE:{..}`, `ERROR_UPDATE:{code, message, severity}`.

use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
};
use cadloop_core::orchestrator::{TurnError, TurnProgress};
use cadloop_core::sandbox::ExecutionOutcome;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::routes::{TurnRequest, TurnResponse};
use crate::state::AppState;

/// Format an error as a JSON message for the frontend
pub fn format_error(code: &str, message: &str, severity: &str) -> String {
    format!(
        "ERROR_UPDATE:{}",
        json!({
            "code": code,
            "message": message,
            "severity": severity
        })
    )
}

fn format_update<T: Serialize>(prefix: &str, payload: &T) -> String {
    let json = serde_json::to_string(payload).unwrap_or_else(|_| "{}".into());
    format!("{prefix}:{json}")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TurnCommand {
    conversation_id: Uuid,
    #[serde(flatten)]
    request: TurnRequest,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressUpdate<'a> {
    conversation_id: Uuid,
    #[serde(flatten)]
    progress: &'a TurnProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<&'static str>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    info!("Client connected");

    while let Some(msg) = socket.recv().await {
        let Ok(msg) = msg else {
            return;
        };
        let Message::Text(text) = msg else {
            continue;
        };

        let sent = if let Some(script) = text.strip_prefix("EXECUTE:") {
            debug!(bytes = script.len(), "execute request");
            handle_execute(&mut socket, &state, script.to_string()).await
        } else if let Some(command) = text.strip_prefix("TURN:") {
            match serde_json::from_str::<TurnCommand>(command) {
                Ok(command) => handle_turn(&mut socket, &state, command).await,
                Err(e) => {
                    warn!("Failed to parse TURN command: {}", e);
                    let message = format!("invalid TURN command: {e}");
                    send(&mut socket, format_error("BAD_COMMAND", &message, "warning")).await
                }
            }
        } else {
            warn!("Unknown command: {}", text.chars().take(40).collect::<String>());
            send(&mut socket, format_error("UNKNOWN_COMMAND", "unknown command", "warning")).await
        };

        if sent.is_err() {
            break;
        }
    }
    info!("Client disconnected");
}

async fn send(socket: &mut WebSocket, text: String) -> Result<(), axum::Error> {
    socket.send(Message::Text(text)).await
}

async fn handle_execute(
    socket: &mut WebSocket,
    state: &AppState,
    script: String,
) -> Result<(), axum::Error> {
    match state.execute(script).await {
        ExecutionOutcome::Accepted(shape) => {
            let payload = state.render(&shape);
            info!("Sent RENDER_UPDATE with {} triangles", payload.stats.triangle_count);
            send(socket, format_update("RENDER_UPDATE", &payload)).await
        }
        ExecutionOutcome::Rejected(error) => {
            send(socket, format_error("SCRIPT_REJECTED", &error, "error")).await
        }
    }
}

/// Run a turn, forwarding progress while it is in flight.
async fn handle_turn(
    socket: &mut WebSocket,
    state: &AppState,
    command: TurnCommand,
) -> Result<(), axum::Error> {
    let id = command.conversation_id;
    let turn = match command.request.into_turn() {
        Ok(turn) => turn,
        Err(e) => return send(socket, format_error("BAD_COMMAND", &e.message, "warning")).await,
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<TurnProgress>();
    let observer = move |progress: &TurnProgress| {
        let _ = tx.send(progress.clone());
    };
    let running = state.turns.submit(id, turn, Some(&observer));
    tokio::pin!(running);

    let result = loop {
        tokio::select! {
            result = &mut running => break result,
            Some(progress) = rx.recv() => {
                send(socket, progress_update(id, &progress)).await?;
            }
        }
    };
    while let Ok(progress) = rx.try_recv() {
        send(socket, progress_update(id, &progress)).await?;
    }

    match result {
        Ok(submission) => {
            let response = TurnResponse::new(state, submission);
            if response.render.is_some() {
                send(socket, format_update("RENDER_UPDATE", &response)).await
            } else {
                send(socket, turn_failure(&response)).await
            }
        }
        Err(e) => {
            let code = match e {
                TurnError::Busy(_) => "TURN_BUSY",
                _ => "TURN_REJECTED",
            };
            send(socket, format_error(code, &e.to_string(), "error")).await
        }
    }
}

fn progress_update(conversation_id: Uuid, progress: &TurnProgress) -> String {
    let label = match progress {
        TurnProgress::Phase { phase, .. } => Some(phase.label()),
        _ => None,
    };
    format_update(
        "PROGRESS_UPDATE",
        &ProgressUpdate {
            conversation_id,
            progress,
            label,
        },
    )
}

/// Error update for a turn that finished without a model; carries the saved conversation.
fn turn_failure(response: &TurnResponse) -> String {
    let severity = match response.outcome {
        "exhausted" | "unidentifiable" => "warning",
        _ => "error",
    };
    format!(
        "ERROR_UPDATE:{}",
        json!({
            "code": response.outcome.to_ascii_uppercase(),
            "message": response.message.clone().unwrap_or_default(),
            "severity": severity,
            "turn": response,
        })
    )
}
