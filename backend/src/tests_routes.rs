use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use cadloop_core::config::CadConfig;
use cadloop_core::conversation::Conversation;
use cadloop_core::generation::{
    GenerationClient, GenerationError, GenerationEvent, GenerationRequest, GenerationStream,
};
use futures::stream;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::routes::{app, file_stem};
use crate::state::AppState;

const CUBE: &str = "return cuboid({ size: [10, 10, 10] });";

/// Replays one canned event list per call.
struct ScriptedClient {
    replies: Mutex<VecDeque<Vec<GenerationEvent>>>,
}

impl ScriptedClient {
    fn new(replies: Vec<Vec<GenerationEvent>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
        })
    }
}

impl GenerationClient for ScriptedClient {
    fn stream(&self, _request: GenerationRequest) -> GenerationStream {
        let events = self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            vec![GenerationEvent::Failed(GenerationError::Transport(
                "no scripted reply".into(),
            ))]
        });
        Box::pin(stream::iter(events))
    }
}

fn state(replies: Vec<Vec<GenerationEvent>>) -> Arc<AppState> {
    Arc::new(AppState::with_client(
        CadConfig::default(),
        ScriptedClient::new(replies),
    ))
}

fn done(script: &str) -> Vec<GenerationEvent> {
    vec![
        GenerationEvent::Delta(script.to_string()),
        GenerationEvent::Done(script.to_string()),
    ]
}

async fn send(state: &Arc<AppState>, method: Method, uri: &str, body: Option<Value>) -> Response {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header(CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&value).unwrap())
        }
        None => Body::empty(),
    };
    app(state.clone())
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap()
}

async fn read_body_bytes(response: Response) -> axum::body::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn parse_json_value(response: Response) -> Value {
    serde_json::from_slice(&read_body_bytes(response).await).unwrap()
}

async fn create_conversation(state: &Arc<AppState>) -> String {
    let response = send(state, Method::POST, "/api/conversations", Some(json!({}))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    parse_json_value(response).await["id"].as_str().unwrap().to_string()
}

fn history() -> Value {
    json!([{ "role": "user", "content": "a cube" }])
}

#[tokio::test]
async fn test_health() {
    let state = state(vec![]);
    let response = send(&state, Method::GET, "/api/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(parse_json_value(response).await["status"], "ok");
}

#[tokio::test]
async fn test_generate_returns_code() {
    let state = state(vec![done(CUBE)]);
    let response = send(
        &state,
        Method::POST,
        "/api/generate",
        Some(json!({ "conversationHistory": history() })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(parse_json_value(response).await["code"], CUBE);
}

#[tokio::test]
async fn test_generate_error_statuses() {
    let state = state(vec![
        vec![GenerationEvent::Failed(GenerationError::MissingCredential)],
        vec![GenerationEvent::Failed(GenerationError::Transport("reset".into()))],
    ]);
    let body = json!({ "conversationHistory": history() });

    let response = send(&state, Method::POST, "/api/generate", Some(body.clone())).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error = parse_json_value(response).await;
    assert!(error["error"].is_string());
    assert_eq!(error["code"], "configuration");

    let response = send(&state, Method::POST, "/api/generate", Some(body)).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_generate_streams_ndjson() {
    let state = state(vec![done(CUBE)]);
    let response = send(
        &state,
        Method::POST,
        "/api/generate",
        Some(json!({ "conversationHistory": history(), "stream": true })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/x-ndjson");

    let body = read_body_bytes(response).await;
    let lines: Vec<Value> = std::str::from_utf8(&body)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["type"], "delta");
    assert_eq!(lines[1], json!({ "type": "done", "code": CUBE }));
}

#[tokio::test]
async fn test_generate_rejects_bad_input() {
    let state = state(vec![done(CUBE)]);
    let response = send(
        &state,
        Method::POST,
        "/api/generate",
        Some(json!({ "conversationHistory": [] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &state,
        Method::POST,
        "/api/generate",
        Some(json!({
            "conversationHistory": history(),
            "imageAttachment": { "data": "R0lGODlh", "mediaType": "image/gif" },
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = parse_json_value(response).await["error"].as_str().unwrap().to_string();
    assert!(error.contains("image/gif"));
}

#[tokio::test]
async fn test_execute() {
    let state = state(vec![]);
    let response = send(&state, Method::POST, "/api/execute", Some(json!({ "code": CUBE }))).await;
    let body = parse_json_value(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["parts"].as_array().unwrap().len(), 1);
    assert_eq!(body["stats"]["triangleCount"], 12);

    let response = send(
        &state,
        Method::POST,
        "/api/execute",
        Some(json!({ "code": "return 1;" })),
    )
    .await;
    let body = parse_json_value(response).await;
    assert_eq!(body["ok"], false);
    assert!(body["error"].as_str().unwrap().contains("solid"));
    assert!(body.get("parts").is_none());
}

#[tokio::test]
async fn test_conversation_crud() {
    let state = state(vec![]);
    let id = create_conversation(&state).await;
    let uri = format!("/api/conversations/{id}");

    let response = send(&state, Method::PUT, &uri, Some(json!({ "title": "Bracket" }))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(parse_json_value(response).await["title"], "Bracket");

    let response = send(&state, Method::GET, "/api/conversations", None).await;
    let list = parse_json_value(response).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["title"], "Bracket");

    let response = send(&state, Method::DELETE, &uri, None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = send(&state, Method::GET, &uri, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_import() {
    let state = state(vec![]);
    let response = send(
        &state,
        Method::POST,
        "/api/conversations/import",
        Some(json!({ "sessions": [] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(parse_json_value(response).await["error"], "No sessions to import");

    let sessions = vec![Conversation::new("one"), Conversation::new("two")];
    let response = send(
        &state,
        Method::POST,
        "/api/conversations/import",
        Some(json!({ "sessions": sessions })),
    )
    .await;
    assert_eq!(parse_json_value(response).await["imported"], 2);
    assert_eq!(state.store().list().unwrap().len(), 2);
}

#[tokio::test]
async fn test_turn_then_export() {
    let state = state(vec![done(CUBE)]);
    let id = create_conversation(&state).await;

    let response = send(
        &state,
        Method::POST,
        &format!("/api/conversations/{id}/turns"),
        Some(json!({ "content": "a 10mm cube" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_json_value(response).await;
    assert_eq!(body["outcome"], "accepted");
    assert_eq!(body["attempts"], 1);
    assert_eq!(body["script"], CUBE);
    assert_eq!(body["render"]["stats"]["partCount"], 1);
    assert_eq!(body["conversation"]["title"], "a 10mm cube");

    let response = send(
        &state,
        Method::GET,
        &format!("/api/conversations/{id}/export?format=stl"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "model/stl");
    assert_eq!(
        response.headers()[CONTENT_DISPOSITION],
        "attachment; filename=\"a-10mm-cube.stl\""
    );
    assert_eq!(read_body_bytes(response).await.len(), 84 + 12 * 50);

    let response = send(
        &state,
        Method::GET,
        &format!("/api/conversations/{id}/export?format=3mf"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(read_body_bytes(response).await.starts_with(b"PK"));

    let response = send(
        &state,
        Method::GET,
        &format!("/api/conversations/{id}/export?format=obj"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_failed_turn_reports_outcome() {
    let state = state(vec![
        vec![GenerationEvent::Failed(GenerationError::MissingCredential)],
    ]);
    let id = create_conversation(&state).await;

    let response = send(
        &state,
        Method::POST,
        &format!("/api/conversations/{id}/turns"),
        Some(json!({ "content": "a cube" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_json_value(response).await;
    assert_eq!(body["outcome"], "configuration_fault");
    assert_eq!(body["attempts"], 0);
    assert!(body["message"].is_string());
    assert!(body.get("render").is_none());
    assert_eq!(body["conversation"]["turns"].as_array().unwrap().len(), 2);

    let response = send(
        &state,
        Method::GET,
        &format!("/api/conversations/{id}/export"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_turn_input_errors() {
    let state = state(vec![]);
    let id = create_conversation(&state).await;

    let response = send(
        &state,
        Method::POST,
        &format!("/api/conversations/{id}/turns"),
        Some(json!({ "content": "   " })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &state,
        Method::POST,
        &format!("/api/conversations/{id}/regenerate"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let missing = uuid::Uuid::new_v4();
    let response = send(
        &state,
        Method::POST,
        &format!("/api/conversations/{missing}/turns"),
        Some(json!({ "content": "a cube" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_file_stem() {
    assert_eq!(file_stem("Desk Lamp (v2)"), "desk-lamp-v2");
    assert_eq!(file_stem("  "), "model");
    assert_eq!(file_stem("Ø 20"), "20");
}
