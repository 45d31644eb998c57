use futures::executor::block_on;
use futures::stream::{self, StreamExt};

use super::decode::{decode_lines, status_error};
use super::*;
use crate::conversation::{ConversationTurn, ImageAttachment, Role};

fn events_from<D: LineDecoder>(chunks: Vec<&'static str>) -> Vec<GenerationEvent> {
    let bytes = stream::iter(
        chunks
            .into_iter()
            .map(|c| Ok::<_, std::io::Error>(c.as_bytes().to_vec())),
    );
    block_on(terminated(decode_lines(bytes, D::default())).collect::<Vec<_>>())
}

#[test]
fn test_strip_fences() {
    assert_eq!(strip_fences("```javascript\nreturn cuboid();\n```"), "return cuboid();");
    assert_eq!(strip_fences("```\nreturn cuboid();\n```"), "return cuboid();");
    assert_eq!(strip_fences("  return cuboid();  \n"), "return cuboid();");
    assert_eq!(strip_fences("\n```js\r\nreturn sphere();```\n"), "return sphere();");
    assert_eq!(strip_fences("```\n```"), "");
}

#[test]
fn test_terminated_truncates_after_first_terminal() {
    let inner = stream::iter(vec![
        GenerationEvent::Delta("a".into()),
        GenerationEvent::Done("return cuboid();".into()),
        GenerationEvent::Delta("late".into()),
    ]);
    let events: Vec<_> = block_on(terminated(inner).collect());
    assert_eq!(
        events,
        vec![
            GenerationEvent::Delta("a".into()),
            GenerationEvent::Done("return cuboid();".into()),
        ]
    );
}

#[test]
fn test_terminated_reports_early_end() {
    let inner = stream::iter(vec![GenerationEvent::Delta("a".into())]);
    let events: Vec<_> = block_on(terminated(inner).collect());
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[1],
        GenerationEvent::Failed(GenerationError::Transport(_))
    ));
}

#[test]
fn test_collect_returns_final_code() {
    let events = stream::iter(vec![
        GenerationEvent::Delta("return ".into()),
        GenerationEvent::Delta("cuboid();".into()),
        GenerationEvent::Done("return cuboid();".into()),
    ]);
    assert_eq!(block_on(collect(Box::pin(events))), Ok("return cuboid();".to_string()));
    assert_eq!(
        block_on(collect(failed(GenerationError::EmptyResponse))),
        Err(GenerationError::EmptyResponse)
    );
}

#[test]
fn test_ndjson_lines_split_across_chunks() {
    let events = events_from::<NdjsonDecoder>(vec![
        "{\"type\":\"delta\",\"te",
        "xt\":\"return \"}\n{\"type\":\"delta\",\"text\":\"cuboid();\"}\n",
        "not json\n\n",
        "{\"type\":\"done\",\"code\":\"```js\\nreturn cuboid();\\n```\"}",
    ]);
    assert_eq!(
        events,
        vec![
            GenerationEvent::Delta("return ".into()),
            GenerationEvent::Delta("cuboid();".into()),
            GenerationEvent::Done("return cuboid();".into()),
        ]
    );
}

#[test]
fn test_parse_event_line_errors() {
    assert_eq!(
        parse_event_line("{\"type\":\"error\",\"error\":\"no key\",\"code\":\"configuration\"}"),
        Some(GenerationEvent::Failed(GenerationError::MissingCredential))
    );
    assert_eq!(
        parse_event_line("{\"type\":\"error\",\"error\":\"reset\"}"),
        Some(GenerationEvent::Failed(GenerationError::Transport("reset".into())))
    );
    assert_eq!(
        parse_event_line("{\"type\":\"done\",\"code\":\"  \"}"),
        Some(GenerationEvent::Failed(GenerationError::EmptyResponse))
    );
    assert_eq!(parse_event_line("   "), None);
    assert_eq!(parse_event_line("{\"type\":\"ping\"}"), None);
}

#[test]
fn test_wire_event_from_generation_event() {
    let wire = WireEvent::from(&GenerationEvent::Failed(GenerationError::MissingCredential));
    let line = wire.to_line();
    assert!(line.ends_with('\n'));
    assert_eq!(
        parse_event_line(&line),
        Some(GenerationEvent::Failed(GenerationError::MissingCredential))
    );
    let json: serde_json::Value = serde_json::from_str(&WireEvent::from(&GenerationEvent::Delta("x".into())).to_line()).unwrap();
    assert_eq!(json["type"], "delta");
    assert_eq!(json["text"], "x");
}

#[test]
fn test_sse_decoder_accumulates_text() {
    let events = events_from::<SseDecoder>(vec![
        "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{}}\n\n",
        "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"```\\nreturn \"}}\n\n",
        "event: ping\ndata: {\"type\":\"ping\"}\n\n",
        "event: content_block_delta\r\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"sphere();\\n```\"}}\r\n\r\n",
        "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
    ]);
    assert_eq!(events.len(), 3);
    assert_eq!(events[2], GenerationEvent::Done("return sphere();".into()));
}

#[test]
fn test_sse_error_event() {
    let events = events_from::<SseDecoder>(vec![
        "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
    ]);
    assert_eq!(
        events,
        vec![GenerationEvent::Failed(GenerationError::Provider {
            status: 529,
            message: "overloaded_error: Overloaded".into(),
        })]
    );
}

#[test]
fn test_sse_stream_without_stop_is_a_transport_failure() {
    let events = events_from::<SseDecoder>(vec![
        "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"return\"}}\n",
    ]);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[1], GenerationEvent::Failed(GenerationError::Transport(_))));
}

#[test]
fn test_status_error_mapping() {
    assert_eq!(status_error(401, "{}"), GenerationError::MissingCredential);
    assert_eq!(
        status_error(500, "{\"error\":\"no key\",\"code\":\"configuration\"}"),
        GenerationError::MissingCredential
    );
    assert_eq!(
        status_error(429, "{\"type\":\"error\",\"error\":{\"type\":\"rate_limit_error\",\"message\":\"slow down\"}}"),
        GenerationError::Provider {
            status: 429,
            message: "slow down".into()
        }
    );
    assert_eq!(
        status_error(502, "bad gateway"),
        GenerationError::Provider {
            status: 502,
            message: "bad gateway".into()
        }
    );
}

#[test]
fn test_missing_or_placeholder_key_fails_without_network() {
    let request = GenerationRequest::new(vec![ConversationTurn::user("a cube")]);
    for key in [None, Some("".to_string()), Some("your-key-here".to_string())] {
        let client = AnthropicClient::new(key);
        assert!(!client.has_credential());
        let events: Vec<_> = block_on(client.stream(request.clone()).collect());
        assert_eq!(events, vec![GenerationEvent::Failed(GenerationError::MissingCredential)]);
    }
}

#[test]
fn test_request_body_shape() {
    let client = AnthropicClient::new(Some("sk-test".into())).with_model("test-model");
    let request = GenerationRequest::new(vec![
        ConversationTurn::user("model this").with_image(ImageAttachment::new("aGk=", "image/png")),
    ])
    .with_current_script(Some("return cuboid();".into()));
    let body = client.request_body(&request);
    assert_eq!(body["model"], "test-model");
    assert_eq!(body["stream"], true);
    assert!(body["system"].as_str().unwrap().contains("return cuboid();"));
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][0]["content"][0]["type"], "image");
    assert_eq!(body["messages"][0]["content"][1]["text"], "model this");
}

#[test]
fn test_generate_body_moves_image_to_attachment() {
    let request = GenerationRequest::new(vec![
        ConversationTurn::user("model this").with_image(ImageAttachment::new("aGk=", "image/png")),
    ]);
    let body = GenerateBody::from_request(&request, true);
    assert!(body.conversation_history[0].image.is_none());
    assert_eq!(body.image_attachment.as_ref().map(|i| i.data.as_str()), Some("aGk="));

    let json = serde_json::to_value(&body).unwrap();
    assert!(json.get("conversationHistory").is_some());
    assert!(json.get("imageAttachment").is_some());

    let back = body.into_request();
    assert_eq!(back, request);
    assert_eq!(back.history[0].role, Role::User);
}

#[tokio::test]
async fn test_endpoint_unreachable_is_transport_failure() {
    let client = EndpointClient::new("http://127.0.0.1:9/api/generate");
    let events: Vec<_> = client
        .stream(GenerationRequest::new(vec![ConversationTurn::user("a cube")]))
        .collect()
        .await;
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], GenerationEvent::Failed(GenerationError::Transport(_))));
}
