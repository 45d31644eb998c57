//! Line-oriented decoding of streamed responses.
//!
//! Byte chunks arrive split at arbitrary points; [`LineBuffer`] reassembles
//! lines and a [`LineDecoder`] maps each line to at most one event.

use std::collections::VecDeque;
use std::fmt::Display;

use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{strip_fences, GenerationError, GenerationEvent};

#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Add a chunk and return every line it completed, without terminators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(Self::decode(&line[..pos]));
        }
        lines
    }

    /// Trailing text without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(Self::decode(&rest))
    }

    fn decode(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).trim_end_matches('\r').to_string()
    }
}

pub trait LineDecoder: Default + Send + 'static {
    fn decode_line(&mut self, line: &str) -> Option<GenerationEvent>;

    fn finish(&mut self) -> Option<GenerationEvent> {
        None
    }
}

/// Wire events of the newline-delimited JSON stream served by `/api/generate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireEvent {
    Delta {
        text: String,
    },
    Done {
        code: String,
    },
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl WireEvent {
    /// One NDJSON line, newline included.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_default();
        line.push('\n');
        line
    }

    pub fn into_event(self) -> GenerationEvent {
        match self {
            WireEvent::Delta { text } => GenerationEvent::Delta(text),
            WireEvent::Done { code } => {
                let code = strip_fences(&code);
                if code.is_empty() {
                    GenerationEvent::Failed(GenerationError::EmptyResponse)
                } else {
                    GenerationEvent::Done(code)
                }
            }
            WireEvent::Error { error, code } => GenerationEvent::Failed(match code.as_deref() {
                Some("configuration") => GenerationError::MissingCredential,
                Some("empty") => GenerationError::EmptyResponse,
                Some("malformed") => GenerationError::Malformed(error),
                Some("provider") => GenerationError::Provider {
                    status: 502,
                    message: error,
                },
                _ => GenerationError::Transport(error),
            }),
        }
    }
}

impl From<&GenerationEvent> for WireEvent {
    fn from(event: &GenerationEvent) -> Self {
        match event {
            GenerationEvent::Delta(text) => WireEvent::Delta { text: text.clone() },
            GenerationEvent::Done(code) => WireEvent::Done { code: code.clone() },
            GenerationEvent::Failed(error) => WireEvent::Error {
                error: error.to_string(),
                code: Some(error.code().to_string()),
            },
        }
    }
}

/// Parse one NDJSON line. Blank and unrecognized lines yield `None`.
pub fn parse_event_line(line: &str) -> Option<GenerationEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<WireEvent>(line) {
        Ok(event) => Some(event.into_event()),
        Err(e) => {
            debug!(error = %e, line, "ignoring unrecognized stream line");
            None
        }
    }
}

#[derive(Debug, Default)]
pub struct NdjsonDecoder;

impl LineDecoder for NdjsonDecoder {
    fn decode_line(&mut self, line: &str) -> Option<GenerationEvent> {
        parse_event_line(line)
    }
}

/// Decoder for the provider's server-sent events.
#[derive(Debug, Default)]
pub struct SseDecoder {
    text: String,
}

impl SseDecoder {
    fn provider_error(error: &serde_json::Value) -> GenerationError {
        let kind = error["type"].as_str().unwrap_or("api_error");
        let message = error["message"].as_str().unwrap_or("unknown provider error");
        let status = match kind {
            "overloaded_error" => 529,
            "rate_limit_error" => 429,
            "authentication_error" => return GenerationError::MissingCredential,
            "invalid_request_error" => 400,
            _ => 500,
        };
        GenerationError::Provider {
            status,
            message: format!("{kind}: {message}"),
        }
    }
}

impl LineDecoder for SseDecoder {
    fn decode_line(&mut self, line: &str) -> Option<GenerationEvent> {
        let data = line.strip_prefix("data:")?.trim();
        let payload: serde_json::Value = match serde_json::from_str(data) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(error = %e, data, "ignoring non-JSON event data");
                return None;
            }
        };
        match payload["type"].as_str()? {
            "content_block_delta" => {
                let delta = &payload["delta"];
                if delta["type"].as_str() != Some("text_delta") {
                    return None;
                }
                let text = delta["text"].as_str()?;
                self.text.push_str(text);
                Some(GenerationEvent::Delta(text.to_string()))
            }
            "message_stop" => {
                let code = strip_fences(&self.text);
                Some(if code.is_empty() {
                    GenerationEvent::Failed(GenerationError::EmptyResponse)
                } else {
                    GenerationEvent::Done(code)
                })
            }
            "error" => Some(GenerationEvent::Failed(Self::provider_error(&payload["error"]))),
            _ => None,
        }
    }
}

struct DecodeState<B, D> {
    bytes: B,
    lines: LineBuffer,
    decoder: D,
    pending: VecDeque<GenerationEvent>,
    exhausted: bool,
}

impl<B, D: LineDecoder> DecodeState<B, D> {
    fn feed(&mut self, line: &str) {
        if let Some(event) = self.decoder.decode_line(line) {
            self.pending.push_back(event);
        }
    }
}

/// Decode a byte stream line by line.
pub fn decode_lines<B, C, E, D>(bytes: B, decoder: D) -> impl Stream<Item = GenerationEvent> + Send
where
    B: Stream<Item = Result<C, E>> + Send + 'static,
    C: AsRef<[u8]> + Send,
    E: Display + Send,
    D: LineDecoder,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        lines: LineBuffer::default(),
        decoder,
        pending: VecDeque::new(),
        exhausted: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.exhausted {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for line in state.lines.push(chunk.as_ref()) {
                        state.feed(&line);
                    }
                }
                Some(Err(e)) => {
                    state
                        .pending
                        .push_back(GenerationEvent::Failed(GenerationError::Transport(e.to_string())));
                    state.exhausted = true;
                }
                None => {
                    if let Some(rest) = state.lines.finish() {
                        state.feed(&rest);
                    }
                    if let Some(event) = state.decoder.finish() {
                        state.pending.push_back(event);
                    }
                    state.exhausted = true;
                }
            }
        }
    })
}

/// Map a non-success HTTP response to an error.
pub(crate) fn status_error(status: u16, body: &str) -> GenerationError {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    if let Some(json) = &parsed {
        if json["code"].as_str() == Some("configuration") {
            return GenerationError::MissingCredential;
        }
    }
    if status == 401 || status == 403 {
        return GenerationError::MissingCredential;
    }
    let message = parsed
        .as_ref()
        .and_then(|json| {
            json["error"]["message"]
                .as_str()
                .or_else(|| json["error"].as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect());
    GenerationError::Provider { status, message }
}

/// Send a request and decode its body as a stream of events.
pub(crate) fn response_stream<F, D>(send: F) -> super::GenerationStream
where
    F: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>> + Send + 'static,
    D: LineDecoder,
{
    let events = stream::once(send).flat_map(|result| -> super::GenerationStream {
        match result {
            Err(e) => super::failed(GenerationError::Transport(e.to_string())),
            Ok(response) if !response.status().is_success() => Box::pin(stream::once(async move {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                GenerationEvent::Failed(status_error(status, &body))
            })),
            Ok(response) => Box::pin(decode_lines(response.bytes_stream(), D::default())),
        }
    });
    super::terminated(events)
}
