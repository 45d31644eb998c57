//! Streaming script generation.
//!
//! A [`GenerationClient`] turns a [`GenerationRequest`] into a stream of
//! [`GenerationEvent`]s. Every stream ends with exactly one terminal event
//! (`Done` or `Failed`), enforced by [`terminated`].

pub mod anthropic;
pub mod decode;
pub mod endpoint;

#[cfg(test)]
mod tests_generation;

pub use anthropic::AnthropicClient;
pub use decode::{parse_event_line, LineBuffer, LineDecoder, NdjsonDecoder, SseDecoder, WireEvent};
pub use endpoint::{EndpointClient, GenerateBody};

use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};
use thiserror::Error;

use crate::conversation::ConversationTurn;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GenerationError {
    #[error("no API key configured; set ANTHROPIC_API_KEY")]
    MissingCredential,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("the model returned no code")]
    EmptyResponse,
}

impl GenerationError {
    /// Configuration faults end a turn without consuming attempts.
    pub fn is_configuration(&self) -> bool {
        matches!(self, GenerationError::MissingCredential)
    }

    /// Stable short code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            GenerationError::MissingCredential => "configuration",
            GenerationError::Transport(_) => "transport",
            GenerationError::Provider { .. } => "provider",
            GenerationError::Malformed(_) => "malformed",
            GenerationError::EmptyResponse => "empty",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    /// Incremental text, for progress display only.
    Delta(String),
    /// Complete script with fences removed.
    Done(String),
    Failed(GenerationError),
}

impl GenerationEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GenerationEvent::Delta(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationRequest {
    /// Alternating turns ending with a user turn.
    pub history: Vec<ConversationTurn>,
    pub current_script: Option<String>,
}

impl GenerationRequest {
    pub fn new(history: Vec<ConversationTurn>) -> Self {
        Self {
            history,
            current_script: None,
        }
    }

    pub fn with_current_script(mut self, script: Option<String>) -> Self {
        self.current_script = script;
        self
    }
}

pub type GenerationStream = Pin<Box<dyn Stream<Item = GenerationEvent> + Send>>;

pub trait GenerationClient: Send + Sync {
    fn stream(&self, request: GenerationRequest) -> GenerationStream;
}

/// Single-event stream carrying a failure.
pub fn failed(error: GenerationError) -> GenerationStream {
    Box::pin(stream::iter([GenerationEvent::Failed(error)]))
}

/// Guarantee exactly one terminal event: anything after the first terminal
/// event is dropped, and a stream that ends early yields a transport failure.
pub fn terminated<S>(inner: S) -> GenerationStream
where
    S: Stream<Item = GenerationEvent> + Send + 'static,
{
    Box::pin(stream::unfold(Some(Box::pin(inner)), |state| async move {
        let mut inner = state?;
        match inner.next().await {
            Some(event) => {
                let next = if event.is_terminal() { None } else { Some(inner) };
                Some((event, next))
            }
            None => Some((
                GenerationEvent::Failed(GenerationError::Transport(
                    "stream ended before completion".into(),
                )),
                None,
            )),
        }
    }))
}

/// Drain a stream to its final script.
pub async fn collect(mut events: GenerationStream) -> Result<String, GenerationError> {
    while let Some(event) = events.next().await {
        match event {
            GenerationEvent::Delta(_) => {}
            GenerationEvent::Done(code) => return Ok(code),
            GenerationEvent::Failed(error) => return Err(error),
        }
    }
    Err(GenerationError::Transport("stream ended before completion".into()))
}

/// Remove a surrounding markdown code fence and trim whitespace.
pub fn strip_fences(text: &str) -> String {
    let mut code = text.trim();
    if let Some(rest) = code.strip_prefix("```") {
        let tag_len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        let rest = &rest[tag_len..];
        code = rest
            .strip_prefix("\r\n")
            .or_else(|| rest.strip_prefix('\n'))
            .unwrap_or(rest);
    }
    if let Some(rest) = code.strip_suffix("```") {
        code = rest;
    }
    code.trim().to_string()
}
