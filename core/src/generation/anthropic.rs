//! Direct client for the Anthropic Messages API.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use super::decode::{response_stream, SseDecoder};
use super::{failed, GenerationClient, GenerationError, GenerationRequest, GenerationStream};
use crate::prompt::{PromptBuilder, PromptOptions};

pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const API_VERSION: &str = "2023-06-01";

/// Placeholder value shipped in sample configuration files.
const PLACEHOLDER_KEY: &str = "your-key-here";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: Option<String>,
    api_url: String,
    model: String,
    max_tokens: u32,
    prompts: PromptBuilder,
}

impl AnthropicClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            prompts: PromptBuilder::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_prompt_options(mut self, options: PromptOptions) -> Self {
        self.prompts = PromptBuilder::with_options(options);
        self
    }

    /// Overall request timeout, covering the whole streamed body.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        match reqwest::Client::builder().timeout(timeout).build() {
            Ok(http) => self.http = http,
            Err(e) => warn!(error = %e, "failed to build HTTP client with timeout; keeping default"),
        }
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn has_credential(&self) -> bool {
        self.credential().is_ok()
    }

    fn credential(&self) -> Result<&str, GenerationError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() && key != PLACEHOLDER_KEY => Ok(key),
            _ => Err(GenerationError::MissingCredential),
        }
    }

    /// Messages API request body for a generation request.
    pub fn request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let prompt = self
            .prompts
            .build(&request.history, request.current_script.as_deref());
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "stream": true,
            "system": prompt.system,
            "messages": prompt.messages,
        })
    }
}

impl GenerationClient for AnthropicClient {
    fn stream(&self, request: GenerationRequest) -> GenerationStream {
        let key = match self.credential() {
            Ok(key) => key.to_string(),
            Err(e) => return failed(e),
        };
        let body = self.request_body(&request);
        debug!(model = %self.model, turns = request.history.len(), "sending generation request");

        let send = self
            .http
            .post(&self.api_url)
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send();
        response_stream::<_, SseDecoder>(send)
    }
}
