//! Client for a running backend's `/api/generate` route.

use serde::{Deserialize, Serialize};

use super::decode::{response_stream, NdjsonDecoder};
use super::{GenerationClient, GenerationRequest, GenerationStream};
use crate::conversation::{ConversationTurn, ImageAttachment, Role};

/// Request body of `/api/generate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    pub conversation_history: Vec<ConversationTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_attachment: Option<ImageAttachment>,
    #[serde(default)]
    pub stream: bool,
}

impl GenerateBody {
    /// Split the final user turn's image out into `imageAttachment`.
    pub fn from_request(request: &GenerationRequest, stream: bool) -> Self {
        let image = request
            .history
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .and_then(|t| t.image.clone());
        Self {
            conversation_history: request.history.iter().map(ConversationTurn::without_image).collect(),
            current_script: request.current_script.clone(),
            image_attachment: image,
            stream,
        }
    }

    /// Reattach `imageAttachment` to the final user turn.
    pub fn into_request(self) -> GenerationRequest {
        let mut history = self.conversation_history;
        if let Some(image) = self.image_attachment {
            if let Some(turn) = history.iter_mut().rev().find(|t| t.role == Role::User) {
                turn.image = Some(image);
            }
        }
        GenerationRequest {
            history,
            current_script: self.current_script,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EndpointClient {
    http: reqwest::Client,
    url: String,
}

impl EndpointClient {
    /// `url` is the full route, e.g. `http://127.0.0.1:3000/api/generate`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl GenerationClient for EndpointClient {
    fn stream(&self, request: GenerationRequest) -> GenerationStream {
        let body = GenerateBody::from_request(&request, true);
        let send = self.http.post(&self.url).json(&body).send();
        response_stream::<_, NdjsonDecoder>(send)
    }
}
