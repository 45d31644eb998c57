//! Prompt composition for the language model.
//!
//! [`PromptBuilder::build`] turns conversation history into a [`ComposedPrompt`]:
//! a system prompt and provider-shaped messages. Also home to the corrective
//! prompt used by retries, the unidentifiable-photo sentinel and request expansion.

pub mod expander;
pub mod system;


pub use expander::{expand_prompt, ExpandedPrompt};
pub use system::{function_signature, system_prompt, UNIDENTIFIABLE_SENTINEL};

use serde::{Deserialize, Serialize};

use crate::conversation::{ConversationTurn, ImageAttachment, Role};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn image(image: &ImageAttachment) -> Self {
        ContentBlock::Image {
            source: ImageSource {
                kind: "base64".into(),
                media_type: image.media_type.clone(),
                data: image.payload().to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComposedPrompt {
    pub system: String,
    pub messages: Vec<ChatMessage>,
}

impl ComposedPrompt {
    pub fn has_image(&self) -> bool {
        self.messages
            .iter()
            .flat_map(|m| &m.content)
            .any(|block| matches!(block, ContentBlock::Image { .. }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptOptions {
    /// Include the worked examples in the system prompt.
    pub examples: bool,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self { examples: true }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    options: PromptOptions,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: PromptOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> PromptOptions {
        self.options
    }

    /// Compose the prompt for one model call.
    ///
    /// Only the final user turn may carry an image; images on earlier turns
    /// were already sent once and are dropped.
    pub fn build(&self, history: &[ConversationTurn], current_script: Option<&str>) -> ComposedPrompt {
        let last_user = history.iter().rposition(|t| t.role == Role::User);
        let image = last_user.and_then(|i| history[i].image.as_ref());

        let messages = history
            .iter()
            .enumerate()
            .map(|(i, turn)| {
                let mut content = Vec::with_capacity(2);
                if Some(i) == last_user {
                    if let Some(image) = &turn.image {
                        content.push(ContentBlock::image(image));
                    }
                }
                content.push(ContentBlock::text(turn.content.clone()));
                ChatMessage {
                    role: turn.role,
                    content,
                }
            })
            .collect();

        ComposedPrompt {
            system: system_prompt(self.options.examples, current_script, image.is_some()),
            messages,
        }
    }
}

/// Follow-up request sent after a rejected attempt.
pub fn corrective_prompt(original_request: &str, script: &str, error: &str) -> String {
    format!(
        "The code you wrote for \"{original_request}\" failed:\n\n\
         {error}\n\n\
         Failed code:\n```\n{script}\n```\n\n\
         Fix the problem and return the complete corrected code. \
         It must `return` one solid or an array of {{ solid, color?, name? }} parts, \
         and use only the available primitives."
    )
}

/// Reason given by the model when a photo shows nothing it can model.
pub fn detect_unidentifiable(reply: &str) -> Option<String> {
    let first = reply.trim_start().lines().next()?.trim();
    let reason = first.strip_prefix(UNIDENTIFIABLE_SENTINEL)?.trim();
    Some(if reason.is_empty() {
        "the photo does not show an object that can be modeled".to_string()
    } else {
        reason.to_string()
    })
}
