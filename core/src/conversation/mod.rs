//! Conversation records and history events.
//!
//! A turn produces a list of [`HistoryEvent`]s; [`Conversation::apply`] folds them
//! into the persisted record.

pub mod image;
pub mod inflight;
pub mod store;

#[cfg(test)]
mod tests_conversation;

pub use image::{ImageAttachment, ImageError, ImageLimits};
pub use inflight::{InFlight, InFlightGuard};
pub use store::{ConversationStore, InMemoryStore, StoreError, StoreResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_TITLE: &str = "Untitled Design";

/// Recorded in place of a reply when a turn fails.
pub const FAILURE_PLACEHOLDER: &str = "Unable to generate valid code for this request.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageAttachment>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            image: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            image: None,
        }
    }

    pub fn placeholder() -> Self {
        Self::assistant(FAILURE_PLACEHOLDER)
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.image = Some(image);
        self
    }

    /// Copy without the image, as stored in history.
    pub fn without_image(&self) -> Self {
        Self {
            role: self.role,
            content: self.content.clone(),
            image: None,
        }
    }
}

/// A change to a conversation produced by a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    TurnAppended { turn: ConversationTurn },
    TurnReplaced { index: usize, turn: ConversationTurn },
    ScriptAccepted { script: String },
    /// Sets the edit base back to an earlier script, or to none.
    ScriptRestored { script: Option<String> },
    PromptRecorded { prompt: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub turns: Vec<ConversationTurn>,
    /// Last accepted script; the edit context for the next turn.
    #[serde(default)]
    pub current_script: Option<String>,
    #[serde(default)]
    pub last_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            turns: Vec::new(),
            current_script: None,
            last_prompt: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn untitled() -> Self {
        Self::new(DEFAULT_TITLE)
    }

    pub fn apply(&mut self, events: &[HistoryEvent]) {
        for event in events {
            match event {
                HistoryEvent::TurnAppended { turn } => self.turns.push(turn.clone()),
                HistoryEvent::TurnReplaced { index, turn } => match self.turns.get_mut(*index) {
                    Some(slot) => *slot = turn.clone(),
                    None => self.turns.push(turn.clone()),
                },
                HistoryEvent::ScriptAccepted { script } => self.current_script = Some(script.clone()),
                HistoryEvent::ScriptRestored { script } => self.current_script = script.clone(),
                HistoryEvent::PromptRecorded { prompt } => self.last_prompt = Some(prompt.clone()),
            }
        }
        if !events.is_empty() {
            self.updated_at = Utc::now();
        }
    }

    /// True when turns alternate user then assistant and none is left unanswered.
    pub fn accepts_user_turn(&self) -> bool {
        self.turns.len() % 2 == 0
            && self
                .turns
                .chunks(2)
                .all(|pair| pair[0].role == Role::User && pair[1].role == Role::Assistant)
    }

    pub fn last_turn(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id,
            title: self.title.clone(),
            last_prompt: self.last_prompt.clone(),
            message_count: self.turns.len(),
            last_message: self
                .turns
                .last()
                .map(|t| t.content.chars().take(100).collect()),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// List entry for the conversation index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: Uuid,
    pub title: String,
    pub last_prompt: Option<String>,
    pub message_count: usize,
    pub last_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPatch {
    pub title: Option<String>,
    pub turns: Option<Vec<ConversationTurn>>,
    pub current_script: Option<String>,
    pub last_prompt: Option<String>,
}

impl ConversationPatch {
    pub fn apply_to(self, conversation: &mut Conversation) {
        if let Some(title) = self.title {
            conversation.title = title;
        }
        if let Some(turns) = self.turns {
            conversation.turns = turns;
        }
        if let Some(script) = self.current_script {
            conversation.current_script = Some(script);
        }
        if let Some(prompt) = self.last_prompt {
            conversation.last_prompt = Some(prompt);
        }
        conversation.updated_at = Utc::now();
    }
}
