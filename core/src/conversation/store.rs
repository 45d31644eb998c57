//! Persistence boundary for conversations.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::{Conversation, ConversationSummary};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("conversation {0} not found")]
    NotFound(Uuid),

    #[error("conversation {0} already exists")]
    AlreadyExists(Uuid),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// CRUD over conversation records.
pub trait ConversationStore: Send + Sync {
    fn create(&self, conversation: Conversation) -> StoreResult<Conversation>;

    fn get(&self, id: Uuid) -> StoreResult<Conversation>;

    /// Summaries, most recently updated first.
    fn list(&self) -> StoreResult<Vec<ConversationSummary>>;

    fn update(&self, conversation: Conversation) -> StoreResult<Conversation>;

    fn delete(&self, id: Uuid) -> StoreResult<()>;

    /// Bulk insert. Returns how many records were stored.
    fn import(&self, conversations: Vec<Conversation>) -> StoreResult<usize> {
        let mut count = 0;
        for conversation in conversations {
            self.create(conversation)?;
            count += 1;
        }
        Ok(count)
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<Uuid, Conversation>>,
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("conversation store lock poisoned".into())
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for InMemoryStore {
    fn create(&self, conversation: Conversation) -> StoreResult<Conversation> {
        let mut records = self.records.write().map_err(poisoned)?;
        if records.contains_key(&conversation.id) {
            return Err(StoreError::AlreadyExists(conversation.id));
        }
        info!(id = %conversation.id, "conversation created");
        records.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    fn get(&self, id: Uuid) -> StoreResult<Conversation> {
        let records = self.records.read().map_err(poisoned)?;
        records.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    fn list(&self) -> StoreResult<Vec<ConversationSummary>> {
        let records = self.records.read().map_err(poisoned)?;
        let mut summaries: Vec<_> = records.values().map(Conversation::summary).collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    fn update(&self, conversation: Conversation) -> StoreResult<Conversation> {
        let mut records = self.records.write().map_err(poisoned)?;
        match records.get_mut(&conversation.id) {
            Some(slot) => {
                *slot = conversation.clone();
                Ok(conversation)
            }
            None => Err(StoreError::NotFound(conversation.id)),
        }
    }

    fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        match records.remove(&id) {
            Some(_) => {
                info!(%id, "conversation deleted");
                Ok(())
            }
            None => Err(StoreError::NotFound(id)),
        }
    }
}
