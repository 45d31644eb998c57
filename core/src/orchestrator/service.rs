//! Turns against stored conversations, one at a time per conversation.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::{RetryOrchestrator, TurnError, TurnObserver, TurnReport, TurnResult};
use crate::conversation::{
    Conversation, ConversationStore, ConversationTurn, HistoryEvent, InFlight, Role, DEFAULT_TITLE,
    FAILURE_PLACEHOLDER,
};

const TITLE_CHARS: usize = 50;

#[derive(Debug, Clone)]
pub struct TurnSubmission {
    pub conversation: Conversation,
    pub report: TurnReport,
}

pub struct TurnService {
    orchestrator: Arc<RetryOrchestrator>,
    store: Arc<dyn ConversationStore>,
    in_flight: InFlight,
}

impl TurnService {
    pub fn new(orchestrator: Arc<RetryOrchestrator>, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            orchestrator,
            store,
            in_flight: InFlight::new(),
        }
    }

    pub fn orchestrator(&self) -> &Arc<RetryOrchestrator> {
        &self.orchestrator
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn is_busy(&self, conversation_id: Uuid) -> bool {
        self.in_flight.is_busy(conversation_id)
    }

    /// Append a user turn, run it and save the result.
    ///
    /// The image travels with the request only; history stores the text.
    pub async fn submit(
        &self,
        conversation_id: Uuid,
        turn: ConversationTurn,
        observer: Option<&dyn TurnObserver>,
    ) -> TurnResult<TurnSubmission> {
        let _guard = self
            .in_flight
            .try_acquire(conversation_id)
            .ok_or(TurnError::Busy(conversation_id))?;
        if turn.role != Role::User {
            return Err(TurnError::InvalidHistory);
        }

        let mut conversation = self.store.get(conversation_id)?;
        if !conversation.accepts_user_turn() {
            return Err(TurnError::InvalidHistory);
        }
        let mut history = conversation.turns.clone();
        history.push(turn.clone());

        let report = self
            .orchestrator
            .run_turn(&history, conversation.current_script.as_deref(), observer)
            .await?;

        if conversation.title == DEFAULT_TITLE && conversation.turns.is_empty() {
            conversation.title = turn.content.chars().take(TITLE_CHARS).collect::<String>().trim().to_string();
        }
        let mut events = vec![
            HistoryEvent::TurnAppended {
                turn: turn.without_image(),
            },
            HistoryEvent::PromptRecorded {
                prompt: turn.content.clone(),
            },
        ];
        events.extend(report.events.iter().cloned());
        conversation.apply(&events);
        let conversation = self.store.update(conversation)?;

        info!(
            id = %conversation_id,
            outcome = report.outcome.kind(),
            attempts = report.outcome.attempts(),
            "turn finished"
        );
        Ok(TurnSubmission { conversation, report })
    }

    /// Re-run the last user turn and replace the reply that followed it.
    pub async fn regenerate(
        &self,
        conversation_id: Uuid,
        observer: Option<&dyn TurnObserver>,
    ) -> TurnResult<TurnSubmission> {
        let _guard = self
            .in_flight
            .try_acquire(conversation_id)
            .ok_or(TurnError::Busy(conversation_id))?;

        let mut conversation = self.store.get(conversation_id)?;
        let reply_index = match conversation.turns.as_slice() {
            [.., prev, last] if prev.role == Role::User && last.role == Role::Assistant => {
                conversation.turns.len() - 1
            }
            _ => return Err(TurnError::InvalidHistory),
        };

        // The script being replaced is not the edit base; the one before it is.
        let base_script = conversation
            .turns
            .get(..reply_index)
            .and_then(|earlier| {
                earlier
                    .iter()
                    .rev()
                    .filter(|t| t.role == Role::Assistant)
                    .find(|t| t.content != FAILURE_PLACEHOLDER)
            })
            .map(|t| t.content.clone());

        let report = self
            .orchestrator
            .run_turn(&conversation.turns[..reply_index], base_script.as_deref(), observer)
            .await?;

        let mut events: Vec<HistoryEvent> = report
            .events
            .iter()
            .cloned()
            .map(|event| match event {
                HistoryEvent::TurnAppended { turn } => HistoryEvent::TurnReplaced {
                    index: reply_index,
                    turn,
                },
                other => other,
            })
            .collect();
        if !report.outcome.is_accepted() {
            // The replaced reply may have been the current script.
            events.push(HistoryEvent::ScriptRestored { script: base_script });
        }
        conversation.apply(&events);
        let conversation = self.store.update(conversation)?;

        info!(id = %conversation_id, outcome = report.outcome.kind(), "turn regenerated");
        Ok(TurnSubmission { conversation, report })
    }
}
