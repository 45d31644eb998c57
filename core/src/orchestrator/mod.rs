//! Bounded generate → execute → repair loop for one user turn.
//!
//! Each attempt streams a script from the [`GenerationClient`], runs it through
//! the [`SandboxExecutor`] and either accepts it or feeds the failure back as a
//! corrective prompt. The loop produces a [`TurnOutcome`] plus the
//! [`HistoryEvent`]s to apply to the conversation record.

pub mod service;


pub use service::{TurnService, TurnSubmission};

use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::conversation::{ConversationTurn, HistoryEvent, ImageError, ImageLimits, Role, StoreError};
use crate::generation::{GenerationClient, GenerationError, GenerationEvent, GenerationRequest};
use crate::prompt::{corrective_prompt, detect_unidentifiable, expand_prompt};
use crate::sandbox::{ExecutionOutcome, ModelShape, SandboxExecutor};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("conversation history must alternate user and assistant turns")]
    InvalidHistory,

    #[error("invalid image attachment: {0}")]
    InvalidImage(#[from] ImageError),

    #[error("a turn is already in progress for conversation {0}")]
    Busy(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type TurnResult<T> = Result<T, TurnError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Thinking,
    Generating,
    Validating,
    Retrying,
}

impl TurnPhase {
    pub fn label(self) -> &'static str {
        match self {
            TurnPhase::Thinking => "Thinking...",
            TurnPhase::Generating => "Writing code...",
            TurnPhase::Validating => "Validating...",
            TurnPhase::Retrying => "Fixing issues...",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnProgress {
    Phase {
        phase: TurnPhase,
        attempt: u32,
        max_attempts: u32,
    },
    Delta {
        attempt: u32,
        text: String,
    },
    Rejected {
        attempt: u32,
        error: String,
    },
}

pub trait TurnObserver: Send + Sync {
    fn on_progress(&self, progress: &TurnProgress);
}

impl<F> TurnObserver for F
where
    F: Fn(&TurnProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &TurnProgress) {
        self(progress)
    }
}

#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Accepted {
        script: String,
        shape: ModelShape,
        attempts: u32,
    },
    Exhausted {
        attempts: u32,
        last_error: String,
        message: String,
    },
    TransportFailed {
        error: GenerationError,
        attempts: u32,
    },
    ConfigurationFault {
        error: GenerationError,
    },
    Unidentifiable {
        reason: String,
        attempts: u32,
    },
}

impl TurnOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, TurnOutcome::Accepted { .. })
    }

    /// Generation calls made; a configuration fault consumes none.
    pub fn attempts(&self) -> u32 {
        match self {
            TurnOutcome::Accepted { attempts, .. }
            | TurnOutcome::Exhausted { attempts, .. }
            | TurnOutcome::TransportFailed { attempts, .. }
            | TurnOutcome::Unidentifiable { attempts, .. } => *attempts,
            TurnOutcome::ConfigurationFault { .. } => 0,
        }
    }

    /// Short text for the user when the turn did not produce a model.
    pub fn user_message(&self) -> Option<String> {
        match self {
            TurnOutcome::Accepted { .. } => None,
            TurnOutcome::Exhausted { message, .. } => Some(message.clone()),
            TurnOutcome::TransportFailed { error, .. } => {
                Some(format!("The model service could not be reached: {error}"))
            }
            TurnOutcome::ConfigurationFault { error } => Some(error.to_string()),
            TurnOutcome::Unidentifiable { reason, .. } => Some(format!(
                "I couldn't identify an object to model in this photo ({reason}). \
                 Try describing it in words instead."
            )),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TurnOutcome::Accepted { .. } => "accepted",
            TurnOutcome::Exhausted { .. } => "exhausted",
            TurnOutcome::TransportFailed { .. } => "transport_failed",
            TurnOutcome::ConfigurationFault { .. } => "configuration_fault",
            TurnOutcome::Unidentifiable { .. } => "unidentifiable",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    pub events: Vec<HistoryEvent>,
}

fn exhausted_message(attempts: u32, had_image: bool) -> String {
    if had_image {
        format!(
            "I couldn't build a valid model from this photo after {attempts} attempts. \
             Try describing the object in words, including its main dimensions."
        )
    } else {
        format!(
            "I couldn't generate a valid model after {attempts} attempts. \
             Try rephrasing the request or simplifying the design."
        )
    }
}

/// Failure fed back into the next attempt.
#[derive(Debug, Clone)]
struct FailedAttempt {
    script: String,
    error: String,
}

pub struct RetryOrchestrator {
    client: Arc<dyn GenerationClient>,
    executor: Arc<SandboxExecutor>,
    max_attempts: u32,
    image_limits: ImageLimits,
    expand_prompts: bool,
}

impl RetryOrchestrator {
    pub fn new(client: Arc<dyn GenerationClient>, executor: Arc<SandboxExecutor>) -> Self {
        Self {
            client,
            executor,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            image_limits: ImageLimits::default(),
            expand_prompts: true,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_image_limits(mut self, limits: ImageLimits) -> Self {
        self.image_limits = limits;
        self
    }

    pub fn with_prompt_expansion(mut self, enabled: bool) -> Self {
        self.expand_prompts = enabled;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn executor(&self) -> &Arc<SandboxExecutor> {
        &self.executor
    }

    fn notify(observer: Option<&dyn TurnObserver>, progress: TurnProgress) {
        if let Some(observer) = observer {
            observer.on_progress(&progress);
        }
    }

    fn phase(&self, observer: Option<&dyn TurnObserver>, phase: TurnPhase, attempt: u32) {
        Self::notify(
            observer,
            TurnProgress::Phase {
                phase,
                attempt,
                max_attempts: self.max_attempts,
            },
        );
    }

    /// Run one turn. `history` must end with the user's new turn.
    pub async fn run_turn(
        &self,
        history: &[ConversationTurn],
        current_script: Option<&str>,
        observer: Option<&dyn TurnObserver>,
    ) -> TurnResult<TurnReport> {
        let last = history
            .last()
            .filter(|turn| turn.role == Role::User)
            .ok_or(TurnError::InvalidHistory)?;
        if let Some(image) = &last.image {
            image.validate(&self.image_limits)?;
        }
        let had_image = last.image.is_some();
        let original_request = last.content.clone();

        let mut base = history.to_vec();
        if self.expand_prompts {
            let expanded = expand_prompt(&original_request);
            if expanded.was_expanded {
                debug!(extracted_mm = ?expanded.extracted_mm, "expanded request");
                if let Some(turn) = base.last_mut() {
                    turn.content = expanded.text;
                }
            }
        }

        let mut failure: Option<FailedAttempt> = None;
        for attempt in 1..=self.max_attempts {
            self.phase(observer, TurnPhase::Thinking, attempt);

            let mut turns = base.clone();
            if let Some(failed) = &failure {
                for turn in &mut turns {
                    turn.image = None;
                }
                let reply = if failed.script.is_empty() {
                    "// (no code returned)".to_string()
                } else {
                    failed.script.clone()
                };
                turns.push(ConversationTurn::assistant(reply));
                turns.push(ConversationTurn::user(corrective_prompt(
                    &original_request,
                    &failed.script,
                    &failed.error,
                )));
            }
            let request = GenerationRequest {
                history: turns,
                current_script: current_script.map(str::to_string),
            };

            self.phase(observer, TurnPhase::Generating, attempt);
            let generated = self.generate(request, attempt, observer).await;

            let script = match generated {
                Ok(script) => script,
                Err(error) if error.is_configuration() => {
                    warn!(%error, "generation is not configured");
                    return Ok(Self::failed_turn(TurnOutcome::ConfigurationFault { error }));
                }
                Err(GenerationError::EmptyResponse) => {
                    let error = GenerationError::EmptyResponse.to_string();
                    self.reject(observer, attempt, &error);
                    failure = Some(FailedAttempt {
                        script: String::new(),
                        error,
                    });
                    continue;
                }
                Err(error) => {
                    warn!(%error, attempt, "generation failed");
                    return Ok(Self::failed_turn(TurnOutcome::TransportFailed {
                        error,
                        attempts: attempt,
                    }));
                }
            };

            if had_image {
                if let Some(reason) = detect_unidentifiable(&script) {
                    info!(%reason, "photo could not be identified");
                    return Ok(Self::failed_turn(TurnOutcome::Unidentifiable {
                        reason,
                        attempts: attempt,
                    }));
                }
            }

            self.phase(observer, TurnPhase::Validating, attempt);
            match self.execute(script.clone()).await {
                ExecutionOutcome::Accepted(shape) => {
                    info!(attempt, parts = shape.part_count(), "script accepted");
                    return Ok(TurnReport {
                        events: vec![
                            HistoryEvent::TurnAppended {
                                turn: ConversationTurn::assistant(script.clone()),
                            },
                            HistoryEvent::ScriptAccepted {
                                script: script.clone(),
                            },
                        ],
                        outcome: TurnOutcome::Accepted {
                            script,
                            shape,
                            attempts: attempt,
                        },
                    });
                }
                ExecutionOutcome::Rejected(error) => {
                    self.reject(observer, attempt, &error);
                    failure = Some(FailedAttempt { script, error });
                }
            }
        }

        let last_error = failure.map(|f| f.error).unwrap_or_default();
        warn!(attempts = self.max_attempts, %last_error, "attempts exhausted");
        Ok(Self::failed_turn(TurnOutcome::Exhausted {
            attempts: self.max_attempts,
            message: exhausted_message(self.max_attempts, had_image),
            last_error,
        }))
    }

    fn reject(&self, observer: Option<&dyn TurnObserver>, attempt: u32, error: &str) {
        debug!(attempt, error, "attempt rejected");
        Self::notify(
            observer,
            TurnProgress::Rejected {
                attempt,
                error: error.to_string(),
            },
        );
        if attempt < self.max_attempts {
            self.phase(observer, TurnPhase::Retrying, attempt);
        }
    }

    async fn generate(
        &self,
        request: GenerationRequest,
        attempt: u32,
        observer: Option<&dyn TurnObserver>,
    ) -> Result<String, GenerationError> {
        let mut events = self.client.stream(request);
        while let Some(event) = events.next().await {
            match event {
                GenerationEvent::Delta(text) => {
                    Self::notify(observer, TurnProgress::Delta { attempt, text });
                }
                GenerationEvent::Done(script) => return Ok(script),
                GenerationEvent::Failed(error) => return Err(error),
            }
        }
        Err(GenerationError::Transport("stream ended before completion".into()))
    }

    /// Scripts run on the blocking pool; the interpreter is synchronous.
    async fn execute(&self, script: String) -> ExecutionOutcome {
        let executor = Arc::clone(&self.executor);
        match tokio::task::spawn_blocking(move || executor.execute(&script)).await {
            Ok(outcome) => outcome,
            Err(e) => ExecutionOutcome::Rejected(format!("Error: script execution aborted: {e}")),
        }
    }

    fn failed_turn(outcome: TurnOutcome) -> TurnReport {
        TurnReport {
            outcome,
            events: vec![HistoryEvent::TurnAppended {
                turn: ConversationTurn::placeholder(),
            }],
        }
    }
}
