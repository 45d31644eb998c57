//! Conversational parametric CAD: model-written scripts are executed in a
//! sandbox, validated, retried on failure and turned into render meshes.

pub mod config;
pub mod conversation;
pub mod export;
pub mod generation;
pub mod geometry;
pub mod kernel;
pub mod orchestrator;
pub mod prompt;
pub mod sandbox;
pub mod script;
pub mod units;

pub use config::{CadConfig, ConfigError};
pub use conversation::{Conversation, ConversationStore, ConversationTurn, InMemoryStore, Role};
pub use export::{export, ExportError, ExportFormat};
pub use generation::{GenerationClient, GenerationError, GenerationEvent, GenerationRequest};
pub use geometry::{mesh_parts, MeshOptions, PartMesh};
pub use kernel::{GeometryKernel, PolygonKernel};
pub use orchestrator::{RetryOrchestrator, TurnOutcome, TurnProgress, TurnReport, TurnService};
pub use sandbox::{ExecutionOutcome, ModelShape, Part, SandboxExecutor};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
