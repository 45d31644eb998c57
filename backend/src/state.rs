use std::sync::Arc;

use cadloop_core::config::CadConfig;
use cadloop_core::conversation::{ConversationStore, InMemoryStore};
use cadloop_core::generation::GenerationClient;
use cadloop_core::geometry::{mesh_parts, MeshOptions, PartMesh};
use cadloop_core::kernel::{GeometryKernel, PolygonKernel};
use cadloop_core::orchestrator::TurnService;
use cadloop_core::sandbox::{ExecutionOutcome, ModelShape, SandboxExecutor};
use serde::Serialize;

// Application State
pub struct AppState {
    pub config: CadConfig,
    pub client: Arc<dyn GenerationClient>,
    pub executor: Arc<SandboxExecutor>,
    pub turns: TurnService,
}

impl AppState {
    pub fn from_config(config: CadConfig) -> Self {
        let client = config.build_client();
        Self::with_client(config, client)
    }

    pub fn with_client(config: CadConfig, client: Arc<dyn GenerationClient>) -> Self {
        let kernel: Arc<dyn GeometryKernel> = Arc::new(PolygonKernel::new());
        let executor = Arc::new(config.build_executor(kernel));
        let orchestrator = Arc::new(config.build_orchestrator(client.clone(), executor.clone()));
        let store: Arc<dyn ConversationStore> = Arc::new(InMemoryStore::new());
        Self {
            config,
            client,
            executor,
            turns: TurnService::new(orchestrator, store),
        }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        self.turns.store()
    }

    pub fn mesh_options(&self) -> &MeshOptions {
        &self.config.mesh
    }

    /// Run a script on the blocking pool through the shared cache.
    pub async fn execute(&self, script: String) -> ExecutionOutcome {
        let executor = self.executor.clone();
        match tokio::task::spawn_blocking(move || executor.execute(&script)).await {
            Ok(outcome) => outcome,
            Err(e) => ExecutionOutcome::Rejected(format!("Error: script execution aborted: {e}")),
        }
    }

    pub fn render(&self, shape: &ModelShape) -> RenderPayload {
        RenderPayload::new(mesh_parts(shape, self.mesh_options()))
    }
}

/// Meshes plus totals, as sent to the viewport.
#[derive(Debug, Clone, Serialize)]
pub struct RenderPayload {
    pub parts: Vec<PartMesh>,
    pub stats: RenderStats,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderStats {
    pub part_count: usize,
    pub triangle_count: usize,
    pub discarded_triangles: usize,
}

impl RenderPayload {
    pub fn new(parts: Vec<PartMesh>) -> Self {
        let stats = RenderStats {
            part_count: parts.len(),
            triangle_count: parts.iter().map(|p| p.mesh.triangle_count).sum(),
            discarded_triangles: parts.iter().map(|p| p.mesh.discarded_triangles).sum(),
        };
        Self { parts, stats }
    }
}
