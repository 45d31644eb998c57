//! Service configuration.
//!
//! Every field has a default, so an empty or partial TOML file is valid.
//! Environment variables override the file:
//!
//! - `CADLOOP_CONFIG`: path of the TOML file (default `cadloop.toml`)
//! - `ANTHROPIC_API_KEY`: provider credential
//! - `CADLOOP_MODEL`: provider model id
//! - `CADLOOP_ADDR`: backend listen address

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::conversation::ImageLimits;
use crate::generation::anthropic::{DEFAULT_API_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use crate::generation::{AnthropicClient, EndpointClient, GenerationClient};
use crate::geometry::MeshOptions;
use crate::kernel::GeometryKernel;
use crate::orchestrator::{RetryOrchestrator, DEFAULT_MAX_ATTEMPTS};
use crate::prompt::PromptOptions;
use crate::sandbox::{SandboxExecutor, DEFAULT_CACHE_CAPACITY};
use crate::script::ScriptLimits;

pub const CONFIG_PATH_VAR: &str = "CADLOOP_CONFIG";
pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";
pub const MODEL_VAR: &str = "CADLOOP_MODEL";
pub const ADDR_VAR: &str = "CADLOOP_ADDR";
pub const DEFAULT_CONFIG_PATH: &str = "cadloop.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadConfig {
    pub server: ServerConfig,
    pub generation: GenerationConfig,
    pub orchestrator: OrchestratorConfig,
    pub sandbox: SandboxConfig,
    pub mesh: MeshOptions,
    pub images: ImageLimits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    /// Frontend build served for paths outside `/api` and `/ws`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
}

fn default_addr() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            static_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Usually left unset in the file and supplied through `ANTHROPIC_API_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Route generation through another backend's `/api/generate` instead of the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub prompts: PromptOptions,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            api_url: default_api_url(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            endpoint: None,
            prompts: PromptOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Annotate imperial units and known part types in user requests.
    #[serde(default = "default_true")]
    pub expand_prompts: bool,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_true() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            expand_prompts: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default)]
    pub limits: ScriptLimits,
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            limits: ScriptLimits::default(),
        }
    }
}

impl CadConfig {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load from TOML file or return default
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "falling back to default config");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// File named by `CADLOOP_CONFIG` (or `cadloop.toml`), then environment overrides.
    pub fn from_env() -> Self {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load_or_default(Path::new(&path));
        config.apply_overrides(|name| std::env::var(name).ok());
        info!(
            config = %path,
            addr = %config.server.addr,
            model = %config.generation.model,
            credential = config.generation.api_key.is_some(),
            "configuration loaded"
        );
        config
    }

    /// Apply variable overrides from `lookup`; blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        if let Some(key) = get(API_KEY_VAR) {
            self.generation.api_key = Some(key);
        }
        if let Some(model) = get(MODEL_VAR) {
            self.generation.model = model;
        }
        if let Some(addr) = get(ADDR_VAR) {
            self.server.addr = addr;
        }
    }

    pub fn build_client(&self) -> Arc<dyn GenerationClient> {
        let generation = &self.generation;
        if let Some(url) = &generation.endpoint {
            return Arc::new(EndpointClient::new(url.clone()));
        }
        Arc::new(
            AnthropicClient::new(generation.api_key.clone())
                .with_model(generation.model.clone())
                .with_api_url(generation.api_url.clone())
                .with_max_tokens(generation.max_tokens)
                .with_prompt_options(generation.prompts)
                .with_timeout(Duration::from_secs(generation.timeout_secs)),
        )
    }

    pub fn build_executor(&self, kernel: Arc<dyn GeometryKernel>) -> SandboxExecutor {
        SandboxExecutor::new(kernel)
            .with_limits(self.sandbox.limits)
            .with_cache_capacity(self.sandbox.cache_capacity)
    }

    pub fn build_orchestrator(
        &self,
        client: Arc<dyn GenerationClient>,
        executor: Arc<SandboxExecutor>,
    ) -> RetryOrchestrator {
        RetryOrchestrator::new(client, executor)
            .with_max_attempts(self.orchestrator.max_attempts)
            .with_image_limits(self.images.clone())
            .with_prompt_expansion(self.orchestrator.expand_prompts)
    }
}
