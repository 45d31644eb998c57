//! Sandbox executor
//!
//! Runs untrusted model scripts in the embedded interpreter, validates what they
//! return and memoizes the outcome by script text.

pub mod cache;
pub mod shape;


pub use cache::{CacheStats, CompilationCache, DEFAULT_CACHE_CAPACITY};
pub use shape::{validate_shape, ModelShape, Part, SHAPE_MESSAGE};

use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use crate::generation::strip_fences;
use crate::kernel::GeometryKernel;
use crate::script::{Interpreter, ScriptLimits};

/// Stack for the script thread; parser and evaluator nesting limits fit well inside it.
pub const SCRIPT_STACK_SIZE: usize = 32 * 1024 * 1024;

/// Result of running one script.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Accepted(ModelShape),
    Rejected(String),
}

impl ExecutionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ExecutionOutcome::Accepted(_))
    }

    pub fn shape(&self) -> Option<&ModelShape> {
        match self {
            ExecutionOutcome::Accepted(shape) => Some(shape),
            ExecutionOutcome::Rejected(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ExecutionOutcome::Accepted(_) => None,
            ExecutionOutcome::Rejected(message) => Some(message),
        }
    }
}

/// Compiles, runs and validates scripts against a geometry kernel.
///
/// Execution is synchronous; async callers should run it on a blocking thread.
pub struct SandboxExecutor {
    kernel: Arc<dyn GeometryKernel>,
    limits: ScriptLimits,
    cache: Arc<CompilationCache>,
}

impl SandboxExecutor {
    pub fn new(kernel: Arc<dyn GeometryKernel>) -> Self {
        Self {
            kernel,
            limits: ScriptLimits::default(),
            cache: Arc::new(CompilationCache::default()),
        }
    }

    pub fn with_limits(mut self, limits: ScriptLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Share a cache between executors.
    pub fn with_cache(mut self, cache: Arc<CompilationCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_cache_capacity(self, capacity: usize) -> Self {
        self.with_cache(Arc::new(CompilationCache::new(capacity)))
    }

    pub fn kernel(&self) -> &Arc<dyn GeometryKernel> {
        &self.kernel
    }

    pub fn cache(&self) -> &CompilationCache {
        &self.cache
    }

    pub fn limits(&self) -> &ScriptLimits {
        &self.limits
    }

    /// Run a script, answering from the cache when the exact text was seen before.
    pub fn execute(&self, script: &str) -> ExecutionOutcome {
        if let Some(outcome) = self.cache.get(script) {
            debug!(accepted = outcome.is_accepted(), "compilation cache hit");
            return outcome;
        }
        let outcome = self.execute_uncached(script);
        self.cache.insert(script.to_string(), outcome.clone());
        outcome
    }

    /// Run a script without consulting or filling the cache.
    ///
    /// The script runs on its own thread with a [`SCRIPT_STACK_SIZE`] stack, so
    /// nesting limits hold no matter which thread calls this.
    pub fn execute_uncached(&self, script: &str) -> ExecutionOutcome {
        let source = strip_fences(script);
        let spawned = thread::scope(|scope| {
            thread::Builder::new()
                .name("cadloop-script".into())
                .stack_size(SCRIPT_STACK_SIZE)
                .spawn_scoped(scope, || self.run(&source))
                .map(|handle| handle.join())
        });
        let outcome = match spawned {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                warn!("script thread panicked");
                ExecutionOutcome::Rejected("Error: script execution failed".to_string())
            }
            Err(e) => {
                warn!(error = %e, "could not start script thread");
                ExecutionOutcome::Rejected(format!("Error: could not start script execution: {}", e))
            }
        };
        match &outcome {
            ExecutionOutcome::Accepted(shape) => debug!(parts = shape.part_count(), "script accepted"),
            ExecutionOutcome::Rejected(message) => debug!(%message, "script rejected"),
        }
        outcome
    }

    fn run(&self, source: &str) -> ExecutionOutcome {
        let interpreter = Interpreter::new(self.kernel.clone(), self.limits);
        match interpreter.evaluate(source) {
            Ok(value) => match validate_shape(&value) {
                Ok(shape) => ExecutionOutcome::Accepted(shape),
                Err(message) => ExecutionOutcome::Rejected(message),
            },
            Err(err) => ExecutionOutcome::Rejected(err.to_string()),
        }
    }
}
