//! Host engine boundary for the stepcache step
//!
//! The host engine calls [`CacheStep::run`] before the wrapped step body and
//! [`CacheStep::post_run`] after it, passing back the [`StepOutputs`] the
//! first call produced. Inputs and context arrive as JSON and are parsed into
//! the typed structures in [`inputs`].

mod error;
pub mod inputs;
mod outputs;

pub use error::{Result, StepError};
pub use inputs::{StepContext, StepInputs, cache_props};
pub use outputs::StepOutputs;

use stepcache_cache::{CacheEngine, CacheOutcome, ProcessTool, TransferSettings, TransferTool};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

impl StepInputs {
    /// Parse step inputs from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| StepError::invalid_document("inputs", e))
    }
}

impl StepContext {
    /// Parse the execution context from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| StepError::invalid_document("context", e))
    }
}

impl StepOutputs {
    /// Parse restore outputs from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| StepError::invalid_document("outputs", e))
    }
}

/// The cache step as seen by the host engine
pub struct CacheStep {
    settings: TransferSettings,
    tool: Arc<dyn TransferTool>,
}

impl std::fmt::Debug for CacheStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStep")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl CacheStep {
    /// Create a step running invocations through `tool`
    #[must_use]
    pub fn new(settings: TransferSettings, tool: Arc<dyn TransferTool>) -> Self {
        Self { settings, tool }
    }

    /// Create a step that spawns the transfer tool as a child process
    #[must_use]
    pub fn with_process_tool(settings: TransferSettings) -> Self {
        Self::new(settings, Arc::new(ProcessTool::new()))
    }

    fn engine(&self, inputs: &StepInputs, context: &StepContext) -> stepcache_cache::Result<CacheEngine> {
        debug!(?inputs, ?context, "resolving cache step configuration");
        CacheEngine::from_props(
            cache_props(inputs, context),
            self.settings.clone(),
            Arc::clone(&self.tool),
        )
    }

    /// Restore phase, run before the step body
    #[instrument(skip_all, fields(key = %inputs.key))]
    pub async fn run(&self, inputs: &StepInputs, context: &StepContext) -> CacheOutcome {
        info!("cache restore started");
        let engine = match self.engine(inputs, context) {
            Ok(engine) => engine,
            Err(e) => {
                warn!(error = %e, "cache step inputs are invalid");
                return CacheOutcome::miss().with_error(e);
            }
        };
        let outcome = engine.run().await;
        info!(cache_hit = outcome.cache_hit, "cache restore finished");
        outcome
    }

    /// Persist phase, run after the step body
    ///
    /// `prior` is only logged; the push happens whatever it says.
    #[instrument(skip_all, fields(key = %inputs.key))]
    pub async fn post_run(&self, inputs: &StepInputs, context: &StepContext, prior: &StepOutputs) {
        info!("cache persist started");
        let engine = match self.engine(inputs, context) {
            Ok(engine) => engine,
            Err(e) => {
                warn!(error = %e, "cache step inputs are invalid");
                return;
            }
        };
        engine.post_run(prior.cache_hit, prior.error.as_deref()).await;
        info!("cache persist finished");
    }
}
