//! `run` and `post-run` subcommands
//!
//! These stand in for the host engine: they read the step's inputs and
//! context from JSON files, drive [`CacheStep`], and hand the restore
//! outputs over to the persist phase through a JSON file.

use crate::cli::{CliError, StepArgs};
use std::path::Path;
use stepcache_step::{CacheStep, StepContext, StepInputs, StepOutputs};
use tracing::{debug, instrument};

fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|e| CliError::file("read", path, e))
}

fn load(args: &StepArgs) -> Result<(StepInputs, StepContext), CliError> {
    let inputs = StepInputs::from_json(&read(&args.inputs)?)?;
    let context = StepContext::from_json(&read(&args.context)?)?;
    Ok((inputs, context))
}

/// Restore phase; returns the outputs the host should keep for `post-run`
#[instrument(skip_all)]
pub async fn run(step: &CacheStep, args: &StepArgs) -> Result<StepOutputs, CliError> {
    let (inputs, context) = load(args)?;
    let outcome = step.run(&inputs, &context).await;
    let outputs = StepOutputs::from(&outcome);

    let json = serde_json::to_string_pretty(&outputs)?;
    match &args.outputs {
        Some(path) => {
            std::fs::write(path, json).map_err(|e| CliError::file("write", path, e))?;
            debug!(path = %path.display(), "step outputs written");
        }
        #[allow(clippy::print_stdout)]
        None => println!("{json}"),
    }
    Ok(outputs)
}

/// Persist phase; a missing outputs file means the restore phase left nothing
#[instrument(skip_all)]
pub async fn post_run(step: &CacheStep, args: &StepArgs) -> Result<(), CliError> {
    let (inputs, context) = load(args)?;
    let prior = match &args.outputs {
        Some(path) if path.exists() => StepOutputs::from_json(&read(path)?)?,
        _ => StepOutputs::default(),
    };
    step.post_run(&inputs, &context, &prior).await;
    Ok(())
}
