//! Minimal pipeline around the step implementers: reads the pipeline config,
//! hands each step its layered config and working dir, and persists the results.
use anyhow::{bail, Result};
use shared_fn::report::{read_step_results, write_step_results};

pub mod config;
pub mod step_runner;

use config::{EngineConfig, PipelineConfig};
use step_runner::{run_steps, StepRegistry};


pub async fn run() -> Result<()> {
  run_with(&EngineConfig::from_env(), &StepRegistry::builtin()).await
}

/// Runs the pipeline described by `engine_config` with the steps `registry` knows
pub async fn run_with(engine_config: &EngineConfig, registry: &StepRegistry) -> Result<()> {
  tracing::info!(
    config = %engine_config.config_file.display(),
    work_dir = %engine_config.work_dir.display(),
    "loading pipeline"
  );
  let pipeline = PipelineConfig::load(&engine_config.config_file)?;
  let previous = read_step_results(&engine_config.results_file)?;

  let mut produced = Vec::new();
  let outcome = run_steps(
    &pipeline,
    registry,
    &engine_config.work_dir,
    &previous,
    &mut produced,
  )
  .await;

  // results are written before any error goes up, the log artifacts are in there
  write_step_results(&engine_config.results_file, &produced)?;
  outcome?;

  for result in &produced {
    match &result.message {
      Some(message) => tracing::info!(step = %result.step_name, success = result.success, %message, "step result"),
      None => tracing::info!(step = %result.step_name, success = result.success, "step result"),
    }
  }
  if let Some(failed) = produced.iter().find(|r| !r.success) {
    bail!(
      "step `{}` failed: {}",
      failed.step_name,
      failed.message.as_deref().unwrap_or("no message"),
    );
  }
  Ok(())
}
