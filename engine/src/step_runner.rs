use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::Path;
// the common `trait` shared between `steps`
use shared_traits::step_traits::{StepError, StepImplementer};
use step_core::{ConfigResolver, StepContext, StepResult, WorkingDir};
// all the `steps`
use step_unit_test_npm::NpmUnitTest;

use crate::config::PipelineConfig;


type StepFactory = Box<dyn Fn() -> Box<dyn StepImplementer> + Send + Sync>;

/// Which implementer handles which `(step, implementer)` pair of the pipeline config
pub struct StepRegistry {
  factories: HashMap<(String, String), StepFactory>,
}

impl StepRegistry {
  pub fn empty() -> Self {
    Self { factories: HashMap::new() }
  }

  /// Every step implementer shipped with the runner
  pub fn builtin() -> Self {
    Self::empty().register(step_unit_test_npm::STEP_NAME, step_unit_test_npm::IMPLEMENTER, || {
      Box::new(NpmUnitTest::new())
    })
  }

  pub fn register(
    mut self,
    step: &str,
    implementer: &str,
    factory: impl Fn() -> Box<dyn StepImplementer> + Send + Sync + 'static,
  ) -> Self {
    self.factories.insert((step.to_string(), implementer.to_string()), Box::new(factory));
    self
  }

  fn create(&self, step: &str, implementer: &str) -> Option<Box<dyn StepImplementer>> {
    self.factories.get(&(step.to_string(), implementer.to_string())).map(|f| f())
  }
}

/// Runs the pipeline steps in order, pushing every produced result into `produced`
/// (partial results of aborted runs too) so the caller can persist them whatever happens.
/// Stops at the first step that fails.
pub async fn run_steps(
  pipeline: &PipelineConfig,
  registry: &StepRegistry,
  work_dir: &Path,
  previous: &[StepResult],
  produced: &mut Vec<StepResult>,
) -> Result<()> {
  for (idx, step_config) in pipeline.steps.iter().enumerate() {
    let step = registry
      .create(&step_config.name, &step_config.implementer)
      .ok_or_else(|| anyhow!(
        "no implementer `{}` registered for step `{}`",
        step_config.implementer,
        step_config.name,
      ))?;

    // results of earlier runs first, this run's results after so they win
    let earlier: Vec<&StepResult> = previous.iter().chain(produced.iter()).collect();
    let config = ConfigResolver::for_step(
      step.descriptor(),
      pipeline.global_defaults.clone(),
      step_config.config.clone(),
      earlier,
    );
    let ctx = StepContext::new(config, WorkingDir::new(work_dir, &step_config.name));

    tracing::info!(index = idx, step = %step.name(), implementer = %step_config.implementer, "starting step");
    match step.run_step(&ctx).await {
      // step done, maybe with failures reported by the tool
      Ok(result) => {
        let success = result.success;
        produced.push(result);
        // a failed tool is reported through the result, the pipeline still stops here
        // so nothing runs on top of failing tests
        if !success {
          tracing::warn!(step = %step_config.name, "step reported failure, stopping the pipeline");
          return Ok(());
        }
      }
      // the run was aborted: keep what it produced and stop explicitly so that no other step runs
      Err(e) => {
        if let Some(partial) = e.partial_result() {
          produced.push(partial.clone());
        }
        return Err(step_error(&step_config.name, e));
      }
    }
  }
  Ok(())
}

fn step_error(step: &str, e: StepError) -> anyhow::Error {
  if e.is_validation() {
    anyhow::Error::new(e).context(format!("step `{step}` is not configured correctly"))
  } else {
    anyhow::Error::new(e).context(format!("step `{step}` failed"))
  }
}
