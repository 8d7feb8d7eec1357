use async_trait::async_trait;
use step_core::{
  config::validate_required,
  ConfigValidationError,
  StepContext,
  StepDescriptor,
  StepResult,
};

pub use step_core::StepError;


/// A step implementer: one way of doing a pipeline step (ex: `unit-test` done with `npm`)
#[async_trait]
pub trait StepImplementer: Send + Sync {
  /// Defaults and required keys of this step type, built once
  fn descriptor(&self) -> &StepDescriptor;

  fn name(&self) -> &str {
    &self.descriptor().step_name
  }

  /// Checks the required keys before anything runs.
  /// Implementers needing more checks call this first and add theirs.
  fn validate(&self, ctx: &StepContext) -> Result<(), ConfigValidationError> {
    validate_required(&ctx.config, self.descriptor())
  }

  /// The step itself, only called once `validate` passed
  async fn run_step_inner(&self, ctx: &StepContext) -> Result<StepResult, StepError>;

  /// Single entry point for the framework.
  /// Tool failures come back as `success = false` results, only invocation
  /// defects and runs that could not complete are errors.
  async fn run_step(&self, ctx: &StepContext) -> Result<StepResult, StepError> {
    let descriptor = self.descriptor();
    tracing::info!(step = %descriptor.step_name, implementer = %descriptor.implementer, "validating step");
    self.validate(ctx)?;

    let result = self.run_step_inner(ctx).await;
    match &result {
      Ok(r) if r.success => tracing::info!(step = %descriptor.step_name, "step succeeded"),
      Ok(r) => tracing::warn!(step = %descriptor.step_name, message = ?r.message, "step failed"),
      Err(e) => tracing::error!(step = %descriptor.step_name, error = %e, "step could not complete"),
    }
    result
  }
}
