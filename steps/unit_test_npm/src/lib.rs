use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use step_core::{
  config::validate_required,
  run_tool_with_output_artifact,
  ConfigValidationError,
  Console,
  RequiredKey,
  ShellCommand,
  StepContext,
  StepDescriptor,
  StepResult,
  TestCommand,
  ToolReport,
  Violation,
};
use shared_traits::step_traits::{StepError, StepImplementer};


pub const STEP_NAME: &str = "unit-test";
pub const IMPLEMENTER: &str = "npm";
/// path of the `package.json` of the project to test
pub const PACKAGE_FILE: &str = "package-file";
/// optional limit in seconds for `npm run test`, no limit when absent
pub const TEST_TIMEOUT_SECONDS: &str = "npm-test-timeout-seconds";

/// Defaults and required keys of the `unit-test` step done with npm
pub fn descriptor() -> StepDescriptor {
  StepDescriptor::new(STEP_NAME, IMPLEMENTER)
    .with_default(PACKAGE_FILE, "package.json")
    .with_required(RequiredKey::path(PACKAGE_FILE))
}

fn report() -> ToolReport {
  ToolReport {
    tool: IMPLEMENTER.to_string(),
    output_file: "npm_test_output.txt".to_string(),
    description: "Standard out and standard error from 'npm test'.".to_string(),
    failure_summary: "Unit test failures".to_string(),
  }
}

/// `unit-test` step running `npm run test` next to the configured `package-file`
pub struct NpmUnitTest {
  descriptor: StepDescriptor,
  // replaces `npm run test` when set
  command: Option<Box<dyn TestCommand>>,
  console: Console,
}

impl Default for NpmUnitTest {
  fn default() -> Self {
    Self::new()
  }
}

impl NpmUnitTest {
  pub fn new() -> Self {
    Self { descriptor: descriptor(), command: None, console: Console::inherited() }
  }

  /// Same step with another tool in place of npm
  pub fn with_command(command: impl TestCommand + 'static) -> Self {
    Self { command: Some(Box::new(command)), ..Self::new() }
  }

  /// Where the operator visible copy of the output goes, the process stdout/stderr by default
  pub fn with_console(mut self, console: Console) -> Self {
    self.console = console;
    self
  }

  fn npm_command(&self, ctx: &StepContext) -> ShellCommand {
    let package_file = ctx.config.get_str(PACKAGE_FILE).unwrap_or_default();
    let limit = ctx.config.get_u64(TEST_TIMEOUT_SECONDS).map(Duration::from_secs);
    tracing::debug!(package_file = %package_file, timeout = ?limit, "preparing npm command");
    let command = ShellCommand::new("npm", ["run", "test"]).timeout(limit);
    // npm looks for `package.json` in its working dir
    match Path::new(&package_file).parent() {
      Some(dir) if !dir.as_os_str().is_empty() => command.current_dir(dir),
      _ => command,
    }
  }
}

#[async_trait]
impl StepImplementer for NpmUnitTest {
  fn descriptor(&self) -> &StepDescriptor {
    &self.descriptor
  }

  fn validate(&self, ctx: &StepContext) -> Result<(), ConfigValidationError> {
    let mut violations = match validate_required(&ctx.config, &self.descriptor) {
      Ok(()) => Vec::new(),
      Err(e) => e.violations,
    };
    if ctx.get_value(TEST_TIMEOUT_SECONDS).is_some() {
      match ctx.config.get_u64(TEST_TIMEOUT_SECONDS) {
        Some(seconds) if seconds > 0 => {}
        _ => violations.push(Violation::Invalid {
          key: TEST_TIMEOUT_SECONDS.to_string(),
          reason: "expected a positive number of seconds".to_string(),
        }),
      }
    }

    if violations.is_empty() {
      Ok(())
    } else {
      Err(ConfigValidationError { step: self.descriptor.step_name.clone(), violations })
    }
  }

  async fn run_step_inner(&self, ctx: &StepContext) -> Result<StepResult, StepError> {
    let npm;
    let command: &dyn TestCommand = match &self.command {
      Some(command) => command.as_ref(),
      None => {
        npm = self.npm_command(ctx);
        &npm
      }
    };
    run_tool_with_output_artifact(ctx, &self.descriptor, command, &report(), self.console.clone()).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::{json, Map, Value};
  use step_core::{ConfigResolver, WorkingDir};

  fn ctx_with(step: &[(&str, Value)]) -> StepContext {
    let step: Map<String, Value> = step.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
    let config = ConfigResolver::for_step(&descriptor(), Map::new(), step, &Vec::<StepResult>::new());
    StepContext::new(config, WorkingDir::new("step-runner-working", STEP_NAME))
  }

  #[test]
  fn default_package_file_is_package_json() {
    let ctx = ctx_with(&[]);
    assert_eq!(ctx.config.get_str(PACKAGE_FILE).as_deref(), Some("package.json"));
  }

  #[test]
  fn npm_runs_next_to_the_package_file() {
    let ctx = ctx_with(&[(PACKAGE_FILE, json!("web/ui/package.json"))]);
    let command = NpmUnitTest::new().npm_command(&ctx);
    assert_eq!(command.describe(), "npm run test");
    assert!(format!("{command:?}").contains("web/ui"));
  }

  #[test]
  fn zero_timeout_is_rejected() {
    let dir = std::env::temp_dir();
    let ctx = ctx_with(&[
      (PACKAGE_FILE, json!(dir.to_string_lossy())),
      (TEST_TIMEOUT_SECONDS, json!(0)),
    ]);
    let err = NpmUnitTest::new().validate(&ctx).unwrap_err();
    assert_eq!(err.violations.len(), 1);
    assert!(err.to_string().contains(TEST_TIMEOUT_SECONDS));
  }

  #[test]
  fn report_names_the_npm_output_artifact() {
    assert_eq!(report().artifact_name(), "npm-output");
  }
}
