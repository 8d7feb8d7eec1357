use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use shared_traits::step_traits::{StepError, StepImplementer};
use step_core::{
  ChunkSink, CommandError, CommandOutcome, ConfigResolver, Console, Multiplexer, SharedWriter,
  ShellCommand, StepContext, StepResult, Violation, WorkingDir,
};
use step_unit_test_npm::{descriptor, NpmUnitTest, PACKAGE_FILE};
use tempfile::TempDir;


/// Tool that prints a line on stdout and then loses its output pipe
struct BrokenPipeTool;

#[async_trait]
impl step_core::TestCommand for BrokenPipeTool {
  fn describe(&self) -> String {
    "npm run test".to_string()
  }

  async fn run(&self, out: Multiplexer, _err: Multiplexer) -> Result<CommandOutcome, CommandError> {
    out
      .write_chunk(b"RUNS src/app.test.js\n")
      .await
      .map_err(|source| CommandError::Stream { stream: "stdout", source })?;
    Err(CommandError::Stream {
      stream: "stdout",
      source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed"),
    })
  }
}

struct Project {
  dir: TempDir,
}

impl Project {
  fn with_package_json() -> Self {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("package.json"), r#"{"scripts":{"test":"jest"}}"#).unwrap();
    Self { dir }
  }

  fn package_file(&self) -> PathBuf {
    self.dir.path().join("package.json")
  }

  fn work_root(&self) -> PathBuf {
    self.dir.path().join("step-runner-working")
  }

  fn ctx(&self, step: &[(&str, Value)]) -> StepContext {
    let step: Map<String, Value> = step.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
    let config = ConfigResolver::for_step(&descriptor(), Map::new(), step, &Vec::<StepResult>::new());
    StepContext::new(config, WorkingDir::new(self.work_root(), "unit-test"))
  }

  fn default_ctx(&self) -> StepContext {
    self.ctx(&[(PACKAGE_FILE, json!(self.package_file().to_string_lossy()))])
  }
}

fn quiet(step: NpmUnitTest) -> NpmUnitTest {
  step.with_console(Console {
    out: Arc::new(SharedWriter::new(tokio::io::sink())),
    err: Arc::new(SharedWriter::new(tokio::io::sink())),
  })
}

fn sh(script: &str) -> NpmUnitTest {
  quiet(NpmUnitTest::with_command(ShellCommand::new("sh", ["-c", script])))
}

fn output_of(result: &StepResult) -> String {
  let artifact = result.get_artifact("npm-output").expect("npm-output artifact");
  let path = artifact.value.as_str().expect("artifact value is a path");
  assert!(!path.is_empty());
  std::fs::read_to_string(path).unwrap()
}

fn no_files_under(dir: &Path) -> bool {
  !dir.exists() || std::fs::read_dir(dir).unwrap().next().is_none()
}

#[tokio::test]
async fn passing_tests_give_a_successful_result_with_the_log() {
  let project = Project::with_package_json();
  let result = sh("echo PASS").run_step(&project.default_ctx()).await.unwrap();

  assert!(result.success);
  assert!(result.message.is_none());
  assert_eq!(result.step_name, "unit-test");
  assert_eq!(result.sub_step_name, "npm");
  assert_eq!(result.artifacts().len(), 1);
  assert!(output_of(&result).contains("PASS"));
}

#[tokio::test]
async fn failing_tests_are_reported_not_raised() {
  let project = Project::with_package_json();
  let result = sh("echo '1 test failed' >&2; exit 1")
    .run_step(&project.default_ctx())
    .await
    .unwrap();

  assert!(!result.success);
  let message = result.message.clone().unwrap();
  assert!(message.contains("Unit test failures"));
  assert!(message.contains("npm-output"));
  assert!(output_of(&result).contains("1 test failed"));
}

#[tokio::test]
async fn broken_output_pipe_still_keeps_the_log_artifact() {
  let project = Project::with_package_json();
  let err = quiet(NpmUnitTest::with_command(BrokenPipeTool))
    .run_step(&project.default_ctx())
    .await
    .unwrap_err();

  assert!(matches!(err, StepError::Unexpected { .. }));
  let partial = err.partial_result().unwrap();
  assert!(!partial.success);
  assert!(output_of(partial).contains("RUNS src/app.test.js"));
}

#[tokio::test]
async fn tool_that_cannot_start_still_keeps_the_log_artifact() {
  let project = Project::with_package_json();
  let step = quiet(NpmUnitTest::with_command(ShellCommand::new(
    "npm-is-not-installed-here",
    ["run", "test"],
  )));
  let err = step.run_step(&project.default_ctx()).await.unwrap_err();

  assert!(matches!(&err, StepError::ToolFailedToStart { tool, .. } if tool == "npm"));
  assert!(err.partial_result().and_then(|r| r.get_artifact("npm-output")).is_some());
}

#[tokio::test]
async fn empty_package_file_fails_before_anything_runs() {
  let project = Project::with_package_json();
  let err = sh("echo PASS")
    .run_step(&project.ctx(&[(PACKAGE_FILE, json!(""))]))
    .await
    .unwrap_err();

  match err {
    StepError::ConfigValidation(e) => {
      assert_eq!(e.violations, vec![Violation::Missing { key: PACKAGE_FILE.to_string() }]);
    }
    other => panic!("expected a validation error, got {other}"),
  }
  assert!(no_files_under(&project.work_root()));
}

#[tokio::test]
async fn missing_package_file_names_key_and_path() {
  let project = Project::with_package_json();
  let missing = project.dir.path().join("client").join("package.json");
  let err = sh("echo PASS")
    .run_step(&project.ctx(&[(PACKAGE_FILE, json!(missing.to_string_lossy()))]))
    .await
    .unwrap_err();

  assert!(err.is_validation());
  let message = err.to_string();
  assert!(message.contains(PACKAGE_FILE));
  assert!(message.contains(&*missing.to_string_lossy()));
  assert!(no_files_under(&project.work_root()));
}

#[tokio::test]
async fn console_sees_the_same_bytes_as_the_log() {
  let project = Project::with_package_json();
  let console_out = SharedWriter::new(Vec::new());
  let console_err = SharedWriter::new(Vec::new());
  let step = NpmUnitTest::with_command(ShellCommand::new("sh", ["-c", "printf 'a\\nb\\n'"]))
    .with_console(Console { out: Arc::new(console_out.clone()), err: Arc::new(console_err.clone()) });

  let result = step.run_step(&project.default_ctx()).await.unwrap();
  drop(step);

  let seen = console_out.into_inner().await.unwrap();
  assert_eq!(String::from_utf8(seen).unwrap(), output_of(&result));
  assert!(console_err.into_inner().await.unwrap().is_empty());
}
