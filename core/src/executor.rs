//! Runs an external tool for a step and turns what happened into a `StepResult`.
//!
//! The `<tool>-output` artifact pointing at the captured log is attached on every
//! path out of the run, through an [`ArtifactGuard`] armed before the log file is opened.
use anyhow::Context;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use crate::cmd::{CommandOutcome, TestCommand};
use crate::config::StepDescriptor;
use crate::context::StepContext;
use crate::errors::StepError;
use crate::multiplex::{ChunkSink, Multiplexer, SharedWriter};
use crate::step_result::{Artifact, ArtifactGuard, StepResult};


/// How the output of one tool is archived and reported
#[derive(Debug, Clone)]
pub struct ToolReport {
  /// short tool name, the artifact is named `<tool>-output`
  pub tool: String,
  /// working file holding the combined stdout and stderr
  pub output_file: String,
  pub description: String,
  /// first words of the message when the tool exits unsuccessfully
  pub failure_summary: String,
}

impl ToolReport {
  pub fn artifact_name(&self) -> String {
    format!("{}-output", self.tool)
  }
}

/// Operator visible destinations, the parent process streams unless replaced
#[derive(Clone)]
pub struct Console {
  pub out: Arc<dyn ChunkSink>,
  pub err: Arc<dyn ChunkSink>,
}

impl Console {
  pub fn inherited() -> Self {
    Self {
      out: Arc::new(SharedWriter::new(tokio::io::stdout())),
      err: Arc::new(SharedWriter::new(tokio::io::stderr())),
    }
  }
}

impl Default for Console {
  fn default() -> Self {
    Self::inherited()
  }
}

enum RunFailure {
  FailedToStart(std::io::Error),
  Unexpected(anyhow::Error),
}

pub async fn run_tool_with_output_artifact(
  ctx: &StepContext,
  descriptor: &StepDescriptor,
  command: &dyn TestCommand,
  report: &ToolReport,
  console: Console,
) -> Result<StepResult, StepError> {
  let mut result = StepResult::from_step_implementer(descriptor);
  let output_path = ctx.write_working_file(&report.output_file)?;
  let artifact = Artifact {
    name: report.artifact_name(),
    description: report.description.clone(),
    value: Value::String(output_path.to_string_lossy().into_owned()),
  };

  tracing::info!(
    step = %descriptor.step_name,
    command = %command.describe(),
    output = %output_path.display(),
    "running tool"
  );

  // the guard is dropped at the end of this block, attaching the artifact whatever `run` is
  let run = {
    let mut guard = ArtifactGuard::new(&mut result, artifact);
    run_capturing(&mut guard, command, report, &output_path, console).await
  };

  match run {
    Ok(()) => {
      tracing::info!(step = %descriptor.step_name, success = result.success, "tool run finished");
      Ok(result)
    }
    Err(RunFailure::FailedToStart(source)) => Err(StepError::ToolFailedToStart {
      tool: report.tool.clone(),
      source,
      result: Box::new(result),
    }),
    Err(RunFailure::Unexpected(source)) => {
      tracing::error!(step = %descriptor.step_name, error = %source, "tool run aborted");
      result.fail(format!("{source:#}"));
      Err(StepError::Unexpected {
        step: descriptor.step_name.clone(),
        source,
        result: Box::new(result),
      })
    }
  }
}

async fn run_capturing(
  result: &mut StepResult,
  command: &dyn TestCommand,
  report: &ToolReport,
  output_path: &Path,
  console: Console,
) -> Result<(), RunFailure> {
  let file = tokio::fs::File::create(output_path)
    .await
    .with_context(|| format!("could not open output file {}", output_path.display()))
    .map_err(RunFailure::Unexpected)?;
  let log: Arc<dyn ChunkSink> = Arc::new(SharedWriter::new(file));

  // stdout -> (console out, log file), stderr -> (console err, log file)
  let out = Multiplexer::new(vec![console.out, Arc::clone(&log)]);
  let err = Multiplexer::new(vec![console.err, log]);

  let outcome = command
    .run(out, err)
    .await
    .with_context(|| format!("`{}` output could not be captured", command.describe()))
    .map_err(RunFailure::Unexpected)?;

  match outcome {
    CommandOutcome::Completed(code) if code.success() => Ok(()),
    CommandOutcome::Completed(code) => {
      tracing::warn!(tool = %report.tool, exit_code = %code, "tool reported failures");
      result.fail(format!(
        "{}. See '{}' report artifact for details: `{}` exited with {code}",
        report.failure_summary,
        report.artifact_name(),
        command.describe(),
      ));
      Ok(())
    }
    CommandOutcome::FailedToStart(e) => {
      result.fail(format!("Could not start `{}`: {e}", command.describe()));
      Err(RunFailure::FailedToStart(e))
    }
  }
}
