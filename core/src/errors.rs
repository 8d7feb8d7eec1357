use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::step_result::StepResult;


/// One required key that did not pass validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
  Missing { key: String },
  PathNotFound { key: String, path: PathBuf },
  Invalid { key: String, reason: String },
}

impl std::fmt::Display for Violation {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Violation::Missing { key } => write!(f, "Missing required configuration or previous step result artifact: `{key}`"),
      Violation::PathNotFound { key, path } => write!(f, "Given path for `{key}` does not exist: {}", path.display()),
      Violation::Invalid { key, reason } => write!(f, "Invalid value for `{key}`: {reason}"),
    }
  }
}

/// The step was invoked with missing or invalid configuration. Nothing ran.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid configuration for step `{step}`: {}", join_violations(.violations))]
pub struct ConfigValidationError {
  pub step: String,
  pub violations: Vec<Violation>,
}

fn join_violations(violations: &[Violation]) -> String {
  violations.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("; ")
}

/// Errors of the process layer: the child was started but draining or waiting on it failed
#[derive(Debug, Error)]
pub enum CommandError {
  #[error("failed to forward `{stream}` output: {source}")]
  Stream { stream: &'static str, #[source] source: std::io::Error },
  #[error("failed waiting for child process: {0}")]
  Wait(#[source] std::io::Error),
  #[error("child process did not finish within {0:?}")]
  TimedOut(Duration),
}

#[derive(Debug, Error)]
pub enum StepError {
  #[error(transparent)]
  ConfigValidation(#[from] ConfigValidationError),

  // before Running: the working file could not even be allocated
  #[error("could not allocate working file: {0}")]
  WorkingFile(#[from] std::io::Error),

  #[error("`{tool}` could not be started: {source}")]
  ToolFailedToStart {
    tool: String,
    #[source] source: std::io::Error,
    result: Box<StepResult>,
  },

  #[error("step `{step}` failed while running: {source}")]
  Unexpected {
    step: String,
    #[source] source: anyhow::Error,
    result: Box<StepResult>,
  },
}

impl StepError {
  /// The finalized result of a run that failed after the working file was allocated.
  /// It always holds the output artifact.
  pub fn partial_result(&self) -> Option<&StepResult> {
    match self {
      StepError::ToolFailedToStart { result, .. } | StepError::Unexpected { result, .. } => Some(result),
      StepError::ConfigValidation(_) | StepError::WorkingFile(_) => None,
    }
  }

  pub fn is_validation(&self) -> bool {
    matches!(self, StepError::ConfigValidation(_))
  }
}
