use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::{Deref, DerefMut};


/// A named, described reference to something a step run produced (usually a file path)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
  pub name: String,
  pub description: String,
  pub value: Value,
}

/// Outcome of one step run.
/// `artifacts` keeps insertion order and nothing is ever removed from it,
/// also when `success` is `false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StepResult {
  pub step_name: String,
  pub sub_step_name: String,
  pub success: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(default)]
  artifacts: Vec<Artifact>,
}

impl StepResult {
  pub fn new(step_name: &str, sub_step_name: &str) -> Self {
    Self {
      step_name: step_name.to_string(),
      sub_step_name: sub_step_name.to_string(),
      success: true,
      message: None,
      artifacts: Vec::new(),
    }
  }

  /// Seeds a result with which step type and implementer produced it
  pub fn from_step_implementer(descriptor: &crate::config::StepDescriptor) -> Self {
    Self::new(&descriptor.step_name, &descriptor.implementer)
  }

  /// Appends an artifact. The name is the local key: adding a name twice replaces
  /// the value in place and keeps its position.
  pub fn add_artifact(&mut self, name: &str, description: &str, value: impl Into<Value>) {
    let value = value.into();
    match self.artifacts.iter_mut().find(|a| a.name == name) {
      Some(existing) => {
        existing.description = description.to_string();
        existing.value = value;
      }
      None => self.artifacts.push(Artifact {
        name: name.to_string(),
        description: description.to_string(),
        value,
      }),
    }
  }

  pub fn fail(&mut self, message: impl Into<String>) {
    self.success = false;
    self.message = Some(message.into());
  }

  pub fn get_artifact(&self, name: &str) -> Option<&Artifact> {
    self.artifacts.iter().find(|a| a.name == name)
  }

  pub fn artifacts(&self) -> &[Artifact] {
    &self.artifacts
  }
}

/// Scope guard over a `StepResult` that attaches `artifact` when it goes out of scope,
/// whatever the exit path is (normal end, `?` early return or a panic unwinding).
pub struct ArtifactGuard<'a> {
  result: &'a mut StepResult,
  artifact: Option<Artifact>,
}

impl<'a> ArtifactGuard<'a> {
  pub fn new(result: &'a mut StepResult, artifact: Artifact) -> Self {
    Self { result, artifact: Some(artifact) }
  }
}

impl Deref for ArtifactGuard<'_> {
  type Target = StepResult;
  fn deref(&self) -> &StepResult { self.result }
}

impl DerefMut for ArtifactGuard<'_> {
  fn deref_mut(&mut self) -> &mut StepResult { self.result }
}

impl Drop for ArtifactGuard<'_> {
  fn drop(&mut self) {
    if let Some(artifact) = self.artifact.take() {
      tracing::debug!(artifact = %artifact.name, "attaching artifact on scope exit");
      self.result.add_artifact(&artifact.name, &artifact.description, artifact.value);
    }
  }
}
