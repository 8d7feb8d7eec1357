//! Layered configuration for a step run.
//!
//! Sources are kept lowest to highest precedence and the last source defining
//! a key wins it entirely, there is no per-key deep merge.
//! The standard stack built by [`ConfigResolver::for_step`] is:
//! `defaults` < `global-defaults` < `step-config` < `previous-step-results`.
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::errors::{ConfigValidationError, Violation};
use crate::step_result::StepResult;


pub const DEFAULTS_SOURCE: &str = "defaults";
pub const GLOBAL_SOURCE: &str = "global-defaults";
pub const STEP_SOURCE: &str = "step-config";
pub const PREVIOUS_RESULTS_SOURCE: &str = "previous-step-results";

/// How a required key is checked before the step runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
  /// must resolve to a non empty value
  Value,
  /// must resolve to a non empty value naming an existing path
  Path,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredKey {
  pub key: &'static str,
  pub kind: KeyKind,
}

impl RequiredKey {
  pub const fn value(key: &'static str) -> Self { Self { key, kind: KeyKind::Value } }
  pub const fn path(key: &'static str) -> Self { Self { key, kind: KeyKind::Path } }
}

/// Immutable description of a step type, built once at startup and handed to the executor.
#[derive(Debug, Clone)]
pub struct StepDescriptor {
  pub step_name: String,
  pub implementer: String,
  pub defaults: Map<String, Value>,
  pub required: Vec<RequiredKey>,
}

impl StepDescriptor {
  pub fn new(step_name: &str, implementer: &str) -> Self {
    Self {
      step_name: step_name.to_string(),
      implementer: implementer.to_string(),
      defaults: Map::new(),
      required: Vec::new(),
    }
  }

  pub fn with_default(mut self, key: &str, value: impl Into<Value>) -> Self {
    self.defaults.insert(key.to_string(), value.into());
    self
  }

  pub fn with_required(mut self, key: RequiredKey) -> Self {
    self.required.push(key);
    self
  }
}

/// A named provider of key/value pairs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSource {
  pub name: String,
  pub values: Map<String, Value>,
}

impl ConfigSource {
  pub fn new(name: &str, values: Map<String, Value>) -> Self {
    Self { name: name.to_string(), values }
  }

  /// Copies the artifacts of earlier step runs, a later result overriding an earlier one
  pub fn from_previous_results<'a>(results: impl IntoIterator<Item = &'a StepResult>) -> Self {
    let mut values = Map::new();
    for result in results {
      for artifact in result.artifacts() {
        values.insert(artifact.name.clone(), artifact.value.clone());
      }
    }
    Self::new(PREVIOUS_RESULTS_SOURCE, values)
  }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
  // lowest precedence first
  sources: Vec<ConfigSource>,
}

impl ConfigResolver {
  pub fn new(sources: Vec<ConfigSource>) -> Self {
    Self { sources }
  }

  /// The four standard layers for one step run
  pub fn for_step<'a>(
    descriptor: &StepDescriptor,
    global: Map<String, Value>,
    step: Map<String, Value>,
    previous_results: impl IntoIterator<Item = &'a StepResult>,
  ) -> Self {
    Self::new(vec![
      ConfigSource::new(DEFAULTS_SOURCE, descriptor.defaults.clone()),
      ConfigSource::new(GLOBAL_SOURCE, global),
      ConfigSource::new(STEP_SOURCE, step),
      ConfigSource::from_previous_results(previous_results),
    ])
  }

  pub fn get_value(&self, key: &str) -> Option<&Value> {
    self.sources.iter().rev().find_map(|s| s.values.get(key))
  }

  /// Name of the source the value of `key` comes from
  pub fn source_of(&self, key: &str) -> Option<&str> {
    self.sources.iter().rev().find(|s| s.values.contains_key(key)).map(|s| s.name.as_str())
  }

  /// String view of a value; numbers and booleans are rendered, other shapes give `None`
  pub fn get_str(&self, key: &str) -> Option<String> {
    match self.get_value(key)? {
      Value::String(s) => Some(s.clone()),
      Value::Number(n) => Some(n.to_string()),
      Value::Bool(b) => Some(b.to_string()),
      _ => None,
    }
  }

  pub fn get_u64(&self, key: &str) -> Option<u64> {
    match self.get_value(key)? {
      Value::Number(n) => n.as_u64(),
      Value::String(s) => s.trim().parse().ok(),
      _ => None,
    }
  }
}

pub fn is_empty_value(value: &Value) -> bool {
  match value {
    Value::Null => true,
    Value::String(s) => s.trim().is_empty(),
    Value::Array(a) => a.is_empty(),
    Value::Object(o) => o.is_empty(),
    Value::Bool(_) | Value::Number(_) => false,
  }
}

/// Checks every required key of `descriptor` and reports all violations at once
pub fn validate_required(
  config: &ConfigResolver,
  descriptor: &StepDescriptor,
) -> Result<(), ConfigValidationError> {
  let mut violations = Vec::new();
  for required in &descriptor.required {
    let value = config.get_value(required.key).filter(|v| !is_empty_value(v));
    let Some(value) = value else {
      violations.push(Violation::Missing { key: required.key.to_string() });
      continue;
    };
    if required.kind == KeyKind::Path {
      let path = match value {
        Value::String(s) => PathBuf::from(s),
        other => PathBuf::from(other.to_string()),
      };
      if !path.exists() {
        violations.push(Violation::PathNotFound { key: required.key.to_string(), path });
      }
    }
  }

  if violations.is_empty() {
    Ok(())
  } else {
    tracing::warn!(step = %descriptor.step_name, count = violations.len(), "configuration validation failed");
    Err(ConfigValidationError { step: descriptor.step_name.clone(), violations })
  }
}
