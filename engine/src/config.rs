//! Where the engine finds things (process env, `.env` included) and the pipeline config file.
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::env;
use std::path::{Path, PathBuf};


pub const CONFIG_ENV: &str = "STEP_RUNNER_CONFIG";
pub const WORK_DIR_ENV: &str = "STEP_RUNNER_WORK_DIR";
pub const RESULTS_ENV: &str = "STEP_RUNNER_RESULTS";

#[derive(Debug, Clone)]
pub struct EngineConfig {
  pub config_file: PathBuf,
  pub work_dir: PathBuf,
  pub results_file: PathBuf,
}

impl EngineConfig {
  pub fn from_env() -> Self {
    // a missing `.env` is fine
    let _ = dotenvy::dotenv();
    Self::from_lookup(|key| env::var(key).ok())
  }

  /// Same as `from_env` with another source for the variables
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let config_file = lookup(CONFIG_ENV).unwrap_or_else(|| "step-runner-config.json".to_string());
    let work_dir = PathBuf::from(lookup(WORK_DIR_ENV).unwrap_or_else(|| "step-runner-working".to_string()));
    let results_file = lookup(RESULTS_ENV)
      .map(PathBuf::from)
      .unwrap_or_else(|| work_dir.join("step-runner-results.json"));
    Self { config_file: PathBuf::from(config_file), work_dir, results_file }
  }
}

/// One step of the pipeline: which step, done by which implementer, with what config
#[derive(Debug, Clone, Deserialize)]
pub struct StepConfig {
  pub name: String,
  pub implementer: String,
  #[serde(default)]
  pub config: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PipelineConfig {
  #[serde(default)]
  pub global_defaults: Map<String, Value>,
  #[serde(default)]
  pub steps: Vec<StepConfig>,
}

impl PipelineConfig {
  pub fn load(path: &Path) -> Result<Self> {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("could not read pipeline config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid pipeline config {}", path.display()))
  }
}
