//! Result reporting sink: the results of every step run are kept in one JSON file
//! so a later run can feed them back as the `previous-step-results` config layer.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use step_core::StepResult;


#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StepResultsFile {
  #[serde(default)]
  pub step_results: Vec<StepResult>,
}

/// Reads the results file, a missing file is an empty list
pub fn read_step_results(file_path: &Path) -> Result<Vec<StepResult>> {
  if !file_path.exists() {
    return Ok(Vec::new());
  }
  let raw = std::fs::read_to_string(file_path)
    .with_context(|| format!("could not read step results {}", file_path.display()))?;
  let parsed: StepResultsFile = serde_json::from_str(&raw)
    .with_context(|| format!("invalid step results file {}", file_path.display()))?;
  Ok(parsed.step_results)
}

/// Adds `results` to what the file already holds and rewrites it.
/// A step that ran again replaces its older entries, so stale artifacts never shadow the step config.
pub fn write_step_results(file_path: &Path, results: &[StepResult]) -> Result<()> {
  let mut all = read_step_results(file_path)?;
  all.retain(|old| !results.iter().any(|new| same_step(old, new)));
  all.extend(results.iter().cloned());
  if let Some(parent) = file_path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  let json = serde_json::to_string_pretty(&StepResultsFile { step_results: all })?;
  std::fs::write(file_path, json)
    .with_context(|| format!("could not write step results {}", file_path.display()))?;
  tracing::debug!(path = %file_path.display(), added = results.len(), "step results written");
  Ok(())
}

fn same_step(a: &StepResult, b: &StepResult) -> bool {
  a.step_name == b.step_name && a.sub_step_name == b.sub_step_name
}
