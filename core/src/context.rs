use std::io;
use std::path::PathBuf;

use crate::config::ConfigResolver;


/// Root under which each step gets its own folder for transient files
#[derive(Debug, Clone)]
pub struct WorkingDir {
  root: PathBuf,
  step_name: String,
}

impl WorkingDir {
  pub fn new(root: impl Into<PathBuf>, step_name: &str) -> Self {
    Self { root: root.into(), step_name: step_name.to_string() }
  }

  pub fn step_dir(&self) -> PathBuf {
    self.root.join(&self.step_name)
  }

  /// Returns a writable path for `name` inside the step folder.
  /// The folder is created, the file itself is left to the caller.
  pub fn write_working_file(&self, name: &str) -> io::Result<PathBuf> {
    let dir = self.step_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join(name))
  }
}

/// What the surrounding framework hands to a step implementer for one run
#[derive(Debug, Clone)]
pub struct StepContext {
  pub config: ConfigResolver,
  pub work_dir: WorkingDir,
}

impl StepContext {
  pub fn new(config: ConfigResolver, work_dir: WorkingDir) -> Self {
    Self { config, work_dir }
  }

  pub fn get_value(&self, key: &str) -> Option<&serde_json::Value> {
    self.config.get_value(key)
  }

  pub fn write_working_file(&self, name: &str) -> io::Result<PathBuf> {
    self.work_dir.write_working_file(name)
  }
}
