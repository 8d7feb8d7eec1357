// core/src/cmd.rs
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;

use crate::errors::CommandError;
use crate::multiplex::{ChunkSink, Multiplexer};

// size of one read from a child pipe, so one chunk handed to a multiplexer
const CHUNK_SIZE: usize = 8 * 1024;


/// Exit status of a finished child. `None` when it was terminated by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub Option<i32>);

impl ExitCode {
  pub fn success(&self) -> bool {
    self.0 == Some(0)
  }
}

impl std::fmt::Display for ExitCode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self.0 {
      Some(code) => write!(f, "{code}"),
      None => write!(f, "no code (terminated by signal)"),
    }
  }
}

/// What happened to the external tool: it ran to the end, or it never started
#[derive(Debug)]
pub enum CommandOutcome {
  Completed(ExitCode),
  FailedToStart(std::io::Error),
}

/// The external tool a step runs. Its stdout goes to `out` and its stderr to `err`,
/// chunk by chunk as they arrive.
#[async_trait]
pub trait TestCommand: Send + Sync {
  /// Human readable command line, used in messages and logs
  fn describe(&self) -> String;

  async fn run(&self, out: Multiplexer, err: Multiplexer) -> Result<CommandOutcome, CommandError>;
}

/// A program started with `tokio::process`
#[derive(Debug, Clone)]
pub struct ShellCommand {
  program: String,
  args: Vec<String>,
  current_dir: Option<PathBuf>,
  timeout: Option<Duration>,
}

impl ShellCommand {
  pub fn new<I, S>(program: &str, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      program: program.to_string(),
      args: args.into_iter().map(Into::into).collect(),
      current_dir: None,
      timeout: None,
    }
  }

  pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.current_dir = Some(dir.into());
    self
  }

  /// No limit unless set, a hung tool hangs the step
  pub fn timeout(mut self, limit: Option<Duration>) -> Self {
    self.timeout = limit;
    self
  }
}

#[async_trait]
impl TestCommand for ShellCommand {
  fn describe(&self) -> String {
    std::iter::once(self.program.as_str())
      .chain(self.args.iter().map(String::as_str))
      .collect::<Vec<_>>()
      .join(" ")
  }

  async fn run(&self, out: Multiplexer, err: Multiplexer) -> Result<CommandOutcome, CommandError> {
    let mut command = Command::new(&self.program);
    command
      .args(&self.args)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    if let Some(dir) = &self.current_dir {
      command.current_dir(dir);
    }
    // own process group, so a kill also reaches what the tool spawned (npm -> sh -> node)
    #[cfg(unix)]
    command.process_group(0);

    // type of `child` is `tokio::process::Child`
    let child = match command.spawn() {
      Ok(child) => child,
      Err(e) => {
        tracing::warn!(program = %self.program, error = %e, "could not start command");
        return Ok(CommandOutcome::FailedToStart(e));
      }
    };
    tracing::debug!(command = %self.describe(), pid = ?child.id(), "command started");

    let code = stream_child(&self.program, child, &out, &err, self.timeout).await?;
    tracing::debug!(command = %self.describe(), exit_code = %code, "command finished");
    Ok(CommandOutcome::Completed(code))
  }
}

/// Streams stdout and stderr of a spawned command, chunk by chunk, into their multiplexers
/// and waits for the child to exit.
/// On a sink failure or when `limit` is exceeded the child is killed and the error returned.
pub async fn stream_child(
  name: &str,
  mut child: Child,
  out: &Multiplexer,
  err: &Multiplexer,
  limit: Option<Duration>,
) -> Result<ExitCode, CommandError> {
  // gone once the child is reaped, so keep it for the kill below
  let pid = child.id();
  // Take the child's stdout and stderr handles
  let stdout = child.stdout.take();
  let stderr = child.stderr.take();

  // both pipes are drained concurrently so none of them can fill up and block the child,
  // each one stays sequential so chunk order is kept per stream
  let drained = async {
    tokio::try_join!(
      pump("stdout", stdout, out),
      pump("stderr", stderr, err),
    )?;
    child.wait().await.map_err(CommandError::Wait)
  };

  let finished = match limit {
    Some(limit) => timeout(limit, drained)
      .await
      .unwrap_or(Err(CommandError::TimedOut(limit))),
    None => drained.await,
  };

  match finished {
    Ok(status) => Ok(ExitCode(status.code())),
    Err(e) => {
      tracing::warn!(command = name, error = %e, "killing command");
      if let Some(pid) = pid {
        kill_process_group(pid);
      }
      let _ = child.kill().await;
      Err(e)
    }
  }
}

/// SIGKILL to the group led by `pid`. Not an error when the group is already gone
/// or the child was spawned without its own group.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
  use nix::sys::signal::{killpg, Signal};
  use nix::unistd::Pid;

  let Ok(raw) = i32::try_from(pid) else { return };
  if let Err(errno) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
    tracing::debug!(pid, %errno, "process group not signalled");
  }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

async fn pump<R: AsyncRead + Unpin>(
  stream: &'static str,
  reader: Option<R>,
  mux: &Multiplexer,
) -> Result<(), CommandError> {
  // not piped, nothing to forward
  let Some(mut reader) = reader else { return Ok(()) };
  let mut buf = vec![0u8; CHUNK_SIZE];
  loop {
    let n = reader
      .read(&mut buf)
      .await
      .map_err(|source| CommandError::Stream { stream, source })?;
    if n == 0 {
      // end of stream
      return Ok(());
    }
    mux
      .write_chunk(&buf[..n])
      .await
      .map_err(|source| CommandError::Stream { stream, source })?;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::multiplex::SharedWriter;
  use std::sync::Arc;

  fn capture() -> (SharedWriter<Vec<u8>>, Multiplexer) {
    let sink = SharedWriter::new(Vec::new());
    let mux = Multiplexer::default().with_sink(Arc::new(sink.clone()));
    (sink, mux)
  }

  fn sh(script: &str) -> ShellCommand {
    ShellCommand::new("sh", ["-c", script])
  }

  #[tokio::test]
  async fn separates_stdout_and_stderr() {
    let (out_sink, out) = capture();
    let (err_sink, err) = capture();
    let outcome = sh("echo PASS; echo '1 warning' >&2").run(out, err).await.unwrap();

    assert!(matches!(outcome, CommandOutcome::Completed(code) if code.success()));
    assert_eq!(out_sink.into_inner().await.unwrap(), b"PASS\n".to_vec());
    assert_eq!(err_sink.into_inner().await.unwrap(), b"1 warning\n".to_vec());
  }

  #[tokio::test]
  async fn reports_non_zero_exit() {
    let (_, out) = capture();
    let (_, err) = capture();
    let outcome = sh("exit 3").run(out, err).await.unwrap();
    assert!(matches!(outcome, CommandOutcome::Completed(ExitCode(Some(3)))));
  }

  #[tokio::test]
  async fn missing_program_is_failed_to_start() {
    let (_, out) = capture();
    let (_, err) = capture();
    let outcome = ShellCommand::new("definitely-not-a-real-tool-42", Vec::<String>::new())
      .run(out, err)
      .await
      .unwrap();
    assert!(matches!(outcome, CommandOutcome::FailedToStart(_)));
  }

  #[tokio::test]
  async fn timeout_kills_the_child() {
    let (_, out) = capture();
    let (_, err) = capture();
    let result = sh("sleep 5")
      .timeout(Some(Duration::from_millis(100)))
      .run(out, err)
      .await;
    assert!(matches!(result, Err(CommandError::TimedOut(_))));
  }

  #[tokio::test]
  async fn timeout_also_kills_what_the_child_spawned() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("still-running");
    let (_, out) = capture();
    let (_, err) = capture();
    // the inner shell stands for the test runner npm starts
    let script = format!("sh -c 'sleep 1; touch {}'; true", marker.display());
    let result = sh(&script)
      .timeout(Some(Duration::from_millis(200)))
      .run(out, err)
      .await;
    assert!(matches!(result, Err(CommandError::TimedOut(_))));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists());
  }

  #[test]
  fn describe_joins_program_and_args() {
    assert_eq!(ShellCommand::new("npm", ["run", "test"]).describe(), "npm run test");
  }
}
