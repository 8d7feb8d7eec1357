use tracing_subscriber::{fmt, EnvFilter};


/// Installs the `tracing` subscriber for the whole process.
/// Logs go to stderr so they never mix with the tool output captured from stdout.
/// Level comes from `RUST_LOG`, `info` when unset. Calling it twice is harmless.
pub fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let _ = fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .try_init();
}
