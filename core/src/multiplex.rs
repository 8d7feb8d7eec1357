//! Fan-out of child process output.
//!
//! A [`Multiplexer`] forwards every chunk it gets to each of its sinks, in order,
//! and only returns once all of them accepted it. The stdout and the stderr of a
//! child each get their own multiplexer; both usually share the log file sink.
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;


/// Anything that can take a chunk of output
#[async_trait]
pub trait ChunkSink: Send + Sync {
  async fn write_chunk(&self, chunk: &[u8]) -> io::Result<()>;
}

/// Writer shared between several multiplexers (ex: the log file fed by stdout and stderr).
/// Cloning gives another handle on the same writer.
pub struct SharedWriter<W> {
  inner: Arc<Mutex<W>>,
}

impl<W> Clone for SharedWriter<W> {
  fn clone(&self) -> Self {
    Self { inner: Arc::clone(&self.inner) }
  }
}

impl<W: AsyncWrite + Send + Unpin + 'static> SharedWriter<W> {
  pub fn new(writer: W) -> Self {
    Self { inner: Arc::new(Mutex::new(writer)) }
  }

  /// Flushes and hands back the writer if this is the last handle
  pub async fn into_inner(self) -> Option<W> {
    let mutex = Arc::try_unwrap(self.inner).ok()?;
    let mut writer = mutex.into_inner();
    writer.flush().await.ok()?;
    Some(writer)
  }
}

#[async_trait]
impl<W: AsyncWrite + Send + Unpin + 'static> ChunkSink for SharedWriter<W> {
  async fn write_chunk(&self, chunk: &[u8]) -> io::Result<()> {
    let mut writer = self.inner.lock().await;
    writer.write_all(chunk).await?;
    // flush each chunk so the file is never behind what the operator saw
    writer.flush().await
  }
}

/// Ordered list of sinks acting as one sink
#[derive(Clone, Default)]
pub struct Multiplexer {
  sinks: Vec<Arc<dyn ChunkSink>>,
}

impl Multiplexer {
  pub fn new(sinks: Vec<Arc<dyn ChunkSink>>) -> Self {
    Self { sinks }
  }

  pub fn with_sink(mut self, sink: Arc<dyn ChunkSink>) -> Self {
    self.sinks.push(sink);
    self
  }
}

#[async_trait]
impl ChunkSink for Multiplexer {
  async fn write_chunk(&self, chunk: &[u8]) -> io::Result<()> {
    for sink in &self.sinks {
      // first failing sink stops the fan-out, partial archival must surface
      sink.write_chunk(chunk).await?;
    }
    Ok(())
  }
}
