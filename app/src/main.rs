use anyhow::Result;
use shared_fn::logging::init_tracing;

// env (`.env` too) and pipeline config are read by the engine, see `engine::config`
#[tokio::main]
async fn main() -> Result<()> {
  init_tracing();
  engine::run().await
}
