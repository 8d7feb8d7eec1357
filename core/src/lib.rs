//! Reusable machinery for step implementers: layered configuration, output
//! multiplexing of a child process, the step result model and the executor
//! that ties them together.
pub mod cmd;
pub mod config;
pub mod context;
pub mod errors;
pub mod executor;
pub mod multiplex;
pub mod step_result;

pub use cmd::{CommandOutcome, ExitCode, ShellCommand, TestCommand};
pub use config::{ConfigResolver, ConfigSource, KeyKind, RequiredKey, StepDescriptor};
pub use context::{StepContext, WorkingDir};
pub use errors::{CommandError, ConfigValidationError, StepError, Violation};
pub use executor::{run_tool_with_output_artifact, Console, ToolReport};
pub use multiplex::{ChunkSink, Multiplexer, SharedWriter};
pub use step_result::{Artifact, ArtifactGuard, StepResult};
