//! Execution coordinator for a single-threaded interpreter session.
//!
//! A [`Session`] owns one engine binding and serializes every request against
//! it: callers submit closures, pipelines or script text from any task and get
//! an [`ExecutionHandle`] that resolves once the request has run. The session
//! retries while the engine is busy, holds the queue while the debugger is
//! stopped and lets callers run nested commands inside the stopped frame.

mod config;
mod driver;
mod error;
mod executor;
mod host;
mod idle;
mod operations;
mod paths;
mod queue;
mod request;
mod session;
mod state;
mod suspension;

pub use shellkeep_engine as engine;

pub use config::{ConfigError, RetryPolicy, SessionConfig};
pub use error::SessionError;
pub use host::{ExecutionOptions, MemoryOutput, NullOutput, OutputSink, OutputType, format_error};
pub use operations::{ModernOperations, V3Operations, V4Operations, VersionOperations, select_operations};
pub use paths::{escape_path, unescape_path};
pub use request::ExecutionHandle;
pub use session::{EngineDetails, Session};
pub use state::SessionState;
pub use suspension::{BreakpointUpdatedEvent, DebuggerStoppedEvent, Suspension};
