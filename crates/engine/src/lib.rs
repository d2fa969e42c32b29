//! Interpreter boundary for shellkeep.
//!
//! An [`Engine`] is a stateful, single-threaded interpreter session: it runs one
//! [`Pipeline`] at a time and reports [`EngineError::Busy`] when asked to run a
//! second one concurrently. Engines publish [`EngineEvent`]s (idle, availability,
//! debugger stops, breakpoint changes) on a broadcast channel and may expose a
//! [`Debugger`] that can evaluate commands against a stopped frame.
//!
//! [`ScriptEngine`] is a small reference interpreter implementing both traits.

mod error;
mod event;
mod pipeline;
mod script;
mod value;
mod version;

pub use error::{EngineError, ScriptPosition};
pub use event::{Availability, Breakpoint, BreakpointUpdate, BreakpointUpdateKind, DebuggerStop, EngineEvent, ResumeAction, StopReason};
pub use pipeline::{Command, CommandKind, Parameter, Pipeline};
pub use script::ScriptEngine;
pub use value::{DecodeError, FromValue, Value};
pub use version::{EngineVersion, VersionParseError, VersionTable};
use tokio::sync::broadcast;

/// A live interpreter session.
///
/// All methods may be called from any thread. Implementations serialize
/// execution internally and reject overlapping work with [`EngineError::Busy`]
/// instead of blocking.
pub trait Engine: Send + Sync + 'static {
	/// Runs `pipeline` to completion and returns its output.
	fn invoke(&self, pipeline: &Pipeline) -> Result<Vec<Value>, EngineError>;

	/// Reads a session variable. `Ok(None)` when it is not defined.
	fn get_variable(&self, name: &str) -> Result<Option<Value>, EngineError>;

	/// Reports the interpreter version and edition.
	fn version_table(&self) -> Result<VersionTable, EngineError>;

	/// The engine's debugger, if it has one.
	fn debugger(&self) -> Option<&dyn Debugger>;

	/// Subscribes to engine notifications.
	fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;

	fn availability(&self) -> Availability;
}

/// Debugger attached to an [`Engine`].
pub trait Debugger: Send + Sync {
	/// Evaluates `pipeline` in the stopped frame.
	///
	/// Returns [`EngineError::NotStopped`] when the debugger is not stopped.
	fn process_command(&self, pipeline: &Pipeline) -> Result<Vec<Value>, EngineError>;

	/// Leaves the current stop with `action`.
	fn resume(&self, action: ResumeAction) -> Result<(), EngineError>;

	/// When enabled, execution stops before the next statement.
	fn set_step_mode(&self, enabled: bool);

	fn is_stopped(&self) -> bool;
}
