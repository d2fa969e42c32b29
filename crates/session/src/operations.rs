//! Version-specific debugger operations, selected once at startup.

use shellkeep_engine::{Command, Debugger, EngineError, EngineVersion, Pipeline, Value};

use crate::SessionError;

/// Operations whose implementation depends on the interpreter version.
pub trait VersionOperations: Send + Sync {
	fn name(&self) -> &'static str;

	/// Asks a running script to break at its next statement.
	fn pause_debugger(&self, debugger: &dyn Debugger) -> Result<(), SessionError>;

	/// Runs `pipeline` in the stopped frame.
	fn execute_in_debugger(&self, debugger: &dyn Debugger, pipeline: &Pipeline) -> Result<Vec<Value>, SessionError>;
}

/// Version 5.0 and later: pause through step mode.
#[derive(Debug, Default)]
pub struct ModernOperations;

impl VersionOperations for ModernOperations {
	fn name(&self) -> &'static str {
		"modern"
	}

	fn pause_debugger(&self, debugger: &dyn Debugger) -> Result<(), SessionError> {
		debugger.set_step_mode(true);
		Ok(())
	}

	fn execute_in_debugger(&self, debugger: &dyn Debugger, pipeline: &Pipeline) -> Result<Vec<Value>, SessionError> {
		Ok(debugger.process_command(pipeline)?)
	}
}

fn pause_unsupported(version: &str) -> Result<(), SessionError> {
	tracing::warn!(version, "session.debugger.pause_unsupported");
	Err(EngineError::Unsupported(format!("pausing the debugger is not supported on version {version}")).into())
}

/// Version 4.x: no pause.
#[derive(Debug, Default)]
pub struct V4Operations;

impl VersionOperations for V4Operations {
	fn name(&self) -> &'static str {
		"v4"
	}

	fn pause_debugger(&self, _debugger: &dyn Debugger) -> Result<(), SessionError> {
		pause_unsupported("4")
	}

	fn execute_in_debugger(&self, debugger: &dyn Debugger, pipeline: &Pipeline) -> Result<Vec<Value>, SessionError> {
		Ok(debugger.process_command(pipeline)?)
	}
}

/// Version 3.x: no pause; nested output comes back as text.
#[derive(Debug, Default)]
pub struct V3Operations;

impl VersionOperations for V3Operations {
	fn name(&self) -> &'static str {
		"v3"
	}

	fn pause_debugger(&self, _debugger: &dyn Debugger) -> Result<(), SessionError> {
		pause_unsupported("3")
	}

	fn execute_in_debugger(&self, debugger: &dyn Debugger, pipeline: &Pipeline) -> Result<Vec<Value>, SessionError> {
		let pipeline = pipeline.clone().then(Command::new("Out-String"));
		Ok(debugger.process_command(&pipeline)?)
	}
}

/// Chooses the operations for `version`. Versions before 3.0 are unsupported.
pub fn select_operations(version: EngineVersion) -> Result<Box<dyn VersionOperations>, SessionError> {
	match version.major {
		5.. => Ok(Box::new(ModernOperations)),
		4 => Ok(Box::new(V4Operations)),
		3 => Ok(Box::new(V3Operations)),
		_ => Err(SessionError::UnsupportedVersion { version }),
	}
}
