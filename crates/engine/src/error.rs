use std::fmt;

/// Location of a statement in script text. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPosition {
	/// Script file, or `None` for inline script text.
	pub file: Option<String>,
	pub line: u32,
	pub column: u32,
}

impl ScriptPosition {
	pub fn new(file: Option<String>, line: u32, column: u32) -> Self {
		Self { file, line, column }
	}
}

impl fmt::Display for ScriptPosition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.file {
			Some(file) => write!(f, "{file}:{}:{}", self.line, self.column),
			None => write!(f, "line {}, column {}", self.line, self.column),
		}
	}
}

/// Failure reported by an [`Engine`](crate::Engine) or its debugger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
	/// Another operation owns the interpreter. Transient.
	#[error("engine is busy running another operation")]
	Busy,
	#[error("parse error at {position}: {message}")]
	Parse { message: String, position: ScriptPosition },
	#[error("{message}")]
	Runtime { message: String, position: Option<ScriptPosition> },
	/// Execution was ended by a `Stop` resume action.
	#[error("execution was stopped by the debugger")]
	Stopped,
	#[error("debugger is not stopped")]
	NotStopped,
	#[error("unsupported operation: {0}")]
	Unsupported(String),
}

impl EngineError {
	pub fn runtime(message: impl Into<String>) -> Self {
		Self::Runtime {
			message: message.into(),
			position: None,
		}
	}

	pub fn is_busy(&self) -> bool {
		matches!(self, Self::Busy)
	}

	/// Where the failing statement is, when the engine knows.
	pub fn position(&self) -> Option<&ScriptPosition> {
		match self {
			Self::Parse { position, .. } => Some(position),
			Self::Runtime { position, .. } => position.as_ref(),
			_ => None,
		}
	}

	/// The message without position decoration.
	pub fn message(&self) -> String {
		match self {
			Self::Parse { message, .. } | Self::Runtime { message, .. } => message.clone(),
			other => other.to_string(),
		}
	}
}
