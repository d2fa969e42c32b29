use shellkeep_engine::{DecodeError, EngineError, EngineVersion};

use crate::state::SessionState;

/// Failure delivered to a caller of the session.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
	#[error("session has not been started")]
	NotStarted,
	#[error("session is {state} and does not accept requests")]
	Rejected { state: SessionState },
	#[error("session was disposed")]
	Disposed,
	/// The request ran and the engine reported a failure.
	#[error(transparent)]
	Execution(#[from] EngineError),
	#[error("cannot decode engine output: {0}")]
	Decode(#[from] DecodeError),
	#[error("engine stayed busy after {attempts} attempts")]
	RetriesExhausted { attempts: u32 },
	#[error("debugger is not paused")]
	NotPaused,
	#[error("engine does not provide a debugger")]
	DebuggerUnavailable,
	#[error("engine version {version} is not supported")]
	UnsupportedVersion { version: EngineVersion },
	#[error("invalid session state transition from {from} to {to}")]
	InvalidTransition { from: SessionState, to: SessionState },
	#[error("request panicked: {0}")]
	Panicked(String),
	/// The result slot was dropped without being written.
	#[error("request was dropped without a result")]
	Abandoned,
	#[error("interpreter thread has exited")]
	InterpreterGone,
}

impl SessionError {
	/// Errors caused by calling the session in the wrong state, as opposed to
	/// failures of the work itself.
	pub fn is_usage_error(&self) -> bool {
		matches!(
			self,
			Self::NotStarted | Self::Rejected { .. } | Self::Disposed | Self::NotPaused | Self::DebuggerUnavailable | Self::InvalidTransition { .. }
		)
	}
}
