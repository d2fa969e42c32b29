use std::fmt;

use tokio::sync::watch;

use crate::SessionError;

/// Lifecycle of a session.
///
/// `NotStarted → Ready ⇄ Running → Aborting → Disposed`. Any state may move to
/// `Disposed`; nothing leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
	NotStarted,
	Ready,
	Running,
	Aborting,
	Disposed,
}

impl SessionState {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::NotStarted => "not_started",
			Self::Ready => "ready",
			Self::Running => "running",
			Self::Aborting => "aborting",
			Self::Disposed => "disposed",
		}
	}

	/// Whether new requests are accepted.
	pub const fn accepts_requests(self) -> bool {
		matches!(self, Self::Ready | Self::Running)
	}

	const fn can_transition_to(self, to: Self) -> bool {
		use SessionState::*;
		matches!(
			(self, to),
			(NotStarted, Ready) | (Ready, Running) | (Running, Ready) | (Ready | Running, Aborting) | (NotStarted | Ready | Running | Aborting, Disposed)
		)
	}

	/// Error for a request submitted in this state.
	pub(crate) fn rejection(self) -> SessionError {
		match self {
			Self::NotStarted => SessionError::NotStarted,
			Self::Disposed => SessionError::Disposed,
			state => SessionError::Rejected { state },
		}
	}
}

impl fmt::Display for SessionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Observable session state with validated transitions.
pub(crate) struct StateCell {
	tx: watch::Sender<SessionState>,
}

impl StateCell {
	pub(crate) fn new() -> Self {
		Self {
			tx: watch::Sender::new(SessionState::NotStarted),
		}
	}

	pub(crate) fn get(&self) -> SessionState {
		*self.tx.borrow()
	}

	pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
		self.tx.subscribe()
	}

	/// Moves to `to`, returning the previous state.
	pub(crate) fn transition(&self, to: SessionState) -> Result<SessionState, SessionError> {
		let mut outcome = Err(SessionError::InvalidTransition { from: to, to });
		self.tx.send_if_modified(|state| {
			let from = *state;
			if !from.can_transition_to(to) {
				outcome = Err(SessionError::InvalidTransition { from, to });
				return false;
			}
			*state = to;
			outcome = Ok(from);
			true
		});
		if let Ok(from) = outcome {
			tracing::debug!(from = from.as_str(), to = to.as_str(), "session.state");
		}
		outcome
	}

	/// `Ready → Running`; no-op in any other state.
	pub(crate) fn mark_running(&self) {
		self.swap(SessionState::Ready, SessionState::Running);
	}

	/// `Running → Ready`; no-op in any other state.
	pub(crate) fn mark_idle(&self) {
		self.swap(SessionState::Running, SessionState::Ready);
	}

	fn swap(&self, from: SessionState, to: SessionState) {
		let changed = self.tx.send_if_modified(|state| {
			if *state != from {
				return false;
			}
			*state = to;
			true
		});
		if changed {
			tracing::trace!(from = from.as_str(), to = to.as_str(), "session.state");
		}
	}
}
