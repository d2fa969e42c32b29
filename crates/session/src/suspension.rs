//! Debugger suspension: whether the engine is stopped in a debugger break.
//!
//! While paused, the driver does not start queued requests. Nested commands run
//! against the stopped frame and are serialized by an async gate; a resume verb
//! waits for that gate so it never lands in the middle of a nested command.
//! Nothing resumes automatically.

use shellkeep_engine::{BreakpointUpdate, DebuggerStop, EngineError, ResumeAction};
use tokio::sync::{Mutex, MutexGuard, broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::SessionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suspension {
	Active,
	Paused {
		stop: DebuggerStop,
		/// Verb being applied. Unset for the whole stop until `resume` is called.
		resume: Option<ResumeAction>,
	},
}

/// Delivered to subscribers when the engine stops in the debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggerStoppedEvent {
	pub stop: DebuggerStop,
}

/// Delivered to subscribers when a breakpoint is added or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointUpdatedEvent {
	pub update: BreakpointUpdate,
}

pub(crate) struct DebuggerSuspension {
	state: watch::Sender<Suspension>,
	stopped: broadcast::Sender<DebuggerStoppedEvent>,
	breakpoints: broadcast::Sender<BreakpointUpdatedEvent>,
	nested: Mutex<()>,
}

impl DebuggerSuspension {
	pub(crate) fn new(event_buffer: usize) -> Self {
		Self {
			state: watch::Sender::new(Suspension::Active),
			stopped: broadcast::channel(event_buffer).0,
			breakpoints: broadcast::channel(event_buffer).0,
			nested: Mutex::new(()),
		}
	}

	/// Records the stop, then notifies subscribers.
	pub(crate) fn on_debugger_stopped(&self, stop: DebuggerStop) {
		tracing::debug!(reason = ?stop.reason, line = stop.line, "session.debugger.paused");
		self.state.send_replace(Suspension::Paused {
			stop: stop.clone(),
			resume: None,
		});
		let _ = self.stopped.send(DebuggerStoppedEvent { stop });
	}

	pub(crate) fn on_breakpoint_updated(&self, update: BreakpointUpdate) {
		tracing::trace!(id = update.breakpoint.id, kind = ?update.kind, "session.debugger.breakpoint");
		let _ = self.breakpoints.send(BreakpointUpdatedEvent { update });
	}

	pub(crate) fn is_paused(&self) -> bool {
		matches!(*self.state.borrow(), Suspension::Paused { .. })
	}

	pub(crate) fn current(&self) -> Suspension {
		self.state.borrow().clone()
	}

	/// Waits until not paused. Returns `false` if `cancel` fired first.
	pub(crate) async fn wait_active(&self, cancel: &CancellationToken) -> bool {
		let mut rx = self.state.subscribe();
		tokio::select! {
			biased;
			_ = cancel.cancelled() => false,
			res = rx.wait_for(|s| matches!(s, Suspension::Active)) => res.is_ok(),
		}
	}

	/// Serializes nested executions against each other and against resume.
	pub(crate) async fn nested_gate(&self) -> MutexGuard<'_, ()> {
		self.nested.lock().await
	}

	/// Records `action` once in-flight nested commands finish, clears the
	/// pause, then applies the verb through `apply`.
	///
	/// The flag is cleared before the engine sees the verb. A verb that fails
	/// while the engine is still stopped restores the pause.
	pub(crate) async fn resume(&self, action: ResumeAction, apply: impl FnOnce(ResumeAction) -> Result<(), SessionError>) -> Result<(), SessionError> {
		if !self.is_paused() {
			return Err(SessionError::NotPaused);
		}
		let _gate = self.nested_gate().await;
		let recorded = self.state.send_if_modified(|state| match state {
			Suspension::Paused { resume, .. } => {
				*resume = Some(action);
				true
			}
			Suspension::Active => false,
		});
		if !recorded {
			return Err(SessionError::NotPaused);
		}
		let Suspension::Paused { stop, .. } = self.state.send_replace(Suspension::Active) else {
			return Err(SessionError::NotPaused);
		};

		let result = apply(action);
		if let Err(error) = &result
			&& !matches!(error, SessionError::Execution(EngineError::NotStopped))
		{
			self.state.send_if_modified(|state| match state {
				Suspension::Active => {
					*state = Suspension::Paused { stop, resume: None };
					true
				}
				Suspension::Paused { .. } => false,
			});
		}
		tracing::debug!(action = action.as_str(), ok = result.is_ok(), "session.debugger.resumed");
		result
	}

	pub(crate) fn subscribe_stopped(&self) -> broadcast::Receiver<DebuggerStoppedEvent> {
		self.stopped.subscribe()
	}

	pub(crate) fn subscribe_breakpoints(&self) -> broadcast::Receiver<BreakpointUpdatedEvent> {
		self.breakpoints.subscribe()
	}
}
