//! Idle trigger and the engine notification pump.

use std::sync::Arc;

use shellkeep_engine::EngineEvent;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::suspension::DebuggerSuspension;

/// Wakes a driver sleeping in busy backoff when the engine goes idle.
///
/// Each idle signal bumps a generation. A waiter only counts signals fired
/// after it called [`IdleTrigger::since_now`], so an idle left over from an
/// earlier request cannot cut a fresh backoff short.
#[derive(Debug)]
pub(crate) struct IdleTrigger {
	generation: watch::Sender<u64>,
}

impl Default for IdleTrigger {
	fn default() -> Self {
		Self {
			generation: watch::Sender::new(0),
		}
	}
}

impl IdleTrigger {
	pub(crate) fn fire(&self) {
		self.generation.send_modify(|generation| *generation = generation.wrapping_add(1));
	}

	/// Starts watching for idle signals fired from now on.
	pub(crate) fn since_now(&self) -> IdleWatch {
		IdleWatch(self.generation.subscribe())
	}
}

/// Idle signals observed since [`IdleTrigger::since_now`].
pub(crate) struct IdleWatch(watch::Receiver<u64>);

impl IdleWatch {
	/// Resolves once the trigger fires after this watch was taken.
	pub(crate) async fn fired(&mut self) {
		if self.0.changed().await.is_err() {
			// Trigger dropped with the session; never wake.
			std::future::pending::<()>().await;
		}
	}
}

/// Forwards engine notifications until `shutdown` fires or the engine's channel closes.
pub(crate) async fn pump_events(
	mut events: broadcast::Receiver<EngineEvent>,
	idle: Arc<IdleTrigger>,
	suspension: Arc<DebuggerSuspension>,
	shutdown: CancellationToken,
) {
	loop {
		let event = tokio::select! {
			biased;
			_ = shutdown.cancelled() => break,
			event = events.recv() => event,
		};
		match event {
			Ok(EngineEvent::Idle) => idle.fire(),
			Ok(EngineEvent::DebuggerStopped(stop)) => suspension.on_debugger_stopped(stop),
			Ok(EngineEvent::BreakpointUpdated(update)) => suspension.on_breakpoint_updated(update),
			Ok(EngineEvent::AvailabilityChanged(availability)) => {
				tracing::trace!(availability = availability.as_str(), "session.engine.availability");
			}
			Err(broadcast::error::RecvError::Lagged(skipped)) => {
				tracing::warn!(skipped, "session.events.lagged");
				// An idle signal may be among the skipped events.
				idle.fire();
			}
			Err(broadcast::error::RecvError::Closed) => break,
		}
	}
	tracing::debug!("session.events.exit");
}
