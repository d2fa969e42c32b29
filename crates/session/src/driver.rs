//! The single consumer of the request queue.
//!
//! Dequeues in insertion order, waits out debugger pauses, and runs each request
//! on the interpreter thread. A busy engine puts the same request into backoff
//! (cut short by the idle trigger) and retries it in place; nothing behind it
//! runs first. Any other outcome is final for that request only.

use std::sync::Arc;

use shellkeep_engine::Engine;
use tokio_util::sync::CancellationToken;

use crate::SessionError;
use crate::config::RetryPolicy;
use crate::executor::{AttemptOutcome, InterpreterThread};
use crate::idle::IdleTrigger;
use crate::queue::RequestStream;
use crate::request::BoxedRequest;
use crate::state::StateCell;
use crate::suspension::DebuggerSuspension;

pub(crate) struct Driver<E> {
	pub(crate) requests: RequestStream<E>,
	pub(crate) interpreter: InterpreterThread<E>,
	pub(crate) suspension: Arc<DebuggerSuspension>,
	pub(crate) idle: Arc<IdleTrigger>,
	pub(crate) state: Arc<StateCell>,
	pub(crate) retry: RetryPolicy,
	pub(crate) shutdown: CancellationToken,
}

impl<E: Engine> Driver<E> {
	pub(crate) async fn run(mut self) {
		tracing::debug!("session.driver.start");
		while let Some(request) = self.requests.dequeue(&self.shutdown).await {
			if !self.suspension.wait_active(&self.shutdown).await {
				request.reject(SessionError::Disposed);
				break;
			}
			self.state.mark_running();
			self.execute(request).await;
			self.state.mark_idle();
		}

		let pending = self.requests.drain();
		let rejected = pending.len();
		for request in pending {
			request.reject(SessionError::Disposed);
		}
		tracing::debug!(rejected, "session.driver.exit");
	}

	async fn execute(&self, mut request: BoxedRequest<E>) {
		let id = request.id();
		let kind = request.kind().as_str();
		let mut attempts: u32 = 0;
		loop {
			attempts += 1;
			let returned = match self.interpreter.attempt(request).await {
				Ok(AttemptOutcome::Finished { failure: None }) => {
					tracing::trace!(id, kind, attempts, "session.request.completed");
					return;
				}
				Ok(AttemptOutcome::Finished { failure: Some(error) }) => {
					tracing::warn!(id, kind, %error, "session.request.failed");
					return;
				}
				Err(error) => {
					tracing::error!(id, kind, %error, "session.request.lost");
					return;
				}
				Ok(AttemptOutcome::Busy(returned)) => returned,
			};

			if self.retry.exhausted(attempts) {
				tracing::warn!(id, kind, attempts, "session.request.retries_exhausted");
				returned.reject(SessionError::RetriesExhausted { attempts });
				return;
			}
			tracing::debug!(id, kind, attempts, "session.request.retry");
			request = returned;

			let mut idle = self.idle.since_now();
			let resumed = tokio::select! {
				biased;
				_ = self.shutdown.cancelled() => false,
				_ = idle.fired() => true,
				_ = tokio::time::sleep(self.retry.interval()) => true,
			};
			if !resumed || !self.suspension.wait_active(&self.shutdown).await {
				request.reject(SessionError::Disposed);
				return;
			}
		}
	}
}
