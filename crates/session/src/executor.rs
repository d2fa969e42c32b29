//! Dedicated interpreter thread.
//!
//! Engine calls block, so they run on one named OS thread that owns the engine
//! binding and processes attempts strictly one at a time. The async driver sends
//! an attempt and awaits the outcome; a busy request travels back to the driver
//! so it can be retried after backoff.
//!
//! The caller's tracing span is entered on the thread while its request runs.
//! Panics inside a payload are caught and delivered to that request as
//! [`SessionError::Panicked`]; the thread keeps serving later attempts.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use shellkeep_engine::Engine;
use shellkeep_worker::{TaskClass, panic_message, spawn_named_thread};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::SessionError;
use crate::request::{Attempt, BoxedRequest};

const SHUTDOWN_ACK_TIMEOUT: Duration = Duration::from_millis(100);

enum Job<E> {
	Attempt {
		request: BoxedRequest<E>,
		reply: oneshot::Sender<AttemptOutcome<E>>,
	},
	Shutdown {
		ack: oneshot::Sender<()>,
	},
}

pub(crate) enum AttemptOutcome<E> {
	/// The request's completion slot was written. `failure` describes a failed result.
	Finished { failure: Option<String> },
	/// The engine was busy; the request is handed back untouched.
	Busy(BoxedRequest<E>),
}

/// Owner of the interpreter thread. Dropping it shuts the thread down.
pub(crate) struct InterpreterThread<E> {
	tx: mpsc::Sender<Job<E>>,
}

impl<E: Engine> InterpreterThread<E> {
	pub(crate) fn spawn(engine: Arc<E>) -> std::io::Result<Self> {
		let (tx, rx) = mpsc::channel::<Job<E>>();
		spawn_named_thread(TaskClass::Interpreter, "shellkeep-interpreter", move || {
			while let Ok(job) = rx.recv() {
				match job {
					Job::Attempt { mut request, reply } => {
						let span = request.span().clone();
						let _guard = span.enter();
						let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| request.attempt(&engine))) {
							Ok(Attempt::Busy) => AttemptOutcome::Busy(request),
							Ok(Attempt::Completed) => AttemptOutcome::Finished { failure: None },
							Ok(Attempt::Failed(message)) => AttemptOutcome::Finished { failure: Some(message) },
							Err(payload) => {
								let message = panic_message(payload.as_ref()).unwrap_or_else(|| "<non-string panic payload>".to_string());
								tracing::error!(id = request.id(), %message, "session.interpreter.panic");
								request.reject(SessionError::Panicked(message.clone()));
								AttemptOutcome::Finished {
									failure: Some(format!("panicked: {message}")),
								}
							}
						};
						let _ = reply.send(outcome);
					}
					Job::Shutdown { ack } => {
						let _ = ack.send(());
						break;
					}
				}
			}
			tracing::debug!("session.interpreter.exit");
		})?;
		Ok(Self { tx })
	}

	/// Runs one attempt of `request` on the interpreter thread.
	///
	/// If the thread is gone the request is rejected with
	/// [`SessionError::InterpreterGone`].
	pub(crate) async fn attempt(&self, request: BoxedRequest<E>) -> Result<AttemptOutcome<E>, SessionError> {
		let (reply_tx, reply_rx) = oneshot::channel();
		if let Err(err) = self.tx.send(Job::Attempt { request, reply: reply_tx }) {
			if let Job::Attempt { request, .. } = err.0 {
				request.reject(SessionError::InterpreterGone);
			}
			return Err(SessionError::InterpreterGone);
		}
		reply_rx.await.map_err(|_| SessionError::InterpreterGone)
	}
}

impl<E> Drop for InterpreterThread<E> {
	fn drop(&mut self) {
		let (ack_tx, mut ack_rx) = oneshot::channel();
		if self.tx.send(Job::Shutdown { ack: ack_tx }).is_err() {
			return;
		}

		let deadline = Instant::now() + SHUTDOWN_ACK_TIMEOUT;
		loop {
			match ack_rx.try_recv() {
				Ok(()) | Err(TryRecvError::Closed) => return,
				Err(TryRecvError::Empty) => {
					if Instant::now() >= deadline {
						tracing::debug!("session.interpreter.shutdown_pending");
						return;
					}
					thread::yield_now();
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use shellkeep_engine::{EngineError, ScriptEngine};

	use super::*;
	use crate::request::{ExecutionHandle, ExecutionRequest, Payload, RequestKind};

	fn function_request<T, F>(id: u64, f: F) -> (BoxedRequest<ScriptEngine>, ExecutionHandle<T>)
	where
		T: Send + 'static,
		F: FnMut(&ScriptEngine) -> Result<T, EngineError> + Send + 'static,
	{
		let (request, handle) = ExecutionRequest::new(id, RequestKind::Function, Payload::Function(Box::new(f)));
		(Box::new(request), handle)
	}

	#[tokio::test]
	async fn runs_attempts_on_the_named_thread() {
		let interpreter = InterpreterThread::spawn(Arc::new(ScriptEngine::new())).expect("spawn");
		let (request, handle) = function_request(1, |_| Ok(thread::current().name().map(str::to_string)));
		assert!(matches!(interpreter.attempt(request).await, Ok(AttemptOutcome::Finished { failure: None })));
		assert_eq!(handle.await, Ok(Some("shellkeep-interpreter".to_string())));
	}

	#[tokio::test]
	async fn busy_requests_come_back() {
		let interpreter = InterpreterThread::spawn(Arc::new(ScriptEngine::new())).expect("spawn");
		let (request, _handle) = function_request::<(), _>(2, |_| Err(EngineError::Busy));
		match interpreter.attempt(request).await {
			Ok(AttemptOutcome::Busy(request)) => assert_eq!(request.id(), 2),
			_ => panic!("expected the request back"),
		}
	}

	#[tokio::test]
	async fn panics_are_isolated_to_their_request() {
		let interpreter = InterpreterThread::spawn(Arc::new(ScriptEngine::new())).expect("spawn");
		let (request, handle) = function_request::<(), _>(3, |_| panic!("payload exploded"));
		match interpreter.attempt(request).await {
			Ok(AttemptOutcome::Finished { failure: Some(message) }) => assert!(message.contains("payload exploded")),
			_ => panic!("expected a finished failure"),
		}
		assert_eq!(handle.await, Err(SessionError::Panicked("payload exploded".to_string())));

		let (request, handle) = function_request(4, |_| Ok(5));
		interpreter.attempt(request).await.expect("thread still alive");
		assert_eq!(handle.await, Ok(5));
	}
}
