use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

enum JoinState {
	/// Task handle still owned; the first joiner takes it.
	Handle(JoinHandle<()>),
	/// A joiner is awaiting the handle.
	Joining,
	/// Task has completed.
	Done,
}

/// Join coordination for a background task that several callers may want to await.
///
/// One caller becomes the leader that awaits the handle; the rest wait on the
/// notify until the leader records `Done`. A leader that times out puts the
/// handle back so a later join can finish the job.
pub struct TaskJoin {
	name: &'static str,
	state: Mutex<JoinState>,
	done: Notify,
}

impl TaskJoin {
	pub fn new(name: &'static str, handle: JoinHandle<()>) -> Self {
		Self {
			name,
			state: Mutex::new(JoinState::Handle(handle)),
			done: Notify::new(),
		}
	}

	/// Waits for the task to finish. Safe to call from several callers.
	pub async fn join(&self) {
		loop {
			let handle = {
				let mut state = self.state.lock().await;
				match &*state {
					JoinState::Done => return,
					JoinState::Joining => {
						// Register before unlocking so the leader's notify is not missed.
						let notified = self.done.notified();
						drop(state);
						notified.await;
						continue;
					}
					JoinState::Handle(_) => {
						let JoinState::Handle(handle) = std::mem::replace(&mut *state, JoinState::Joining) else {
							unreachable!()
						};
						handle
					}
				}
			};
			self.finish(handle.await).await;
			return;
		}
	}

	/// Waits up to `timeout`. Returns `true` if the task finished in time.
	pub async fn join_with_timeout(&self, timeout: Duration) -> bool {
		let deadline = tokio::time::Instant::now() + timeout;
		loop {
			let mut handle = {
				let mut state = self.state.lock().await;
				match &*state {
					JoinState::Done => return true,
					JoinState::Joining => {
						let notified = self.done.notified();
						drop(state);
						tokio::select! {
							_ = notified => continue,
							_ = tokio::time::sleep_until(deadline) => return false,
						}
					}
					JoinState::Handle(_) => {
						let JoinState::Handle(handle) = std::mem::replace(&mut *state, JoinState::Joining) else {
							unreachable!()
						};
						handle
					}
				}
			};
			tokio::select! {
				res = &mut handle => {
					self.finish(res).await;
					return true;
				}
				_ = tokio::time::sleep_until(deadline) => {
					*self.state.lock().await = JoinState::Handle(handle);
					self.done.notify_waiters();
					tracing::warn!(task = self.name, ?timeout, "worker.join.timeout");
					return false;
				}
			}
		}
	}

	async fn finish(&self, res: Result<(), tokio::task::JoinError>) {
		if let Err(err) = res {
			let message = crate::join_error_panic_message(err).unwrap_or_else(|| "cancelled".to_string());
			tracing::error!(task = self.name, %message, "worker.join.failed");
		}
		*self.state.lock().await = JoinState::Done;
		self.done.notify_waiters();
	}
}
