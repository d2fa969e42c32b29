//! Spawn helpers. Every spawn is tagged with its [`TaskClass`] in traces.
//!
//! The async helpers must be called from inside a tokio runtime; the session
//! only spawns from its own async methods.

use std::future::Future;
use std::thread;

use tokio::task::JoinHandle;

use crate::TaskClass;

pub fn spawn<F>(class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn");
	tokio::spawn(fut)
}

/// Runs blocking work on the runtime's blocking pool.
pub fn spawn_blocking<F, R>(class: TaskClass, f: F) -> JoinHandle<R>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn_blocking");
	tokio::task::spawn_blocking(f)
}

/// Starts a dedicated OS thread named `name`.
pub fn spawn_named_thread<F, R>(class: TaskClass, name: impl Into<String>, f: F) -> std::io::Result<thread::JoinHandle<R>>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	let name = name.into();
	tracing::trace!(worker_class = class.as_str(), thread = %name, "worker.spawn_named_thread");
	thread::Builder::new().name(name).spawn(f)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn tasks_run_on_the_calling_runtime() {
		let (tx, rx) = tokio::sync::oneshot::channel();
		let task = spawn(TaskClass::Background, async move {
			let _ = tx.send(());
			7
		});
		rx.await.expect("spawned task ran");
		assert_eq!(task.await.expect("task"), 7);

		let sum = spawn_blocking(TaskClass::Interactive, || 2 + 2).await.expect("blocking task");
		assert_eq!(sum, 4);
	}

	#[test]
	fn named_threads_carry_their_name() {
		let name = spawn_named_thread(TaskClass::Interpreter, "shellkeep-test", || thread::current().name().map(str::to_owned))
			.expect("spawn thread")
			.join()
			.expect("thread");
		assert_eq!(name.as_deref(), Some("shellkeep-test"));
	}
}
