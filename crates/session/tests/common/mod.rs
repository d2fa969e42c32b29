//! Shared fixtures for session integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use shellkeep_session::engine::{Availability, Engine, Pipeline, ScriptEngine, Value};
use shellkeep_session::{DebuggerStoppedEvent, Session, SessionConfig};
use tokio::sync::broadcast;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A started session over `engine`, with the engine handle kept for direct access.
pub async fn started(engine: ScriptEngine) -> (Arc<ScriptEngine>, Session<ScriptEngine>) {
	started_with(engine, SessionConfig::default()).await
}

pub async fn started_with(engine: ScriptEngine, config: SessionConfig) -> (Arc<ScriptEngine>, Session<ScriptEngine>) {
	init_tracing();
	let engine = Arc::new(engine);
	let session = Session::new(Arc::clone(&engine), config).expect("valid config");
	session.start().await.expect("session starts");
	(engine, session)
}

/// Keeps the engine busy from outside the session for `millis`.
pub async fn hold_busy(engine: &Arc<ScriptEngine>, millis: u64) -> thread::JoinHandle<Vec<Value>> {
	let outside = thread::spawn({
		let engine = Arc::clone(engine);
		move || {
			engine
				.invoke(&Pipeline::script(format!("Start-Sleep -Milliseconds {millis}; 'outside'")))
				.expect("outside invocation")
		}
	});
	wait_until(|| engine.availability() == Availability::Busy).await;
	outside
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
	tokio::time::timeout(TIMEOUT, async {
		while !condition() {
			tokio::time::sleep(Duration::from_millis(2)).await;
		}
	})
	.await
	.expect("condition never became true");
}

pub async fn next_stop(rx: &mut broadcast::Receiver<DebuggerStoppedEvent>) -> DebuggerStoppedEvent {
	tokio::time::timeout(TIMEOUT, rx.recv())
		.await
		.expect("debugger never stopped")
		.expect("stop channel open")
}
