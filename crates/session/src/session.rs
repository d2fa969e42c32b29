use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use shellkeep_engine::{Command, Engine, EngineError, EngineVersion, FromValue, Pipeline, ResumeAction, Value, VersionTable};
use shellkeep_worker::{TaskClass, TaskJoin, join_error_panic_message, spawn, spawn_blocking};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, SessionConfig};
use crate::driver::Driver;
use crate::executor::InterpreterThread;
use crate::host::{ExecutionOptions, NullOutput, OutputSink};
use crate::idle::{IdleTrigger, pump_events};
use crate::operations::{VersionOperations, select_operations};
use crate::paths::escape_path;
use crate::queue::{RequestQueue, RequestStream, request_queue};
use crate::request::{Decoder, ExecutionHandle, ExecutionRequest, Payload, RequestKind, decode_each, discard};
use crate::state::{SessionState, StateCell};
use crate::suspension::{BreakpointUpdatedEvent, DebuggerStoppedEvent, DebuggerSuspension, Suspension};
use crate::SessionError;

/// Interpreter version and edition negotiated by [`Session::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineDetails {
	pub version: EngineVersion,
	pub edition: String,
}

struct Inner<E> {
	config: SessionConfig,
	fallback_version: EngineVersion,
	/// Engine binding; released by `dispose`.
	engine: Mutex<Option<Arc<E>>>,
	state: Arc<StateCell>,
	queue: RequestQueue<E>,
	/// Consumer side until `start` hands it to the driver.
	stream: Mutex<Option<RequestStream<E>>>,
	suspension: Arc<DebuggerSuspension>,
	idle: Arc<IdleTrigger>,
	shutdown: CancellationToken,
	sink: Arc<dyn OutputSink>,
	/// Last request id. Held across enqueue so ids follow queue order.
	next_id: Mutex<u64>,
	operations: OnceLock<Arc<dyn VersionOperations>>,
	details: OnceLock<EngineDetails>,
	tasks: Mutex<Vec<TaskJoin>>,
	/// Serializes start, abort and dispose.
	lifecycle: tokio::sync::Mutex<()>,
}

impl<E> Drop for Inner<E> {
	fn drop(&mut self) {
		self.shutdown.cancel();
	}
}

/// Shares one single-threaded interpreter session between concurrent callers.
///
/// Requests from any number of callers are queued and executed one at a time
/// in submission order. A busy engine is retried in place; a debugger stop
/// holds the queue until [`Session::resume`]. The handle is cheap to clone.
pub struct Session<E> {
	inner: Arc<Inner<E>>,
}

impl<E> Clone for Session<E> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<E: Engine> Session<E> {
	pub fn new(engine: Arc<E>, config: SessionConfig) -> Result<Self, ConfigError> {
		Self::with_output(engine, config, Arc::new(NullOutput))
	}

	/// Like [`Session::new`], writing host output to `sink`.
	pub fn with_output(engine: Arc<E>, config: SessionConfig, sink: Arc<dyn OutputSink>) -> Result<Self, ConfigError> {
		config.validate()?;
		let fallback_version = config.fallback_version()?;
		let (queue, stream) = request_queue();
		Ok(Self {
			inner: Arc::new(Inner {
				fallback_version,
				engine: Mutex::new(Some(engine)),
				state: Arc::new(StateCell::new()),
				queue,
				stream: Mutex::new(Some(stream)),
				suspension: Arc::new(DebuggerSuspension::new(config.event_buffer)),
				idle: Arc::new(IdleTrigger::default()),
				shutdown: CancellationToken::new(),
				sink,
				next_id: Mutex::new(0),
				operations: OnceLock::new(),
				details: OnceLock::new(),
				tasks: Mutex::new(Vec::new()),
				lifecycle: tokio::sync::Mutex::new(()),
				config,
			}),
		})
	}

	/// Starts the driver and negotiates the engine version.
	///
	/// Version detection goes through the queue like any request, so a busy
	/// engine delays startup instead of failing it. An unsupported version
	/// disposes the session.
	pub async fn start(&self) -> Result<EngineDetails, SessionError> {
		let _lifecycle = self.inner.lifecycle.lock().await;
		match self.inner.state.get() {
			SessionState::NotStarted => {}
			SessionState::Disposed => return Err(SessionError::Disposed),
			from => {
				return Err(SessionError::InvalidTransition {
					from,
					to: SessionState::Ready,
				});
			}
		}
		let engine = self.engine()?;
		let stream = self.inner.stream.lock().take().ok_or(SessionError::Disposed)?;
		let interpreter = InterpreterThread::spawn(Arc::clone(&engine)).map_err(|error| {
			tracing::error!(%error, "session.interpreter.spawn_failed");
			SessionError::InterpreterGone
		})?;

		let pump = spawn(
			TaskClass::Background,
			pump_events(
				engine.subscribe(),
				Arc::clone(&self.inner.idle),
				Arc::clone(&self.inner.suspension),
				self.inner.shutdown.clone(),
			),
		);
		let driver = Driver {
			requests: stream,
			interpreter,
			suspension: Arc::clone(&self.inner.suspension),
			idle: Arc::clone(&self.inner.idle),
			state: Arc::clone(&self.inner.state),
			retry: self.inner.config.busy_retry.clone(),
			shutdown: self.inner.shutdown.clone(),
		};
		let driver = spawn(TaskClass::Interactive, driver.run());
		self.inner
			.tasks
			.lock()
			.extend([TaskJoin::new("session.driver", driver), TaskJoin::new("session.events", pump)]);

		let table = match self.detect_version()?.await {
			Ok(table) => table,
			Err(error) => {
				tracing::error!(%error, "session.start.failed");
				self.dispose_locked().await;
				return Err(error);
			}
		};
		let operations = match select_operations(table.version) {
			Ok(operations) => Arc::<dyn VersionOperations>::from(operations),
			Err(error) => {
				tracing::error!(version = %table.version, "session.start.unsupported_version");
				self.dispose_locked().await;
				return Err(error);
			}
		};
		let operations_name = operations.name();
		let _ = self.inner.operations.set(operations);
		let details = EngineDetails {
			version: table.version,
			edition: table.edition,
		};
		let _ = self.inner.details.set(details.clone());
		self.inner.state.transition(SessionState::Ready)?;
		tracing::info!(version = %details.version, edition = %details.edition, operations = operations_name, "session.started");
		Ok(details)
	}

	fn detect_version(&self) -> Result<ExecutionHandle<VersionTable>, SessionError> {
		let fallback = VersionTable::new(self.inner.fallback_version, self.inner.config.fallback_edition.clone());
		let payload = Payload::Function(Box::new(move |engine: &E| match engine.version_table() {
			Err(EngineError::Busy) => Err(EngineError::Busy),
			Err(error) => {
				tracing::warn!(%error, version = %fallback.version, edition = %fallback.edition, "session.version.fallback");
				Ok(fallback.clone())
			}
			ok => ok,
		}));
		self.push(RequestKind::Startup, payload)
	}

	pub fn details(&self) -> Option<EngineDetails> {
		self.inner.details.get().cloned()
	}

	pub fn state(&self) -> SessionState {
		self.inner.state.get()
	}

	pub fn state_changes(&self) -> watch::Receiver<SessionState> {
		self.inner.state.subscribe()
	}

	/// Requests waiting in the queue, not counting the one executing.
	pub fn pending(&self) -> usize {
		self.inner.queue.len()
	}

	/// Queues `f` to run against the engine. It may run more than once if the
	/// engine reports busy, so it must be safe to repeat.
	pub fn submit_with<T, F>(&self, f: F) -> Result<ExecutionHandle<T>, SessionError>
	where
		T: Send + 'static,
		F: FnMut(&E) -> Result<T, EngineError> + Send + 'static,
	{
		self.submit(RequestKind::Function, Payload::Function(Box::new(f)))
	}

	pub async fn execute_with<T, F>(&self, f: F) -> Result<T, SessionError>
	where
		T: Send + 'static,
		F: FnMut(&E) -> Result<T, EngineError> + Send + 'static,
	{
		self.submit_with(f)?.await
	}

	/// Queues a pipeline whose output decodes item by item into `T`.
	pub fn submit_command<T>(&self, pipeline: Pipeline, options: ExecutionOptions) -> Result<ExecutionHandle<Vec<T>>, SessionError>
	where
		T: FromValue + Send + 'static,
	{
		self.submit_pipeline(RequestKind::Pipeline, pipeline, options, decode_each::<T>)
	}

	/// Runs a pipeline, reporting only errors to the host.
	pub async fn execute_command<T>(&self, pipeline: Pipeline) -> Result<Vec<T>, SessionError>
	where
		T: FromValue + Send + 'static,
	{
		self.submit_command(pipeline, ExecutionOptions::default())?.await
	}

	pub async fn execute_command_with<T>(&self, pipeline: Pipeline, options: ExecutionOptions) -> Result<Vec<T>, SessionError>
	where
		T: FromValue + Send + 'static,
	{
		self.submit_command(pipeline, options)?.await
	}

	/// Runs a pipeline and discards its output.
	pub async fn run_command(&self, pipeline: Pipeline, options: ExecutionOptions) -> Result<(), SessionError> {
		self.submit_pipeline(RequestKind::Pipeline, pipeline, options, discard)?.await
	}

	pub fn submit_script_string(&self, script: impl Into<String>, options: ExecutionOptions) -> Result<ExecutionHandle<Vec<Value>>, SessionError> {
		self.submit_pipeline(RequestKind::Script, Pipeline::script(script), options, decode_each::<Value>)
	}

	/// Runs script text, writing its output and errors to the host.
	pub async fn execute_script_string(&self, script: impl Into<String>) -> Result<Vec<Value>, SessionError> {
		self.submit_script_string(script, ExecutionOptions::script_defaults())?.await
	}

	pub async fn execute_script_string_with(&self, script: impl Into<String>, options: ExecutionOptions) -> Result<Vec<Value>, SessionError> {
		self.submit_script_string(script, options)?.await
	}

	/// Runs the script file at `path`.
	///
	/// With `arguments`, the escaped path and the arguments are run as script
	/// text; otherwise the path is invoked as a command.
	pub async fn execute_script_at_path(&self, path: &str, arguments: Option<&str>) -> Result<Vec<Value>, SessionError> {
		match arguments {
			Some(arguments) => {
				let script = format!("{} {arguments}", escape_path(path, true));
				self.execute_script_string(script).await
			}
			None => {
				self.execute_command_with(Pipeline::from(Command::new(path)), ExecutionOptions::script_defaults())
					.await
			}
		}
	}

	/// Runs `pipeline` in the stopped debugger frame, bypassing the queue.
	///
	/// Nested executions run one at a time and always before a pending resume.
	pub async fn execute_nested<T>(&self, pipeline: Pipeline) -> Result<Vec<T>, SessionError>
	where
		T: FromValue + Send + 'static,
	{
		let operations = self.operations()?;
		let engine = self.engine()?;
		let suspension = &self.inner.suspension;
		if !suspension.is_paused() {
			return Err(SessionError::NotPaused);
		}
		let _gate = suspension.nested_gate().await;
		if !suspension.is_paused() {
			return Err(SessionError::NotPaused);
		}
		let values = spawn_blocking(TaskClass::Interactive, move || {
			let debugger = engine.debugger().ok_or(SessionError::DebuggerUnavailable)?;
			operations.execute_in_debugger(debugger, &pipeline)
		})
		.await
		.map_err(|error| SessionError::Panicked(join_error_panic_message(error).unwrap_or_else(|| "nested command was cancelled".to_string())))??;
		Ok(decode_each(values)?)
	}

	/// Asks the engine to break at its next statement.
	pub fn pause(&self) -> Result<(), SessionError> {
		let operations = self.operations()?;
		let engine = self.engine()?;
		let debugger = engine.debugger().ok_or(SessionError::DebuggerUnavailable)?;
		operations.pause_debugger(debugger)
	}

	/// Leaves the current debugger stop. Waits for nested executions first.
	pub async fn resume(&self, action: ResumeAction) -> Result<(), SessionError> {
		let engine = self.engine()?;
		self.inner
			.suspension
			.resume(action, |action| {
				let debugger = engine.debugger().ok_or(SessionError::DebuggerUnavailable)?;
				debugger.resume(action).map_err(SessionError::from)
			})
			.await
	}

	pub fn is_debugger_stopped(&self) -> bool {
		self.inner.suspension.is_paused()
	}

	pub fn suspension(&self) -> Suspension {
		self.inner.suspension.current()
	}

	pub fn subscribe_debugger_stopped(&self) -> broadcast::Receiver<DebuggerStoppedEvent> {
		self.inner.suspension.subscribe_stopped()
	}

	pub fn subscribe_breakpoint_updated(&self) -> broadcast::Receiver<BreakpointUpdatedEvent> {
		self.inner.suspension.subscribe_breakpoints()
	}

	/// Stops accepting requests. Queued requests still run; a debugger stop is
	/// ended with [`ResumeAction::Stop`] first.
	pub async fn abort(&self) -> Result<(), SessionError> {
		let _lifecycle = self.inner.lifecycle.lock().await;
		self.abort_locked().await
	}

	async fn abort_locked(&self) -> Result<(), SessionError> {
		match self.inner.state.get() {
			SessionState::Aborting | SessionState::Disposed => return Ok(()),
			SessionState::NotStarted => {
				return Err(SessionError::InvalidTransition {
					from: SessionState::NotStarted,
					to: SessionState::Aborting,
				});
			}
			SessionState::Ready | SessionState::Running => {}
		}
		if self.inner.suspension.is_paused()
			&& let Err(error) = self.resume(ResumeAction::Stop).await
		{
			tracing::warn!(%error, "session.abort.stop_failed");
		}
		self.inner.state.transition(SessionState::Aborting)?;
		self.inner.queue.close();
		tracing::info!(pending = self.inner.queue.len(), "session.aborted");
		Ok(())
	}

	/// Shuts the session down. Pending requests fail with
	/// [`SessionError::Disposed`]; the one executing finishes normally.
	/// Idempotent.
	pub async fn dispose(&self) {
		let _lifecycle = self.inner.lifecycle.lock().await;
		self.dispose_locked().await;
	}

	async fn dispose_locked(&self) {
		let state = self.inner.state.get();
		if state == SessionState::Disposed {
			return;
		}
		if (state == SessionState::Running || self.inner.suspension.is_paused())
			&& let Err(error) = self.abort_locked().await
		{
			tracing::warn!(%error, "session.dispose.abort_failed");
		}
		if let Err(error) = self.inner.state.transition(SessionState::Disposed) {
			tracing::warn!(%error, "session.dispose.transition");
		}
		self.inner.queue.close();
		self.inner.shutdown.cancel();

		// Never started: nobody else will reject what is queued.
		let stream = self.inner.stream.lock().take();
		if let Some(mut stream) = stream {
			for request in stream.drain() {
				request.reject(SessionError::Disposed);
			}
		}

		let tasks = std::mem::take(&mut *self.inner.tasks.lock());
		let timeout = self.inner.config.dispose_timeout();
		for task in &tasks {
			if !task.join_with_timeout(timeout).await {
				tracing::warn!(?timeout, "session.dispose.task_outlived");
			}
		}
		self.inner.engine.lock().take();
		tracing::info!("session.disposed");
	}

	fn engine(&self) -> Result<Arc<E>, SessionError> {
		self.inner.engine.lock().clone().ok_or(SessionError::Disposed)
	}

	fn operations(&self) -> Result<Arc<dyn VersionOperations>, SessionError> {
		match self.inner.operations.get() {
			Some(operations) if self.inner.state.get() != SessionState::Disposed => Ok(Arc::clone(operations)),
			Some(_) => Err(SessionError::Disposed),
			None => Err(self.inner.state.get().rejection()),
		}
	}

	fn submit_pipeline<T>(&self, kind: RequestKind, pipeline: Pipeline, options: ExecutionOptions, decode: Decoder<T>) -> Result<ExecutionHandle<T>, SessionError>
	where
		T: Send + 'static,
	{
		self.submit(
			kind,
			Payload::Pipeline {
				pipeline,
				options,
				sink: Arc::clone(&self.inner.sink),
				decode,
			},
		)
	}

	fn submit<T: Send + 'static>(&self, kind: RequestKind, payload: Payload<E, T>) -> Result<ExecutionHandle<T>, SessionError> {
		let state = self.inner.state.get();
		if !state.accepts_requests() {
			return Err(state.rejection());
		}
		self.push(kind, payload)
	}

	/// Enqueues without the state check.
	fn push<T: Send + 'static>(&self, kind: RequestKind, payload: Payload<E, T>) -> Result<ExecutionHandle<T>, SessionError> {
		let mut next_id = self.inner.next_id.lock();
		*next_id += 1;
		let id = *next_id;
		let (request, handle) = ExecutionRequest::new(id, kind, payload);
		let enqueued = self.inner.queue.enqueue(Box::new(request));
		drop(next_id);
		match enqueued {
			Ok(depth) => {
				tracing::trace!(id, kind = kind.as_str(), depth, "session.request.enqueued");
				Ok(handle)
			}
			Err(_closed) => match self.inner.state.get() {
				state if state.accepts_requests() => Err(SessionError::Disposed),
				state => Err(state.rejection()),
			},
		}
	}
}
