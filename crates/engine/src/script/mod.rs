//! Reference single-threaded script engine.
//!
//! A deliberately small shell language: variables, arithmetic, strings, a
//! handful of built-in commands and script files. It exists so the session
//! coordinator can be exercised against a real interpreter: it refuses
//! overlapping work with [`EngineError::Busy`], publishes idle and availability
//! events, and has a debugger that stops on breakpoints, step mode and
//! `Wait-Debugger`, evaluating nested commands on the stopped thread.
//!
//! Built-in commands: `Start-Sleep`, `Wait-Debugger`, `Write-Output`,
//! `Get-Variable`, `Set-Variable`, `Set-PSBreakpoint`, `Remove-PSBreakpoint`,
//! `Get-PSBreakpoint` and `Out-String`. Any other command name that refers to
//! an existing file runs that file as a script.

mod commands;
mod eval;
mod lexer;
mod syntax;
#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use self::eval::Exec;
use crate::{
	Availability, Breakpoint, Debugger, Engine, EngineError, EngineEvent, EngineVersion, Pipeline, ResumeAction, Value, VersionTable,
};

const EVENT_CAPACITY: usize = 256;

/// Interpreter state. Owned by whichever thread currently holds the engine lock.
#[derive(Default)]
struct Interpreter {
	variables: HashMap<String, Value>,
	breakpoints: BTreeMap<u32, Breakpoint>,
	next_breakpoint: u32,
	/// Depth of nested debugger commands; no stops while non-zero.
	nested: u32,
}

impl Interpreter {
	fn variable(&self, name: &str) -> Option<&Value> {
		self.variables.get(&name.to_ascii_lowercase())
	}

	fn set_variable(&mut self, name: &str, value: Value) {
		self.variables.insert(name.to_ascii_lowercase(), value);
	}
}

enum DebugRequest {
	Command(Pipeline, mpsc::Sender<Result<Vec<Value>, EngineError>>),
	Resume(ResumeAction),
}

struct ScriptDebugger {
	step_mode: AtomicBool,
	/// Channel into the stopped thread. `Some` exactly while stopped.
	stopped: Mutex<Option<mpsc::Sender<DebugRequest>>>,
}

impl ScriptDebugger {
	fn channel(&self) -> Result<mpsc::Sender<DebugRequest>, EngineError> {
		self.stopped.lock().clone().ok_or(EngineError::NotStopped)
	}
}

impl Debugger for ScriptDebugger {
	fn process_command(&self, pipeline: &Pipeline) -> Result<Vec<Value>, EngineError> {
		let (reply_tx, reply_rx) = mpsc::channel();
		self.channel()?
			.send(DebugRequest::Command(pipeline.clone(), reply_tx))
			.map_err(|_| EngineError::NotStopped)?;
		// The stopped thread drops unanswered requests when it resumes.
		reply_rx.recv().map_err(|_| EngineError::NotStopped)?
	}

	fn resume(&self, action: ResumeAction) -> Result<(), EngineError> {
		self.channel()?.send(DebugRequest::Resume(action)).map_err(|_| EngineError::NotStopped)
	}

	fn set_step_mode(&self, enabled: bool) {
		self.step_mode.store(enabled, Ordering::SeqCst);
	}

	fn is_stopped(&self) -> bool {
		self.stopped.lock().is_some()
	}
}

/// The reference [`Engine`]. See the module docs for the language.
pub struct ScriptEngine {
	state: Mutex<Interpreter>,
	debugger: ScriptDebugger,
	events: broadcast::Sender<EngineEvent>,
	availability: Mutex<Availability>,
	version: Option<VersionTable>,
}

impl Default for ScriptEngine {
	fn default() -> Self {
		Self::new()
	}
}

impl ScriptEngine {
	/// An engine reporting version 5.1, edition `Desktop`.
	pub fn new() -> Self {
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		Self {
			state: Mutex::new(Interpreter::default()),
			debugger: ScriptDebugger {
				step_mode: AtomicBool::new(false),
				stopped: Mutex::new(None),
			},
			events,
			availability: Mutex::new(Availability::Available),
			version: Some(VersionTable::new(EngineVersion::new(5, 1), "Desktop")),
		}
	}

	pub fn with_version(mut self, version: VersionTable) -> Self {
		self.version = Some(version);
		self
	}

	/// Makes [`Engine::version_table`] fail, as a host without version information would.
	pub fn without_version_table(mut self) -> Self {
		self.version = None;
		self
	}

	fn emit(&self, event: EngineEvent) {
		// No subscribers is fine.
		let _ = self.events.send(event);
	}

	fn set_availability(&self, next: Availability) {
		let mut current = self.availability.lock();
		if *current == next {
			return;
		}
		*current = next;
		drop(current);
		tracing::trace!(availability = next.as_str(), "engine.availability");
		self.emit(EngineEvent::AvailabilityChanged(next));
	}

	/// Runs `f` with exclusive access to the interpreter, or fails with `Busy`.
	fn with_state<R>(&self, f: impl FnOnce(&mut Interpreter) -> R) -> Result<R, EngineError> {
		let mut state = self.state.try_lock().ok_or(EngineError::Busy)?;
		Ok(f(&mut state))
	}
}

impl Engine for ScriptEngine {
	fn invoke(&self, pipeline: &Pipeline) -> Result<Vec<Value>, EngineError> {
		let mut state = self.state.try_lock().ok_or(EngineError::Busy)?;
		self.set_availability(Availability::Busy);
		let result = Exec::new(self, &mut state).invoke(pipeline);
		drop(state);
		self.set_availability(Availability::Available);
		self.emit(EngineEvent::Idle);
		result
	}

	fn get_variable(&self, name: &str) -> Result<Option<Value>, EngineError> {
		self.with_state(|state| state.variable(name).cloned())
	}

	fn version_table(&self) -> Result<VersionTable, EngineError> {
		let version = self.with_state(|_| self.version.clone())?;
		version.ok_or_else(|| EngineError::runtime("The variable '$PSVersionTable' cannot be retrieved because it has not been set."))
	}

	fn debugger(&self) -> Option<&dyn Debugger> {
		Some(&self.debugger)
	}

	fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
		self.events.subscribe()
	}

	fn availability(&self) -> Availability {
		*self.availability.lock()
	}
}
