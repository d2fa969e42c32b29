//! Built-in commands and script file execution.

use std::path::Path;
use std::time::Duration;

use super::eval::{Exec, enumerate};
use crate::{Breakpoint, BreakpointUpdate, BreakpointUpdateKind, EngineError, EngineEvent, Parameter, StopReason, Value};

/// Evaluated command arguments.
#[derive(Debug, Default)]
pub(super) struct CallArgs {
	pub(super) named: Vec<(String, Option<Value>)>,
	pub(super) positional: Vec<Value>,
}

impl CallArgs {
	pub(super) fn from_parameters(parameters: &[Parameter]) -> Self {
		let mut args = Self::default();
		for param in parameters {
			match (&param.name, &param.value) {
				(Some(name), value) => args.named.push((name.clone(), value.clone())),
				(None, Some(value)) => args.positional.push(value.clone()),
				(None, None) => {}
			}
		}
		args
	}

	fn named(&self, name: &str) -> Option<&Value> {
		self.named
			.iter()
			.find(|(param, _)| param.eq_ignore_ascii_case(name))
			.and_then(|(_, value)| value.as_ref())
	}

	/// Named parameter, falling back to the positional argument at `position`.
	fn get(&self, name: &str, position: usize) -> Option<&Value> {
		self.named(name).or_else(|| self.positional.get(position))
	}

	fn require(&self, command: &str, name: &str, position: usize) -> Result<&Value, EngineError> {
		self.get(name, position)
			.ok_or_else(|| EngineError::runtime(format!("{command}: missing required parameter '{name}'.")))
	}
}

fn integer(command: &str, name: &str, value: &Value) -> Result<i64, EngineError> {
	match value {
		Value::Int(v) => Ok(*v),
		Value::Float(v) if v.fract() == 0.0 => Ok(*v as i64),
		Value::String(s) => s.trim().parse().map_err(|_| invalid_argument(command, name, value)),
		_ => Err(invalid_argument(command, name, value)),
	}
}

fn invalid_argument(command: &str, name: &str, value: &Value) -> EngineError {
	EngineError::runtime(format!("{command}: cannot bind '{value}' to parameter '{name}'."))
}

impl Exec<'_> {
	pub(super) fn call(&mut self, name: &str, args: CallArgs, input: Vec<Value>) -> Result<Vec<Value>, EngineError> {
		match name.to_ascii_lowercase().as_str() {
			"start-sleep" => start_sleep(&args),
			"wait-debugger" => {
				if self.state.nested == 0 {
					self.stop(StopReason::WaitDebugger)?;
				}
				Ok(Vec::new())
			}
			"write-output" => {
				let mut output = input;
				if let Some(value) = args.named("InputObject") {
					output.extend(enumerate(value.clone()));
				}
				output.extend(args.positional.into_iter().flat_map(enumerate));
				Ok(output)
			}
			"get-variable" => {
				let name = args.require("Get-Variable", "Name", 0)?.to_string();
				match self.state.variable(&name) {
					Some(value) => Ok(enumerate(value.clone())),
					None => Err(EngineError::runtime(format!("Cannot find a variable with the name '{name}'."))),
				}
			}
			"set-variable" => {
				let name = args.require("Set-Variable", "Name", 0)?.to_string();
				let value = args.get("Value", 1).cloned().unwrap_or(Value::Null);
				self.state.set_variable(&name, value);
				Ok(Vec::new())
			}
			"set-psbreakpoint" => self.set_breakpoint(&args),
			"remove-psbreakpoint" => self.remove_breakpoint(&args),
			"get-psbreakpoint" => Ok(self.state.breakpoints.keys().map(|id| Value::from(*id)).collect()),
			"out-string" => {
				let text = input.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n");
				Ok(vec![Value::String(text)])
			}
			_ => self.run_file(name, args),
		}
	}

	fn set_breakpoint(&mut self, args: &CallArgs) -> Result<Vec<Value>, EngineError> {
		let line = integer("Set-PSBreakpoint", "Line", args.require("Set-PSBreakpoint", "Line", 0)?)?;
		let line = u32::try_from(line)
			.ok()
			.filter(|line| *line > 0)
			.ok_or_else(|| EngineError::runtime(format!("Set-PSBreakpoint: line {line} is out of range.")))?;
		self.state.next_breakpoint += 1;
		let breakpoint = Breakpoint {
			id: self.state.next_breakpoint,
			line,
			enabled: true,
		};
		self.state.breakpoints.insert(breakpoint.id, breakpoint.clone());
		let id = breakpoint.id;
		self.engine.emit(EngineEvent::BreakpointUpdated(BreakpointUpdate {
			breakpoint,
			kind: BreakpointUpdateKind::Added,
		}));
		Ok(vec![Value::from(id)])
	}

	fn remove_breakpoint(&mut self, args: &CallArgs) -> Result<Vec<Value>, EngineError> {
		let id = integer("Remove-PSBreakpoint", "Id", args.require("Remove-PSBreakpoint", "Id", 0)?)?;
		let breakpoint = u32::try_from(id)
			.ok()
			.and_then(|id| self.state.breakpoints.remove(&id))
			.ok_or_else(|| EngineError::runtime(format!("Remove-PSBreakpoint: no breakpoint with id {id}.")))?;
		self.engine.emit(EngineEvent::BreakpointUpdated(BreakpointUpdate {
			breakpoint,
			kind: BreakpointUpdateKind::Removed,
		}));
		Ok(Vec::new())
	}

	/// Runs a script file in the session scope. Named arguments become
	/// variables, positional ones are collected in `$args`.
	fn run_file(&mut self, name: &str, args: CallArgs) -> Result<Vec<Value>, EngineError> {
		let path = Path::new(name);
		if !path.is_file() {
			return Err(EngineError::runtime(format!(
				"The term '{name}' is not recognized as the name of a cmdlet, function, script file, or operable program."
			)));
		}
		let src = std::fs::read_to_string(path).map_err(|err| EngineError::runtime(format!("Cannot read script '{name}': {err}")))?;

		for (param, value) in args.named {
			self.state.set_variable(&param, value.unwrap_or(Value::Bool(true)));
		}
		self.state.set_variable("args", Value::List(args.positional));

		let saved = (self.file.replace(name.to_string()), self.line);
		let result = self.run_source(&src);
		(self.file, self.line) = saved;
		result
	}
}

fn start_sleep(args: &CallArgs) -> Result<Vec<Value>, EngineError> {
	let duration = if let Some(ms) = args.named("Milliseconds") {
		let ms = integer("Start-Sleep", "Milliseconds", ms)?;
		Duration::from_millis(u64::try_from(ms).map_err(|_| invalid_argument("Start-Sleep", "Milliseconds", &Value::Int(ms)))?)
	} else {
		let seconds = args.require("Start-Sleep", "Seconds", 0)?;
		let secs = match seconds {
			Value::Int(v) => *v as f64,
			Value::Float(v) => *v,
			other => integer("Start-Sleep", "Seconds", other)? as f64,
		};
		Duration::try_from_secs_f64(secs).map_err(|_| invalid_argument("Start-Sleep", "Seconds", seconds))?
	};
	std::thread::sleep(duration);
	Ok(Vec::new())
}
