//! Host output: echoing input and writing results or errors to a console-like sink.

use parking_lot::Mutex;
use shellkeep_engine::{EngineError, Pipeline, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
	Normal,
	Error,
}

/// Receives host output produced while requests execute.
///
/// Called from the interpreter thread; implementations must not block for long.
pub trait OutputSink: Send + Sync {
	/// Echo of the command about to be reported on.
	fn write_input(&self, text: &str);

	fn write_output(&self, kind: OutputType, text: &str);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

impl OutputSink for NullOutput {
	fn write_input(&self, _text: &str) {}

	fn write_output(&self, _kind: OutputType, _text: &str) {}
}

/// Keeps every line in memory. Inputs are recorded as [`OutputType::Normal`]
/// lines prefixed with `> `.
#[derive(Debug, Default)]
pub struct MemoryOutput {
	lines: Mutex<Vec<(OutputType, String)>>,
}

impl MemoryOutput {
	pub fn new() -> Self {
		Self::default()
	}

	/// Takes the recorded lines, leaving the buffer empty.
	pub fn take(&self) -> Vec<(OutputType, String)> {
		std::mem::take(&mut *self.lines.lock())
	}
}

impl OutputSink for MemoryOutput {
	fn write_input(&self, text: &str) {
		self.lines.lock().push((OutputType::Normal, format!("> {text}")));
	}

	fn write_output(&self, kind: OutputType, text: &str) {
		self.lines.lock().push((kind, text.to_string()));
	}
}

/// What a request reports to the host besides its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOptions {
	pub write_input_to_host: bool,
	pub write_output_to_host: bool,
	pub write_errors_to_host: bool,
}

impl Default for ExecutionOptions {
	/// Commands report errors only.
	fn default() -> Self {
		Self {
			write_input_to_host: false,
			write_output_to_host: false,
			write_errors_to_host: true,
		}
	}
}

impl ExecutionOptions {
	/// Script strings also write their output.
	pub const fn script_defaults() -> Self {
		Self {
			write_input_to_host: false,
			write_output_to_host: true,
			write_errors_to_host: true,
		}
	}

	pub const fn silent() -> Self {
		Self {
			write_input_to_host: false,
			write_output_to_host: false,
			write_errors_to_host: false,
		}
	}
}

/// Renders an engine failure the way a console host shows it:
///
/// ```text
/// Attempted to divide by zero.
/// At line:2 char:3
/// ```
pub fn format_error(err: &EngineError) -> String {
	let mut out = err.message();
	if let Some(position) = err.position() {
		let location = position.file.as_deref().unwrap_or("line");
		out.push_str(&format!("\nAt {location}:{} char:{}", position.line, position.column));
	}
	out
}

/// Writes one request's host output according to its options.
pub(crate) fn echo(sink: &dyn OutputSink, options: ExecutionOptions, pipeline: &Pipeline, output: &Result<Vec<Value>, EngineError>) {
	if options.write_input_to_host {
		sink.write_input(&pipeline.to_string());
	}
	match output {
		Ok(values) if options.write_output_to_host => {
			for value in values {
				sink.write_output(OutputType::Normal, &value.to_string());
			}
		}
		Err(err) if options.write_errors_to_host => sink.write_output(OutputType::Error, &format_error(err)),
		_ => {}
	}
}
