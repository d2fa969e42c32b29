use std::sync::atomic::Ordering;
use std::sync::mpsc;

use super::commands::CallArgs;
use super::lexer::AssignOp;
use super::syntax::{self, Arg, BinOp, Call, Expr, PipelineExpr, Script, Segment, Statement, StatementKind};
use super::{DebugRequest, Interpreter, ScriptEngine};
use crate::{Availability, CommandKind, DebuggerStop, EngineError, EngineEvent, Pipeline, ResumeAction, ScriptPosition, StopReason, Value};

/// Longest string a repetition may produce, in bytes.
const MAX_STRING_LEN: usize = 64 * 1024 * 1024;

/// One evaluation pass over the locked interpreter.
pub(super) struct Exec<'a> {
	pub(super) engine: &'a ScriptEngine,
	pub(super) state: &'a mut Interpreter,
	/// Script file being run, `None` for inline text.
	pub(super) file: Option<String>,
	/// Line of the statement being run.
	pub(super) line: u32,
}

impl<'a> Exec<'a> {
	pub(super) fn new(engine: &'a ScriptEngine, state: &'a mut Interpreter) -> Self {
		Self {
			engine,
			state,
			file: None,
			line: 1,
		}
	}

	/// Runs a host pipeline; each stage receives the previous stage's output.
	pub(super) fn invoke(&mut self, pipeline: &Pipeline) -> Result<Vec<Value>, EngineError> {
		let mut input = Vec::new();
		for command in pipeline.commands() {
			input = match command.kind() {
				CommandKind::Script => self.run_source(command.text())?,
				CommandKind::Command => self.call(command.text(), CallArgs::from_parameters(command.parameters()), input)?,
			};
		}
		Ok(input)
	}

	pub(super) fn run_source(&mut self, src: &str) -> Result<Vec<Value>, EngineError> {
		let script = syntax::parse(src).map_err(|err| EngineError::Parse {
			message: err.message,
			position: ScriptPosition::new(self.file.clone(), err.line, err.column),
		})?;
		self.run_script(&script)
	}

	fn run_script(&mut self, script: &Script) -> Result<Vec<Value>, EngineError> {
		let mut output = Vec::new();
		for statement in &script.statements {
			self.line = statement.line;
			self.checkpoint()?;
			self.statement(statement, &mut output).map_err(|err| self.locate(err, statement))?;
		}
		Ok(output)
	}

	fn locate(&self, err: EngineError, statement: &Statement) -> EngineError {
		match err {
			EngineError::Runtime { message, position: None } => EngineError::Runtime {
				message,
				position: Some(ScriptPosition::new(self.file.clone(), statement.line, statement.column)),
			},
			other => other,
		}
	}

	fn statement(&mut self, statement: &Statement, output: &mut Vec<Value>) -> Result<(), EngineError> {
		match &statement.kind {
			StatementKind::Assign { name, op, value } => {
				let rhs = Value::from_output(self.pipeline(value)?);
				let value = match assign_operator(*op) {
					None => rhs,
					Some(op) => binary(self.state.variable(name).cloned().unwrap_or(Value::Null), op, rhs)?,
				};
				self.state.set_variable(name, value);
			}
			StatementKind::Throw(expr) => {
				let message = match expr {
					Some(expr) => self.expr(expr)?.to_string(),
					None => "ScriptHalted".to_string(),
				};
				return Err(EngineError::runtime(message));
			}
			StatementKind::Pipeline(pipeline) => output.extend(self.pipeline(pipeline)?),
		}
		Ok(())
	}

	fn pipeline(&mut self, pipeline: &PipelineExpr) -> Result<Vec<Value>, EngineError> {
		let mut input = Vec::new();
		for (i, segment) in pipeline.segments.iter().enumerate() {
			input = match segment {
				Segment::Expr(expr) if i == 0 => enumerate(self.expr(expr)?),
				Segment::Expr(_) => return Err(EngineError::runtime("Expressions are only allowed as the first element of a pipeline.")),
				Segment::Call(call) => {
					let args = self.call_args(call)?;
					self.call(&call.name, args, input)?
				}
			};
		}
		Ok(input)
	}

	fn call_args(&mut self, call: &Call) -> Result<CallArgs, EngineError> {
		let mut args = CallArgs::default();
		for arg in &call.args {
			match arg {
				Arg::Named(name, value) => {
					let value = value.as_ref().map(|expr| self.expr(expr)).transpose()?;
					args.named.push((name.clone(), value));
				}
				Arg::Positional(expr) => {
					let value = self.expr(expr)?;
					args.positional.push(value);
				}
			}
		}
		Ok(args)
	}

	fn expr(&mut self, expr: &Expr) -> Result<Value, EngineError> {
		match expr {
			Expr::Literal(value) => Ok(value.clone()),
			Expr::Variable(name) => Ok(self.state.variable(name).cloned().unwrap_or(Value::Null)),
			Expr::Binary(lhs, op, rhs) => {
				let lhs = self.expr(lhs)?;
				let rhs = self.expr(rhs)?;
				binary(lhs, *op, rhs)
			}
			Expr::Negate(inner) => negate(self.expr(inner)?),
			Expr::List(items) => items.iter().map(|item| self.expr(item)).collect::<Result<Vec<_>, _>>().map(Value::List),
			Expr::Sub(pipeline) => self.pipeline(pipeline).map(Value::from_output),
		}
	}

	/// Stops in the debugger before a statement when step mode is on or a
	/// breakpoint sits on the current line.
	fn checkpoint(&mut self) -> Result<(), EngineError> {
		if self.state.nested > 0 {
			return Ok(());
		}
		let reason = if self.engine.debugger.step_mode.load(Ordering::SeqCst) {
			Some(StopReason::Step)
		} else {
			self.state
				.breakpoints
				.values()
				.find(|bp| bp.enabled && bp.line == self.line)
				.map(|bp| StopReason::Breakpoint(bp.id))
		};
		match reason {
			Some(reason) => self.stop(reason),
			None => Ok(()),
		}
	}

	/// Parks this thread in the debugger until a resume action arrives,
	/// evaluating nested commands in the meantime.
	pub(super) fn stop(&mut self, reason: StopReason) -> Result<(), EngineError> {
		let (tx, rx) = mpsc::channel();
		*self.engine.debugger.stopped.lock() = Some(tx);
		self.engine.set_availability(Availability::AvailableForNestedCommand);
		tracing::debug!(?reason, line = self.line, "engine.debugger.stopped");
		self.engine.emit(EngineEvent::DebuggerStopped(DebuggerStop { reason, line: self.line }));

		let action = loop {
			match rx.recv() {
				Ok(DebugRequest::Command(pipeline, reply)) => {
					let saved = (self.file.take(), self.line);
					self.state.nested += 1;
					let result = self.invoke(&pipeline);
					self.state.nested -= 1;
					(self.file, self.line) = saved;
					let _ = reply.send(result);
				}
				Ok(DebugRequest::Resume(action)) => break action,
				Err(_) => break ResumeAction::Stop,
			}
		};
		*self.engine.debugger.stopped.lock() = None;
		drop(rx);
		self.engine.set_availability(Availability::Busy);
		tracing::debug!(action = action.as_str(), "engine.debugger.resumed");

		let step = matches!(action, ResumeAction::StepOver | ResumeAction::StepInto | ResumeAction::StepOut);
		self.engine.debugger.step_mode.store(step, Ordering::SeqCst);
		match action {
			ResumeAction::Stop => Err(EngineError::Stopped),
			_ => Ok(()),
		}
	}
}

fn assign_operator(op: AssignOp) -> Option<BinOp> {
	match op {
		AssignOp::Set => None,
		AssignOp::Add => Some(BinOp::Add),
		AssignOp::Sub => Some(BinOp::Sub),
		AssignOp::Mul => Some(BinOp::Mul),
		AssignOp::Div => Some(BinOp::Div),
	}
}

/// Pipeline output of a single value: lists are unrolled, null produces nothing.
pub(super) fn enumerate(value: Value) -> Vec<Value> {
	match value {
		Value::Null => Vec::new(),
		Value::List(items) => items,
		other => vec![other],
	}
}

#[derive(Debug, Clone, Copy)]
enum Number {
	Int(i64),
	Float(f64),
}

fn operator_symbol(op: BinOp) -> &'static str {
	match op {
		BinOp::Add => "+",
		BinOp::Sub => "-",
		BinOp::Mul => "*",
		BinOp::Div => "/",
	}
}

fn number(value: &Value, op: BinOp) -> Result<Number, EngineError> {
	match value {
		Value::Null => Ok(Number::Int(0)),
		Value::Bool(b) => Ok(Number::Int(i64::from(*b))),
		Value::Int(v) => Ok(Number::Int(*v)),
		Value::Float(v) => Ok(Number::Float(*v)),
		Value::String(s) => {
			if let Ok(v) = s.trim().parse::<i64>() {
				return Ok(Number::Int(v));
			}
			s.trim()
				.parse::<f64>()
				.map(Number::Float)
				.map_err(|_| EngineError::runtime(format!("Cannot convert value \"{s}\" to a number.")))
		}
		Value::List(_) => Err(EngineError::runtime(format!(
			"Operator '{}' cannot be applied to a list on the right-hand side.",
			operator_symbol(op)
		))),
	}
}

pub(super) fn binary(lhs: Value, op: BinOp, rhs: Value) -> Result<Value, EngineError> {
	match (op, lhs) {
		(BinOp::Add, Value::String(mut s)) => {
			s.push_str(&rhs.to_string());
			Ok(Value::String(s))
		}
		(BinOp::Add, Value::List(mut items)) => {
			items.extend(enumerate(rhs));
			Ok(Value::List(items))
		}
		(BinOp::Mul, Value::String(s)) => match number(&rhs, op)? {
			Number::Int(n) if n >= 0 => usize::try_from(n)
				.ok()
				.filter(|&count| s.len().checked_mul(count).is_some_and(|len| len <= MAX_STRING_LEN))
				.map(|count| Value::String(s.repeat(count)))
				.ok_or_else(|| EngineError::runtime("The string produced by the repetition is too long.")),
			_ => Err(EngineError::runtime("A string can only be repeated a non-negative whole number of times.")),
		},
		(op, Value::List(_)) => Err(EngineError::runtime(format!("Operator '{}' cannot be applied to a list.", operator_symbol(op)))),
		(op, lhs) => arithmetic(op, number(&lhs, op)?, number(&rhs, op)?),
	}
}

fn arithmetic(op: BinOp, lhs: Number, rhs: Number) -> Result<Value, EngineError> {
	if let (Number::Int(a), Number::Int(b)) = (lhs, rhs) {
		let exact = match op {
			BinOp::Add => a.checked_add(b),
			BinOp::Sub => a.checked_sub(b),
			BinOp::Mul => a.checked_mul(b),
			BinOp::Div if b == 0 => return Err(divide_by_zero()),
			BinOp::Div => match a.checked_rem(b) {
				Some(0) => a.checked_div(b),
				_ => None,
			},
		};
		if let Some(v) = exact {
			return Ok(Value::Int(v));
		}
	}
	let (a, b) = (as_float(lhs), as_float(rhs));
	let v = match op {
		BinOp::Add => a + b,
		BinOp::Sub => a - b,
		BinOp::Mul => a * b,
		BinOp::Div if b == 0.0 => return Err(divide_by_zero()),
		BinOp::Div => a / b,
	};
	Ok(Value::Float(v))
}

fn as_float(n: Number) -> f64 {
	match n {
		Number::Int(v) => v as f64,
		Number::Float(v) => v,
	}
}

fn divide_by_zero() -> EngineError {
	EngineError::runtime("Attempted to divide by zero.")
}

fn negate(value: Value) -> Result<Value, EngineError> {
	match value {
		Value::Null => Ok(Value::Int(0)),
		Value::Int(v) => Ok(v.checked_neg().map_or(Value::Float(-(v as f64)), Value::Int)),
		Value::Float(v) => Ok(Value::Float(-v)),
		other => Err(EngineError::runtime(format!("Cannot negate a value of type {}.", other.type_name()))),
	}
}
