//! Notifications published by an engine.

/// Whether the engine can take new work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Availability {
	Available,
	Busy,
	/// Stopped in the debugger; only nested commands are accepted.
	AvailableForNestedCommand,
}

impl Availability {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Available => "available",
			Self::Busy => "busy",
			Self::AvailableForNestedCommand => "nested",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
	/// Hit the breakpoint with this id.
	Breakpoint(u32),
	Step,
	/// The script asked for the debugger explicitly.
	WaitDebugger,
}

/// A debugger stop: why, and at which line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggerStop {
	pub reason: StopReason,
	pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
	pub id: u32,
	pub line: u32,
	pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointUpdateKind {
	Added,
	Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointUpdate {
	pub breakpoint: Breakpoint,
	pub kind: BreakpointUpdateKind,
}

/// How to leave a debugger stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResumeAction {
	Continue,
	StepOver,
	StepInto,
	StepOut,
	/// Abandon the running script.
	Stop,
}

impl ResumeAction {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Continue => "continue",
			Self::StepOver => "step_over",
			Self::StepInto => "step_into",
			Self::StepOut => "step_out",
			Self::Stop => "stop",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
	/// The engine finished a top-level operation and holds no lock.
	Idle,
	AvailabilityChanged(Availability),
	DebuggerStopped(DebuggerStop),
	BreakpointUpdated(BreakpointUpdate),
}
