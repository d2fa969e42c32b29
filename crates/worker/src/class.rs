/// Execution classes used to label spawned work in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Work on the request path of a waiting caller (queue driver, nested debugger commands).
	Interactive,
	/// Housekeeping that nobody awaits directly (notification pumps).
	Background,
	/// The dedicated thread that owns interpreter calls.
	Interpreter,
}

impl TaskClass {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Interactive => "interactive",
			Self::Background => "background",
			Self::Interpreter => "interpreter",
		}
	}
}
