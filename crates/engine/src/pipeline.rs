use std::fmt;

use crate::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
	/// Raw script text, parsed by the engine.
	Script,
	/// A named command (or script file path) invoked with parameters.
	Command,
}

/// A command parameter. `name: None` is a positional argument, `value: None`
/// a switch.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
	pub name: Option<String>,
	pub value: Option<Value>,
}

/// One stage of a [`Pipeline`].
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
	text: String,
	kind: CommandKind,
	parameters: Vec<Parameter>,
}

impl Command {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			text: name.into(),
			kind: CommandKind::Command,
			parameters: Vec::new(),
		}
	}

	pub fn script(text: impl Into<String>) -> Self {
		Self {
			text: text.into(),
			kind: CommandKind::Script,
			parameters: Vec::new(),
		}
	}

	/// Adds a named parameter.
	pub fn parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.parameters.push(Parameter {
			name: Some(name.into()),
			value: Some(value.into()),
		});
		self
	}

	pub fn switch(mut self, name: impl Into<String>) -> Self {
		self.parameters.push(Parameter {
			name: Some(name.into()),
			value: None,
		});
		self
	}

	/// Adds a positional argument.
	pub fn argument(mut self, value: impl Into<Value>) -> Self {
		self.parameters.push(Parameter {
			name: None,
			value: Some(value.into()),
		});
		self
	}

	pub fn text(&self) -> &str {
		&self.text
	}

	pub fn kind(&self) -> CommandKind {
		self.kind
	}

	pub fn parameters(&self) -> &[Parameter] {
		&self.parameters
	}
}

impl fmt::Display for Command {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.text)?;
		for param in &self.parameters {
			if let Some(name) = &param.name {
				write!(f, " -{name}")?;
			}
			match &param.value {
				Some(Value::String(s)) => write!(f, " '{}'", s.replace('\'', "''"))?,
				Some(value) => write!(f, " {value}")?,
				None => {}
			}
		}
		Ok(())
	}
}

/// Ordered stages; each stage receives the previous stage's output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
	commands: Vec<Command>,
}

impl Pipeline {
	pub fn new() -> Self {
		Self::default()
	}

	/// A pipeline holding a single script stage.
	pub fn script(text: impl Into<String>) -> Self {
		Self {
			commands: vec![Command::script(text)],
		}
	}

	/// Appends a stage, builder style.
	pub fn then(mut self, command: Command) -> Self {
		self.commands.push(command);
		self
	}

	pub fn push(&mut self, command: Command) {
		self.commands.push(command);
	}

	pub fn commands(&self) -> &[Command] {
		&self.commands
	}

	pub fn is_empty(&self) -> bool {
		self.commands.is_empty()
	}
}

impl From<Command> for Pipeline {
	fn from(command: Command) -> Self {
		Self { commands: vec![command] }
	}
}

impl fmt::Display for Pipeline {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, command) in self.commands.iter().enumerate() {
			if i > 0 {
				f.write_str(" | ")?;
			}
			write!(f, "{command}")?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn display_renders_stages_and_parameters() {
		let pipeline = Pipeline::from(Command::new("Get-Variable").parameter("Name", "it's").switch("ValueOnly")).then(Command::new("Out-String"));
		assert_eq!(pipeline.to_string(), "Get-Variable -Name 'it''s' -ValueOnly | Out-String");
	}

	#[test]
	fn script_pipeline_renders_raw_text() {
		assert_eq!(Pipeline::script("$x = 1").to_string(), "$x = 1");
		assert!(Pipeline::new().is_empty());
	}
}
