use std::fmt;

/// A value produced by the interpreter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	String(String),
	List(Vec<Value>),
}

impl Value {
	pub const fn type_name(&self) -> &'static str {
		match self {
			Self::Null => "null",
			Self::Bool(_) => "bool",
			Self::Int(_) => "int",
			Self::Float(_) => "float",
			Self::String(_) => "string",
			Self::List(_) => "list",
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}

	/// Output collapsed to a single value: nothing is `Null`, one item is itself.
	pub fn from_output(mut values: Vec<Value>) -> Self {
		match values.len() {
			0 => Self::Null,
			1 => values.swap_remove(0),
			_ => Self::List(values),
		}
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Null => Ok(()),
			Self::Bool(true) => f.write_str("True"),
			Self::Bool(false) => f.write_str("False"),
			Self::Int(v) => write!(f, "{v}"),
			Self::Float(v) => write!(f, "{v}"),
			Self::String(v) => f.write_str(v),
			Self::List(items) => {
				for (i, item) in items.iter().enumerate() {
					if i > 0 {
						f.write_str("\n")?;
					}
					write!(f, "{item}")?;
				}
				Ok(())
			}
		}
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Self::Int(v)
	}
}

impl From<i32> for Value {
	fn from(v: i32) -> Self {
		Self::Int(v.into())
	}
}

impl From<u32> for Value {
	fn from(v: u32) -> Self {
		Self::Int(v.into())
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Self::Float(v)
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Self::Bool(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Self::String(v.to_string())
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Self::String(v)
	}
}

impl<T: Into<Value>> From<Vec<T>> for Value {
	fn from(v: Vec<T>) -> Self {
		Self::List(v.into_iter().map(Into::into).collect())
	}
}

/// Engine value did not have the shape the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected}, found {found}")]
pub struct DecodeError {
	pub expected: &'static str,
	pub found: &'static str,
}

impl DecodeError {
	fn new(expected: &'static str, value: &Value) -> Self {
		Self {
			expected,
			found: value.type_name(),
		}
	}
}

/// Conversion from an engine [`Value`] into a Rust type.
pub trait FromValue: Sized {
	fn from_value(value: Value) -> Result<Self, DecodeError>;
}

impl FromValue for Value {
	fn from_value(value: Value) -> Result<Self, DecodeError> {
		Ok(value)
	}
}

impl FromValue for i64 {
	fn from_value(value: Value) -> Result<Self, DecodeError> {
		match value {
			Value::Int(v) => Ok(v),
			other => Err(DecodeError::new("int", &other)),
		}
	}
}

impl FromValue for f64 {
	fn from_value(value: Value) -> Result<Self, DecodeError> {
		match value {
			Value::Float(v) => Ok(v),
			Value::Int(v) => Ok(v as f64),
			other => Err(DecodeError::new("float", &other)),
		}
	}
}

impl FromValue for bool {
	fn from_value(value: Value) -> Result<Self, DecodeError> {
		match value {
			Value::Bool(v) => Ok(v),
			other => Err(DecodeError::new("bool", &other)),
		}
	}
}

impl FromValue for String {
	fn from_value(value: Value) -> Result<Self, DecodeError> {
		match value {
			Value::String(v) => Ok(v),
			other => Err(DecodeError::new("string", &other)),
		}
	}
}

impl<T: FromValue> FromValue for Option<T> {
	fn from_value(value: Value) -> Result<Self, DecodeError> {
		match value {
			Value::Null => Ok(None),
			other => T::from_value(other).map(Some),
		}
	}
}

impl<T: FromValue> FromValue for Vec<T> {
	fn from_value(value: Value) -> Result<Self, DecodeError> {
		match value {
			Value::List(items) => items.into_iter().map(T::from_value).collect(),
			other => Err(DecodeError::new("list", &other)),
		}
	}
}
