use std::fmt;
use std::str::FromStr;

/// Interpreter language version. Only major and minor take part in ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EngineVersion {
	pub major: u32,
	pub minor: u32,
}

impl EngineVersion {
	pub const fn new(major: u32, minor: u32) -> Self {
		Self { major, minor }
	}
}

impl fmt::Display for EngineVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.major, self.minor)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid engine version '{0}'")]
pub struct VersionParseError(pub String);

impl FromStr for EngineVersion {
	type Err = VersionParseError;

	/// Accepts `5`, `5.1` and longer forms such as `5.1.19041.1`.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let invalid = || VersionParseError(s.to_string());
		let mut parts = s.trim().split('.');
		let major = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
		let minor = match parts.next() {
			Some(p) => p.parse().map_err(|_| invalid())?,
			None => 0,
		};
		if parts.any(|p| p.parse::<u32>().is_err()) {
			return Err(invalid());
		}
		Ok(Self { major, minor })
	}
}

/// Version information an engine reports about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionTable {
	pub version: EngineVersion,
	/// Edition name, e.g. `Desktop` or `Core`.
	pub edition: String,
}

impl VersionTable {
	pub fn new(version: EngineVersion, edition: impl Into<String>) -> Self {
		Self {
			version,
			edition: edition.into(),
		}
	}
}
