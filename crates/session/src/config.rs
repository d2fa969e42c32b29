//! Session configuration, loaded from kebab-case TOML.
//!
//! ```toml
//! event-buffer = 64
//! dispose-timeout-ms = 2000
//! fallback-version = "5.0"
//! fallback-edition = "Desktop"
//!
//! [busy-retry]
//! interval-ms = 250
//! max-attempts = 40   # omit to retry forever
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use shellkeep_engine::EngineVersion;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("I/O error reading {path}: {error}")]
	Io { path: PathBuf, error: std::io::Error },
	#[error("TOML parse error: {0}")]
	Parse(#[from] toml::de::Error),
	#[error("invalid session config: {0}")]
	Invalid(String),
}

/// How the driver retries a request the engine reported busy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct RetryPolicy {
	/// Backoff between attempts. The idle trigger can cut it short.
	pub interval_ms: u64,
	/// Attempts before giving up. `None` retries indefinitely.
	pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			interval_ms: 250,
			max_attempts: None,
		}
	}
}

impl RetryPolicy {
	pub fn interval(&self) -> Duration {
		Duration::from_millis(self.interval_ms)
	}

	/// Whether `attempts` busy results exhaust the policy.
	pub fn exhausted(&self, attempts: u32) -> bool {
		self.max_attempts.is_some_and(|max| attempts >= max)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct SessionConfig {
	/// Capacity of the debugger-stopped and breakpoint-updated broadcast channels.
	pub event_buffer: usize,
	/// How long `dispose` waits for background tasks.
	pub dispose_timeout_ms: u64,
	/// Version assumed when the engine cannot report one.
	pub fallback_version: String,
	pub fallback_edition: String,
	pub busy_retry: RetryPolicy,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			event_buffer: 64,
			dispose_timeout_ms: 2000,
			fallback_version: "5.0".to_string(),
			fallback_edition: "Desktop".to_string(),
			busy_retry: RetryPolicy::default(),
		}
	}
}

impl SessionConfig {
	pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(src)?;
		config.validate()?;
		Ok(config)
	}

	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let src = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&src)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.event_buffer == 0 {
			return Err(ConfigError::Invalid("event-buffer must be greater than zero".into()));
		}
		if self.busy_retry.interval_ms == 0 {
			return Err(ConfigError::Invalid("busy-retry.interval-ms must be greater than zero".into()));
		}
		if self.busy_retry.max_attempts == Some(0) {
			return Err(ConfigError::Invalid("busy-retry.max-attempts must be greater than zero".into()));
		}
		self.fallback_version()?;
		Ok(())
	}

	pub fn fallback_version(&self) -> Result<EngineVersion, ConfigError> {
		self.fallback_version
			.parse()
			.map_err(|err| ConfigError::Invalid(format!("fallback-version: {err}")))
	}

	pub fn dispose_timeout(&self) -> Duration {
		Duration::from_millis(self.dispose_timeout_ms)
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn empty_document_yields_defaults() {
		let config = SessionConfig::from_toml_str("").expect("defaults");
		assert_eq!(config, SessionConfig::default());
		assert_eq!(config.busy_retry.interval(), Duration::from_millis(250));
		assert_eq!(config.busy_retry.max_attempts, None);
		assert_eq!(config.fallback_version().expect("version"), EngineVersion::new(5, 0));
	}

	#[test]
	fn parses_every_key() {
		let config = SessionConfig::from_toml_str(
			r#"
event-buffer = 8
dispose-timeout-ms = 50
fallback-version = "7.2"
fallback-edition = "Core"

[busy-retry]
interval-ms = 10
max-attempts = 3
"#,
		)
		.expect("parse");
		assert_eq!(
			config,
			SessionConfig {
				event_buffer: 8,
				dispose_timeout_ms: 50,
				fallback_version: "7.2".into(),
				fallback_edition: "Core".into(),
				busy_retry: RetryPolicy {
					interval_ms: 10,
					max_attempts: Some(3),
				},
			}
		);
		assert!(!config.busy_retry.exhausted(2));
		assert!(config.busy_retry.exhausted(3));
	}

	#[test]
	fn rejects_unknown_keys_and_bad_values() {
		assert!(matches!(SessionConfig::from_toml_str("retry = 1"), Err(ConfigError::Parse(_))));
		assert!(matches!(
			SessionConfig::from_toml_str("[busy-retry]\ninterval-ms = 0"),
			Err(ConfigError::Invalid(_))
		));
		assert!(matches!(
			SessionConfig::from_toml_str("[busy-retry]\nmax-attempts = 0"),
			Err(ConfigError::Invalid(_))
		));
		assert!(matches!(SessionConfig::from_toml_str("event-buffer = 0"), Err(ConfigError::Invalid(_))));
		assert!(matches!(
			SessionConfig::from_toml_str("fallback-version = \"latest\""),
			Err(ConfigError::Invalid(_))
		));
	}

	#[test]
	fn loads_from_file() {
		let mut file = tempfile::NamedTempFile::new().expect("temp file");
		writeln!(file, "dispose-timeout-ms = 10").expect("write");
		let config = SessionConfig::load(file.path()).expect("load");
		assert_eq!(config.dispose_timeout(), Duration::from_millis(10));

		let missing = file.path().with_extension("missing");
		assert!(matches!(SessionConfig::load(&missing), Err(ConfigError::Io { .. })));
	}
}
