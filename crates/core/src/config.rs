//! Client configuration.
//!
//! The values here come from whatever drives the scan (a config file, CLI
//! flags); the engine only reads them.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default ceiling on in-flight exchanges.
pub const DEFAULT_MAX_CONCURRENCY: usize = 20;

/// Default user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("probe-http/", env!("CARGO_PKG_VERSION"));

/// How soft-404 baselines are cached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineKeying {
	/// One baseline per client, probed under the first path judged.
	#[default]
	Instance,
	/// One baseline per directory of the URL being judged.
	Directory,
}

/// Retry budget for transient transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
	/// Retries after the first attempt; `0` disables retrying.
	pub max_retries: u32,
	/// Delay before the first retry, doubled on every further retry.
	pub initial_backoff_ms: u64,
	/// Upper bound for the backoff delay.
	pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_retries: 5,
			initial_backoff_ms: 250,
			max_backoff_ms: 5_000,
		}
	}
}

impl RetryConfig {
	pub fn initial_backoff(&self) -> Duration {
		Duration::from_millis(self.initial_backoff_ms)
	}

	pub fn max_backoff(&self) -> Duration {
		Duration::from_millis(self.max_backoff_ms)
	}
}

/// Settings consumed by [`HttpClient`](crate::HttpClient) and its transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
	/// Maximum number of exchanges in flight at once.
	pub max_concurrency: usize,
	/// Basic-auth user name.
	pub username: Option<String>,
	/// Basic-auth password.
	pub password: Option<String>,
	/// Proxy URL handed to the transport as-is.
	pub proxy: Option<String>,
	pub user_agent: String,
	/// Cookie names that [`HttpClient::cookie`](crate::HttpClient::cookie) never sends.
	pub exclude_cookies: Vec<String>,
	/// Per-exchange deadline enforced by the transport.
	pub request_timeout_ms: u64,
	/// Accept self-signed and otherwise invalid TLS certificates.
	pub accept_invalid_certs: bool,
	pub retry: RetryConfig,
	pub not_found_keying: BaselineKeying,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			max_concurrency: DEFAULT_MAX_CONCURRENCY,
			username: None,
			password: None,
			proxy: None,
			user_agent: DEFAULT_USER_AGENT.to_string(),
			exclude_cookies: Vec::new(),
			request_timeout_ms: 30_000,
			accept_invalid_certs: true,
			retry: RetryConfig::default(),
			not_found_keying: BaselineKeying::default(),
		}
	}
}

impl ClientConfig {
	/// Loads a JSON configuration file; missing keys take their defaults.
	pub fn from_file(path: &Path) -> Result<Self> {
		let raw = std::fs::read_to_string(path)?;
		let config = serde_json::from_str(&raw)?;
		Ok(config)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}

	/// Ceiling clamped to at least one slot.
	pub fn concurrency(&self) -> usize {
		self.max_concurrency.max(1)
	}

	pub fn is_cookie_excluded(&self, name: &str) -> bool {
		self.exclude_cookies.iter().any(|excluded| excluded == name)
	}
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	#[test]
	fn partial_file_keeps_defaults() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("probe.json");
		std::fs::write(
			&path,
			r#"{
  "max_concurrency": 4,
  "exclude_cookies": ["tracking"],
  "retry": { "max_retries": 2 },
  "not_found_keying": "directory"
}"#,
		)
		.unwrap();

		let config = ClientConfig::from_file(&path).unwrap();
		assert_eq!(config.max_concurrency, 4);
		assert_eq!(config.retry.max_retries, 2);
		assert_eq!(config.retry.initial_backoff_ms, 250);
		assert_eq!(config.not_found_keying, BaselineKeying::Directory);
		assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
		assert!(config.is_cookie_excluded("tracking"));
		assert!(!config.is_cookie_excluded("session"));
	}

	#[test]
	fn zero_concurrency_is_clamped() {
		let config = ClientConfig {
			max_concurrency: 0,
			..Default::default()
		};
		assert_eq!(config.concurrency(), 1);
	}

	#[test]
	fn missing_file_is_an_io_error() {
		let err = ClientConfig::from_file(Path::new("/definitely/missing/probe.json")).unwrap_err();
		assert!(matches!(err, crate::Error::Io(_)));
	}
}
