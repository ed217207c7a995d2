//! Process-wide settings for the store connection and component defaults.

// self
use crate::{_prelude::*, error::ConfigError};

/// Settings shared by the store adapter and every component built on it.
///
/// Deserializes from JSON with every field optional; missing fields fall back to
/// [`KvConfig::default`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KvConfig {
	/// Connection URL of the shared store.
	pub url: String,
	/// Upper bound for a single store round-trip, in milliseconds.
	pub operation_timeout_ms: u64,
	/// Session TTL used when callers do not pass one, in seconds.
	pub session_ttl_secs: u64,
	/// Response-cache TTL used when callers do not pass one, in seconds.
	pub cache_ttl_secs: u64,
	/// Length of the short burst window, in seconds.
	pub burst_window_secs: u64,
}
impl KvConfig {
	const DEFAULT_URL: &str = "redis://127.0.0.1:6379";

	/// Parses and validates a JSON configuration document.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let de = &mut serde_json::Deserializer::from_str(raw);
		let config: Self = serde_path_to_error::deserialize(de)?;

		config.validate()?;

		Ok(config)
	}

	/// Rejects settings no component can work with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.url.trim().is_empty() {
			return Err(ConfigError::EmptyUrl);
		}

		for (field, value) in [
			("operation_timeout_ms", self.operation_timeout_ms),
			("session_ttl_secs", self.session_ttl_secs),
			("cache_ttl_secs", self.cache_ttl_secs),
			("burst_window_secs", self.burst_window_secs),
		] {
			if value == 0 {
				return Err(ConfigError::NonPositiveDuration { field });
			}
		}

		Ok(())
	}

	/// Overrides the store URL.
	pub fn with_url(mut self, url: impl Into<String>) -> Self {
		self.url = url.into();

		self
	}

	/// Overrides the per-operation timeout.
	pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
		self.operation_timeout_ms = timeout.whole_milliseconds().clamp(0, u64::MAX as i128) as u64;

		self
	}

	/// Overrides the default session TTL.
	pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
		self.session_ttl_secs = whole_seconds(ttl);

		self
	}

	/// Overrides the default response-cache TTL.
	pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
		self.cache_ttl_secs = whole_seconds(ttl);

		self
	}

	/// Overrides the burst window length.
	pub fn with_burst_window(mut self, window: Duration) -> Self {
		self.burst_window_secs = whole_seconds(window);

		self
	}

	/// Per-operation timeout.
	pub fn operation_timeout(&self) -> Duration {
		Duration::milliseconds(self.operation_timeout_ms.min(i64::MAX as u64) as i64)
	}

	/// Default session TTL.
	pub fn session_ttl(&self) -> Duration {
		seconds(self.session_ttl_secs)
	}

	/// Default response-cache TTL.
	pub fn cache_ttl(&self) -> Duration {
		seconds(self.cache_ttl_secs)
	}

	/// Burst window length.
	pub fn burst_window(&self) -> Duration {
		seconds(self.burst_window_secs)
	}
}
impl Default for KvConfig {
	fn default() -> Self {
		Self {
			url: Self::DEFAULT_URL.into(),
			operation_timeout_ms: 2_000,
			session_ttl_secs: 24 * 60 * 60,
			cache_ttl_secs: 60 * 60,
			burst_window_secs: 10,
		}
	}
}

fn whole_seconds(duration: Duration) -> u64 {
	duration.whole_seconds().max(0) as u64
}

fn seconds(value: u64) -> Duration {
	Duration::seconds(value.min(i64::MAX as u64) as i64)
}
