//! Crate-level error types shared across limiters, sessions, caches, and queues.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Shared-store failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Caller supplied an identifier that cannot be embedded into a store key.
	#[error(transparent)]
	Identifier(#[from] crate::id::IdentifierError),
	/// A payload could not be encoded for storage.
	#[error("Payload could not be encoded: {message}.")]
	Encode {
		/// Human-readable error payload.
		message: String,
	},
}
impl Error {
	/// Returns `true` when the error came from an unreachable or timed-out store.
	pub fn is_unavailable(&self) -> bool {
		matches!(self, Self::Storage(crate::store::StoreError::Unavailable { .. }))
	}
}
impl From<serde_json::Error> for Error {
	fn from(e: serde_json::Error) -> Self {
		Self::Encode { message: e.to_string() }
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Configuration document is not valid JSON for [`crate::KvConfig`].
	#[error("Configuration could not be parsed at `{path}`.")]
	Parse {
		/// JSON path of the offending field.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: serde_json::Error,
	},
	/// Store URL is empty.
	#[error("Store URL cannot be empty.")]
	EmptyUrl,
	/// A duration setting must be strictly positive.
	#[error("The {field} setting must be positive.")]
	NonPositiveDuration {
		/// Name of the offending setting.
		field: &'static str,
	},
	/// Store client could not be constructed from the configured URL.
	#[error("Store client could not be constructed: {message}.")]
	ClientBuild {
		/// Human-readable error payload.
		message: String,
	},
}
impl From<serde_path_to_error::Error<serde_json::Error>> for ConfigError {
	fn from(e: serde_path_to_error::Error<serde_json::Error>) -> Self {
		let path = e.path().to_string();

		Self::Parse { path, source: e.into_inner() }
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;
	use crate::store::StoreError;

	#[test]
	fn store_error_converts_into_crate_error_with_source() {
		let store_error =
			StoreError::Unavailable { operation: "get", message: "connection refused".into() };
		let error: Error = store_error.clone().into();

		assert!(error.is_unavailable());
		assert!(error.to_string().contains("connection refused"));

		let source = StdError::source(&error)
			.expect("Crate error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn decode_errors_are_not_unavailability() {
		let error: Error =
			StoreError::Decode { key: "session:abc".into(), message: "expected map".into() }.into();

		assert!(!error.is_unavailable());
	}
}
