//! Strongly typed identifiers that are safe to embed in store keys.
//!
//! Every identifier is non-empty, whitespace-free, at most 128 bytes, and free of `:`, the key
//! segment separator. Rejecting `:` keeps composite keys such as `ai_cache:{model}:{hash}`
//! unambiguous, so two distinct `(model, hash)` pairs never share a slot.

// std
use std::{borrow::Borrow, ops::Deref};
// crates.io
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}

			/// Returns the identifier as a string slice.
			pub fn as_str(&self) -> &str {
				&self.0
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl TryFrom<&str> for $name {
			type Error = IdentifierError;

			fn try_from(value: &str) -> Result<Self, Self::Error> {
				Self::new(value)
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 128;
const SESSION_TOKEN_LEN: usize = 48;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (user, session, model, queue, hash).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (user, session, model, queue, hash).
		kind: &'static str,
	},
	/// The identifier contains the key separator.
	#[error("{kind} identifier contains the `:` key separator.")]
	ContainsSeparator {
		/// Kind of identifier (user, session, model, queue, hash).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed length.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (user, session, model, queue, hash).
		kind: &'static str,
		/// Maximum permitted length in bytes.
		max: usize,
	},
}

def_id! { UserId, "Identifier of the user owning sessions, trust scores, and adaptive quotas.", "User" }
def_id! { SessionToken, "Opaque session token naming one session record.", "Session" }
def_id! { ModelId, "Model identifier namespacing response-cache entries.", "Model" }
def_id! { QueueName, "Logical work-queue name.", "Queue" }
def_id! { PromptHash, "Deterministic digest of a normalized prompt or document.", "PromptHash" }

impl SessionToken {
	/// Generates a fresh random alphanumeric session token.
	pub fn generate() -> Self {
		let token = rand::rng()
			.sample_iter(Alphanumeric)
			.take(SESSION_TOKEN_LEN)
			.map(char::from)
			.collect();

		Self(token)
	}
}

impl PromptHash {
	/// Hashes the provided content with SHA-256 and renders the digest as lowercase hex.
	///
	/// Callers normalize the content first; the cache never hashes on its own.
	pub fn of(content: impl AsRef<[u8]>) -> Self {
		let mut hasher = Sha256::new();

		hasher.update(content.as_ref());

		Self(format!("{:x}", hasher.finalize()))
	}
}

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.contains(':') {
		return Err(IdentifierError::ContainsSeparator { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}
