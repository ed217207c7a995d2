//! Shared-store rate limiting, adaptive throttling, session tracking, response caching, and
//! work queues layered over one key-value store with counters, TTLs, sets, and sorted sets.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod config;
pub mod error;
pub mod id;
pub mod keys;
pub mod limit;
pub mod obs;
pub mod queue;
pub mod session;
pub mod store;

pub use cache::{CacheStats, CachedResponse, ResponseCache};
pub use config::KvConfig;
pub use error::{ConfigError, Error, Result};
pub use id::{IdentifierError, ModelId, PromptHash, QueueName, SessionToken, UserId};
pub use limit::{
	AdaptiveLimiter, BurstOutcome, GateDecision, RateLimitGate, RateLimitOutcome, RateLimiter,
	TooManyRequests,
};
pub use queue::{FifoQueue, PriorityQueue, QueueShape, WorkQueues};
pub use session::{Session, SessionStore};
pub use store::{Expiry, KvBackend, KvStore, MemoryBackend, StoreError};
#[cfg(feature = "redis")] pub use store::RedisBackend;

mod _prelude {
	pub use std::{
		collections::{HashMap, HashSet, VecDeque},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::Mutex;
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use serde_json::Value;
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};

	pub use crate::error::{Error, Result};
}

/// JSON object document used for session, cache, and metadata payloads.
pub type Payload = serde_json::Map<String, serde_json::Value>;
