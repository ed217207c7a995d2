//! Store adapter: the single point of contact with the shared key-value store.
//!
//! [`KvBackend`] is the backend contract (atomic counters, TTLs, sets, sorted sets, lists, and
//! publish). [`KvStore`] wraps one shared backend instance, logs every failure with its
//! operation and key, and hands callers a typed [`StoreError`] so each component can pick its
//! own fail-open or fail-closed policy.

pub mod memory;
#[cfg(feature = "redis")] pub mod redis;

pub use memory::MemoryBackend;
#[cfg(feature = "redis")] pub use redis::RedisBackend;

// self
use crate::{_prelude::*, obs};

/// Boxed future returned by every [`KvBackend`] operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Backend contract implemented by shared key-value stores.
///
/// Each method maps to one atomic store command. Implementations must be safe for concurrent
/// use by many in-flight logical operations.
pub trait KvBackend
where
	Self: Send + Sync,
{
	/// Reads a string value.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Writes a string value with the provided expiry behavior.
	fn set<'a>(&'a self, key: &'a str, value: String, expiry: Expiry) -> StoreFuture<'a, ()>;

	/// Overwrites a string value only if the key is still live, returning whether the write
	/// applied. Never creates the key.
	fn set_if_exists<'a>(
		&'a self,
		key: &'a str,
		value: String,
		expiry: Expiry,
	) -> StoreFuture<'a, bool>;

	/// Deletes a key, returning whether it existed.
	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool>;

	/// Returns whether a key exists.
	fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool>;

	/// Atomically adds `amount` to an integer value (missing keys start at zero).
	fn increment<'a>(&'a self, key: &'a str, amount: i64) -> StoreFuture<'a, i64>;

	/// Sets a TTL on an existing key, returning whether the key existed.
	fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> StoreFuture<'a, bool>;

	/// Remaining TTL of a key; `None` when the key is missing or has no expiry.
	fn time_to_live<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Duration>>;

	/// Adds a member to a set, returning whether it was newly added.
	fn add_to_set<'a>(&'a self, key: &'a str, member: &'a str) -> StoreFuture<'a, bool>;

	/// Removes a member from a set, returning whether it was present.
	fn remove_from_set<'a>(&'a self, key: &'a str, member: &'a str) -> StoreFuture<'a, bool>;

	/// Lists all members of a set.
	fn members_of_set<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<String>>;

	/// Adds or rescores a sorted-set member, returning whether it was newly added.
	fn add_scored<'a>(
		&'a self,
		key: &'a str,
		member: &'a str,
		score: f64,
	) -> StoreFuture<'a, bool>;

	/// Removes and returns the member with the highest score.
	fn pop_highest_score<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<(String, f64)>>;

	/// Number of members in a sorted set.
	fn scored_len<'a>(&'a self, key: &'a str) -> StoreFuture<'a, u64>;

	/// Appends a value to the tail of a list, returning the new length.
	fn push_back<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, u64>;

	/// Removes and returns the head of a list.
	fn pop_front<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Number of values in a list.
	fn list_len<'a>(&'a self, key: &'a str) -> StoreFuture<'a, u64>;

	/// Publishes a message, returning how many subscribers received it.
	fn publish<'a>(&'a self, channel: &'a str, message: String) -> StoreFuture<'a, u64>;

	/// Releases the underlying connection; the next operation reconnects lazily.
	fn close(&self) -> StoreFuture<'_, ()>;
}

/// Expiry behavior applied by [`KvBackend::set`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expiry {
	/// Store without a TTL.
	Persist,
	/// Expire after the provided duration.
	After(Duration),
	/// Keep whatever TTL the key already has.
	Keep,
}

/// Error type produced by [`KvBackend`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum StoreError {
	/// The store could not be reached or did not answer in time.
	#[error("Store unavailable during {operation}: {message}.")]
	Unavailable {
		/// Store operation that failed.
		operation: &'static str,
		/// Human-readable error payload.
		message: String,
	},
	/// The store answered with an error (wrong value type, malformed reply).
	#[error("Store rejected {operation}: {message}.")]
	Protocol {
		/// Store operation that failed.
		operation: &'static str,
		/// Human-readable error payload.
		message: String,
	},
	/// A stored value is not valid structured data.
	#[error("Value under `{key}` could not be decoded: {message}.")]
	Decode {
		/// Key holding the undecodable value.
		key: String,
		/// Human-readable error payload, including the JSON path.
		message: String,
	},
}

/// Shared, cloneable handle over one [`KvBackend`].
///
/// Build it once at process start and clone it into every component; all clones share the
/// same backend and therefore the same connection.
#[derive(Clone)]
pub struct KvStore {
	backend: Arc<dyn KvBackend>,
}
impl KvStore {
	/// Wraps an already constructed backend.
	pub fn new(backend: Arc<dyn KvBackend>) -> Self {
		Self { backend }
	}

	/// Builds a store over a fresh in-process backend and returns both handles.
	pub fn in_memory() -> (Self, MemoryBackend) {
		let backend = MemoryBackend::default();

		(Self::new(Arc::new(backend.clone())), backend)
	}

	/// Builds a store over a lazily connected Redis backend.
	#[cfg(feature = "redis")]
	pub fn connect(config: &crate::KvConfig) -> Result<Self> {
		Ok(Self::new(Arc::new(RedisBackend::new(config)?)))
	}

	/// Reads a string value.
	pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		observe("get", key, self.backend.get(key)).await
	}

	/// Writes a string value.
	pub async fn set(&self, key: &str, value: String, expiry: Expiry) -> Result<(), StoreError> {
		observe("set", key, self.backend.set(key, value, expiry)).await
	}

	/// Overwrites a live key; returns `false` without writing when the key is gone.
	pub async fn set_if_exists(
		&self,
		key: &str,
		value: String,
		expiry: Expiry,
	) -> Result<bool, StoreError> {
		observe("set_if_exists", key, self.backend.set_if_exists(key, value, expiry)).await
	}

	/// Deletes a key, returning whether it existed.
	pub async fn delete(&self, key: &str) -> Result<bool, StoreError> {
		observe("delete", key, self.backend.delete(key)).await
	}

	/// Returns whether a key exists.
	pub async fn exists(&self, key: &str) -> Result<bool, StoreError> {
		observe("exists", key, self.backend.exists(key)).await
	}

	/// Atomically adds `amount` to a counter and returns the new value.
	pub async fn increment(&self, key: &str, amount: i64) -> Result<i64, StoreError> {
		observe("increment", key, self.backend.increment(key, amount)).await
	}

	/// Sets a TTL on an existing key.
	pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
		observe("expire", key, self.backend.expire(key, ttl)).await
	}

	/// Remaining TTL of a key.
	pub async fn time_to_live(&self, key: &str) -> Result<Option<Duration>, StoreError> {
		observe("time_to_live", key, self.backend.time_to_live(key)).await
	}

	/// Adds a set member.
	pub async fn add_to_set(&self, key: &str, member: &str) -> Result<bool, StoreError> {
		observe("add_to_set", key, self.backend.add_to_set(key, member)).await
	}

	/// Removes a set member.
	pub async fn remove_from_set(&self, key: &str, member: &str) -> Result<bool, StoreError> {
		observe("remove_from_set", key, self.backend.remove_from_set(key, member)).await
	}

	/// Lists set members.
	pub async fn members_of_set(&self, key: &str) -> Result<Vec<String>, StoreError> {
		observe("members_of_set", key, self.backend.members_of_set(key)).await
	}

	/// Adds a scored member.
	pub async fn add_scored(&self, key: &str, member: &str, score: f64) -> Result<bool, StoreError> {
		observe("add_scored", key, self.backend.add_scored(key, member, score)).await
	}

	/// Removes and returns the highest-scored member.
	pub async fn pop_highest_score(&self, key: &str) -> Result<Option<(String, f64)>, StoreError> {
		observe("pop_highest_score", key, self.backend.pop_highest_score(key)).await
	}

	/// Sorted-set cardinality.
	pub async fn scored_len(&self, key: &str) -> Result<u64, StoreError> {
		observe("scored_len", key, self.backend.scored_len(key)).await
	}

	/// Appends to a list.
	pub async fn push_back(&self, key: &str, value: String) -> Result<u64, StoreError> {
		observe("push_back", key, self.backend.push_back(key, value)).await
	}

	/// Pops the head of a list.
	pub async fn pop_front(&self, key: &str) -> Result<Option<String>, StoreError> {
		observe("pop_front", key, self.backend.pop_front(key)).await
	}

	/// List length.
	pub async fn list_len(&self, key: &str) -> Result<u64, StoreError> {
		observe("list_len", key, self.backend.list_len(key)).await
	}

	/// Publishes a message on a channel.
	pub async fn publish(&self, channel: &str, message: String) -> Result<u64, StoreError> {
		observe("publish", channel, self.backend.publish(channel, message)).await
	}

	/// Releases the backend connection.
	pub async fn close(&self) -> Result<(), StoreError> {
		observe("close", "", self.backend.close()).await
	}

	/// Reads and decodes a JSON value.
	pub async fn get_json<T>(&self, key: &str) -> Result<Option<T>, StoreError>
	where
		T: DeserializeOwned,
	{
		match self.get(key).await? {
			Some(raw) => decode_json(key, &raw)
				.inspect_err(|e| obs::log_store_failure("decode", key, e))
				.map(Some),
			None => Ok(None),
		}
	}

	/// Encodes and writes a JSON value.
	pub async fn set_json<T>(&self, key: &str, value: &T, expiry: Expiry) -> Result<()>
	where
		T: ?Sized + Serialize,
	{
		let raw = serde_json::to_string(value)?;

		self.set(key, raw, expiry).await?;

		Ok(())
	}

	/// Encodes and overwrites a JSON value only if the key is still live.
	pub async fn set_json_if_exists<T>(&self, key: &str, value: &T, expiry: Expiry) -> Result<bool>
	where
		T: ?Sized + Serialize,
	{
		let raw = serde_json::to_string(value)?;

		Ok(self.set_if_exists(key, raw, expiry).await?)
	}
}
impl Debug for KvStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("KvStore(..)")
	}
}

/// Decodes a stored JSON document, reporting the failing JSON path.
pub fn decode_json<T>(key: &str, raw: &str) -> Result<T, StoreError>
where
	T: DeserializeOwned,
{
	let de = &mut serde_json::Deserializer::from_str(raw);

	serde_path_to_error::deserialize(de).map_err(|e| StoreError::Decode {
		key: key.to_owned(),
		message: format!("{} at `{}`", e.inner(), e.path()),
	})
}

async fn observe<T>(
	operation: &'static str,
	key: &str,
	fut: StoreFuture<'_, T>,
) -> Result<T, StoreError> {
	let result = fut.await;

	if let Err(e) = &result {
		obs::log_store_failure(operation, key, e);
	}

	result
}
