//! Model response cache keyed by `(model, prompt hash)`.
//!
//! Entries expire by TTL only; nothing invalidates them explicitly. The cache is advisory:
//! store failures and undecodable entries read as misses so callers fall through to the
//! model.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	Payload,
	config::KvConfig,
	id::{ModelId, PromptHash},
	keys,
	obs::{self, OpKind, OpOutcome, OpSpan},
	store::{Expiry, KvStore, StoreError},
};

const STAMP_FIELDS: [&str; 2] = ["model", "cached_at"];

/// Cached model response: the caller's payload plus the `model` and `cached_at` stamps.
///
/// On the wire the stamp is the snake_case `cached_at` field, not `cachedAt`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
	/// Model that produced the response.
	pub model: ModelId,
	/// Instant the entry was written.
	#[serde(with = "time::serde::rfc3339")]
	pub cached_at: OffsetDateTime,
	/// Caller payload.
	#[serde(flatten)]
	pub payload: Payload,
}

/// Thread-safe hit/miss counters for one cache instance.
#[derive(Debug, Default)]
pub struct CacheStats {
	hits: AtomicU64,
	misses: AtomicU64,
	stores: AtomicU64,
}
impl CacheStats {
	/// Returns the number of lookups served from the cache.
	pub fn hits(&self) -> u64 {
		self.hits.load(Ordering::Relaxed)
	}

	/// Returns the number of lookups that fell through, failures included.
	pub fn misses(&self) -> u64 {
		self.misses.load(Ordering::Relaxed)
	}

	/// Returns the number of entries written.
	pub fn stores(&self) -> u64 {
		self.stores.load(Ordering::Relaxed)
	}

	/// Fraction of lookups served from the cache, `0.0` before the first lookup.
	pub fn hit_ratio(&self) -> f64 {
		let hits = self.hits();
		let total = hits + self.misses();

		if total == 0 { 0.0 } else { hits as f64 / total as f64 }
	}

	fn record_hit(&self) {
		self.hits.fetch_add(1, Ordering::Relaxed);
	}

	fn record_miss(&self) {
		self.misses.fetch_add(1, Ordering::Relaxed);
	}

	fn record_store(&self) {
		self.stores.fetch_add(1, Ordering::Relaxed);
	}
}

/// Response cache over the shared store.
#[derive(Clone, Debug)]
pub struct ResponseCache {
	store: KvStore,
	default_ttl: Duration,
	stats: Arc<CacheStats>,
}
impl ResponseCache {
	const DEFAULT_TTL: Duration = Duration::hours(1);

	/// Creates a cache with the default one hour TTL.
	pub fn new(store: KvStore) -> Self {
		Self { store, default_ttl: Self::DEFAULT_TTL, stats: Default::default() }
	}

	/// Creates a cache using the configured TTL.
	pub fn from_config(store: KvStore, config: &KvConfig) -> Self {
		Self::new(store).with_default_ttl(config.cache_ttl())
	}

	/// Overrides the TTL used when callers do not pass one.
	pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
		self.default_ttl = ttl;

		self
	}

	/// Counters shared by every clone of this cache.
	pub fn stats(&self) -> &CacheStats {
		&self.stats
	}

	/// Looks up a cached response; failures of any kind read as a miss.
	pub async fn get(&self, model: &ModelId, hash: &PromptHash) -> Option<CachedResponse> {
		let span = OpSpan::new(OpKind::Cache, "get");
		let key = keys::ai_cache(model, hash);
		let found = span.instrument(self.store.get_json::<CachedResponse>(&key)).await;

		match found {
			Ok(Some(entry)) => {
				self.stats.record_hit();
				obs::record_op_outcome(OpKind::Cache, OpOutcome::Hit);

				Some(entry)
			},
			Ok(None) => {
				self.stats.record_miss();
				obs::record_op_outcome(OpKind::Cache, OpOutcome::Miss);

				None
			},
			Err(_) => {
				self.stats.record_miss();
				obs::record_op_outcome(OpKind::Cache, OpOutcome::Degraded);

				None
			},
		}
	}

	/// Stores a response, stamping it with the model and the current time.
	///
	/// Writing the same `(model, hash)` again replaces the entry and restarts its TTL.
	pub async fn put(
		&self,
		model: &ModelId,
		hash: &PromptHash,
		payload: &Payload,
		ttl: Option<Duration>,
	) -> Result<CachedResponse> {
		let mut payload = payload.clone();

		for field in STAMP_FIELDS {
			payload.remove(field);
		}

		let entry =
			CachedResponse { model: model.clone(), cached_at: OffsetDateTime::now_utc(), payload };
		let ttl = ttl.unwrap_or(self.default_ttl);

		self.store.set_json(&keys::ai_cache(model, hash), &entry, Expiry::After(ttl)).await?;
		self.stats.record_store();

		Ok(entry)
	}

	/// Bumps the model's usage counter, returning the new count. The counter never expires.
	pub async fn increment_usage(&self, model: &ModelId) -> Result<u64, StoreError> {
		let count = self.store.increment(&keys::ai_model_usage(model), 1).await?;

		Ok(count.max(0) as u64)
	}

	/// Current usage count of a model.
	pub async fn usage(&self, model: &ModelId) -> Result<u64, StoreError> {
		let key = keys::ai_model_usage(model);

		match self.store.get(&key).await? {
			Some(raw) => raw
				.parse::<u64>()
				.map_err(|e| StoreError::Decode { key, message: e.to_string() }),
			None => Ok(0),
		}
	}

	/// Writes the model's metadata document, replacing any previous one. It never expires.
	pub async fn put_model_meta(&self, model: &ModelId, meta: &Payload) -> Result<()> {
		self.store.set_json(&keys::ai_model_meta(model), meta, Expiry::Persist).await
	}

	/// Reads the model's metadata document.
	pub async fn model_meta(&self, model: &ModelId) -> Result<Option<Payload>, StoreError> {
		self.store.get_json(&keys::ai_model_meta(model)).await
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::store::{KvBackend, MemoryBackend};

	fn cache() -> (ResponseCache, MemoryBackend) {
		let (store, backend) = KvStore::in_memory();

		(ResponseCache::new(store), backend)
	}

	fn model(id: &str) -> ModelId {
		ModelId::new(id).expect("Model fixture should be valid.")
	}

	fn answer(text: &str) -> Payload {
		let mut payload = Payload::new();

		payload.insert("answer".into(), json!(text));

		payload
	}

	#[tokio::test]
	async fn put_then_get_returns_stamped_payload() {
		let (cache, backend) = cache();
		let hash = PromptHash::of("what is rust");
		let stored = cache
			.put(&model("gpt"), &hash, &answer("a language"), None)
			.await
			.expect("Put should succeed.");
		let hit = cache.get(&model("gpt"), &hash).await.expect("Entry should be cached.");
		let ttl = backend
			.time_to_live(&format!("ai_cache:gpt:{hash}"))
			.await
			.expect("TTL read should succeed.")
			.expect("Entry should carry a TTL.");

		assert_eq!(hit, stored);
		assert_eq!(hit.payload["answer"], json!("a language"));
		assert!(ttl > Duration::minutes(59) && ttl <= Duration::hours(1));
		assert_eq!((cache.stats().hits(), cache.stats().stores()), (1, 1));
	}

	#[tokio::test]
	async fn stamps_override_caller_fields() {
		let (cache, backend) = cache();
		let hash = PromptHash::of("p");
		let mut payload = answer("x");

		payload.insert("model".into(), json!("spoofed"));
		cache.put(&model("gpt"), &hash, &payload, None).await.expect("Put should succeed.");

		let raw = backend
			.get(&format!("ai_cache:gpt:{hash}"))
			.await
			.expect("Raw read should succeed.")
			.expect("Entry should exist.");
		let doc: Value = serde_json::from_str(&raw).expect("Entry should be JSON.");

		assert_eq!(doc["model"], "gpt");
		assert!(doc["cached_at"].is_string());
	}

	#[tokio::test]
	async fn entries_expire_and_count_as_misses() {
		let (cache, backend) = cache();
		let hash = PromptHash::of("p");

		cache
			.put(&model("gpt"), &hash, &answer("x"), Some(Duration::seconds(30)))
			.await
			.expect("Put should succeed.");
		backend.advance(Duration::seconds(31));

		assert!(cache.get(&model("gpt"), &hash).await.is_none());
		assert_eq!(cache.stats().misses(), 1);
		assert_eq!(cache.stats().hit_ratio(), 0.0);
	}

	#[tokio::test]
	async fn failures_read_as_misses() {
		let (cache, backend) = cache();
		let hash = PromptHash::of("p");

		backend
			.set(&format!("ai_cache:gpt:{hash}"), "[1,2".into(), Expiry::Persist)
			.await
			.expect("Raw write should succeed.");

		assert!(cache.get(&model("gpt"), &hash).await.is_none());

		backend.set_offline(true);

		assert!(cache.get(&model("gpt"), &hash).await.is_none());
		assert_eq!(cache.stats().misses(), 2);
	}

	#[tokio::test]
	async fn usage_counter_has_no_ttl() {
		let (cache, backend) = cache();

		assert_eq!(cache.usage(&model("gpt")).await.expect("Read should succeed."), 0);

		for expected in 1..=3 {
			assert_eq!(
				cache.increment_usage(&model("gpt")).await.expect("Increment should succeed."),
				expected
			);
		}

		assert_eq!(cache.usage(&model("gpt")).await.expect("Read should succeed."), 3);
		assert!(
			backend
				.time_to_live("ai_model_usage:gpt")
				.await
				.expect("TTL read should succeed.")
				.is_none()
		);
	}

	#[tokio::test]
	async fn model_meta_round_trips() {
		let (cache, _backend) = cache();
		let mut meta = Payload::new();

		meta.insert("context_window".into(), json!(128_000));
		cache.put_model_meta(&model("gpt"), &meta).await.expect("Write should succeed.");

		assert_eq!(
			cache.model_meta(&model("gpt")).await.expect("Read should succeed."),
			Some(meta)
		);
		assert_eq!(cache.model_meta(&model("other")).await.expect("Read should succeed."), None);
	}
}
