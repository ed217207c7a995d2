//! Fixed-window rate limiting with an optional burst allowance.
//!
//! Each identifier owns a counter under `rate_limit:{identifier}`. The first increment in a
//! window starts the TTL clock; the counter disappears when the TTL lapses and the next
//! request opens a fresh window. The scheme is a fixed window, not a sliding one: a burst at
//! the end of one window followed by a burst at the start of the next admits up to twice the
//! limit within one window length.
//!
//! Burst checks add a second, independent counter under `rate_limit_burst:{identifier}` with
//! a short window. The two counters are not updated atomically together.

pub mod adaptive;
pub mod gate;

pub use adaptive::AdaptiveLimiter;
pub use gate::{GateDecision, RateLimitGate, TooManyRequests};

// self
use crate::{
	_prelude::*,
	config::KvConfig,
	keys,
	obs::{self, OpKind, OpOutcome, OpSpan},
	store::{KvStore, StoreError},
};

/// Result of consuming one request from a fixed-window bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitOutcome {
	/// Whether the request fits every configured bucket.
	pub allowed: bool,
	/// Post-increment count of the main bucket.
	pub count: u64,
	/// Limit the main bucket was checked against.
	pub limit: u64,
	/// Requests left in the main window.
	pub remaining: u64,
	/// Approximate end of the main window (check instant plus the window length).
	pub reset_at: OffsetDateTime,
	/// Burst bucket state, when a burst limit was configured.
	pub burst: Option<BurstOutcome>,
}
impl RateLimitOutcome {
	/// Earliest instant at which a rejected request may succeed.
	pub fn retry_at(&self) -> OffsetDateTime {
		match &self.burst {
			Some(burst) if !burst.allowed && self.count <= self.limit => burst.reset_at,
			_ => self.reset_at,
		}
	}
}

/// State of the short burst bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BurstOutcome {
	/// Whether the burst bucket admitted the request.
	pub allowed: bool,
	/// Post-increment count of the burst bucket.
	pub count: u64,
	/// Burst limit the bucket was checked against.
	pub limit: u64,
	/// Approximate end of the burst window.
	pub reset_at: OffsetDateTime,
}

/// Fixed-window limiter backed by the shared store's atomic counters.
#[derive(Clone, Debug)]
pub struct RateLimiter {
	store: KvStore,
	burst_window: Duration,
}
impl RateLimiter {
	const DEFAULT_BURST_WINDOW: Duration = Duration::seconds(10);

	/// Creates a limiter with the default 10 second burst window.
	pub fn new(store: KvStore) -> Self {
		Self { store, burst_window: Self::DEFAULT_BURST_WINDOW }
	}

	/// Creates a limiter using the configured burst window.
	pub fn from_config(store: KvStore, config: &KvConfig) -> Self {
		Self::new(store).with_burst_window(config.burst_window())
	}

	/// Overrides the burst window length.
	pub fn with_burst_window(mut self, window: Duration) -> Self {
		self.burst_window = window;

		self
	}

	/// Consumes one request from the identifier's main bucket.
	pub async fn check(
		&self,
		identifier: &str,
		limit: u64,
		window: Duration,
	) -> Result<RateLimitOutcome, StoreError> {
		self.check_with_burst(identifier, limit, window, None).await
	}

	/// Consumes one request from the main bucket and, when `burst_limit` is set, from the
	/// burst bucket too; the request is allowed only if both admit it.
	pub async fn check_with_burst(
		&self,
		identifier: &str,
		limit: u64,
		window: Duration,
		burst_limit: Option<u64>,
	) -> Result<RateLimitOutcome, StoreError> {
		let span = OpSpan::new(OpKind::RateLimit, "check");

		span.instrument(async move {
			let now = OffsetDateTime::now_utc();
			let window = effective_window(window);
			let count = self.consume(&keys::rate_limit(identifier), window).await?;
			let burst = match burst_limit {
				Some(burst_limit) => {
					let burst_window = effective_window(self.burst_window);
					let burst_key = keys::rate_limit_burst(identifier);
					let count = self.consume(&burst_key, burst_window).await?;

					Some(BurstOutcome {
						allowed: count <= burst_limit,
						count,
						limit: burst_limit,
						reset_at: now + burst_window,
					})
				},
				None => None,
			};
			let allowed = count <= limit && burst.as_ref().is_none_or(|burst| burst.allowed);

			obs::record_op_outcome(
				OpKind::RateLimit,
				if allowed { OpOutcome::Allowed } else { OpOutcome::Rejected },
			);

			Ok(RateLimitOutcome {
				allowed,
				count,
				limit,
				remaining: limit.saturating_sub(count),
				reset_at: now + window,
				burst,
			})
		})
		.await
	}

	/// Reads the main bucket without consuming quota.
	pub async fn peek(
		&self,
		identifier: &str,
		limit: u64,
		window: Duration,
	) -> Result<RateLimitOutcome, StoreError> {
		let key = keys::rate_limit(identifier);
		let now = OffsetDateTime::now_utc();
		let count = match self.store.get(&key).await? {
			Some(raw) => raw.parse::<u64>().map_err(|e| StoreError::Decode {
				key: key.clone(),
				message: e.to_string(),
			})?,
			None => 0,
		};
		let reset_at = match self.store.time_to_live(&key).await? {
			Some(ttl) => now + ttl,
			None => now + effective_window(window),
		};

		Ok(RateLimitOutcome {
			allowed: count < limit,
			count,
			limit,
			remaining: limit.saturating_sub(count),
			reset_at,
			burst: None,
		})
	}

	/// Deletes both buckets of an identifier, returning whether anything was removed.
	pub async fn reset(&self, identifier: &str) -> Result<bool, StoreError> {
		let main = self.store.delete(&keys::rate_limit(identifier)).await?;
		let burst = self.store.delete(&keys::rate_limit_burst(identifier)).await?;

		Ok(main || burst)
	}

	/// Increments a bucket and starts its TTL when the increment opened a new window.
	async fn consume(&self, key: &str, window: Duration) -> Result<u64, StoreError> {
		let count = self.store.increment(key, 1).await?;

		// Not atomic with the increment: if this expire is lost the bucket never expires.
		if count == 1 {
			self.store.expire(key, window).await?;
		}

		Ok(count.max(0) as u64)
	}
}

// Non-positive windows would expire the bucket immediately and disable limiting.
fn effective_window(window: Duration) -> Duration {
	if window.is_positive() { window } else { Duration::seconds(1) }
}
