//! Per-user quotas scaled by an externally computed trust score.

// self
use crate::{
	_prelude::*,
	id::UserId,
	keys,
	limit::{RateLimitOutcome, RateLimiter},
	obs::{self, OpKind, OpOutcome},
	store::{KvStore, StoreError},
};

const DEFAULT_TRUST_SCORE: f64 = 1.0;

#[derive(Debug, Deserialize)]
struct TrustScoreDoc {
	score: f64,
}

/// Scales a base limit by the user's trust score before delegating to [`RateLimiter`].
///
/// Scores live under `user_score:{user}` as `{"score": <float>}` and are maintained by an
/// outside scoring process. A missing, malformed, non-finite, or negative score, or a failed
/// read, resolves to `1.0`: bad scoring data never denies service on its own.
#[derive(Clone, Debug)]
pub struct AdaptiveLimiter {
	store: KvStore,
	limiter: RateLimiter,
}
impl AdaptiveLimiter {
	/// Wraps a limiter; `store` must be the same store the limiter counts in.
	pub fn new(store: KvStore, limiter: RateLimiter) -> Self {
		Self { store, limiter }
	}

	/// Resolves the user's trust score, falling back to `1.0`.
	pub async fn trust_score(&self, user: &UserId) -> f64 {
		let key = keys::user_score(user);

		match self.store.get_json::<TrustScoreDoc>(&key).await {
			Ok(Some(doc)) if doc.score.is_finite() && doc.score >= 0.0 => doc.score,
			Ok(_) | Err(_) => DEFAULT_TRUST_SCORE,
		}
	}

	/// Consumes one request from the user's bucket, `user:{user}`, against
	/// `floor(base_limit × trust score)`.
	pub async fn check_for_user(
		&self,
		user: &UserId,
		base_limit: u64,
		window: Duration,
	) -> Result<RateLimitOutcome, StoreError> {
		let score = self.trust_score(user).await;
		let adjusted = adjusted_limit(base_limit, score);
		let result = self.limiter.check(&keys::user_scope(user), adjusted, window).await;

		if let Ok(outcome) = &result {
			obs::record_op_outcome(
				OpKind::AdaptiveLimit,
				if outcome.allowed { OpOutcome::Allowed } else { OpOutcome::Rejected },
			);
		}

		result
	}
}

fn adjusted_limit(base_limit: u64, score: f64) -> u64 {
	// Float-to-int `as` saturates, so huge scores clamp to u64::MAX.
	(base_limit as f64 * score).floor() as u64
}
