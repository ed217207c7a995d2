//! Request admission built on the limiters, with the fail-open policy applied.
//!
//! A store outage must not take the service down with it, so a failed limiter check admits
//! the request and records a degraded outcome. Rejections carry everything needed to answer
//! with a "too many requests" response.

// self
use crate::{
	_prelude::*,
	config::KvConfig,
	id::UserId,
	limit::{AdaptiveLimiter, RateLimitOutcome, RateLimiter},
	obs::{self, OpKind, OpOutcome},
	store::KvStore,
};

/// Admission verdict for one inbound request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
	/// The request may proceed. `outcome` is `None` when the check was skipped because the
	/// store failed.
	Allow {
		/// Limiter state after the request was counted.
		outcome: Option<RateLimitOutcome>,
	},
	/// The request exceeded a limit.
	Reject(TooManyRequests),
}
impl GateDecision {
	/// Returns `true` when the request may proceed.
	pub fn is_allowed(&self) -> bool {
		matches!(self, Self::Allow { .. })
	}

	fn from_outcome(outcome: RateLimitOutcome) -> Self {
		if outcome.allowed {
			Self::Allow { outcome: Some(outcome) }
		} else {
			Self::Reject(TooManyRequests::from_outcome(&outcome))
		}
	}
}

/// Rejection details for a rate-limited request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TooManyRequests {
	/// Limit that was exceeded.
	pub limit: u64,
	/// Always zero for a rejection.
	pub remaining: u64,
	/// Instant at which the exhausted window ends.
	pub reset_at: OffsetDateTime,
	/// Suggested wait before retrying, never negative.
	pub retry_after: Duration,
}
impl TooManyRequests {
	fn from_outcome(outcome: &RateLimitOutcome) -> Self {
		Self::at(outcome, OffsetDateTime::now_utc())
	}

	fn at(outcome: &RateLimitOutcome, now: OffsetDateTime) -> Self {
		let (limit, reset_at) = match &outcome.burst {
			Some(burst) if !burst.allowed && outcome.count <= outcome.limit =>
				(burst.limit, burst.reset_at),
			_ => (outcome.limit, outcome.reset_at),
		};
		let retry_after = (reset_at - now).max(Duration::ZERO);

		Self { limit, remaining: 0, reset_at, retry_after }
	}

	/// Conventional response headers for the rejection.
	///
	/// `X-RateLimit-Reset` is a Unix timestamp; `Retry-After` is whole seconds, rounded up.
	pub fn headers(&self) -> [(&'static str, String); 4] {
		let whole = self.retry_after.whole_seconds();
		let retry_after =
			if self.retry_after > Duration::seconds(whole) { whole + 1 } else { whole };

		[
			("X-RateLimit-Limit", self.limit.to_string()),
			("X-RateLimit-Remaining", self.remaining.to_string()),
			("X-RateLimit-Reset", self.reset_at.unix_timestamp().to_string()),
			("Retry-After", retry_after.to_string()),
		]
	}
}
impl Display for TooManyRequests {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(
			f,
			"Too many requests: limit {} exhausted, retry in {}s.",
			self.limit,
			self.retry_after.whole_seconds()
		)
	}
}

/// Admission gate applied in front of request handlers.
#[derive(Clone, Debug)]
pub struct RateLimitGate {
	limiter: RateLimiter,
	adaptive: AdaptiveLimiter,
}
impl RateLimitGate {
	/// Builds a gate with the default burst window.
	pub fn new(store: KvStore) -> Self {
		Self::with_limiter(store.clone(), RateLimiter::new(store))
	}

	/// Builds a gate using the configured burst window.
	pub fn from_config(store: KvStore, config: &KvConfig) -> Self {
		Self::with_limiter(store.clone(), RateLimiter::from_config(store, config))
	}

	fn with_limiter(store: KvStore, limiter: RateLimiter) -> Self {
		let adaptive = AdaptiveLimiter::new(store, limiter.clone());

		Self { limiter, adaptive }
	}

	/// Counts a request against `identifier`, typically a client address or API key.
	pub async fn admit(
		&self,
		identifier: &str,
		limit: u64,
		window: Duration,
		burst_limit: Option<u64>,
	) -> GateDecision {
		match self.limiter.check_with_burst(identifier, limit, window, burst_limit).await {
			Ok(outcome) => GateDecision::from_outcome(outcome),
			Err(_) => degraded(OpKind::RateLimit),
		}
	}

	/// Counts a request against the user's trust-scaled quota.
	pub async fn admit_user(&self, user: &UserId, base_limit: u64, window: Duration) -> GateDecision {
		match self.adaptive.check_for_user(user, base_limit, window).await {
			Ok(outcome) => GateDecision::from_outcome(outcome),
			Err(_) => degraded(OpKind::AdaptiveLimit),
		}
	}

	/// Underlying fixed-window limiter, for `peek` and `reset`.
	pub fn limiter(&self) -> &RateLimiter {
		&self.limiter
	}
}

// The failure itself was already logged by the store adapter.
fn degraded(kind: OpKind) -> GateDecision {
	obs::record_op_outcome(kind, OpOutcome::Degraded);

	GateDecision::Allow { outcome: None }
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::limit::BurstOutcome;

	fn rejected(count: u64, reset_in: Duration, now: OffsetDateTime) -> RateLimitOutcome {
		RateLimitOutcome {
			allowed: false,
			count,
			limit: 3,
			remaining: 0,
			reset_at: now + reset_in,
			burst: None,
		}
	}

	#[test]
	fn rejection_reports_the_exhausted_window() {
		let now = OffsetDateTime::now_utc();
		let rejection = TooManyRequests::at(&rejected(4, Duration::seconds(30), now), now);

		assert_eq!(rejection.limit, 3);
		assert_eq!(rejection.remaining, 0);
		assert_eq!(rejection.retry_after, Duration::seconds(30));
	}

	#[test]
	fn burst_rejection_reports_the_burst_window() {
		let now = OffsetDateTime::now_utc();
		let mut outcome = rejected(2, Duration::seconds(60), now);

		outcome.burst = Some(BurstOutcome {
			allowed: false,
			count: 6,
			limit: 5,
			reset_at: now + Duration::seconds(10),
		});

		let rejection = TooManyRequests::at(&outcome, now);

		assert_eq!(rejection.limit, 5);
		assert_eq!(rejection.retry_after, Duration::seconds(10));
	}

	#[test]
	fn stale_reset_never_yields_negative_retry() {
		let now = OffsetDateTime::now_utc();
		let rejection = TooManyRequests::at(&rejected(4, Duration::seconds(-5), now), now);

		assert_eq!(rejection.retry_after, Duration::ZERO);
	}

	#[test]
	fn headers_round_retry_after_up() {
		let rejection = TooManyRequests {
			limit: 10,
			remaining: 0,
			reset_at: OffsetDateTime::UNIX_EPOCH + Duration::seconds(1_700_000_000),
			retry_after: Duration::milliseconds(1_200),
		};
		let headers = rejection.headers();

		assert_eq!(headers[0], ("X-RateLimit-Limit", "10".into()));
		assert_eq!(headers[1], ("X-RateLimit-Remaining", "0".into()));
		assert_eq!(headers[2], ("X-RateLimit-Reset", "1700000000".into()));
		assert_eq!(headers[3], ("Retry-After", "2".into()));
	}

	#[tokio::test]
	async fn gate_rejects_after_limit() {
		let (store, _backend) = KvStore::in_memory();
		let gate = RateLimitGate::new(store);

		for _ in 0..2 {
			assert!(gate.admit("10.0.0.1", 2, Duration::minutes(1), None).await.is_allowed());
		}

		match gate.admit("10.0.0.1", 2, Duration::minutes(1), None).await {
			GateDecision::Reject(rejection) => {
				assert_eq!(rejection.limit, 2);
				assert!(rejection.retry_after <= Duration::minutes(1));
			},
			other => panic!("Third request should be rejected: {other:?}"),
		}
	}

	#[tokio::test]
	async fn gate_fails_open_when_store_is_down() {
		let (store, backend) = KvStore::in_memory();
		let gate = RateLimitGate::new(store);
		let user = UserId::new("u-1").expect("User fixture should be valid.");

		backend.set_offline(true);

		assert_eq!(
			gate.admit("10.0.0.2", 1, Duration::minutes(1), Some(1)).await,
			GateDecision::Allow { outcome: None }
		);
		assert_eq!(
			gate.admit_user(&user, 0, Duration::minutes(1)).await,
			GateDecision::Allow { outcome: None }
		);
	}
}
