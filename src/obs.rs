//! Optional observability helpers for store-backed operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit spans named `kv_gate.op` with the `op` (component) and `stage`
//!   (call site) fields, plus a `warn` event for every failed store command carrying the
//!   operation, key, and error.
//! - Enable `metrics` to increment the `kv_gate_op_total` counter for every component outcome,
//!   labeled by `op` + `outcome`, and `kv_gate_store_failure_total` labeled by `operation`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Components whose outcomes are observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Fixed-window rate limiter.
	RateLimit,
	/// Trust-score scaled limiter.
	AdaptiveLimit,
	/// Session lifecycle operations.
	Session,
	/// Model response cache.
	Cache,
	/// Work queue hand-off.
	Queue,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::RateLimit => "rate_limit",
			OpKind::AdaptiveLimit => "adaptive_limit",
			OpKind::Session => "session",
			OpKind::Cache => "cache",
			OpKind::Queue => "queue",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded per operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// The guarded action may proceed.
	Allowed,
	/// A limiter refused the action.
	Rejected,
	/// The store failed and the component degraded to its fallback policy.
	Degraded,
	/// A cached value was served.
	Hit,
	/// No cached value was available.
	Miss,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Allowed => "allowed",
			OpOutcome::Rejected => "rejected",
			OpOutcome::Degraded => "degraded",
			OpOutcome::Hit => "hit",
			OpOutcome::Miss => "miss",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
