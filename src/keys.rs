//! Store key layout shared with every other process reading the same store.
//!
//! These names are a wire format: existing data written under them must stay readable, so
//! they are reproduced exactly and never prefixed.

// self
use crate::id::{ModelId, PromptHash, QueueName, SessionToken, UserId};

/// Main fixed-window bucket for a rate-limit identifier.
pub fn rate_limit(identifier: &str) -> String {
	format!("rate_limit:{identifier}")
}

/// Short-window burst bucket for a rate-limit identifier.
pub fn rate_limit_burst(identifier: &str) -> String {
	format!("rate_limit_burst:{identifier}")
}

/// Rate-limit identifier used by the adaptive limiter for a user.
pub fn user_scope(user: &UserId) -> String {
	format!("user:{user}")
}

/// Externally maintained trust score for a user.
pub fn user_score(user: &UserId) -> String {
	format!("user_score:{user}")
}

/// Session record.
pub fn session(token: &SessionToken) -> String {
	format!("session:{token}")
}

/// Set of live session tokens owned by a user.
pub fn user_sessions(user: &UserId) -> String {
	format!("user_sessions:{user}")
}

/// Cached model response for a prompt hash.
pub fn ai_cache(model: &ModelId, hash: &PromptHash) -> String {
	format!("ai_cache:{model}:{hash}")
}

/// Descriptive metadata for a model.
pub fn ai_model_meta(model: &ModelId) -> String {
	format!("ai_model_meta:{model}")
}

/// Unbounded per-model usage counter.
pub fn ai_model_usage(model: &ModelId) -> String {
	format!("ai_model_usage:{model}")
}

/// FIFO list backing a queue.
pub fn queue(name: &QueueName) -> String {
	format!("queue:{name}")
}

/// Sorted set backing a priority queue.
pub fn queue_priority(name: &QueueName) -> String {
	format!("queue:{name}:priority")
}
