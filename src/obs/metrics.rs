// self
use crate::obs::{OpKind, OpOutcome};

/// Records a component outcome via the global metrics recorder (when enabled).
pub fn record_op_outcome(kind: OpKind, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"kv_gate_op_total",
			"op" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Counts a failed store command via the global metrics recorder (when enabled).
pub fn record_store_failure(operation: &'static str) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("kv_gate_store_failure_total", "operation" => operation).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = operation;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_noop_without_metrics() {
		record_op_outcome(OpKind::Cache, OpOutcome::Miss);
		record_store_failure("get");
	}
}
