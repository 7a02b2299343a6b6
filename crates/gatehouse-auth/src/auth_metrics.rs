//! Decision metrics
//!
//! Enable with the `metrics` feature flag. A `metrics` recorder must be
//! installed by the host for anything to be exported.
//!
//! - `gatehouse_decisions_total` - decisions (labels: method, outcome)
//! - `gatehouse_cache_lookups_total` - cache lookups (labels: cache, result)
//! - `gatehouse_decision_duration_seconds` - time spent in a decision
//!
//! Without the feature every function here is a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_histogram, histogram};

#[cfg(feature = "metrics")]
use std::sync::Once;

use crate::decision::Decision;

#[cfg(feature = "metrics")]
static INIT: Once = Once::new();

/// Register metric descriptions. Idempotent.
#[cfg(feature = "metrics")]
pub fn init_metrics() {
    INIT.call_once(|| {
        describe_counter!(
            "gatehouse_decisions_total",
            "Authentication decisions by method and outcome"
        );
        describe_counter!(
            "gatehouse_cache_lookups_total",
            "Token and authorization cache lookups"
        );
        describe_histogram!(
            "gatehouse_decision_duration_seconds",
            "Time spent producing a decision"
        );
    });
}

#[cfg_attr(not(feature = "metrics"), allow(dead_code))]
fn outcome(decision: &Decision) -> &'static str {
    match (decision.is_authed, decision.is_authorized) {
        (true, true) => "allowed",
        (true, false) => "forbidden",
        (false, _) if decision.error.is_some() => "rejected",
        (false, _) => "anonymous",
    }
}

#[cfg(feature = "metrics")]
pub(crate) fn record_decision(decision: &Decision, duration_seconds: f64) {
    let method = decision.method.map_or("none", |m| m.as_str());
    counter!(
        "gatehouse_decisions_total",
        "method" => method,
        "outcome" => outcome(decision)
    )
    .increment(1);
    histogram!("gatehouse_decision_duration_seconds").record(duration_seconds);
}

#[cfg(feature = "metrics")]
pub(crate) fn record_cache_lookup(cache: &'static str, hit: bool) {
    counter!(
        "gatehouse_cache_lookups_total",
        "cache" => cache,
        "result" => if hit { "hit" } else { "miss" }
    )
    .increment(1);
}

#[cfg(not(feature = "metrics"))]
#[allow(missing_docs)]
pub fn init_metrics() {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_decision(_decision: &Decision, _duration_seconds: f64) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_cache_lookup(_cache: &'static str, _hit: bool) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::AuthMethod;

    #[test]
    fn test_init_metrics_idempotent() {
        init_metrics();
        init_metrics();
    }

    #[test]
    fn test_outcome_labels() {
        let mut decision = Decision::anonymous();
        assert_eq!(outcome(&decision), "anonymous");

        decision.method = Some(AuthMethod::Error);
        decision.error = Some("invalid or expired token".to_string());
        assert_eq!(outcome(&decision), "rejected");

        decision.is_authed = true;
        decision.error = None;
        assert_eq!(outcome(&decision), "forbidden");

        decision.is_authorized = true;
        assert_eq!(outcome(&decision), "allowed");
    }

    #[test]
    fn test_record_functions() {
        record_decision(&Decision::internal_error(), 0.001);
        record_cache_lookup("token", true);
        record_cache_lookup("authz", false);
    }
}
