//! Prometheus metrics for tracked resources
//!
//! Tracks live resources by kind, cleanup outcomes, and id consistency violations

use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge_vec, IntCounter,
    IntCounterVec, IntGaugeVec,
};

lazy_static::lazy_static! {
    /// Resources currently in the registry, by kind
    static ref ACTIVE_RESOURCES: IntGaugeVec = register_int_gauge_vec!(
        "resource_tracker_active_resources",
        "Resources currently held in the registry",
        &["kind"]
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Cleanup attempts by kind and outcome (reclaimed/leaked)
    static ref CLEANUP_TOTAL: IntCounterVec = register_int_counter_vec!(
        "resource_tracker_cleanup_total",
        "Cleanup attempts by outcome",
        &["kind", "outcome"]
    ).expect("Prometheus metrics registration should succeed at startup");

    static ref CONSISTENCY_VIOLATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "resource_tracker_consistency_violations_total",
        "Parent/derived id pairs that failed validation",
        &["component", "reason"]
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Leaked records removed by aged cleanup
    static ref REAPED_TOTAL: IntCounter = register_int_counter!(
        "resource_tracker_reaped_total",
        "Leaked resources removed by aged cleanup"
    ).expect("Prometheus metrics registration should succeed at startup");
}

pub(crate) fn resource_added(kind: &str) {
    ACTIVE_RESOURCES.with_label_values(&[kind]).inc();
}

pub(crate) fn resource_removed(kind: &str) {
    ACTIVE_RESOURCES.with_label_values(&[kind]).dec();
}

pub(crate) fn record_cleanup(kind: &str, outcome: &str) {
    CLEANUP_TOTAL.with_label_values(&[kind, outcome]).inc();
}

pub(crate) fn record_violation(component: &str, reason: &str) {
    CONSISTENCY_VIOLATIONS_TOTAL
        .with_label_values(&[component, reason])
        .inc();
}

pub(crate) fn record_reaped(count: usize) {
    REAPED_TOTAL.inc_by(count as u64);
}
