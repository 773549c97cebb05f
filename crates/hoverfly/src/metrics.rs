//! Per-mode request counters.

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec};
use std::collections::HashMap;

lazy_static! {
    /// Requests processed successfully, labelled by the mode that served them.
    pub static ref MODE_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "hoverfly_mode_requests_total",
        "Total number of requests processed per mode",
        &["mode"]
    )
    .unwrap();
}

/// Count one successfully processed request against a mode.
pub fn count_request(mode: &str) {
    MODE_REQUESTS_TOTAL.with_label_values(&[mode]).inc();
}

/// Snapshot of all per-mode counters for the admin usage view.
pub fn counters(modes: &[&str]) -> HashMap<String, u64> {
    modes
        .iter()
        .map(|mode| {
            let count = MODE_REQUESTS_TOTAL.with_label_values(&[mode]).get();
            (mode.to_string(), count)
        })
        .collect()
}
