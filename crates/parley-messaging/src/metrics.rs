// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade; whichever recorder the binary installs
//! collects these. Without a recorder every call is a no-op.

use metrics::describe_counter;
use parley_core::ConnectivityStatus;
use parley_core::types::MessageKind;

/// Register all Parley metric descriptions.
pub fn register_metrics() {
    describe_counter!("parley_sends_total", "Outbound sends accepted by the provider");
    describe_counter!(
        "parley_send_failures_total",
        "Outbound sends that ended in a failed message"
    );
    describe_counter!(
        "parley_admission_rejections_total",
        "Sends refused by the cooldown"
    );
    describe_counter!("parley_probe_results_total", "Connectivity probe verdicts");
}

pub fn record_send(kind: MessageKind) {
    metrics::counter!("parley_sends_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_send_failure(reason: &'static str) {
    metrics::counter!("parley_send_failures_total", "reason" => reason).increment(1);
}

pub fn record_admission_rejection() {
    metrics::counter!("parley_admission_rejections_total").increment(1);
}

pub fn record_probe(status: ConnectivityStatus) {
    metrics::counter!("parley_probe_results_total", "status" => status.to_string()).increment(1);
}
