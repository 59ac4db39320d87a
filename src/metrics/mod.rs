//! Prometheus metrics module
//!
//! Recording goes through the `metrics` facade, so the free functions below
//! are no-ops until `RelayMetrics::install` has set up the recorder. That
//! keeps the gateway and the bridge usable in tests without a recorder.

use crate::error::RelayError;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Duration;

/// Relay metrics exporter
#[derive(Clone)]
pub struct RelayMetrics {
    handle: Arc<PrometheusHandle>,
}

impl RelayMetrics {
    /// Install the global Prometheus recorder
    pub fn install() -> Result<Self, RelayError> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| RelayError::MetricsInstall(Box::new(e)))?;

        Self::register_metrics();

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    fn register_metrics() {
        describe_gauge!(
            "relay_connections",
            Unit::Count,
            "Currently connected subscribers"
        );
        describe_counter!(
            "relay_subscription_changes_total",
            Unit::Count,
            "Subscribe/unsubscribe operations that changed membership"
        );
        describe_counter!(
            "relay_frames_delivered_total",
            Unit::Count,
            "Frames enqueued to subscribers"
        );
        describe_counter!(
            "relay_frames_dropped_total",
            Unit::Count,
            "Frames dropped for closed or lagging subscribers"
        );
        describe_counter!(
            "relay_head_changed_total",
            Unit::Count,
            "Head-changed triggers by outcome"
        );
        describe_counter!(
            "relay_transactions_relayed_total",
            Unit::Count,
            "Transactions published to topics"
        );
        describe_counter!("relay_errors_total", Unit::Count, "Total relay errors");
        describe_histogram!(
            "relay_head_duration_seconds",
            Unit::Seconds,
            "Time from head-changed trigger to last publish"
        );
        describe_gauge!(
            "relay_consensus_established",
            Unit::Count,
            "Consensus status (1=established, 0=syncing)"
        );
        describe_gauge!("relay_peers", Unit::Count, "Connected peers");
        describe_gauge!("relay_chain_height", Unit::Count, "Local head height");
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

pub fn set_connections(count: usize) {
    gauge!("relay_connections").set(count as f64);
}

pub fn record_subscription_change(kind: &'static str) {
    counter!("relay_subscription_changes_total", "kind" => kind).increment(1);
}

pub fn record_publish(event: &'static str, delivered: usize, dropped: usize) {
    counter!("relay_frames_delivered_total", "event" => event).increment(delivered as u64);
    if dropped > 0 {
        counter!("relay_frames_dropped_total", "event" => event).increment(dropped as u64);
    }
}

/// Outcome: `relayed`, `not_established` or `failed`
pub fn record_head_changed(outcome: &'static str) {
    counter!("relay_head_changed_total", "outcome" => outcome).increment(1);
}

pub fn record_relayed(transactions: usize, duration: Duration) {
    counter!("relay_transactions_relayed_total").increment(transactions as u64);
    histogram!("relay_head_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_error(error_type: &'static str) {
    counter!("relay_errors_total", "error_type" => error_type).increment(1);
}

pub fn set_consensus_established(established: bool) {
    gauge!("relay_consensus_established").set(if established { 1.0 } else { 0.0 });
}

pub fn set_peers(count: usize) {
    gauge!("relay_peers").set(count as f64);
}

pub fn set_chain_height(height: u32) {
    gauge!("relay_chain_height").set(f64::from(height));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        set_connections(3);
        record_publish("tx", 2, 1);
        record_head_changed("relayed");
        record_relayed(2, Duration::from_millis(5));
        set_consensus_established(true);
    }
}
