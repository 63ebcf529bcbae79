//! # Prometheus Metrics
//!
//! Exposes operational metrics for the gossip node. Scraped by Prometheus
//! at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so
//! they do not collide with any default global registry consumers. Gauges
//! are refreshed from the live `GossipNode` state on every scrape, the way
//! a snapshot-style collector does; counters mirror the atomics the
//! protocol crate already maintains on `Mesh`/`Dissemination`.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use nova_protocol::GossipNode;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    pub unverified_peers: IntGauge,
    pub pull_peers: IntGauge,
    pub push_peers: IntGauge,
    pub handshake_success_total: IntCounter,
    pub handshake_failure_total: IntCounter,
    pub peer_evictions_total: IntCounter,
    pub announcements_forwarded_total: IntCounter,
    pub announcements_dropped_duplicate_total: IntCounter,
    pub announcements_dropped_no_subscriber_total: IntCounter,
    pub announcements_dropped_negative_validation_total: IntCounter,
    pub pending_validations: IntGauge,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry =
            Registry::new_custom(Some("gossip".into()), None).expect("failed to create prometheus registry");

        macro_rules! gauge {
            ($name:literal, $help:literal) => {{
                let g = IntGauge::new($name, $help).expect("metric creation");
                registry.register(Box::new(g.clone())).expect("metric registration");
                g
            }};
        }
        macro_rules! counter {
            ($name:literal, $help:literal) => {{
                let c = IntCounter::new($name, $help).expect("metric creation");
                registry.register(Box::new(c.clone())).expect("metric registration");
                c
            }};
        }

        Self {
            unverified_peers: gauge!("unverified_peers", "Current size of the unverified peer set"),
            pull_peers: gauge!("pull_peers", "Current size of the pull peer set"),
            push_peers: gauge!("push_peers", "Current size of the push peer set"),
            handshake_success_total: counter!("handshake_success_total", "Total successful peer handshakes"),
            handshake_failure_total: counter!("handshake_failure_total", "Total failed peer handshakes"),
            peer_evictions_total: counter!("peer_evictions_total", "Total peers evicted on capacity overflow"),
            announcements_forwarded_total: counter!(
                "announcements_forwarded_total",
                "Total announcements forwarded to peers"
            ),
            announcements_dropped_duplicate_total: counter!(
                "announcements_dropped_duplicate_total",
                "Total announcements dropped as duplicates of a seen message id"
            ),
            announcements_dropped_no_subscriber_total: counter!(
                "announcements_dropped_no_subscriber_total",
                "Total announcements dropped for lack of a local subscriber"
            ),
            announcements_dropped_negative_validation_total: counter!(
                "announcements_dropped_negative_validation_total",
                "Total announcements dropped after a negative subscriber validation"
            ),
            pending_validations: gauge!("pending_validations", "Current size of the pending-validation table"),
            registry,
        }
    }

    /// Refreshes gauges and counter deltas from the live node state. Safe
    /// to call on every scrape.
    pub async fn refresh(&self, node: &GossipNode) {
        let (u, pu, ps) = node.mesh.peer_counts().await;
        self.unverified_peers.set(u as i64);
        self.pull_peers.set(pu as i64);
        self.push_peers.set(ps as i64);
        self.pending_validations.set(node.dissemination.pending_count().await as i64);

        set_counter_from_total(
            &self.handshake_success_total,
            node.mesh.counters.handshake_success.load(Ordering::Relaxed),
        );
        set_counter_from_total(
            &self.handshake_failure_total,
            node.mesh.counters.handshake_failure.load(Ordering::Relaxed),
        );
        set_counter_from_total(&self.peer_evictions_total, node.mesh.counters.evictions.load(Ordering::Relaxed));
        set_counter_from_total(
            &self.announcements_forwarded_total,
            node.dissemination.counters.forwarded.load(Ordering::Relaxed),
        );
        set_counter_from_total(
            &self.announcements_dropped_duplicate_total,
            node.dissemination.counters.dropped_duplicate.load(Ordering::Relaxed),
        );
        set_counter_from_total(
            &self.announcements_dropped_no_subscriber_total,
            node.dissemination.counters.dropped_no_subscriber.load(Ordering::Relaxed),
        );
        set_counter_from_total(
            &self.announcements_dropped_negative_validation_total,
            node.dissemination.counters.dropped_negative_validation.load(Ordering::Relaxed),
        );
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

/// `IntCounter` only supports `inc`/`inc_by`; since the source of truth is
/// an absolute atomic total rather than a delta stream, this brings the
/// counter up to that total without going backwards.
fn set_counter_from_total(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

/// Shared state for the admin HTTP surface: metrics plus a handle to the
/// live node so `/status` can report peer-set sizes too.
#[derive(Clone)]
pub struct AdminState {
    pub metrics: Arc<NodeMetrics>,
    pub node: Arc<GossipNode>,
}

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(axum::extract::State(state): axum::extract::State<AdminState>) -> impl IntoResponse {
    state.metrics.refresh(&state.node).await;
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_construct_and_encode() {
        let m = NodeMetrics::new();
        let text = m.encode().unwrap();
        assert!(text.contains("gossip_unverified_peers"));
    }
}
