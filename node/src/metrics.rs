//! # Prometheus Metrics
//!
//! Operational metrics for the relay node, served at `/metrics` next to the
//! HTTP API.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] with
//! the `tally` prefix so they do not collide with any default global
//! registry consumers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are `Arc`s internally) so it can be
/// shared across request handlers and connection tasks.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Number of currently registered peers.
    pub connected_peers: IntGauge,
    /// Finished connection sessions, labelled by `outcome`.
    pub sessions_total: IntCounterVec,
    /// Inbound gossip messages, labelled by `kind`.
    pub messages_received_total: IntCounterVec,
    /// Artifacts written to peers by fan-out, labelled by `kind`.
    pub artifacts_sent_total: IntCounterVec,
    /// Fan-out sends that failed.
    pub send_failures_total: IntCounter,
    /// Lifetime of finished sessions in seconds.
    pub session_duration_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("tally".into()), None)?;

        let connected_peers =
            IntGauge::new("connected_peers", "Number of currently registered peers")?;
        registry.register(Box::new(connected_peers.clone()))?;

        let sessions_total = IntCounterVec::new(
            Opts::new("sessions_total", "Finished peer sessions by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(sessions_total.clone()))?;

        let messages_received_total = IntCounterVec::new(
            Opts::new("messages_received_total", "Inbound gossip messages by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(messages_received_total.clone()))?;

        let artifacts_sent_total = IntCounterVec::new(
            Opts::new("artifacts_sent_total", "Artifacts sent to peers by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(artifacts_sent_total.clone()))?;

        let send_failures_total =
            IntCounter::new("send_failures_total", "Fan-out sends that failed")?;
        registry.register(Box::new(send_failures_total.clone()))?;

        let session_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "session_duration_seconds",
                "Lifetime of finished peer sessions in seconds",
            )
            .buckets(vec![
                0.1, 1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 21600.0, 86400.0,
            ]),
        )?;
        registry.register(Box::new(session_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            connected_peers,
            sessions_total,
            messages_received_total,
            artifacts_sent_total,
            send_failures_total,
            session_duration_seconds,
        })
    }

    /// Records the outcome of one fan-out.
    pub fn record_broadcast(&self, kind: &str, sent: usize, failed: usize) {
        self.artifacts_sent_total
            .with_label_values(&[kind])
            .inc_by(sent as u64);
        self.send_failures_total.inc_by(failed as u64);
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics handle.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails.
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
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
