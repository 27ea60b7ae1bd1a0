use std::net::SocketAddr;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reserve calls. Labels: outcome.
pub const RESERVATIONS_TOTAL: &str = "bookslot_reservations_total";

/// Counter: cancel calls. Labels: outcome.
pub const CANCELLATIONS_TOTAL: &str = "bookslot_cancellations_total";

/// Histogram: reserve latency in seconds, lock wait included.
pub const RESERVE_DURATION_SECONDS: &str = "bookslot_reserve_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: time spent waiting on the per-room lock, in seconds.
pub const LOCK_WAIT_SECONDS: &str = "bookslot_lock_wait_seconds";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map an operation outcome to a short label for metrics.
pub fn outcome_label<T>(result: &Result<T, EngineError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.label(),
    }
}
