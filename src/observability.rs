use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reservation requests that passed the creation guard.
pub const RESERVATION_REQUESTS_TOTAL: &str = "pousada_reservation_requests_total";

/// Counter: reservation requests rejected for overlapping dates.
pub const RESERVATION_CONFLICTS_TOTAL: &str = "pousada_reservation_conflicts_total";

/// Counter: lifecycle transitions actually applied. Labels: action.
pub const RESERVATION_TRANSITIONS_TOTAL: &str = "pousada_reservation_transitions_total";

/// Counter: evaluations recorded.
pub const EVALUATIONS_TOTAL: &str = "pousada_evaluations_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: currently listed properties.
pub const PROPERTIES_LISTED: &str = "pousada_properties_listed";

/// Counter: mail requests enqueued.
pub const MAIL_ENQUEUED_TOTAL: &str = "pousada_mail_enqueued_total";

/// Counter: mail requests dropped on a full queue.
pub const MAIL_DROPPED_TOTAL: &str = "pousada_mail_dropped_total";

/// Counter: transport-level delivery failures.
pub const MAIL_FAILED_TOTAL: &str = "pousada_mail_failed_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "pousada_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "pousada_wal_flush_batch_size";

/// Counter: stays moved to finished by the background finisher.
pub const RESERVATIONS_FINISHED_TOTAL: &str = "pousada_reservations_finished_total";

/// Install the Prometheus metrics exporter on the given port. No-op if
/// `port` is None. Call at most once per process.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
