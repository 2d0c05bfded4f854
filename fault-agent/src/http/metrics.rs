//! Prometheus metrics endpoint.

use crate::server::ChaosAgent;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use fault_engine::EngineMetrics;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Includes both gauges (current state) and counters (monotonic since startup).
pub async fn metrics_handler(Extension(agent): Extension<Arc<ChaosAgent>>) -> impl IntoResponse {
    let engine = agent.engine();
    let m = engine.metrics();

    // Gauges
    let active = engine.active().len();
    let uptime = agent.uptime_seconds();

    // Counters
    let started = EngineMetrics::get(&m.started_total);
    let completed = EngineMetrics::get(&m.completed_total);
    let failed = EngineMetrics::get(&m.failed_total);
    let cleanup_failures = EngineMetrics::get(&m.cleanup_failures_total);
    let log_lines = EngineMetrics::get(&m.log_lines_total);

    let body = format!(
        r#"# HELP chaosd_faults_active Fault executions in flight
# TYPE chaosd_faults_active gauge
chaosd_faults_active {active}

# HELP chaosd_info Agent information
# TYPE chaosd_info gauge
chaosd_info{{version="{version}"}} 1

# HELP chaosd_uptime_seconds Seconds since the agent started
# TYPE chaosd_uptime_seconds gauge
chaosd_uptime_seconds {uptime}

# HELP chaosd_faults_started_total Fault executions accepted
# TYPE chaosd_faults_started_total counter
chaosd_faults_started_total {started}

# HELP chaosd_faults_completed_total Fault executions that completed
# TYPE chaosd_faults_completed_total counter
chaosd_faults_completed_total {completed}

# HELP chaosd_faults_failed_total Fault executions that ended in error, including rejected requests
# TYPE chaosd_faults_failed_total counter
chaosd_faults_failed_total {failed}

# HELP chaosd_cleanup_failures_total Undo operations that failed and need manual recovery
# TYPE chaosd_cleanup_failures_total counter
chaosd_cleanup_failures_total {cleanup_failures}

# HELP chaosd_log_lines_total Workload output lines streamed to subscribers
# TYPE chaosd_log_lines_total counter
chaosd_log_lines_total {log_lines}
"#,
        version = env!("CARGO_PKG_VERSION"),
    );

    ([(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")], body)
}
