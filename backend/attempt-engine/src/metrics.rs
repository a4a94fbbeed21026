use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Store Metrics (MongoDB / Redis)
    pub static ref STORE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "store_operations_total",
        "Total number of attempt/question/regrade store operations",
        &["operation", "collection", "status"]
    )
    .unwrap();

    pub static ref STORE_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "store_operation_duration_seconds",
        "Store operation duration in seconds",
        &["operation", "collection"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // Engine Metrics
    pub static ref ATTEMPT_ACTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempt_actions_total",
        "Processed attempt actions by verdict",
        &["action", "verdict"]
    )
    .unwrap();

    pub static ref GRADING_RESULTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "grading_results_total",
        "Accepted grader callbacks by outcome",
        &["outcome"]
    )
    .unwrap();

    pub static ref STALE_GRADING_RESULTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "stale_grading_results_total",
        "Grader callbacks discarded because their grade process no longer exists",
        &["action"]
    )
    .unwrap();

    pub static ref GRADER_DISPATCH_TOTAL: IntCounterVec = register_int_counter_vec!(
        "grader_dispatch_total",
        "Submissions handed to the external grader",
        &["status"]
    )
    .unwrap();

    pub static ref ATTEMPTS_STARTED: IntGauge = register_int_gauge!(
        "attempts_started",
        "Attempts started since process start"
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track store operation with metrics
pub async fn track_store_operation<F, T>(
    operation: &str,
    collection: &str,
    future: F,
) -> Result<T, anyhow::Error>
where
    F: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    STORE_OPERATIONS_TOTAL
        .with_label_values(&[operation, collection, status])
        .inc();

    STORE_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, collection])
        .observe(duration);

    result
}
