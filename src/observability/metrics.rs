// ============================================================================
// PROMETHEUS METRICS
// ============================================================================
// Process-wide counters/histograms for HTTP traffic and the wizard domain.
// ============================================================================

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter_vec, CounterVec,
    HistogramVec, IntCounterVec,
};

lazy_static! {
    // ------------------------------------------------------------------
    // HTTP request metrics
    // ------------------------------------------------------------------
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "endpoint", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "endpoint"],
        vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0]
    )
    .unwrap();

    // ------------------------------------------------------------------
    // Wizard domain metrics — names fixed by the observability contract
    // ------------------------------------------------------------------

    /// Items flagged as expired, by reason (`past_validity`, `offer_missing`, ...).
    pub static ref WIZARD_ITEMS_FLAGGED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "wizard_items_flagged_total",
        "Total shopping list items flagged as expired",
        &["reason"]
    )
    .unwrap();

    /// Suggestions surfaced to users, split by whether the suggestion matched brand.
    pub static ref WIZARD_SUGGESTIONS_RETURNED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "wizard_suggestions_returned_total",
        "Total replacement suggestions returned",
        &["has_same_brand"]
    )
    .unwrap();

    /// Per-item decisions recorded, by decision kind.
    pub static ref WIZARD_ACCEPTANCE_RATE_TOTAL: IntCounterVec = register_int_counter_vec!(
        "wizard_acceptance_rate_total",
        "Total per-item decisions recorded",
        &["decision"]
    )
    .unwrap();

    /// Distribution of store counts selected per confirmed/cancelled session.
    pub static ref WIZARD_SELECTED_STORE_COUNT: HistogramVec = register_histogram_vec!(
        "wizard_selected_store_count",
        "Number of distinct stores selected per wizard session",
        &["session_status"],
        vec![0.0, 1.0, 2.0]
    )
    .unwrap();

    /// Operation latency.
    pub static ref WIZARD_LATENCY_MS: HistogramVec = register_histogram_vec!(
        "wizard_latency_ms",
        "Wizard operation latency in milliseconds",
        &["operation"],
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0]
    )
    .unwrap();

    /// Sessions created, by terminal/non-terminal status.
    pub static ref WIZARD_SESSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "wizard_sessions_total",
        "Total wizard sessions by status",
        &["status"]
    )
    .unwrap();

    /// Revalidation failures surfaced at confirm time.
    pub static ref WIZARD_REVALIDATION_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "wizard_revalidation_errors_total",
        "Total revalidation errors encountered during confirm",
        &["error_type"]
    )
    .unwrap();

    /// Catch-all error counter by taxonomy code, for dashboards outside the wizard-specific set.
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "errors_total",
        "Total errors by error code",
        &["error_code"]
    )
    .unwrap();
}

pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    HTTP_REQUESTS_TOTAL.with_label_values(&[method, endpoint, &status.to_string()]).inc();
    HTTP_REQUEST_DURATION_SECONDS.with_label_values(&[method, endpoint]).observe(duration_secs);
}

pub fn record_item_flagged(reason: &str) {
    WIZARD_ITEMS_FLAGGED_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_suggestion_returned(has_same_brand: bool) {
    WIZARD_SUGGESTIONS_RETURNED_TOTAL
        .with_label_values(&[if has_same_brand { "true" } else { "false" }])
        .inc();
}

pub fn record_decision(decision: &str) {
    WIZARD_ACCEPTANCE_RATE_TOTAL.with_label_values(&[decision]).inc();
}

pub fn record_selected_store_count(session_status: &str, store_count: usize) {
    WIZARD_SELECTED_STORE_COUNT
        .with_label_values(&[session_status])
        .observe(store_count as f64);
}

pub fn record_wizard_latency(operation: &str, duration_ms: f64) {
    WIZARD_LATENCY_MS.with_label_values(&[operation]).observe(duration_ms);
}

pub fn record_session_status(status: &str) {
    WIZARD_SESSIONS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_revalidation_error(error_type: &str) {
    WIZARD_REVALIDATION_ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

pub fn record_error(error_code: &str) {
    ERRORS_TOTAL.with_label_values(&[error_code]).inc();
}
