// Prometheus metrics for admission control and retries
//
// - Admission decisions per endpoint (counter)
// - Time spent waiting inside acquire (histogram)
// - Rate-limit retries (counter)
// - Queued requests executed (counter)
//
// Endpoint keys are caller-supplied, so only endpoints with an explicit
// `configure` get their own label value. Everything else shares
// `OTHER_ENDPOINT_LABEL`, which keeps the label set bounded by the
// configuration.

use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, HistogramVec, IntCounter, IntCounterVec, Registry, TextEncoder};
use std::sync::{Arc, Once};

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref ADMISSIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("ratekeeper_admissions_total", "Admission decisions by endpoint and outcome"),
        &["endpoint", "outcome"]
    ).expect("Failed to create admissions metric");

    pub static ref ACQUIRE_WAIT_SECONDS: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new("ratekeeper_acquire_wait_seconds", "Time acquire spent waiting for a token")
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["endpoint"]
    ).expect("Failed to create acquire wait metric");

    pub static ref RETRIES_TOTAL: IntCounter = IntCounter::new(
        "ratekeeper_retries_total",
        "Operations retried after a rate-limit error"
    ).expect("Failed to create retries metric");

    pub static ref QUEUE_EXECUTED_TOTAL: CounterVec = CounterVec::new(
        prometheus::Opts::new("ratekeeper_queue_executed_total", "Queued requests executed by endpoint"),
        &["endpoint"]
    ).expect("Failed to create queue executed metric");
}

/// Label value for endpoints that were never configured
pub const OTHER_ENDPOINT_LABEL: &str = "other";

static INIT: Once = Once::new();

/// Register all metrics with [`REGISTRY`]. Safe to call more than once.
pub fn init() -> prometheus::Result<()> {
    let mut result = Ok(());
    INIT.call_once(|| {
        result = register_all();
    });
    result
}

fn register_all() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(ADMISSIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ACQUIRE_WAIT_SECONDS.clone()))?;
    REGISTRY.register(Box::new(RETRIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_EXECUTED_TOTAL.clone()))?;
    Ok(())
}

/// Label value recorded for `endpoint`
pub fn endpoint_label(endpoint: &str, configured: bool) -> &str {
    if configured {
        endpoint
    } else {
        OTHER_ENDPOINT_LABEL
    }
}

pub(crate) fn record_admission(label: &str, admitted: bool) {
    let outcome = if admitted { "granted" } else { "denied" };
    ADMISSIONS_TOTAL.with_label_values(&[label, outcome]).inc();
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
