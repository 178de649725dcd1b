use std::sync::OnceLock;

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

pub(crate) const JOBS_TOTAL: &str = "assessment_jobs_total";
pub(crate) const DURATION_SECONDS: &str = "assessment_duration_seconds";
pub(crate) const QUEUE_LATENCY_SECONDS: &str = "assessment_queue_latency_seconds";
pub(crate) const REQUESTS_ENQUEUED_TOTAL: &str = "assessment_requests_enqueued_total";
pub(crate) const REQUESTS_RETRIED_TOTAL: &str = "assessment_requests_retried_total";
pub(crate) const REQUESTS_STALE_RECOVERED_TOTAL: &str = "assessment_requests_stale_recovered_total";
pub(crate) const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub(crate) const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    describe_counter!(JOBS_TOTAL, "Assessment jobs by terminal status");
    describe_histogram!(DURATION_SECONDS, Unit::Seconds, "Wall time of one assessment attempt");
    describe_histogram!(
        QUEUE_LATENCY_SECONDS,
        Unit::Seconds,
        "Time a request waited in the queue before being claimed"
    );
    describe_counter!(REQUESTS_ENQUEUED_TOTAL, "Assessment requests created");
    describe_counter!(REQUESTS_RETRIED_TOTAL, "Failed requests moved back to the queue");
    describe_counter!(
        REQUESTS_STALE_RECOVERED_TOTAL,
        "Processing requests failed by stale recovery"
    );
    describe_counter!(HTTP_REQUESTS_TOTAL, "HTTP requests by response status");
    describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, Unit::Seconds, "HTTP request latency");
}
