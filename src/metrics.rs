use std::time::Duration;

use prometheus::{
    opts, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct AppMetrics {
    registry: Registry,
    request_total: IntCounterVec,
    request_duration_seconds: HistogramVec,
    inflight_requests: IntGauge,
    backend_errors_total: IntCounterVec,
    fragments_total: IntCounterVec,
}

pub struct InflightGuard<'a> {
    metrics: &'a AppMetrics,
}

impl AppMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let request_total = IntCounterVec::new(
            opts!(
                "research_http_requests_total",
                "Total HTTP requests processed by the research agent"
            ),
            &["path", "method", "provider", "status"],
        )
        .expect("valid request_total metric");

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "research_http_request_duration_seconds",
                "Time until the streaming response starts, in seconds, by provider",
            ),
            &["path", "method", "provider"],
        )
        .expect("valid request_duration_seconds metric");

        let inflight_requests = IntGauge::new(
            "research_inflight_requests",
            "Current in-flight requests",
        )
        .expect("valid inflight_requests metric");

        let backend_errors_total = IntCounterVec::new(
            opts!(
                "research_backend_errors_total",
                "Backend failures by provider and stage"
            ),
            &["provider", "stage"],
        )
        .expect("valid backend_errors_total metric");

        let fragments_total = IntCounterVec::new(
            opts!(
                "research_fragments_total",
                "Text fragments streamed to clients by provider"
            ),
            &["provider"],
        )
        .expect("valid fragments_total metric");

        registry
            .register(Box::new(request_total.clone()))
            .expect("register request_total");
        registry
            .register(Box::new(request_duration_seconds.clone()))
            .expect("register request_duration_seconds");
        registry
            .register(Box::new(inflight_requests.clone()))
            .expect("register inflight_requests");
        registry
            .register(Box::new(backend_errors_total.clone()))
            .expect("register backend_errors_total");
        registry
            .register(Box::new(fragments_total.clone()))
            .expect("register fragments_total");

        Self {
            registry,
            request_total,
            request_duration_seconds,
            inflight_requests,
            backend_errors_total,
            fragments_total,
        }
    }

    pub fn inflight_guard(&self) -> InflightGuard<'_> {
        self.inflight_requests.inc();
        InflightGuard { metrics: self }
    }

    /// Records one routed request against the backend it resolved to.
    pub fn observe_request(
        &self,
        path: &str,
        method: &str,
        provider: &str,
        status: u16,
        duration: Duration,
    ) {
        let status_label = status.to_string();
        self.request_total
            .with_label_values(&[path, method, provider, &status_label])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[path, method, provider])
            .observe(duration.as_secs_f64());
    }

    pub fn observe_backend_error(&self, provider: &str, stage: &str) {
        self.backend_errors_total
            .with_label_values(&[provider, stage])
            .inc();
    }

    pub fn observe_fragment(&self, provider: &str) {
        self.fragments_total.with_label_values(&[provider]).inc();
    }

    pub fn render(&self) -> Result<String, String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|error| error.to_string())?;
        String::from_utf8(buffer).map_err(|error| error.to_string())
    }
}

impl Default for AppMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.metrics.inflight_requests.dec();
    }
}
