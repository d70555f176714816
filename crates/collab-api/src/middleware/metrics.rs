//! # Prometheus Metrics
//!
//! HTTP metrics are recorded by [`metrics_middleware`] (push model).
//! Workflow counters are recorded by the services as transitions commit.
//! The per-status gauge is refreshed on each `/metrics` scrape (pull model),
//! see the metrics handler in `lib.rs`.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use collab_compliance::ComplianceFlags;
use collab_state::Action;
use prometheus::core::Collector;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

/// Shared metrics state backed by a Prometheus registry.
#[derive(Clone)]
pub struct ApiMetrics {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,

    // -- HTTP middleware metrics --
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_errors_total: IntCounterVec,

    // -- Workflow metrics --
    transitions_total: IntCounterVec,
    cas_conflicts_total: IntCounter,
    compliance_flags_total: IntCounterVec,
    collaborations: IntGaugeVec,
}

impl std::fmt::Debug for ApiMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiMetrics")
            .field("requests", &self.requests())
            .field("errors", &self.errors())
            .finish()
    }
}

impl ApiMetrics {
    /// Create a metrics instance with a fresh registry.
    pub fn try_new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("collab_http_requests_total", "Total HTTP requests"),
            &["method", "path", "status"],
        )?;
        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "collab_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["method", "path"],
        )?;
        let http_errors_total = IntCounterVec::new(
            Opts::new("collab_http_errors_total", "Total HTTP errors (4xx and 5xx)"),
            &["method", "path", "status"],
        )?;
        let transitions_total = IntCounterVec::new(
            Opts::new("collab_transitions_total", "Committed workflow transitions"),
            &["action"],
        )?;
        let cas_conflicts_total = IntCounter::new(
            "collab_cas_conflicts_total",
            "Version-check misses on commit (retried or surfaced as conflict)",
        )?;
        let compliance_flags_total = IntCounterVec::new(
            Opts::new(
                "collab_compliance_flags_total",
                "Compliance flags raised on submitted text",
            ),
            &["code"],
        )?;
        let collaborations = IntGaugeVec::new(
            Opts::new("collab_collaborations", "Collaborations by effective status"),
            &["status"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(http_errors_total.clone()))?;
        registry.register(Box::new(transitions_total.clone()))?;
        registry.register(Box::new(cas_conflicts_total.clone()))?;
        registry.register(Box::new(compliance_flags_total.clone()))?;
        registry.register(Box::new(collaborations.clone()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                http_requests_total,
                http_request_duration_seconds,
                http_errors_total,
                transitions_total,
                cas_conflicts_total,
                compliance_flags_total,
                collaborations,
            }),
        })
    }

    /// Total request count across all labels.
    pub fn requests(&self) -> u64 {
        sum_counters(&self.inner.http_requests_total)
    }

    /// Total 4xx/5xx count across all labels.
    pub fn errors(&self) -> u64 {
        sum_counters(&self.inner.http_errors_total)
    }

    pub fn transitions(&self, action: Action) -> u64 {
        self.inner
            .transitions_total
            .with_label_values(&[action.as_str()])
            .get()
    }

    pub fn cas_conflicts(&self) -> u64 {
        self.inner.cas_conflicts_total.get()
    }

    pub fn record_transition(&self, action: Action) {
        self.inner
            .transitions_total
            .with_label_values(&[action.as_str()])
            .inc();
    }

    pub fn record_cas_conflict(&self) {
        self.inner.cas_conflicts_total.inc();
    }

    pub fn record_flags(&self, flags: &ComplianceFlags) {
        for code in flags.iter() {
            self.inner
                .compliance_flags_total
                .with_label_values(&[code.as_str()])
                .inc();
        }
    }

    /// The per-status gauge, reset and refilled on scrape.
    pub fn collaborations(&self) -> &IntGaugeVec {
        &self.inner.collaborations
    }

    fn record_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.inner
            .http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.inner
            .http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
        if status >= 400 {
            self.inner
                .http_errors_total
                .with_label_values(&[method, path, &status_str])
                .inc();
        }
    }

    /// Gather all metrics and encode to Prometheus text format.
    pub fn gather_and_encode(&self) -> Result<String, String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| format!("failed to encode metrics: {e}"))?;
        String::from_utf8(buffer)
            .map_err(|e| format!("metrics encoding produced invalid UTF-8: {e}"))
    }
}

fn sum_counters(vec: &IntCounterVec) -> u64 {
    vec.collect()
        .iter()
        .flat_map(|mf| mf.get_metric())
        .map(|m| m.get_counter().get_value() as u64)
        .sum()
}

/// Replace UUID segments with `{id}` so label cardinality stays bounded.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if uuid::Uuid::parse_str(segment).is_ok() {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Middleware that records HTTP request metrics.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let metrics = request.extensions().get::<ApiMetrics>().cloned();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());
    let start = Instant::now();

    let response = next.run(request).await;

    if let Some(m) = metrics {
        m.record_request(
            &method,
            &path,
            response.status().as_u16(),
            start.elapsed().as_secs_f64(),
        );
    }

    response
}
