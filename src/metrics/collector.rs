// src/metrics/collector.rs
use super::instrument::{CallRecorder, Instrumentation};
use super::labels::{Labels, BACKEND_LABEL};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, ProtobufEncoder,
    Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const PROTOBUF_MEDIA_TYPE: &str = "application/vnd.google.protobuf";

const HTTP_DURATION_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 0.75, 1.0, 2.0, 3.0, 5.0, 10.0];

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Metric name must match [a-zA-Z_:][a-zA-Z0-9_:]*: {0:?}")]
    InvalidName(String),

    #[error("Metric name {0:?} collides with the standard request metrics")]
    ReservedName(String),

    #[error("Metric {metric} was registered with labels {expected:?}, got {actual:?}")]
    LabelMismatch {
        metric: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Identifies this process in metric labels.
///
/// The machine host name, or `unknown` when it cannot be read.
pub fn default_backend() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Owns the prometheus registry and the collector writing into it.
pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new(backend: impl Into<String>) -> Result<Self, MetricsError> {
        Self::with_registry(Registry::new(), backend)
    }

    /// Registers into an existing registry, e.g. `prometheus::default_registry()`.
    pub fn with_registry(registry: Registry, backend: impl Into<String>) -> Result<Self, MetricsError> {
        let collector = Arc::new(MetricsCollector::new(&registry, backend.into())?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn instrumentation(&self) -> Instrumentation {
        Instrumentation::new(self.collector.clone(), self.collector.backend())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition of everything registered.
    pub fn gather(&self) -> Result<Vec<u8>, MetricsError> {
        let (body, _) = self.encode(None)?;
        Ok(body)
    }

    /// Encodes the registry in the format the `Accept` header asks for.
    ///
    /// Delimited protobuf when offered, text otherwise. Returns the body
    /// and its content type.
    pub fn encode(&self, accept: Option<&str>) -> Result<(Vec<u8>, String), MetricsError> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        let wants_protobuf = accept
            .unwrap_or_default()
            .split(',')
            .any(|media| media.trim().starts_with(PROTOBUF_MEDIA_TYPE));

        let content_type = if wants_protobuf {
            let encoder = ProtobufEncoder::new();
            encoder.encode(&metric_families, &mut buffer)?;
            encoder.format_type().to_string()
        } else {
            let encoder = TextEncoder::new();
            encoder.encode(&metric_families, &mut buffer)?;
            encoder.format_type().to_string()
        };

        Ok((buffer, content_type))
    }
}

struct Family<T> {
    label_names: Vec<String>,
    metric: T,
}

pub struct MetricsCollector {
    registry: Registry,
    backend: String,

    // Inbound HTTP request metrics
    pub http_requests_total: IntCounterVec,
    pub http_current_requests: IntGaugeVec,
    pub http_responses_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,

    // Application metrics
    pub errors_total: IntCounterVec,
    pub emails_sent_total: IntCounterVec,

    // Instrumented outbound calls, created on first use per name
    call_counters: DashMap<String, Family<IntCounterVec>>,
    call_gauges: DashMap<String, Family<IntGaugeVec>>,
    call_histograms: DashMap<String, Family<HistogramVec>>,
}

impl MetricsCollector {
    pub fn new(registry: &Registry, backend: String) -> Result<Self, MetricsError> {
        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP requests"),
            &[BACKEND_LABEL],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_current_requests = IntGaugeVec::new(
            Opts::new(
                "http_current_requests",
                "Number of HTTP requests in progress",
            ),
            &[BACKEND_LABEL],
        )?;
        registry.register(Box::new(http_current_requests.clone()))?;

        let http_responses_total = IntCounterVec::new(
            Opts::new("http_responses_total", "HTTP responses"),
            &[BACKEND_LABEL, "status"],
        )?;
        registry.register(Box::new(http_responses_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "Request duration (in seconds).",
            )
            .buckets(HTTP_DURATION_BUCKETS.to_vec()),
            &[BACKEND_LABEL],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        let errors_total = IntCounterVec::new(
            Opts::new("errors_total", "Errors"),
            &["error", BACKEND_LABEL],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        let emails_sent_total = IntCounterVec::new(
            Opts::new("emails_sent_total", "Emails sent"),
            &[BACKEND_LABEL, "type"],
        )?;
        registry.register(Box::new(emails_sent_total.clone()))?;

        Ok(Self {
            registry: registry.clone(),
            backend,
            http_requests_total,
            http_current_requests,
            http_responses_total,
            http_request_duration_seconds,
            errors_total,
            emails_sent_total,
            call_counters: DashMap::new(),
            call_gauges: DashMap::new(),
            call_histograms: DashMap::new(),
        })
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn record_request_started(&self) {
        self.http_requests_total
            .with_label_values(&[&self.backend])
            .inc();
        self.http_current_requests
            .with_label_values(&[&self.backend])
            .inc();
    }

    pub fn record_request_finished(&self, status_code: u16, duration: Duration) {
        let status = status_code.to_string();
        self.http_current_requests
            .with_label_values(&[&self.backend])
            .dec();
        self.http_responses_total
            .with_label_values(&[&self.backend, &status])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[&self.backend])
            .observe(duration.as_secs_f64());
    }

    pub fn increment_errors_counter(&self, error: &str, increment: u64) {
        self.errors_total
            .with_label_values(&[error, &self.backend])
            .inc_by(increment);
    }

    pub fn increment_emails_sent_counter(&self, email_type: &str, increment: u64) {
        self.emails_sent_total
            .with_label_values(&[&self.backend, email_type])
            .inc_by(increment);
    }

    fn call_counter(
        &self,
        name: String,
        help: String,
        label_names: &[&str],
    ) -> Result<IntCounterVec, MetricsError> {
        family(&self.call_counters, &self.registry, name, label_names, |name| {
            IntCounterVec::new(Opts::new(name, help), label_names)
        })
    }

    fn call_gauge(
        &self,
        name: String,
        help: String,
        label_names: &[&str],
    ) -> Result<IntGaugeVec, MetricsError> {
        family(&self.call_gauges, &self.registry, name, label_names, |name| {
            IntGaugeVec::new(Opts::new(name, help), label_names)
        })
    }

    fn current_requests(&self, name: &str) -> Result<IntGaugeVec, MetricsError> {
        self.call_gauge(
            format!("{}_current_requests", name),
            format!("Requests in progress for {}", name),
            &[BACKEND_LABEL],
        )
    }

    fn call_histogram(
        &self,
        name: String,
        help: String,
        label_names: &[&str],
    ) -> Result<HistogramVec, MetricsError> {
        family(&self.call_histograms, &self.registry, name, label_names, |name| {
            HistogramVec::new(HistogramOpts::new(name, help), label_names)
        })
    }
}

/// Fetches a cached family, creating and registering it on first use.
fn family<T, F>(
    cache: &DashMap<String, Family<T>>,
    registry: &Registry,
    name: String,
    label_names: &[&str],
    create: F,
) -> Result<T, MetricsError>
where
    T: prometheus::core::Collector + Clone + 'static,
    F: FnOnce(String) -> Result<T, prometheus::Error>,
{
    match cache.entry(name) {
        Entry::Occupied(entry) => {
            let family = entry.get();
            if family.label_names.iter().map(String::as_str).ne(label_names.iter().copied()) {
                return Err(MetricsError::LabelMismatch {
                    metric: entry.key().clone(),
                    expected: family.label_names.clone(),
                    actual: label_names.iter().map(|l| l.to_string()).collect(),
                });
            }
            Ok(family.metric.clone())
        }
        Entry::Vacant(entry) => {
            let metric = create(entry.key().clone())?;
            registry.register(Box::new(metric.clone()))?;
            entry.insert(Family {
                label_names: label_names.iter().map(|l| l.to_string()).collect(),
                metric: metric.clone(),
            });
            Ok(metric)
        }
    }
}

impl CallRecorder for MetricsCollector {
    fn request_started(&self, name: &str, backend: &str) -> Result<(), MetricsError> {
        self.call_counter(
            format!("{}_requests_total", name),
            format!("Requests started for {}", name),
            &[BACKEND_LABEL],
        )?
        .with_label_values(&[backend])
        .inc();
        Ok(())
    }

    fn in_flight_inc(&self, name: &str, backend: &str) -> Result<(), MetricsError> {
        self.current_requests(name)?.with_label_values(&[backend]).inc();
        Ok(())
    }

    fn in_flight_dec(&self, name: &str, backend: &str) -> Result<(), MetricsError> {
        self.current_requests(name)?.with_label_values(&[backend]).dec();
        Ok(())
    }

    fn response_recorded(&self, name: &str, labels: &Labels) -> Result<(), MetricsError> {
        let keys: Vec<&str> = labels.keys().collect();
        let values: Vec<&str> = labels.values().collect();

        self.call_counter(
            format!("{}_responses_total", name),
            format!("Responses received for {}", name),
            &keys,
        )?
        .get_metric_with_label_values(&values)?
        .inc();
        Ok(())
    }

    fn duration_observed(
        &self,
        name: &str,
        labels: &Labels,
        elapsed: Duration,
    ) -> Result<(), MetricsError> {
        let keys: Vec<&str> = labels.keys().collect();
        let values: Vec<&str> = labels.values().collect();

        self.call_histogram(
            format!("{}_request_duration_seconds", name),
            format!("Request duration for {} (in seconds)", name),
            &keys,
        )?
        .get_metric_with_label_values(&values)?
        .observe(elapsed.as_secs_f64());
        Ok(())
    }
}

// Helper for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
