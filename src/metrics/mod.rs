// src/metrics/mod.rs
mod collector;
mod instrument;
mod labels;
mod middleware;

pub use collector::{default_backend, MetricsCollector, MetricsError, MetricsRegistry, Timer};
pub use instrument::{validate_call_name, CallRecorder, InstrumentedCall, Instrumentation};
pub use labels::{LabelError, Labels, BACKEND_LABEL, STATUS_CODE_LABEL, SUCCESS_LABEL};
pub use middleware::{RequestMetrics, RequestMetricsLayer};
