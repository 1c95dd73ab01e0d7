// src/metrics/instrument.rs
// Instrumentation of outbound calls (REST/SOAP APIs, mail relays, ...).
//
// A call named `N` touches, in order:
//   N_requests_total, N_current_requests (+1), <work>, N_current_requests (-1),
//   N_responses_total{labels}, N_request_duration_seconds{labels}

use super::collector::{MetricsError, Timer};
use super::labels::Labels;
use regex::Regex;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::warn;

/// The metric operations an instrumented call performs.
pub trait CallRecorder: Send + Sync {
    fn request_started(&self, name: &str, backend: &str) -> Result<(), MetricsError>;

    fn in_flight_inc(&self, name: &str, backend: &str) -> Result<(), MetricsError>;

    fn in_flight_dec(&self, name: &str, backend: &str) -> Result<(), MetricsError>;

    fn response_recorded(&self, name: &str, labels: &Labels) -> Result<(), MetricsError>;

    fn duration_observed(
        &self,
        name: &str,
        labels: &Labels,
        elapsed: Duration,
    ) -> Result<(), MetricsError>;
}

/// Call names whose derived families are already taken by the collector.
const RESERVED_CALL_NAMES: &[&str] = &["http"];

fn metric_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").expect("valid regex"))
}

/// Rejects names that are not a valid prometheus metric-name prefix, or
/// that would collide with the standard `http_*` families.
pub fn validate_call_name(name: &str) -> Result<(), MetricsError> {
    if !metric_name_regex().is_match(name) {
        return Err(MetricsError::InvalidName(name.to_string()));
    }
    if RESERVED_CALL_NAMES.contains(&name) {
        return Err(MetricsError::ReservedName(name.to_string()));
    }
    Ok(())
}

/// Entry point for instrumenting outbound calls.
#[derive(Clone)]
pub struct Instrumentation {
    recorder: Arc<dyn CallRecorder>,
    backend: String,
}

impl Instrumentation {
    pub fn new(recorder: Arc<dyn CallRecorder>, backend: impl Into<String>) -> Self {
        Self {
            recorder,
            backend: backend.into(),
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Starts a call; its outcome is recorded when the guard is dropped.
    pub fn start_call(&self, name: &str) -> Result<InstrumentedCall, MetricsError> {
        InstrumentedCall::start(self.recorder.clone(), name, Labels::new(self.backend.clone()))
    }

    /// Runs `work` and records it under `name`.
    ///
    /// Whatever `work` returns, including an `Err`, is handed back
    /// untouched. A panic unwinds through after the metrics are recorded.
    pub fn instrument<T, F>(&self, name: &str, work: F) -> Result<T, MetricsError>
    where
        F: FnOnce() -> T,
    {
        let _call = self.start_call(name)?;
        Ok(work())
    }

    /// Like [`instrument`](Self::instrument), exposing the call's labels
    /// so `work` can mark success, failure or a status code.
    pub fn instrument_with_labels<T, F>(&self, name: &str, work: F) -> Result<T, MetricsError>
    where
        F: FnOnce(&mut Labels) -> T,
    {
        let mut call = self.start_call(name)?;
        Ok(work(call.labels_mut()))
    }

    /// Instruments fallible work, labelling it `success=1` or `success=0`.
    pub fn instrument_result<T, E, F>(&self, name: &str, work: F) -> Result<Result<T, E>, MetricsError>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.instrument_with_labels(name, |labels| {
            let result = work();
            match result {
                Ok(_) => labels.add_success(),
                Err(_) => labels.add_failure(),
            }
            result
        })
    }

    /// Instruments a future. Dropping it before completion still records
    /// the call.
    pub async fn instrument_async<T, Fut>(&self, name: &str, work: Fut) -> Result<T, MetricsError>
    where
        Fut: Future<Output = T>,
    {
        let _call = self.start_call(name)?;
        Ok(work.await)
    }
}

/// Guard for one in-progress call.
///
/// Created by [`Instrumentation::start_call`]; dropping it stops the timer,
/// decrements the in-flight gauge and records the response and duration
/// with the labels as they are at that moment.
pub struct InstrumentedCall {
    recorder: Arc<dyn CallRecorder>,
    name: String,
    labels: Labels,
    timer: Timer,
    in_flight: bool,
}

impl InstrumentedCall {
    fn start(
        recorder: Arc<dyn CallRecorder>,
        name: &str,
        labels: Labels,
    ) -> Result<Self, MetricsError> {
        validate_call_name(name)?;

        if let Err(e) = recorder.request_started(name, labels.backend()) {
            warn!(call = %name, error = %e, "Failed to record call start");
        }

        let in_flight = match recorder.in_flight_inc(name, labels.backend()) {
            Ok(()) => true,
            Err(e) => {
                warn!(call = %name, error = %e, "Failed to record in-flight call");
                false
            }
        };

        Ok(Self {
            recorder,
            name: name.to_string(),
            labels,
            timer: Timer::new(),
            in_flight,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn labels_mut(&mut self) -> &mut Labels {
        &mut self.labels
    }
}

impl Drop for InstrumentedCall {
    fn drop(&mut self) {
        let elapsed = self.timer.elapsed();

        if self.in_flight {
            if let Err(e) = self.recorder.in_flight_dec(&self.name, self.labels.backend()) {
                warn!(call = %self.name, error = %e, "Failed to record call end");
            }
        }

        if let Err(e) = self.recorder.response_recorded(&self.name, &self.labels) {
            warn!(call = %self.name, error = %e, "Failed to record call response");
        }

        if let Err(e) = self
            .recorder
            .duration_observed(&self.name, &self.labels, elapsed)
        {
            warn!(call = %self.name, error = %e, "Failed to record call duration");
        }
    }
}
