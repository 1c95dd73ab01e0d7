// src/metrics/middleware.rs
use super::collector::{MetricsCollector, Timer};
use hyper::{Request, Response};
use std::sync::Arc;
use tower::{Layer, Service};

/// Status recorded for a request whose future was dropped before a
/// response was produced (client went away).
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Wraps a service with the standard `http_*` request metrics.
#[derive(Clone)]
pub struct RequestMetricsLayer {
    collector: Arc<MetricsCollector>,
}

impl RequestMetricsLayer {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }
}

impl<S> Layer<S> for RequestMetricsLayer {
    type Service = RequestMetrics<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestMetrics {
            inner,
            collector: self.collector.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RequestMetrics<S> {
    inner: S,
    collector: Arc<MetricsCollector>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestMetrics<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::fmt::Display,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // The readied service goes into the future; keep a fresh clone.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let collector = self.collector.clone();

        Box::pin(async move {
            let mut in_flight = InFlightRequest::start(collector.clone());

            let result = inner.call(req).await;

            in_flight.status = match &result {
                Ok(response) => response.status().as_u16(),
                Err(e) => {
                    tracing::error!(%e, "request failed");
                    collector.increment_errors_counter(std::any::type_name::<S::Error>(), 1);
                    500
                }
            };

            result
        })
    }
}

/// Records the end of a request when dropped, so a cancelled request
/// still releases its in-flight slot.
struct InFlightRequest {
    collector: Arc<MetricsCollector>,
    timer: Timer,
    status: u16,
}

impl InFlightRequest {
    fn start(collector: Arc<MetricsCollector>) -> Self {
        collector.record_request_started();
        Self {
            collector,
            timer: Timer::new(),
            status: CLIENT_CLOSED_REQUEST,
        }
    }
}

impl Drop for InFlightRequest {
    fn drop(&mut self) {
        self.collector
            .record_request_finished(self.status, self.timer.elapsed());
    }
}
