// src/server/handler.rs
use crate::auth::{AuthContext, AuthGate};
use crate::metrics::MetricsRegistry;
use crate::readiness::{ReadinessAggregator, ReadinessReport};
use hyper::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use hyper::{Body, Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;

/// Where each monitoring endpoint is mounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPaths {
    pub health: String,
    pub readiness: String,
    pub metrics: String,
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            health: "/health".to_string(),
            readiness: "/readiness".to_string(),
            metrics: "/metrics".to_string(),
        }
    }
}

/// Reads credentials from a hyper request; a rejection becomes a 403.
struct HyperAuthContext<'a> {
    headers: &'a HeaderMap,
    rejected: bool,
}

impl<'a> HyperAuthContext<'a> {
    fn new(headers: &'a HeaderMap) -> Self {
        Self {
            headers,
            rejected: false,
        }
    }

    fn rejection(&self) -> Option<Response<Body>> {
        self.rejected.then(|| empty_response(StatusCode::FORBIDDEN))
    }
}

impl AuthContext for HyperAuthContext<'_> {
    fn auth_header(&self) -> Option<&str> {
        // A header that is not visible ASCII cannot carry Basic credentials.
        self.headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
    }

    fn on_rejected(&mut self) {
        self.rejected = true;
    }
}

/// Serves the health, readiness and metrics endpoints.
#[derive(Clone)]
pub struct MonitoringService {
    gate: AuthGate,
    readiness: Arc<ReadinessAggregator>,
    metrics: Arc<MetricsRegistry>,
    paths: Arc<EndpointPaths>,
}

impl MonitoringService {
    pub fn new(
        gate: AuthGate,
        readiness: Arc<ReadinessAggregator>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            gate,
            readiness,
            metrics,
            paths: Arc::new(EndpointPaths::default()),
        }
    }

    pub fn with_paths(mut self, paths: EndpointPaths) -> Self {
        self.paths = Arc::new(paths);
        self
    }

    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let path = req.uri().path();

        if path == self.paths.health {
            return text_response(StatusCode::OK, "OK");
        }

        if path == self.paths.readiness {
            if let Some(denied) = self.authenticate(req.headers()) {
                return denied;
            }
            return self.readiness_response().await;
        }

        if path == self.paths.metrics {
            if let Some(denied) = self.authenticate(req.headers()) {
                return denied;
            }
            let accept = req.headers().get(ACCEPT).and_then(|v| v.to_str().ok());
            return self.metrics_response(accept);
        }

        text_response(StatusCode::NOT_FOUND, "Not Found")
    }

    /// `None` when the request may proceed, otherwise the response to send.
    fn authenticate(&self, headers: &HeaderMap) -> Option<Response<Body>> {
        let mut ctx = HyperAuthContext::new(headers);

        match self.gate.check_authentication(&mut ctx) {
            Ok(_) => ctx.rejection(),
            Err(e) => {
                tracing::warn!(%e, "Unreadable Authorization header");
                Some(empty_response(StatusCode::BAD_REQUEST))
            }
        }
    }

    async fn readiness_response(&self) -> Response<Body> {
        let statuses = self.readiness.check_dependencies().await;
        let report = ReadinessReport::from_statuses(&statuses);

        match report.to_json() {
            Ok(body) => {
                let mut response = Response::new(Body::from(body));
                *response.status_mut() = report.status_code();
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                response
            }
            Err(e) => {
                tracing::error!(%e, "Failed to serialize readiness report");
                empty_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    fn metrics_response(&self, accept: Option<&str>) -> Response<Body> {
        match self.metrics.encode(accept) {
            Ok((body, content_type)) => {
                let mut response = Response::new(Body::from(body));
                if let Ok(value) = HeaderValue::from_str(&content_type) {
                    response.headers_mut().insert(CONTENT_TYPE, value);
                }
                response
            }
            Err(e) => {
                tracing::error!(%e, "Failed to encode metrics");
                empty_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

fn empty_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

impl Service<Request<Body>> for MonitoringService {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}
