// src/server/builder.rs
use crate::server::listener::bind_tcp;
use anyhow::{Context, Result};
use hyper::{server::conn::Http, Body, Request, Response};
use std::future::Future;
use std::net::SocketAddr;
use tower::Service;

/// Builder so `main.rs` can inject the monitoring service (or any handler).
pub struct ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    addr: SocketAddr,
    handler: Option<H>,
}

impl<H> ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, handler: None }
    }

    pub fn with_handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Serve until `signal` resolves. Connections already accepted keep
    /// running on their own tasks; only the accept loop stops.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let handler = self
            .handler
            .context("handler must be set via with_handler()")?;

        let listener = bind_tcp(self.addr).await?;
        tracing::info!("Monitoring server listening on {}", listener.local_addr()?);

        tokio::pin!(signal);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = &mut signal => {
                    tracing::info!("Shutdown signal received, no longer accepting connections");
                    return Ok(());
                }
            };
            let svc = handler.clone();

            tokio::spawn(async move {
                let http = Http::new();
                if let Err(err) = http.serve_connection(stream, svc).await {
                    tracing::warn!(%peer, %err, "connection error");
                }
            });
        }
    }
}
