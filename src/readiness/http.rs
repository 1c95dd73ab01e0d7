// src/readiness/http.rs
use super::dependency::{CheckError, CheckOutcome, Dependency};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use url::Url;

/// Dependency on a third-party site, checked with a plain GET.
#[derive(Debug, Clone)]
pub struct HttpDependency {
    name: String,
    url: Url,
    expected_status: StatusCode,
    client: Client,
}

impl HttpDependency {
    pub fn new(name: impl Into<String>, url: Url) -> Self {
        Self::with_client(name, url, Client::new())
    }

    /// Reuses a caller-configured client (timeouts, proxies, TLS roots).
    pub fn with_client(name: impl Into<String>, url: Url, client: Client) -> Self {
        Self {
            name: name.into(),
            url,
            expected_status: StatusCode::OK,
            client,
        }
    }

    pub fn expect_status(mut self, status: StatusCode) -> Self {
        self.expected_status = status;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Dependency for HttpDependency {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<CheckOutcome, CheckError> {
        let response = self.client.get(self.url.as_str()).send().await?;
        let status = response.status();

        let message = format!(
            "Request returned HTTP status {}: {}",
            status.as_u16(),
            self.url
        );

        if status != self.expected_status {
            return Err(CheckError::UnexpectedStatus {
                message,
                expected: self.expected_status.as_u16(),
            });
        }

        Ok(CheckOutcome::ready(message))
    }
}
