// src/config/models.rs
use crate::auth::Credentials;
use crate::metrics::{default_backend, MetricsRegistry};
use crate::readiness::{HttpDependency, ReadinessAggregator, SmtpDependency};
use crate::server::EndpointPaths;
use anyhow::{bail, Context, Result};
use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub dependencies: Vec<DependencyConfig>,
}

/// An empty username disables authentication entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_health_path")]
    pub health_path: String,
    #[serde(default = "default_readiness_path")]
    pub readiness_path: String,
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Overrides the host name as the `backend` label value.
    #[serde(default)]
    pub backend: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadinessConfig {
    #[serde(default)]
    pub check_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DependencyConfig {
    Http {
        name: String,
        url: Url,
        #[serde(default = "default_expected_status")]
        expected_status: u16,
    },
    Smtp {
        name: String,
        host: String,
        #[serde(default = "default_smtp_port")]
        port: u16,
    },
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9102))
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_readiness_path() -> String {
    "/readiness".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_expected_status() -> u16 {
    200
}

fn default_smtp_port() -> u16 {
    25
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            auth: AuthConfig::default(),
            endpoints: EndpointsConfig::default(),
            metrics: MetricsConfig::default(),
            readiness: ReadinessConfig::default(),
            dependencies: Vec::new(),
        }
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            health_path: default_health_path(),
            readiness_path: default_readiness_path(),
            metrics_path: default_metrics_path(),
        }
    }
}

impl DependencyConfig {
    pub fn name(&self) -> &str {
        match self {
            DependencyConfig::Http { name, .. } | DependencyConfig::Smtp { name, .. } => name,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let paths = [
            &self.endpoints.health_path,
            &self.endpoints.readiness_path,
            &self.endpoints.metrics_path,
        ];
        for path in paths {
            if !path.starts_with('/') {
                bail!("Endpoint path '{}' must start with '/'", path);
            }
        }
        let unique: HashSet<&String> = paths.into_iter().collect();
        if unique.len() != paths.len() {
            bail!("Endpoint paths must be distinct");
        }

        if self.readiness.check_timeout_secs == Some(0) {
            bail!("readiness.check_timeout_secs must be greater than 0");
        }

        for dependency in &self.dependencies {
            if dependency.name().trim().is_empty() {
                bail!("Dependency names must not be empty");
            }
            if let DependencyConfig::Http {
                name,
                expected_status,
                ..
            } = dependency
            {
                StatusCode::from_u16(*expected_status).with_context(|| {
                    format!("Invalid expected_status {} for dependency '{}'", expected_status, name)
                })?;
            }
        }

        self.credentials()?;
        Ok(())
    }

    pub fn credentials(&self) -> Result<Credentials> {
        Credentials::new(&self.auth.username, &self.auth.password_sha256)
            .context("Invalid auth configuration")
    }

    pub fn endpoint_paths(&self) -> EndpointPaths {
        EndpointPaths {
            health: self.endpoints.health_path.clone(),
            readiness: self.endpoints.readiness_path.clone(),
            metrics: self.endpoints.metrics_path.clone(),
        }
    }

    pub fn backend(&self) -> String {
        self.metrics.backend.clone().unwrap_or_else(default_backend)
    }

    pub fn metrics_registry(&self) -> Result<MetricsRegistry> {
        MetricsRegistry::new(self.backend()).context("Failed to register metrics")
    }

    /// Builds the aggregator with every configured dependency registered in order.
    pub fn readiness_aggregator(&self) -> Result<ReadinessAggregator> {
        let mut aggregator = ReadinessAggregator::new();
        if let Some(secs) = self.readiness.check_timeout_secs {
            aggregator = aggregator.with_check_timeout(Duration::from_secs(secs));
        }

        for dependency in &self.dependencies {
            match dependency {
                DependencyConfig::Http {
                    name,
                    url,
                    expected_status,
                } => {
                    let status = StatusCode::from_u16(*expected_status).with_context(|| {
                        format!("Invalid expected_status {} for dependency '{}'", expected_status, name)
                    })?;
                    aggregator.add_dependency(Arc::new(
                        HttpDependency::new(name.clone(), url.clone()).expect_status(status),
                    ));
                }
                DependencyConfig::Smtp { name, host, port } => {
                    aggregator.add_dependency(Arc::new(SmtpDependency::new(
                        name.clone(),
                        host.clone(),
                        *port,
                    )));
                }
            }
        }

        Ok(aggregator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BAR_SHA256: &str = "fcde2b2edba56bf408601fb721fe9b5c338d10ee429ea04fae5511b68fbf8fb9";

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        config.validate().unwrap();

        assert_eq!(config.listen, default_listen());
        assert_eq!(config.endpoint_paths(), EndpointPaths::default());
        assert!(!config.credentials().unwrap().is_enabled());
        assert!(config.dependencies.is_empty());
        assert!(config.readiness.check_timeout_secs.is_none());
    }

    #[test]
    fn test_parses_tagged_dependencies() {
        let yaml = r#"
listen: "127.0.0.1:9200"
auth:
  username: foo
  password_sha256: FCDE2B2EDBA56BF408601FB721FE9B5C338D10EE429EA04FAE5511B68FBF8FB9
metrics:
  backend: web-1
readiness:
  check_timeout_secs: 3
dependencies:
  - name: search
    kind: http
    url: http://localhost:9200/_cluster/health
  - name: mail
    kind: smtp
    host: localhost
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.backend(), "web-1");
        assert_eq!(config.credentials().unwrap().password_sha256(), BAR_SHA256);
        match &config.dependencies[0] {
            DependencyConfig::Http { expected_status, .. } => assert_eq!(*expected_status, 200),
            other => panic!("unexpected dependency {:?}", other),
        }
        match &config.dependencies[1] {
            DependencyConfig::Smtp { port, .. } => assert_eq!(*port, 25),
            other => panic!("unexpected dependency {:?}", other),
        }

        let aggregator = config.readiness_aggregator().unwrap();
        assert_eq!(aggregator.len(), 2);
        assert_eq!(aggregator.check_timeout(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_rejects_bad_password_hash() {
        let mut config = Config::default();
        config.auth.username = "foo".to_string();
        config.auth.password_sha256 = "not-a-hash".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_relative_and_duplicate_paths() {
        let mut config = Config::default();
        config.endpoints.metrics_path = "metrics".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.endpoints.readiness_path = "/health".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_timeout_and_empty_names() {
        let mut config = Config::default();
        config.readiness.check_timeout_secs = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.dependencies.push(DependencyConfig::Smtp {
            name: " ".to_string(),
            host: "localhost".to_string(),
            port: 25,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_expected_status() {
        let mut config = Config::default();
        config.dependencies.push(DependencyConfig::Http {
            name: "api".to_string(),
            url: Url::parse("http://localhost/").unwrap(),
            expected_status: 1000,
        });
        assert!(config.validate().is_err());
    }
}
