// src/readiness/dependency.rs
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Why a dependency check could not report a status.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("{message} (expected {expected})")]
    UnexpectedStatus { message: String, expected: u16 },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected SMTP greeting: {0}")]
    UnexpectedGreeting(String),

    #[error("Check did not complete within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Panicked(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CheckError {
    /// Short category name used in readiness messages.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckError::Http(_) => "http",
            CheckError::UnexpectedStatus { .. } => "unexpected_status",
            CheckError::Io(_) => "io",
            CheckError::UnexpectedGreeting(_) => "smtp",
            CheckError::Timeout(_) => "timeout",
            CheckError::Panicked(_) => "panic",
            CheckError::Other(_) => "error",
        }
    }
}

/// What a single check observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub ready: bool,
    pub message: String,
}

impl CheckOutcome {
    pub fn ready(message: impl Into<String>) -> Self {
        Self {
            ready: true,
            message: message.into(),
        }
    }

    pub fn not_ready(message: impl Into<String>) -> Self {
        Self {
            ready: false,
            message: message.into(),
        }
    }
}

/// An external system whose availability decides readiness.
#[async_trait]
pub trait Dependency: Send + Sync {
    /// Short, human-readable name used as the key in readiness output.
    fn name(&self) -> &str;

    async fn check(&self) -> Result<CheckOutcome, CheckError>;
}

/// The result of checking one dependency during one readiness run.
#[derive(Clone)]
pub struct DependencyStatus {
    dependency: Arc<dyn Dependency>,
    is_ready: bool,
    message: String,
}

impl DependencyStatus {
    pub fn new(dependency: Arc<dyn Dependency>, is_ready: bool, message: impl Into<String>) -> Self {
        Self {
            dependency,
            is_ready,
            message: message.into(),
        }
    }

    pub(crate) fn from_outcome(dependency: Arc<dyn Dependency>, outcome: CheckOutcome) -> Self {
        Self::new(dependency, outcome.ready, outcome.message)
    }

    pub(crate) fn from_error(dependency: Arc<dyn Dependency>, error: &CheckError) -> Self {
        let message = format!(
            "Exception during readiness check ({}): {}",
            error.kind(),
            error
        );
        Self::new(dependency, false, message)
    }

    pub fn dependency(&self) -> &Arc<dyn Dependency> {
        &self.dependency
    }

    pub fn name(&self) -> &str {
        self.dependency.name()
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Debug for DependencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyStatus")
            .field("dependency", &self.dependency.name())
            .field("is_ready", &self.is_ready)
            .field("message", &self.message)
            .finish()
    }
}

type CheckFn = dyn Fn() -> anyhow::Result<bool> + Send + Sync;

/// Wraps a blocking closure as a dependency check.
///
/// The closure runs on tokio's blocking pool so that a synchronous ping
/// does not stall the other checks.
pub struct FnDependency {
    name: String,
    checker: Arc<CheckFn>,
}

impl FnDependency {
    pub fn new<F>(name: impl Into<String>, checker: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self::fallible(name, move || Ok(checker()))
    }

    /// A check whose errors become a not-ready status with the error text.
    pub fn fallible<F>(name: impl Into<String>, checker: F) -> Self
    where
        F: Fn() -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            checker: Arc::new(checker),
        }
    }
}

#[async_trait]
impl Dependency for FnDependency {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<CheckOutcome, CheckError> {
        let checker = self.checker.clone();
        let ready = tokio::task::spawn_blocking(move || checker())
            .await
            .map_err(|e| CheckError::Panicked(e.to_string()))??;

        Ok(CheckOutcome {
            ready,
            message: String::new(),
        })
    }
}

impl fmt::Debug for FnDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnDependency").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_dependency_reports_closure_result() {
        let up = FnDependency::new("up", || true);
        let down = FnDependency::new("down", || false);

        assert_eq!(up.check().await.unwrap(), CheckOutcome::ready(""));
        assert_eq!(down.check().await.unwrap(), CheckOutcome::not_ready(""));
        assert_eq!(up.name(), "up");
    }

    #[tokio::test]
    async fn test_fallible_dependency_propagates_error() {
        let dep = FnDependency::fallible("db", || anyhow::bail!("connection refused"));

        let err = dep.check().await.unwrap_err();
        assert_eq!(err.kind(), "error");
        assert_eq!(err.to_string(), "connection refused");
    }

    #[tokio::test]
    async fn test_panicking_closure_becomes_error() {
        let dep = FnDependency::new("boom", || panic!("kaboom"));

        let err = dep.check().await.unwrap_err();
        assert_eq!(err.kind(), "panic");
    }

    #[test]
    fn test_status_message_from_error() {
        let dep: Arc<dyn Dependency> = Arc::new(FnDependency::new("cache", || true));
        let error = CheckError::Timeout(Duration::from_secs(2));

        let status = DependencyStatus::from_error(dep, &error);
        assert!(!status.is_ready());
        assert_eq!(status.name(), "cache");
        assert_eq!(
            status.message(),
            "Exception during readiness check (timeout): Check did not complete within 2s"
        );
    }
}
