// src/readiness/aggregator.rs
use super::dependency::{CheckError, Dependency, DependencyStatus, FnDependency};
use super::http::HttpDependency;
use super::smtp::SmtpDependency;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};
use url::Url;

/// Registry of application dependencies, checked concurrently on demand.
///
/// Owned by the application's startup code and shared by handle with the
/// endpoints that need it. Dependencies are never removed.
#[derive(Default)]
pub struct ReadinessAggregator {
    dependencies: Mutex<Vec<Arc<dyn Dependency>>>,
    check_timeout: Option<Duration>,
}

impl ReadinessAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds every individual check. A check exceeding it is reported as
    /// not ready instead of stalling the whole readiness response.
    pub fn with_check_timeout(mut self, check_timeout: Duration) -> Self {
        self.check_timeout = Some(check_timeout);
        self
    }

    pub fn check_timeout(&self) -> Option<Duration> {
        self.check_timeout
    }

    pub fn add_dependency(&self, dependency: Arc<dyn Dependency>) {
        let mut dependencies = self.dependencies.lock();

        // Duplicates are accepted; readiness output keyed by name will
        // only show the last one.
        if dependencies.iter().any(|d| d.name() == dependency.name()) {
            warn!(
                dependency = %dependency.name(),
                "Dependency registered more than once under the same name"
            );
        }

        debug!(dependency = %dependency.name(), "Registered readiness dependency");
        dependencies.push(dependency);
    }

    pub fn add_fn_dependency<F>(&self, name: impl Into<String>, checker: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.add_dependency(Arc::new(FnDependency::new(name, checker)));
    }

    pub fn add_http_dependency(&self, name: impl Into<String>, url: Url) {
        self.add_dependency(Arc::new(HttpDependency::new(name, url)));
    }

    pub fn add_smtp_dependency(&self, name: impl Into<String>, host: impl Into<String>, port: u16) {
        self.add_dependency(Arc::new(SmtpDependency::new(name, host, port)));
    }

    pub fn len(&self) -> usize {
        self.dependencies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.lock().is_empty()
    }

    /// Checks every registered dependency concurrently.
    ///
    /// The registry is snapshotted under the lock, which is released before
    /// any check runs. Results follow registration order. A failing,
    /// panicking or timed-out check only affects its own status.
    pub async fn check_dependencies(&self) -> Vec<DependencyStatus> {
        let snapshot: Vec<Arc<dyn Dependency>> = self.dependencies.lock().clone();
        let check_timeout = self.check_timeout;

        let mut tasks = Vec::with_capacity(snapshot.len());

        for dependency in &snapshot {
            let dependency = dependency.clone();
            let task = tokio::spawn(async move {
                let result = match check_timeout {
                    Some(limit) => timeout(limit, dependency.check())
                        .await
                        .unwrap_or_else(|_| Err(CheckError::Timeout(limit))),
                    None => dependency.check().await,
                };

                match result {
                    Ok(outcome) => DependencyStatus::from_outcome(dependency, outcome),
                    Err(e) => DependencyStatus::from_error(dependency, &e),
                }
            });
            tasks.push(task);
        }

        // join_all keeps input order regardless of completion order
        let results = futures::future::join_all(tasks).await;

        let statuses: Vec<DependencyStatus> = results
            .into_iter()
            .zip(snapshot)
            .map(|(result, dependency)| match result {
                Ok(status) => status,
                Err(e) => {
                    let message = if e.is_panic() {
                        panic_message(e.into_panic())
                    } else {
                        e.to_string()
                    };
                    DependencyStatus::from_error(dependency, &CheckError::Panicked(message))
                }
            })
            .collect();

        let ready_count = statuses.iter().filter(|s| s.is_ready()).count();
        for status in statuses.iter().filter(|s| !s.is_ready()) {
            warn!(
                dependency = %status.name(),
                message = %status.message(),
                "Dependency is not ready"
            );
        }

        info!(
            "Readiness check complete: {} ready, {} not ready",
            ready_count,
            statuses.len() - ready_count
        );

        statuses
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "dependency check panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readiness::dependency::CheckOutcome;
    use async_trait::async_trait;
    use tokio::sync::{oneshot, Notify};

    struct StaticDependency {
        name: &'static str,
        delay: Duration,
        result: fn() -> Result<CheckOutcome, CheckError>,
    }

    #[async_trait]
    impl Dependency for StaticDependency {
        fn name(&self) -> &str {
            self.name
        }

        async fn check(&self) -> Result<CheckOutcome, CheckError> {
            tokio::time::sleep(self.delay).await;
            (self.result)()
        }
    }

    fn dep(
        name: &'static str,
        delay_ms: u64,
        result: fn() -> Result<CheckOutcome, CheckError>,
    ) -> Arc<dyn Dependency> {
        Arc::new(StaticDependency {
            name,
            delay: Duration::from_millis(delay_ms),
            result,
        })
    }

    #[tokio::test]
    async fn test_empty_registry_yields_no_statuses() {
        let aggregator = ReadinessAggregator::new();
        assert!(aggregator.is_empty());
        assert!(aggregator.check_dependencies().await.is_empty());
    }

    #[tokio::test]
    async fn test_results_follow_registration_order() {
        let aggregator = ReadinessAggregator::new();
        // Slowest first so completion order differs from registration order.
        aggregator.add_dependency(dep("slow", 60, || Ok(CheckOutcome::ready("slow ok"))));
        aggregator.add_dependency(dep("medium", 30, || Ok(CheckOutcome::not_ready("medium down"))));
        aggregator.add_dependency(dep("fast", 0, || Ok(CheckOutcome::ready(""))));

        let statuses = aggregator.check_dependencies().await;
        let names: Vec<&str> = statuses.iter().map(|s| s.name()).collect();

        assert_eq!(names, vec!["slow", "medium", "fast"]);
        assert!(statuses[0].is_ready());
        assert!(!statuses[1].is_ready());
        assert_eq!(statuses[1].message(), "medium down");
        assert!(statuses[2].is_ready());
    }

    #[tokio::test]
    async fn test_failing_dependency_is_isolated() {
        let aggregator = ReadinessAggregator::new();
        aggregator.add_fn_dependency("first", || true);
        aggregator.add_dependency(dep("broken", 10, || {
            Err(CheckError::Other(anyhow::anyhow!("query failed")))
        }));
        aggregator.add_fn_dependency("panics", || panic!("driver bug"));
        aggregator.add_fn_dependency("last", || true);

        let statuses = aggregator.check_dependencies().await;

        assert_eq!(statuses.len(), 4);
        assert!(statuses[0].is_ready());
        assert!(!statuses[1].is_ready());
        assert_eq!(
            statuses[1].message(),
            "Exception during readiness check (error): query failed"
        );
        assert!(!statuses[2].is_ready());
        assert!(statuses[2]
            .message()
            .starts_with("Exception during readiness check (panic): "));
        assert!(statuses[3].is_ready());
    }

    #[tokio::test]
    async fn test_panic_inside_async_check_is_isolated() {
        let aggregator = ReadinessAggregator::new();
        aggregator.add_dependency(dep("ok", 0, || Ok(CheckOutcome::ready(""))));
        aggregator.add_dependency(dep("bad", 0, || panic!("async kaboom")));

        let statuses = aggregator.check_dependencies().await;

        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].is_ready());
        assert_eq!(
            statuses[1].message(),
            "Exception during readiness check (panic): async kaboom"
        );
    }

    #[tokio::test]
    async fn test_timeout_marks_dependency_not_ready() {
        let aggregator = ReadinessAggregator::new().with_check_timeout(Duration::from_millis(20));
        aggregator.add_dependency(dep("hung", 5_000, || Ok(CheckOutcome::ready(""))));
        aggregator.add_fn_dependency("quick", || true);

        let statuses = aggregator.check_dependencies().await;

        assert!(!statuses[0].is_ready());
        assert!(statuses[0]
            .message()
            .starts_with("Exception during readiness check (timeout): "));
        assert!(statuses[1].is_ready());
    }

    #[tokio::test]
    async fn test_duplicate_names_are_kept() {
        let aggregator = ReadinessAggregator::new();
        aggregator.add_fn_dependency("db", || true);
        aggregator.add_fn_dependency("db", || false);

        let statuses = aggregator.check_dependencies().await;
        assert_eq!(statuses.len(), 2);
        assert_eq!(aggregator.len(), 2);
    }

    struct GatedDependency {
        started: Arc<Notify>,
        release: Mutex<Option<oneshot::Receiver<()>>>,
    }

    #[async_trait]
    impl Dependency for GatedDependency {
        fn name(&self) -> &str {
            "gated"
        }

        async fn check(&self) -> Result<CheckOutcome, CheckError> {
            self.started.notify_one();
            let release = self.release.lock().take();
            if let Some(release) = release {
                let _ = release.await;
            }
            Ok(CheckOutcome::ready(""))
        }
    }

    #[tokio::test]
    async fn test_registration_during_check_does_not_affect_in_flight_run() {
        let aggregator = Arc::new(ReadinessAggregator::new());
        let started = Arc::new(Notify::new());
        let (release_tx, release_rx) = oneshot::channel();

        aggregator.add_dependency(Arc::new(GatedDependency {
            started: started.clone(),
            release: Mutex::new(Some(release_rx)),
        }));
        aggregator.add_fn_dependency("second", || true);

        let running = {
            let aggregator = aggregator.clone();
            tokio::spawn(async move { aggregator.check_dependencies().await })
        };

        started.notified().await;
        aggregator.add_fn_dependency("late", || false);
        release_tx.send(()).unwrap();

        let statuses = running.await.unwrap();
        let names: Vec<&str> = statuses.iter().map(|s| s.name()).collect();

        assert_eq!(names, vec!["gated", "second"]);
        assert!(statuses.iter().all(|s| s.is_ready()));
        assert_eq!(aggregator.len(), 3);
    }
}
