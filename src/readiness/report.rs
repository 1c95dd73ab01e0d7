// src/readiness/report.rs
use super::dependency::DependencyStatus;
use hyper::StatusCode;
use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyReport {
    pub ready: bool,
    pub message: String,
}

/// Body of the readiness endpoint: dependency name to its status.
///
/// Statuses sharing a name overwrite each other; the entry keeps the
/// position of the first one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReadinessReport {
    dependencies: IndexMap<String, DependencyReport>,
    #[serde(skip)]
    ready: bool,
}

impl ReadinessReport {
    pub fn from_statuses(statuses: &[DependencyStatus]) -> Self {
        let mut dependencies = IndexMap::with_capacity(statuses.len());

        for status in statuses {
            dependencies.insert(
                status.name().to_string(),
                DependencyReport {
                    ready: status.is_ready(),
                    message: status.message().to_string(),
                },
            );
        }

        Self {
            dependencies,
            ready: statuses.iter().all(DependencyStatus::is_ready),
        }
    }

    /// True when every checked dependency was ready, including ones whose
    /// entry was overwritten by a duplicate name.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn status_code(&self) -> StatusCode {
        if self.ready {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }

    pub fn get(&self, name: &str) -> Option<&DependencyReport> {
        self.dependencies.get(name)
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
