// src/metrics/labels.rs
use indexmap::IndexMap;

pub const BACKEND_LABEL: &str = "backend";
pub const STATUS_CODE_LABEL: &str = "statusCode";
pub const SUCCESS_LABEL: &str = "success";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LabelError {
    #[error("Cannot change the value of the backend label")]
    BackendIsReadOnly,
}

/// Label set attached to an instrumented call's response metrics.
///
/// Always starts with `backend`; keys keep insertion order and later
/// writes to an existing key replace its value in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    labels: IndexMap<String, String>,
}

impl Labels {
    pub fn new(backend: impl Into<String>) -> Self {
        let mut labels = IndexMap::new();
        labels.insert(BACKEND_LABEL.to_string(), backend.into());
        Self { labels }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), LabelError> {
        let key = key.into();
        if key == BACKEND_LABEL {
            return Err(LabelError::BackendIsReadOnly);
        }
        self.labels.insert(key, value.into());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn backend(&self) -> &str {
        self.get(BACKEND_LABEL).unwrap_or_default()
    }

    pub fn add_status_code(&mut self, status_code: u16) {
        self.labels
            .insert(STATUS_CODE_LABEL.to_string(), status_code.to_string());
    }

    pub fn add_success(&mut self) {
        self.labels.insert(SUCCESS_LABEL.to_string(), "1".to_string());
    }

    pub fn add_failure(&mut self) {
        self.labels.insert(SUCCESS_LABEL.to_string(), "0".to_string());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.labels.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.labels.values().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
