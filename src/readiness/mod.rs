// src/readiness/mod.rs
mod aggregator;
mod dependency;
mod http;
mod report;
mod smtp;

pub use aggregator::ReadinessAggregator;
pub use dependency::{CheckError, CheckOutcome, Dependency, DependencyStatus, FnDependency};
pub use http::HttpDependency;
pub use report::{DependencyReport, ReadinessReport};
pub use smtp::SmtpDependency;
