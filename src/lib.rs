// src/lib.rs
pub mod auth;
pub mod config;
pub mod metrics;
pub mod readiness;
pub mod server;
