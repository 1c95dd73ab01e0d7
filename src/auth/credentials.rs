// src/auth/credentials.rs
use regex::Regex;
use std::sync::OnceLock;

/// Raised when the configured password hash is not a SHA-256 hex digest.
#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("Invalid password hash specified for {0}: Should be a 64-character hex string")]
    InvalidPasswordHash(String),
}

fn sha256_hex_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-f]{64}$").expect("valid regex"))
}

/// Username and password hash guarding the monitoring endpoints.
///
/// An empty username disables authentication entirely. An empty password
/// hash means any password is accepted for the configured username.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password_sha256: String,
}

impl Credentials {
    /// Normalizes and validates the configured values.
    ///
    /// The username is trimmed. The hash is trimmed and lowercased, and
    /// must then be empty or match `^[0-9a-f]{64}$`.
    pub fn new(
        username: impl AsRef<str>,
        password_sha256: impl AsRef<str>,
    ) -> Result<Self, CredentialsError> {
        let hash = password_sha256.as_ref().trim().to_lowercase();

        if !hash.is_empty() && !sha256_hex_regex().is_match(&hash) {
            return Err(CredentialsError::InvalidPasswordHash(hash));
        }

        Ok(Self {
            username: username.as_ref().trim().to_string(),
            password_sha256: hash,
        })
    }

    /// Credentials that let every request through.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Lowercase hex digest, or `""` when no password is required.
    pub fn password_sha256(&self) -> &str {
        &self.password_sha256
    }

    pub fn is_enabled(&self) -> bool {
        !self.username.is_empty()
    }
}
