// src/auth/gate.rs
// HTTP Basic authentication shared by every protected endpoint.
// RFC 2617 section 2: `Authorization: Basic <base64(user:pass)>`

use super::credentials::Credentials;
use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};
use std::sync::Arc;

const BASIC_PREFIX: &str = "Basic ";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Malformed base64 in Authorization header: {0}")]
    MalformedHeader(#[from] base64::DecodeError),
}

/// The two host-specific operations the gate needs: reading the inbound
/// `Authorization` header and signalling a rejection.
pub trait AuthContext {
    fn auth_header(&self) -> Option<&str>;

    fn on_rejected(&mut self);
}

/// Splits a Basic auth header into `(username, password)`.
///
/// Returns empty strings when the header is absent or uses another scheme.
/// A missing colon yields the whole payload as username and an empty
/// password. Invalid UTF-8 is replaced rather than rejected.
pub fn parse_basic_auth_header(header: Option<&str>) -> Result<(String, String), AuthError> {
    let encoded = match header.and_then(strip_basic_prefix) {
        Some(rest) => rest.trim(),
        None => return Ok((String::new(), String::new())),
    };

    let bytes = STANDARD.decode(encoded)?;
    let user_colon_pass = String::from_utf8_lossy(&bytes);

    Ok(match user_colon_pass.split_once(':') {
        Some((user, pass)) => (user.to_string(), pass.to_string()),
        None => (user_colon_pass.into_owned(), String::new()),
    })
}

fn strip_basic_prefix(header: &str) -> Option<&str> {
    let prefix = header.get(..BASIC_PREFIX.len())?;
    if prefix.eq_ignore_ascii_case(BASIC_PREFIX) {
        Some(&header[BASIC_PREFIX.len()..])
    } else {
        None
    }
}

/// Checks a raw header against an expected username and SHA-256 hex digest.
///
/// Username comparison ignores case. An empty `password_sha256` means the
/// password is not checked; otherwise the digest comparison ignores case.
pub fn check_auth_header(
    header: Option<&str>,
    username: &str,
    password_sha256: &str,
) -> Result<bool, AuthError> {
    let (header_username, header_password) = parse_basic_auth_header(header)?;

    let username_matches = username.to_lowercase() == header_username.to_lowercase();
    let password_matches = password_sha256.is_empty()
        || password_sha256.eq_ignore_ascii_case(&hash_password(&header_password));

    Ok(username_matches && password_matches)
}

fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Authentication gate configured once with the process-wide credentials.
#[derive(Debug, Clone)]
pub struct AuthGate {
    credentials: Arc<Credentials>,
}

impl AuthGate {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Arc::new(credentials),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Returns `true` when the request may proceed.
    ///
    /// With no username configured the header is never inspected. On a
    /// mismatch `ctx.on_rejected()` is invoked before returning `false`.
    pub fn check_authentication<C: AuthContext>(&self, ctx: &mut C) -> Result<bool, AuthError> {
        if !self.credentials.is_enabled() {
            return Ok(true);
        }

        let authorized = check_auth_header(
            ctx.auth_header(),
            self.credentials.username(),
            self.credentials.password_sha256(),
        )?;

        if !authorized {
            tracing::debug!("Rejected request with invalid credentials");
            ctx.on_rejected();
        }

        Ok(authorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BAR_SHA256: &str = "fcde2b2edba56bf408601fb721fe9b5c338d10ee429ea04fae5511b68fbf8fb9";

    struct FakeContext {
        header: Option<String>,
        rejected: bool,
    }

    impl FakeContext {
        fn new(header: Option<&str>) -> Self {
            Self {
                header: header.map(str::to_string),
                rejected: false,
            }
        }
    }

    impl AuthContext for FakeContext {
        fn auth_header(&self) -> Option<&str> {
            self.header.as_deref()
        }

        fn on_rejected(&mut self) {
            self.rejected = true;
        }
    }

    #[test]
    fn test_basic_auth_succeeds_with_valid_user_and_password() {
        assert!(check_auth_header(Some("Basic Zm9vOmJhcg=="), "foo", BAR_SHA256).unwrap());
    }

    #[test]
    fn test_basic_auth_succeeds_with_empty_password_hash() {
        assert!(check_auth_header(Some("Basic Zm9v"), "foo", "").unwrap());
    }

    #[test]
    fn test_basic_auth_succeeds_with_no_username_configured() {
        assert!(check_auth_header(Some(""), "", "").unwrap());
        assert!(check_auth_header(None, "", "").unwrap());
    }

    #[test]
    fn test_basic_auth_fails_with_invalid_user() {
        assert!(!check_auth_header(Some("Basic Zm9vOmJhcg=="), "obviously-wrong", BAR_SHA256).unwrap());
    }

    #[test]
    fn test_basic_auth_fails_with_missing_header() {
        assert!(!check_auth_header(Some(""), "foo", BAR_SHA256).unwrap());
        assert!(!check_auth_header(None, "foo", BAR_SHA256).unwrap());
    }

    #[test]
    fn test_basic_auth_fails_with_wrong_password() {
        // "foo:baz"
        assert!(!check_auth_header(Some("Basic Zm9vOmJheg=="), "foo", BAR_SHA256).unwrap());
    }

    #[test]
    fn test_comparisons_ignore_case() {
        assert!(check_auth_header(Some("Basic Zm9vOmJhcg=="), "FOO", BAR_SHA256).unwrap());
        assert!(check_auth_header(Some("Basic Zm9vOmJhcg=="), "foo", &BAR_SHA256.to_uppercase()).unwrap());
        assert!(check_auth_header(Some("bAsIc Zm9vOmJhcg=="), "foo", BAR_SHA256).unwrap());
    }

    #[test]
    fn test_parse_other_scheme_is_empty() {
        let parsed = parse_basic_auth_header(Some("Bearer abc.def")).unwrap();
        assert_eq!(parsed, (String::new(), String::new()));

        let parsed = parse_basic_auth_header(Some("Basic")).unwrap();
        assert_eq!(parsed, (String::new(), String::new()));
    }

    #[test]
    fn test_parse_splits_at_first_colon() {
        // "user:pa:ss"
        let parsed = parse_basic_auth_header(Some("Basic dXNlcjpwYTpzcw==")).unwrap();
        assert_eq!(parsed, ("user".to_string(), "pa:ss".to_string()));

        // "user:"
        let parsed = parse_basic_auth_header(Some("Basic dXNlcjo=")).unwrap();
        assert_eq!(parsed, ("user".to_string(), String::new()));
    }

    #[test]
    fn test_parse_malformed_base64_is_an_error() {
        let err = parse_basic_auth_header(Some("Basic not*base64")).unwrap_err();
        assert!(matches!(err, AuthError::MalformedHeader(_)));
        assert!(check_auth_header(Some("Basic %%%"), "foo", "").is_err());
    }

    #[test]
    fn test_gate_disabled_never_reads_header() {
        let gate = AuthGate::new(Credentials::disabled());
        let mut ctx = FakeContext::new(Some("Basic %%% definitely not base64"));

        assert!(gate.check_authentication(&mut ctx).unwrap());
        assert!(!ctx.rejected);
    }

    #[test]
    fn test_gate_rejects_and_signals() {
        let gate = AuthGate::new(Credentials::new("foo", BAR_SHA256).unwrap());
        let mut ctx = FakeContext::new(None);

        assert!(!gate.check_authentication(&mut ctx).unwrap());
        assert!(ctx.rejected);
    }

    #[test]
    fn test_gate_accepts_valid_header() {
        let gate = AuthGate::new(Credentials::new("foo", BAR_SHA256).unwrap());
        let mut ctx = FakeContext::new(Some("Basic Zm9vOmJhcg=="));

        assert!(gate.check_authentication(&mut ctx).unwrap());
        assert!(!ctx.rejected);
    }

    proptest! {
        #[test]
        fn prop_parse_recovers_user_and_password(user in "[^:]{0,24}", pass in ".{0,24}") {
            let header = format!("Basic {}", STANDARD.encode(format!("{}:{}", user, pass)));
            let parsed = parse_basic_auth_header(Some(&header)).unwrap();
            prop_assert_eq!(parsed, (user, pass));
        }

        #[test]
        fn prop_parse_without_colon_has_empty_password(user in "[^:]{0,24}") {
            let header = format!("Basic {}", STANDARD.encode(&user));
            let parsed = parse_basic_auth_header(Some(&header)).unwrap();
            prop_assert_eq!(parsed, (user, String::new()));
        }
    }
}
