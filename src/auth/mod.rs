// src/auth/mod.rs
mod credentials;
mod gate;

pub use credentials::{Credentials, CredentialsError};
pub use gate::{check_auth_header, parse_basic_auth_header, AuthContext, AuthError, AuthGate};
