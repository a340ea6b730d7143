//! Auth client configuration parsed from environment variables.

use std::path::PathBuf;

use crate::net::types::AuthError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5001/api";
pub const DEFAULT_SESSION_PATH: &str = ".authsession.json";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for AuthTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// API root the auth endpoints hang off, without a trailing `/`.
    pub base_url: String,
    /// File the session is persisted to between runs.
    pub session_path: PathBuf,
    pub timeouts: AuthTimeouts,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            session_path: PathBuf::from(DEFAULT_SESSION_PATH),
            timeouts: AuthTimeouts::default(),
        }
    }
}

impl AuthConfig {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `BASE_URL`: default `http://localhost:5001/api`
    /// - `AUTH_SESSION_PATH`: default `.authsession.json`
    /// - `AUTH_REQUEST_TIMEOUT_SECS`: default 30
    /// - `AUTH_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if `BASE_URL` is set but blank.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AuthConfig::from_env`] with an injectable variable source.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if `BASE_URL` is set but blank.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AuthError> {
        let base_url = normalize_base_url(&lookup("BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()))?;
        let session_path = lookup("AUTH_SESSION_PATH")
            .filter(|p| !p.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_SESSION_PATH), PathBuf::from);
        let timeouts = AuthTimeouts {
            request_secs: parse_u64(lookup("AUTH_REQUEST_TIMEOUT_SECS"), DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_u64(lookup("AUTH_CONNECT_TIMEOUT_SECS"), DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        Ok(Self { base_url, session_path, timeouts })
    }
}

/// Trim whitespace and trailing slashes.
///
/// # Errors
///
/// Returns [`AuthError::Config`] if nothing is left.
pub fn normalize_base_url(raw: &str) -> Result<String, AuthError> {
    let url = raw.trim().trim_end_matches('/');
    if url.is_empty() {
        return Err(AuthError::Config("BASE_URL must not be empty".to_owned()));
    }
    Ok(url.to_owned())
}

fn parse_u64(raw: Option<String>, default: u64) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok()).unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
