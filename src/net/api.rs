//! REST helpers for the auth endpoints.
//!
//! The session store only sees the [`AuthApi`] trait; [`HttpAuthApi`] is the
//! `reqwest` implementation used by real hosts.
//!
//! ERROR HANDLING
//! ==============
//! Every failure comes back as an [`AuthError`] value. Transport problems,
//! non-2xx statuses, and unparseable bodies are kept distinct so forms can
//! render them, but nothing here retries.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::types::AuthError;
use crate::config::AuthConfig;
use crate::util::persistence::SessionPersistence;

pub const LOGIN_ENDPOINT: &str = "auth/login";
pub const SIGNUP_ENDPOINT: &str = "auth/signup";
pub const PROFILE_ENDPOINT: &str = "auth/profile";

/// HTTP-shaped capabilities the session store consumes.
#[async_trait::async_trait]
pub trait AuthApi: Send + Sync {
    /// `POST` `payload` as JSON to `endpoint` and return the decoded body.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if the request fails, the server rejects it,
    /// or the body is not JSON.
    async fn post_data(&self, endpoint: &str, payload: &Value) -> Result<Value, AuthError>;

    /// `GET` `endpoint` and return the decoded body.
    ///
    /// # Errors
    ///
    /// Same as [`AuthApi::post_data`].
    async fn get_data(&self, endpoint: &str) -> Result<Value, AuthError>;
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

/// `reqwest`-backed [`AuthApi`] rooted at the configured base URL.
///
/// Reads the bearer token from the same persistence the session writes to,
/// so requests made after login are authenticated without extra plumbing.
pub struct HttpAuthApi {
    http: reqwest::Client,
    base_url: String,
    persistence: Arc<dyn SessionPersistence>,
}

impl HttpAuthApi {
    /// # Errors
    ///
    /// Returns [`AuthError::HttpClientBuild`] if the HTTP client cannot be constructed.
    pub fn new(config: &AuthConfig, persistence: Arc<dyn SessionPersistence>) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| AuthError::HttpClientBuild(e.to_string()))?;
        Ok(Self::with_client(http, config.base_url.clone(), persistence))
    }

    /// Use a caller-built client, e.g. one with custom proxy or TLS settings.
    #[must_use]
    pub fn with_client(http: reqwest::Client, base_url: String, persistence: Arc<dyn SessionPersistence>) -> Self {
        Self { http, base_url, persistence }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.persistence.read_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, endpoint: &str, request: reqwest::RequestBuilder) -> Result<Value, AuthError> {
        tracing::debug!(endpoint, "auth request");
        let response = self
            .authorize(request)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(AuthError::Rejected { status, message: rejection_message(status, &text) });
        }
        serde_json::from_str(&text).map_err(|e| AuthError::Malformed(e.to_string()))
    }
}

#[async_trait::async_trait]
impl AuthApi for HttpAuthApi {
    async fn post_data(&self, endpoint: &str, payload: &Value) -> Result<Value, AuthError> {
        let request = self.http.post(endpoint_url(&self.base_url, endpoint)).json(payload);
        self.send(endpoint, request).await
    }

    async fn get_data(&self, endpoint: &str) -> Result<Value, AuthError> {
        let request = self.http.get(endpoint_url(&self.base_url, endpoint));
        self.send(endpoint, request).await
    }
}

fn endpoint_url(base_url: &str, endpoint: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), endpoint.trim_start_matches('/'))
}

/// Prefer the server's `message` (or `error`) field; fall back to the raw body.
fn rejection_message(status: u16, body: &str) -> String {
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(body) {
        let field = ["message", "error"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_str));
        if let Some(message) = field {
            return message.to_owned();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() { format!("status {status}") } else { trimmed.to_owned() }
}
