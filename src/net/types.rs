//! Auth DTOs and errors for the client/server boundary.
//!
//! DESIGN
//! ======
//! Server payloads are loosely shaped, so they are decoded into optional-field
//! structs here and validated before the session store ever sees them. The
//! split between [`RawUser`] and [`User`] keeps role claims out of client
//! state: the only way from one to the other is [`RawUser::strip_roles`].

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Key under which the server ships authorization claims on user objects.
pub const ROLES_KEY: &str = "roles";

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by auth operations.
///
/// The session store never interprets these; it only uses them to decide
/// whether state gets committed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The request never produced an HTTP response.
    #[error("auth request failed: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("auth request rejected: status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The response body did not have the expected shape.
    #[error("malformed auth response: {0}")]
    Malformed(String),

    /// A later session change made this response stale; it was not applied.
    #[error("auth response discarded: session changed while request was in flight")]
    Superseded,

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// A configuration value was invalid.
    #[error("invalid auth config: {0}")]
    Config(String),
}

impl AuthError {
    /// Stable machine-readable code for display layers.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "E_TRANSPORT",
            Self::Rejected { .. } => "E_REJECTED",
            Self::Malformed(_) => "E_MALFORMED",
            Self::Superseded => "E_SUPERSEDED",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
            Self::Config(_) => "E_CONFIG",
        }
    }

    /// Whether a caller could reasonably try the same request again.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Rejected { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// USERS
// =============================================================================

/// User object exactly as the server sent it, possibly carrying role claims.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawUser(pub Map<String, Value>);

impl RawUser {
    /// Whether the server attached a role claim.
    #[must_use]
    pub fn has_roles(&self) -> bool {
        self.0.contains_key(ROLES_KEY)
    }

    /// Copy into a [`User`] without the role claim. `self` is left intact.
    #[must_use]
    pub fn strip_roles(&self) -> User {
        let mut attrs = self.0.clone();
        attrs.remove(ROLES_KEY);
        User(attrs)
    }
}

/// Canonical client-side user: profile attributes, never role claims.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct User(Map<String, Value>);

impl User {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.0
    }

    /// User identifier rendered as a string, whether the server sent a number or a string.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Best label for status lines: `name`, then `email`, then `id`.
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        ["name", "email"]
            .iter()
            .find_map(|key| self.0.get(*key).and_then(Value::as_str).filter(|s| !s.trim().is_empty()))
            .map(str::to_owned)
            .or_else(|| self.id())
    }
}

impl From<Map<String, Value>> for User {
    fn from(attrs: Map<String, Value>) -> Self {
        RawUser(attrs).strip_roles()
    }
}

impl<'de> Deserialize<'de> for User {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Map::<String, Value>::deserialize(deserializer).map(Self::from)
    }
}

// =============================================================================
// RESPONSES
// =============================================================================

/// Login/registration response body: `{ token, user }`, both optional on the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthPayload {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<RawUser>,
}

impl AuthPayload {
    /// Decode a login/registration body, requiring a non-empty token and a user object.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Malformed`] if the body is not an object of the
    /// expected shape or either field is missing.
    pub fn from_response(body: Value) -> Result<Self, AuthError> {
        let payload: Self = serde_json::from_value(body).map_err(|e| AuthError::Malformed(e.to_string()))?;
        if payload.token.as_deref().is_none_or(str::is_empty) {
            return Err(AuthError::Malformed("missing `token`".to_owned()));
        }
        if payload.user.is_none() {
            return Err(AuthError::Malformed("missing `user`".to_owned()));
        }
        Ok(payload)
    }
}

/// Decode a profile body: a bare user object.
///
/// # Errors
///
/// Returns [`AuthError::Malformed`] if the body is not a JSON object.
pub fn raw_user_from_response(body: Value) -> Result<RawUser, AuthError> {
    match body {
        Value::Object(attrs) => Ok(RawUser(attrs)),
        other => Err(AuthError::Malformed(format!("expected user object, got {}", json_kind(&other)))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// REQUESTS
// =============================================================================

/// Already-validated login form values.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Already-validated registration form values, serialized with the form's field names.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub password: String,
    pub confirm_password: String,
    /// Terms acceptance marker; the signup form submits `"agree"`.
    pub terms: String,
}

impl fmt::Debug for RegistrationDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationDetails")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("phone", &self.phone)
            .field("address", &self.address)
            .field("password", &"<redacted>")
            .field("confirm_password", &"<redacted>")
            .field("terms", &self.terms)
            .finish()
    }
}
