//! Durable storage for the session token and user.
//!
//! SYSTEM CONTEXT
//! ==============
//! The session store writes through to a [`SessionPersistence`] on every
//! mutation and reads it once at startup, so a session survives restarts.
//!
//! TRADE-OFFS
//! ==========
//! Writes are best-effort: failures are logged and swallowed. The in-memory
//! session stays authoritative even when the disk write did not land.

#[cfg(test)]
#[path = "persistence_test.rs"]
mod persistence_test;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::net::types::User;

/// Storage backend for the session token and user.
pub trait SessionPersistence: Send + Sync {
    fn read_token(&self) -> Option<String>;

    fn write_token(&self, token: Option<&str>);

    /// Read the stored user. Implementations own the deserialization.
    fn read_user(&self) -> Option<User>;

    /// Store `user`, or erase the stored user when `None`.
    fn write_user(&self, user: Option<&User>);

    /// Erase both the token and the user.
    fn clear_all(&self);
}

// =============================================================================
// MEMORY
// =============================================================================

#[derive(Default)]
struct Stored {
    token: Option<String>,
    user: Option<User>,
}

/// Process-local persistence. Nothing outlives the process.
#[derive(Default)]
pub struct MemoryPersistence {
    inner: Mutex<Stored>,
}

impl MemoryPersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated store, as if a previous run had left a session behind.
    #[must_use]
    pub fn with_session(token: Option<String>, user: Option<User>) -> Self {
        Self { inner: Mutex::new(Stored { token, user }) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Stored> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionPersistence for MemoryPersistence {
    fn read_token(&self) -> Option<String> {
        self.lock().token.clone()
    }

    fn write_token(&self, token: Option<&str>) {
        self.lock().token = token.map(str::to_owned);
    }

    fn read_user(&self) -> Option<User> {
        self.lock().user.clone()
    }

    fn write_user(&self, user: Option<&User>) {
        self.lock().user = user.cloned();
    }

    fn clear_all(&self) {
        *self.lock() = Stored::default();
    }
}

// =============================================================================
// FILE
// =============================================================================

/// On-disk document: one entry per stored key, like a cookie jar.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Jar {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    /// Kept as raw JSON: older writers stored the user as a stringified object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<Value>,
}

impl Jar {
    fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.user.is_none()
    }
}

/// JSON-file persistence. The file is removed once the session is empty.
pub struct FilePersistence {
    path: PathBuf,
    // Serializes read-modify-write cycles on the file.
    io: Mutex<()>,
}

impl FilePersistence {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), io: Mutex::new(()) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Jar {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Jar::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "session file unreadable");
                return Jar::default();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "session file corrupt; treating as empty");
            Jar::default()
        })
    }

    fn save(&self, jar: &Jar) {
        if jar.is_empty() {
            self.remove();
            return;
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %e, "failed to create session directory");
                return;
            }
        }
        let raw = match serde_json::to_string_pretty(jar) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode session file");
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, raw) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write session file");
        }
    }

    fn remove(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "failed to remove session file"),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut Jar)) {
        let _guard = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        let mut jar = self.load();
        apply(&mut jar);
        self.save(&jar);
    }
}

impl SessionPersistence for FilePersistence {
    fn read_token(&self) -> Option<String> {
        let _guard = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        self.load().access_token.filter(|t| !t.is_empty())
    }

    fn write_token(&self, token: Option<&str>) {
        self.update(|jar| jar.access_token = token.map(str::to_owned));
    }

    fn read_user(&self) -> Option<User> {
        let _guard = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        decode_user(self.load().user?)
    }

    fn write_user(&self, user: Option<&User>) {
        let encoded = user.map(|u| Value::Object(u.attributes().clone()));
        self.update(|jar| jar.user = encoded);
    }

    fn clear_all(&self) {
        let _guard = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        self.remove();
    }
}

/// Accept either an object or a string holding a JSON object.
fn decode_user(stored: Value) -> Option<User> {
    match stored {
        Value::Object(attrs) => Some(User::from(attrs)),
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(attrs)) => Some(User::from(attrs)),
            _ => {
                tracing::warn!("stored user string is not a JSON object; ignoring");
                None
            }
        },
        Value::Null => None,
        _ => {
            tracing::warn!("stored user has unexpected JSON type; ignoring");
            None
        }
    }
}
