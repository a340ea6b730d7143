//! Auth-session state for the current client user.
//!
//! SYSTEM CONTEXT
//! ==============
//! One [`SessionStore`] is owned by the application root and shared by
//! reference with forms, route guards, and user-aware components. It is the
//! only thing allowed to mutate the session.
//!
//! DESIGN
//! ======
//! Every primitive mutation updates memory, writes through to persistence,
//! then publishes a [`SessionEvent`]. `apply_auth_payload` is two primitive
//! writes (token, then user), so observers see `TokenChanged` before
//! `UserChanged` and can read a token-without-user session in between.
//!
//! STALE COMPLETIONS
//! =================
//! Requests can interleave at await points: a `logout` may land while a
//! `login` is still waiting on the network. Each commit point advances a
//! generation counter. Network-backed operations remember the generation
//! they started under and refuse to commit if it moved, returning
//! [`AuthError::Superseded`] instead of resurrecting a session the user
//! already left.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::net::api::{AuthApi, LOGIN_ENDPOINT, PROFILE_ENDPOINT, SIGNUP_ENDPOINT};
use crate::net::types::{AuthError, AuthPayload, RawUser, User, raw_user_from_response};
use crate::util::navigator::{LOGIN_PATH, Navigator};
use crate::util::persistence::SessionPersistence;

const EVENT_CAPACITY: usize = 32;

// =============================================================================
// SESSION
// =============================================================================

/// The current (token, user) pair.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<User>,
}

impl Session {
    /// Both a non-empty token and a non-empty user are present.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty()) && self.user.as_ref().is_some_and(|u| !u.is_empty())
    }

    fn is_empty(&self) -> bool {
        self.token.is_none() && self.user.is_none()
    }
}

/// Change notification published after each primitive mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    TokenChanged,
    UserChanged,
    Cleared,
}

// =============================================================================
// STORE
// =============================================================================

struct Inner {
    session: Session,
    generation: u64,
}

/// Owner of the session and orchestrator of the calls that change it.
pub struct SessionStore {
    inner: Mutex<Inner>,
    persistence: Arc<dyn SessionPersistence>,
    api: Arc<dyn AuthApi>,
    navigator: Arc<dyn Navigator>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    /// Build the store, restoring whatever session `persistence` holds.
    #[must_use]
    pub fn new(
        persistence: Arc<dyn SessionPersistence>,
        api: Arc<dyn AuthApi>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let session = Session { token: persistence.read_token(), user: persistence.read_user() };
        tracing::debug!(logged_in = session.is_logged_in(), "session restored");
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { inner: Mutex::new(Inner { session, generation: 0 }), persistence, api, navigator, events }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Receive a [`SessionEvent`] for every mutation from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    // -------------------------------------------------------------------------
    // reads
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.lock().session.clone()
    }

    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.lock().session.token.clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.lock().session.user.clone()
    }

    /// Recomputed from the live fields on every call.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.lock().session.is_logged_in()
    }

    fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Advance the generation if it is still `issued`; `false` means a newer change won.
    fn try_advance(&self, issued: u64) -> bool {
        let mut inner = self.lock();
        if inner.generation != issued {
            return false;
        }
        inner.generation += 1;
        true
    }

    // -------------------------------------------------------------------------
    // primitive mutators
    // -------------------------------------------------------------------------

    pub fn set_token(&self, token: Option<String>) {
        {
            let mut inner = self.lock();
            self.persistence.write_token(token.as_deref());
            inner.session.token = token;
        }
        self.publish(SessionEvent::TokenChanged);
    }

    pub fn set_user(&self, user: Option<User>) {
        {
            let mut inner = self.lock();
            self.persistence.write_user(user.as_ref());
            inner.session.user = user;
        }
        self.publish(SessionEvent::UserChanged);
    }

    /// Drop the session and erase it from storage. Safe to call when already empty.
    pub fn clear_auth(&self) {
        let was_present = {
            let mut inner = self.lock();
            inner.generation += 1;
            let was_present = !inner.session.is_empty();
            inner.session = Session::default();
            self.persistence.clear_all();
            was_present
        };
        if was_present {
            self.publish(SessionEvent::Cleared);
        }
    }

    // -------------------------------------------------------------------------
    // compound operations
    // -------------------------------------------------------------------------

    /// Commit a login/registration response: token first, then the role-stripped user.
    pub fn apply_auth_payload(&self, payload: &AuthPayload) {
        self.lock().generation += 1;
        self.write_payload(payload);
    }

    fn write_payload(&self, payload: &AuthPayload) {
        let user = payload.user.as_ref().map(RawUser::strip_roles);
        self.set_token(payload.token.clone());
        self.set_user(user);
    }

    /// `POST auth/login` and commit the result.
    ///
    /// # Errors
    ///
    /// Returns the endpoint's error unchanged, or [`AuthError::Superseded`]
    /// if the session changed while the request was in flight. The session
    /// is untouched in both cases.
    pub async fn login<P>(&self, credentials: &P) -> Result<Session, AuthError>
    where
        P: Serialize + Sync + ?Sized,
    {
        self.authenticate(LOGIN_ENDPOINT, credentials).await
    }

    /// `POST auth/signup` and commit the result.
    ///
    /// # Errors
    ///
    /// Same contract as [`SessionStore::login`].
    pub async fn register<P>(&self, details: &P) -> Result<Session, AuthError>
    where
        P: Serialize + Sync + ?Sized,
    {
        self.authenticate(SIGNUP_ENDPOINT, details).await
    }

    async fn authenticate<P>(&self, endpoint: &'static str, payload: &P) -> Result<Session, AuthError>
    where
        P: Serialize + Sync + ?Sized,
    {
        let body = serde_json::to_value(payload).map_err(|e| AuthError::Malformed(format!("request encode: {e}")))?;
        let issued = self.generation();

        let response = match self.api.post_data(endpoint, &body).await.and_then(AuthPayload::from_response) {
            Ok(response) => response,
            Err(e) => {
                tracing::info!(endpoint, error = %e, "auth request failed; session unchanged");
                return Err(e);
            }
        };

        if !self.try_advance(issued) {
            tracing::warn!(endpoint, "session changed during auth request; discarding response");
            return Err(AuthError::Superseded);
        }
        self.write_payload(&response);

        tracing::info!(endpoint, "session established");
        Ok(self.snapshot())
    }

    /// `GET auth/profile`, strip roles, and store the result as the current user.
    ///
    /// # Errors
    ///
    /// Returns the endpoint's error unchanged, or [`AuthError::Superseded`]
    /// if the session changed while the request was in flight.
    pub async fn refresh_profile(&self) -> Result<User, AuthError> {
        let issued = self.generation();

        let raw = match self.api.get_data(PROFILE_ENDPOINT).await.and_then(raw_user_from_response) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::info!(endpoint = PROFILE_ENDPOINT, error = %e, "profile refresh failed");
                return Err(e);
            }
        };
        let user = raw.strip_roles();

        if !self.try_advance(issued) {
            tracing::warn!(endpoint = PROFILE_ENDPOINT, "session changed during profile refresh; discarding response");
            return Err(AuthError::Superseded);
        }
        self.set_user(Some(user.clone()));

        tracing::info!(endpoint = PROFILE_ENDPOINT, "profile refreshed");
        Ok(user)
    }

    /// Local-only logout: clear the session and route to `/login`.
    pub fn logout(&self) {
        self.clear_auth();
        tracing::info!("logged out");
        self.navigator.navigate_to(LOGIN_PATH);
    }
}
