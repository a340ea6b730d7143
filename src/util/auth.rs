//! Shared auth route-guard helpers.
//!
//! SYSTEM CONTEXT
//! ==============
//! Protected pages should apply identical unauthenticated redirect behavior.

#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;

use crate::state::session::{Session, SessionStore};
use crate::util::navigator::{LOGIN_PATH, Navigator};

/// Whether a page guarded by auth should send the user to `/login`.
#[must_use]
pub fn should_redirect_unauth(session: &Session) -> bool {
    !session.is_logged_in()
}

/// Redirect to `/login` if the store holds no complete session.
///
/// Returns `true` when a redirect was issued.
pub fn redirect_if_unauthenticated(store: &SessionStore, navigator: &dyn Navigator) -> bool {
    if !should_redirect_unauth(&store.snapshot()) {
        return false;
    }
    tracing::debug!(path = LOGIN_PATH, "unauthenticated; redirecting");
    navigator.navigate_to(LOGIN_PATH);
    true
}
