//! Route changes requested by the session layer.

/// Path the session layer routes to when the user must sign in.
pub const LOGIN_PATH: &str = "/login";

/// Fire-and-forget route change.
pub trait Navigator: Send + Sync {
    fn navigate_to(&self, path: &str);
}
