//! Client-side authentication session management.
//!
//! SYSTEM CONTEXT
//! ==============
//! The host application builds one [`SessionStore`] at its root and hands an
//! `Arc` of it to every form, route guard, and display component that needs
//! the current user. Storage, HTTP, and navigation are injected through the
//! [`SessionPersistence`], [`AuthApi`], and [`Navigator`] traits.

pub mod config;
pub mod net;
pub mod state;
pub mod util;

pub use config::AuthConfig;
pub use net::api::{AuthApi, HttpAuthApi};
pub use net::types::{AuthError, AuthPayload, LoginCredentials, RawUser, RegistrationDetails, User};
pub use state::session::{Session, SessionEvent, SessionStore};
pub use util::auth::{redirect_if_unauthenticated, should_redirect_unauth};
pub use util::navigator::Navigator;
pub use util::persistence::{FilePersistence, MemoryPersistence, SessionPersistence};
