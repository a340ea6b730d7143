//! Helpers that isolate storage and navigation concerns from session logic.
//!
//! SYSTEM CONTEXT
//! ==============
//! Hosts plug their own storage and router in through the traits defined
//! here; the session store depends on nothing else.

pub mod auth;
pub mod navigator;
pub mod persistence;
