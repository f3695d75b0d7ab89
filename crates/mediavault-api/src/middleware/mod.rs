//! HTTP middleware

pub mod auth;

pub use auth::{optional_session, require_session, AuthUser, JwtState};
