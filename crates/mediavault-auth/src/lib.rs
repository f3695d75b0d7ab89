//! Session and credential plumbing for MediaVault
//!
//! Signed JWT session claims (carrying the caller's resolved group
//! memberships and login kind), Argon2id password hashing, and generation of
//! the opaque token values used by access tokens.

pub mod jwt;
pub mod password;
pub mod token;

pub use jwt::{JwtError, JwtValidator, SessionClaims, TOKEN_TYPE_API, TOKEN_TYPE_SESSION};
pub use password::{hash_password, verify_password, PasswordError};
pub use token::TokenGenerator;
