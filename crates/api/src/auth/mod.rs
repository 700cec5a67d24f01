//! Authentication primitives.
//!
//! - [`password`]: Argon2id hashing plus the password policy.
//! - [`jwt`]: access tokens and opaque refresh tokens.

pub mod jwt;
pub mod password;
