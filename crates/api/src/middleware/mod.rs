//! Identity and authorization extractors.
//!
//! - [`auth::AuthUser`]: caller identity and permission set from a Bearer token.
//! - [`rbac::Require`]: rejects callers missing a given permission tag.

pub mod auth;
pub mod rbac;
