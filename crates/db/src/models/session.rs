//! Refresh-token sessions.
//!
//! Only the SHA-256 of a refresh token is stored. Each refresh revokes the
//! presented session and opens a successor linked through `rotated_from`.

use oa_core::types::{DbId, Timestamp};

/// Values for a newly issued refresh token.
#[derive(Debug)]
pub struct NewSession {
    pub user_id: DbId,
    pub refresh_token_hash: String,
    pub expires_at: Timestamp,
    /// The session this one replaces, when issued by a refresh.
    pub rotated_from: Option<DbId>,
}

/// What presenting a refresh token amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The token was live and is now spent.
    Rotated { session_id: DbId, user_id: DbId },
    /// The token had already been spent or revoked. Someone is replaying it.
    Replayed { user_id: DbId },
    /// Unknown or expired token.
    Rejected,
}
