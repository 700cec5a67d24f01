//! Refresh-token session store backing `/auth/refresh` and logout.

use oa_core::types::DbId;
use sqlx::PgPool;

use crate::models::session::{NewSession, RefreshOutcome};

pub struct SessionRepo;

impl SessionRepo {
    /// Record a newly issued refresh token.
    pub async fn open(pool: &PgPool, session: &NewSession) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO user_sessions (user_id, refresh_token_hash, expires_at, rotated_from)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(session.user_id)
        .bind(&session.refresh_token_hash)
        .bind(session.expires_at)
        .bind(session.rotated_from)
        .fetch_one(pool)
        .await
    }

    /// Spend a refresh token.
    ///
    /// The revoking `UPDATE` is the only check, so two concurrent refreshes
    /// with the same token cannot both succeed: the loser sees the row as
    /// already revoked and gets [`RefreshOutcome::Replayed`].
    pub async fn consume(pool: &PgPool, token_hash: &str) -> Result<RefreshOutcome, sqlx::Error> {
        let spent: Option<(DbId, DbId)> = sqlx::query_as(
            "UPDATE user_sessions SET revoked_at = NOW()
             WHERE refresh_token_hash = $1
               AND revoked_at IS NULL
               AND expires_at > NOW()
             RETURNING id, user_id",
        )
        .bind(token_hash)
        .fetch_optional(pool)
        .await?;
        if let Some((session_id, user_id)) = spent {
            return Ok(RefreshOutcome::Rotated { session_id, user_id });
        }

        let revoked: Option<(DbId,)> = sqlx::query_as(
            "SELECT user_id FROM user_sessions
             WHERE refresh_token_hash = $1 AND revoked_at IS NOT NULL",
        )
        .bind(token_hash)
        .fetch_optional(pool)
        .await?;
        Ok(match revoked {
            Some((user_id,)) => RefreshOutcome::Replayed { user_id },
            None => RefreshOutcome::Rejected,
        })
    }

    /// Revoke every live session of a user. Used by logout, password change,
    /// deactivation and replay detection.
    pub async fn revoke_all_for_user(pool: &PgPool, user_id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_sessions SET revoked_at = NOW()
             WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
