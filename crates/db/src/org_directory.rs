//! Postgres-backed [`OrgDirectory`] used by assignment-rule resolution.
//!
//! Borrows the caller's connection so lookups run inside the same
//! transaction that creates the tasks.

use async_trait::async_trait;
use oa_core::error::CoreError;
use oa_core::types::DbId;
use oa_core::workflow::assignment::OrgDirectory;
use sqlx::PgConnection;

pub struct PgOrgDirectory<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> PgOrgDirectory<'c> {
    pub fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }
}

fn internal(err: sqlx::Error) -> CoreError {
    tracing::error!(error = %err, "Org directory lookup failed");
    CoreError::Internal(format!("Org directory lookup failed: {err}"))
}

#[async_trait]
impl OrgDirectory for PgOrgDirectory<'_> {
    async fn active_users(&mut self, user_ids: &[DbId]) -> Result<Vec<DbId>, CoreError> {
        // Preserve the caller's ordering.
        sqlx::query_scalar(
            "SELECT u.id FROM UNNEST($1::BIGINT[]) WITH ORDINALITY AS ids(id, ord)
             JOIN users u ON u.id = ids.id
             WHERE u.is_active
             ORDER BY ids.ord",
        )
        .bind(user_ids)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(internal)
    }

    async fn users_with_role(&mut self, role_id: DbId) -> Result<Vec<DbId>, CoreError> {
        sqlx::query_scalar(
            "SELECT u.id FROM users u
             JOIN user_roles ur ON ur.user_id = u.id
             WHERE ur.role_id = $1 AND u.is_active
             ORDER BY u.id",
        )
        .bind(role_id)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(internal)
    }

    async fn department_head(&mut self, department_id: DbId) -> Result<Option<DbId>, CoreError> {
        let head: Option<Option<DbId>> = sqlx::query_scalar(
            "SELECT head_user_id FROM departments WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(department_id)
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(internal)?;
        Ok(head.flatten())
    }

    async fn manager_of(&mut self, user_id: DbId) -> Result<Option<DbId>, CoreError> {
        let manager: Option<Option<DbId>> =
            sqlx::query_scalar("SELECT manager_id FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&mut *self.conn)
                .await
                .map_err(internal)?;
        Ok(manager.flatten())
    }
}
