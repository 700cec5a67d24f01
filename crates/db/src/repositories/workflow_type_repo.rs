//! Repository for the `workflow_types` table.

use oa_core::status::StatusId;
use oa_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::workflow::{CreateWorkflowType, UpdateWorkflowType, WorkflowType};

const COLUMNS: &str =
    "id, name, code, description, status, version, created_by, created_at, updated_at";

pub struct WorkflowTypeRepo;

impl WorkflowTypeRepo {
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &CreateWorkflowType,
        status: StatusId,
        created_by: Option<DbId>,
    ) -> Result<WorkflowType, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_types (name, code, description, status, created_by)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowType>(&query)
            .bind(&input.name)
            .bind(&input.code)
            .bind(&input.description)
            .bind(status)
            .bind(created_by)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<WorkflowType>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM workflow_types WHERE id = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, WorkflowType>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_code<'e, E: PgExecutor<'e>>(
        executor: E,
        code: &str,
    ) -> Result<Option<WorkflowType>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM workflow_types WHERE code = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, WorkflowType>(&query)
            .bind(code)
            .fetch_optional(executor)
            .await
    }

    pub async fn list<'e, E: PgExecutor<'e>>(
        executor: E,
        status: Option<StatusId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WorkflowType>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_types
             WHERE deleted_at IS NULL AND ($1::SMALLINT IS NULL OR status = $1)
             ORDER BY id
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, WorkflowType>(&query)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await
    }

    pub async fn count<'e, E: PgExecutor<'e>>(
        executor: E,
        status: Option<StatusId>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM workflow_types
             WHERE deleted_at IS NULL AND ($1::SMALLINT IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(executor)
        .await
    }

    /// Apply a partial update guarded by `input.version`.
    ///
    /// Returns `None` when the row is missing or the version is stale.
    pub async fn update<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        input: &UpdateWorkflowType,
    ) -> Result<Option<WorkflowType>, sqlx::Error> {
        let query = format!(
            "UPDATE workflow_types SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                status = COALESCE($5, status),
                version = version + 1
             WHERE id = $1 AND version = $2 AND deleted_at IS NULL
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowType>(&query)
            .bind(id)
            .bind(input.version)
            .bind(&input.name)
            .bind(&input.description)
            .bind(input.status)
            .fetch_optional(executor)
            .await
    }

    pub async fn soft_delete<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE workflow_types SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether any definition still references the type.
    pub async fn has_definitions<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM workflow_definitions WHERE type_id = $1)")
            .bind(id)
            .fetch_one(executor)
            .await
    }
}
