//! Repository for the `workflow_definitions` table.

use oa_core::status::{DefinitionStatus, InstanceStatus};
use oa_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::workflow::{DefinitionFilter, UpdateWorkflowDefinition, WorkflowDefinition};

const COLUMNS: &str = "id, type_id, name, description, version, status, lock_version, \
                        created_by, published_at, created_at, updated_at";

pub struct WorkflowDefinitionRepo;

impl WorkflowDefinitionRepo {
    /// Insert a draft, allocating the next version for `(type_id, name)`.
    pub async fn create_draft<'e, E: PgExecutor<'e>>(
        executor: E,
        type_id: DbId,
        name: &str,
        description: Option<&str>,
        created_by: Option<DbId>,
    ) -> Result<WorkflowDefinition, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_definitions (type_id, name, description, version, status, created_by)
             VALUES (
                $1, $2, $3,
                (SELECT COALESCE(MAX(version), 0) + 1 FROM workflow_definitions
                  WHERE type_id = $1 AND name = $2),
                $4, $5
             )
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowDefinition>(&query)
            .bind(type_id)
            .bind(name)
            .bind(description)
            .bind(DefinitionStatus::Draft.id())
            .bind(created_by)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<WorkflowDefinition>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflow_definitions WHERE id = $1");
        sqlx::query_as::<_, WorkflowDefinition>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Lock a definition row for the rest of the transaction.
    pub async fn find_for_update<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<WorkflowDefinition>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflow_definitions WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, WorkflowDefinition>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Share-lock a definition: blocks publish/disable while held, but not
    /// other readers.
    pub async fn find_for_share<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<WorkflowDefinition>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflow_definitions WHERE id = $1 FOR SHARE");
        sqlx::query_as::<_, WorkflowDefinition>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// The currently published version for `(type_id, name)`, if any.
    pub async fn find_published<'e, E: PgExecutor<'e>>(
        executor: E,
        type_id: DbId,
        name: &str,
    ) -> Result<Option<WorkflowDefinition>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_definitions
             WHERE type_id = $1 AND name = $2 AND status = $3"
        );
        sqlx::query_as::<_, WorkflowDefinition>(&query)
            .bind(type_id)
            .bind(name)
            .bind(DefinitionStatus::Published.id())
            .fetch_optional(executor)
            .await
    }

    pub async fn list<'e, E: PgExecutor<'e>>(
        executor: E,
        filter: &DefinitionFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WorkflowDefinition>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_definitions
             WHERE ($1::BIGINT IS NULL OR type_id = $1)
               AND ($2::SMALLINT IS NULL OR status = $2)
               AND ($3::TEXT IS NULL OR name = $3)
             ORDER BY type_id, name, version DESC
             LIMIT $4 OFFSET $5"
        );
        sqlx::query_as::<_, WorkflowDefinition>(&query)
            .bind(filter.type_id)
            .bind(filter.status)
            .bind(&filter.name)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await
    }

    pub async fn count<'e, E: PgExecutor<'e>>(
        executor: E,
        filter: &DefinitionFilter,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM workflow_definitions
             WHERE ($1::BIGINT IS NULL OR type_id = $1)
               AND ($2::SMALLINT IS NULL OR status = $2)
               AND ($3::TEXT IS NULL OR name = $3)",
        )
        .bind(filter.type_id)
        .bind(filter.status)
        .bind(&filter.name)
        .fetch_one(executor)
        .await
    }

    /// Update a draft's descriptive fields, guarded by `lock_version`.
    ///
    /// Returns `None` when the row is missing, stale, or no longer a draft.
    pub async fn update_draft<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        input: &UpdateWorkflowDefinition,
    ) -> Result<Option<WorkflowDefinition>, sqlx::Error> {
        let query = format!(
            "UPDATE workflow_definitions SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                lock_version = lock_version + 1
             WHERE id = $1 AND lock_version = $2 AND status = $5
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowDefinition>(&query)
            .bind(id)
            .bind(input.lock_version)
            .bind(&input.name)
            .bind(&input.description)
            .bind(DefinitionStatus::Draft.id())
            .fetch_optional(executor)
            .await
    }

    /// Move a definition between statuses, asserting the expected current one.
    pub async fn set_status<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        from: DefinitionStatus,
        to: DefinitionStatus,
    ) -> Result<Option<WorkflowDefinition>, sqlx::Error> {
        let query = format!(
            "UPDATE workflow_definitions SET
                status = $3,
                published_at = CASE WHEN $3 = {published} THEN NOW() ELSE published_at END,
                lock_version = lock_version + 1
             WHERE id = $1 AND status = $2
             RETURNING {COLUMNS}",
            published = DefinitionStatus::Published.id()
        );
        sqlx::query_as::<_, WorkflowDefinition>(&query)
            .bind(id)
            .bind(from.id())
            .bind(to.id())
            .fetch_optional(executor)
            .await
    }

    /// Hard-delete a draft; its nodes go with it via `ON DELETE CASCADE`.
    pub async fn delete_draft<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM workflow_definitions WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(DefinitionStatus::Draft.id())
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn has_running_instances<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM workflow_instances
                WHERE definition_id = $1 AND status = $2 AND deleted_at IS NULL
             )",
        )
        .bind(id)
        .bind(InstanceStatus::Running.id())
        .fetch_one(executor)
        .await
    }

    pub async fn has_instances<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM workflow_instances WHERE definition_id = $1)")
            .bind(id)
            .fetch_one(executor)
            .await
    }
}
