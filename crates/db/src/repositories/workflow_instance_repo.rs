//! Repository for the `workflow_instances` table.

use oa_core::status::InstanceStatus;
use oa_core::types::DbId;
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::PgExecutor;

use crate::models::workflow::{InstanceFilter, NewInstance, WorkflowInstance};

const COLUMNS: &str = "id, definition_id, definition_version, definition_snapshot, business_key, \
                        initiator_id, current_node_code, status, variables, version, started_at, \
                        completed_at, created_at, updated_at";

/// Visibility predicate: `$5` is either NULL (see everything) or a user id
/// that must be the initiator or hold a task on the instance.
const VISIBLE_TO: &str = "($5::BIGINT IS NULL OR initiator_id = $5 OR EXISTS(
        SELECT 1 FROM workflow_tasks t WHERE t.instance_id = workflow_instances.id AND t.assignee_id = $5))";

pub struct WorkflowInstanceRepo;

impl WorkflowInstanceRepo {
    pub async fn insert<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &NewInstance,
    ) -> Result<WorkflowInstance, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_instances
                (definition_id, definition_version, definition_snapshot, business_key,
                 initiator_id, current_node_code, status, variables)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowInstance>(&query)
            .bind(input.definition_id)
            .bind(input.definition_version)
            .bind(Json(&input.snapshot))
            .bind(&input.business_key)
            .bind(input.initiator_id)
            .bind(&input.current_node_code)
            .bind(InstanceStatus::Running.id())
            .bind(Json(&input.variables))
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<WorkflowInstance>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_instances WHERE id = $1 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, WorkflowInstance>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Lock the instance row; every state change on an instance goes through this.
    pub async fn find_for_update<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<WorkflowInstance>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_instances
             WHERE id = $1 AND deleted_at IS NULL
             FOR UPDATE"
        );
        sqlx::query_as::<_, WorkflowInstance>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// List instances matching `filter`; `visible_to` restricts to instances
    /// the user started or holds a task on.
    pub async fn list<'e, E: PgExecutor<'e>>(
        executor: E,
        filter: &InstanceFilter,
        visible_to: Option<DbId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WorkflowInstance>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_instances
             WHERE deleted_at IS NULL
               AND ($1::BIGINT IS NULL OR definition_id = $1)
               AND ($2::BIGINT IS NULL OR initiator_id = $2)
               AND ($3::SMALLINT IS NULL OR status = $3)
               AND ($4::TEXT IS NULL OR business_key = $4)
               AND {VISIBLE_TO}
             ORDER BY id DESC
             LIMIT $6 OFFSET $7"
        );
        sqlx::query_as::<_, WorkflowInstance>(&query)
            .bind(filter.definition_id)
            .bind(filter.initiator_id)
            .bind(filter.status)
            .bind(&filter.business_key)
            .bind(visible_to)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await
    }

    pub async fn count<'e, E: PgExecutor<'e>>(
        executor: E,
        filter: &InstanceFilter,
        visible_to: Option<DbId>,
    ) -> Result<i64, sqlx::Error> {
        let query = format!(
            "SELECT COUNT(*) FROM workflow_instances
             WHERE deleted_at IS NULL
               AND ($1::BIGINT IS NULL OR definition_id = $1)
               AND ($2::BIGINT IS NULL OR initiator_id = $2)
               AND ($3::SMALLINT IS NULL OR status = $3)
               AND ($4::TEXT IS NULL OR business_key = $4)
               AND {VISIBLE_TO}"
        );
        sqlx::query_scalar(&query)
            .bind(filter.definition_id)
            .bind(filter.initiator_id)
            .bind(filter.status)
            .bind(&filter.business_key)
            .bind(visible_to)
            .fetch_one(executor)
            .await
    }

    /// Move the instance to `node_code` with `status`; terminal statuses
    /// stamp `completed_at`.
    pub async fn move_to<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        node_code: &str,
        status: InstanceStatus,
    ) -> Result<WorkflowInstance, sqlx::Error> {
        let query = format!(
            "UPDATE workflow_instances SET
                current_node_code = $2,
                status = $3,
                completed_at = CASE WHEN $4 THEN NOW() ELSE completed_at END,
                version = version + 1
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowInstance>(&query)
            .bind(id)
            .bind(node_code)
            .bind(status.id())
            .bind(status.is_terminal())
            .fetch_one(executor)
            .await
    }

    /// Replace `business_key`/`variables` of a running instance, guarded by `version`.
    pub async fn update_data<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        version: i32,
        business_key: Option<&str>,
        variables: Option<&Map<String, Value>>,
    ) -> Result<Option<WorkflowInstance>, sqlx::Error> {
        let query = format!(
            "UPDATE workflow_instances SET
                business_key = COALESCE($3, business_key),
                variables = COALESCE($4, variables),
                version = version + 1
             WHERE id = $1 AND version = $2 AND status = $5 AND deleted_at IS NULL
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowInstance>(&query)
            .bind(id)
            .bind(version)
            .bind(business_key)
            .bind(variables.map(Json))
            .bind(InstanceStatus::Running.id())
            .fetch_optional(executor)
            .await
    }

    /// Soft-delete a terminal instance. Running instances are left untouched.
    pub async fn soft_delete_terminal<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE workflow_instances SET deleted_at = NOW()
             WHERE id = $1 AND status <> $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(InstanceStatus::Running.id())
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
