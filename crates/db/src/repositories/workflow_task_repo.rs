//! Repository for the `workflow_tasks` table.

use oa_core::status::{TaskAction, WorkflowTaskStatus};
use oa_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::workflow::{NewTask, NodeTaskCounts, TaskFilter, WorkflowTask};

const COLUMNS: &str = "id, instance_id, node_code, node_name, assignee_id, status, action, \
                        comment, transferred_from, completed_at, created_at, updated_at";

pub struct WorkflowTaskRepo;

impl WorkflowTaskRepo {
    /// Insert a pending task.
    ///
    /// A second pending task for the same `(instance, node, assignee)` is
    /// rejected by `uq_workflow_tasks_pending`.
    pub async fn insert<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &NewTask,
    ) -> Result<WorkflowTask, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_tasks
                (instance_id, node_code, node_name, assignee_id, status, action, transferred_from)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowTask>(&query)
            .bind(input.instance_id)
            .bind(&input.node_code)
            .bind(&input.node_name)
            .bind(input.assignee_id)
            .bind(WorkflowTaskStatus::Pending.id())
            .bind(TaskAction::None.id())
            .bind(input.transferred_from)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<WorkflowTask>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM workflow_tasks WHERE id = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, WorkflowTask>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_for_update<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<WorkflowTask>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_tasks WHERE id = $1 AND deleted_at IS NULL FOR UPDATE"
        );
        sqlx::query_as::<_, WorkflowTask>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// The pending task of `assignee` at `node_code`, if any.
    pub async fn find_pending<'e, E: PgExecutor<'e>>(
        executor: E,
        instance_id: DbId,
        node_code: &str,
        assignee_id: DbId,
    ) -> Result<Option<WorkflowTask>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_tasks
             WHERE instance_id = $1 AND node_code = $2 AND assignee_id = $3 AND status = $4"
        );
        sqlx::query_as::<_, WorkflowTask>(&query)
            .bind(instance_id)
            .bind(node_code)
            .bind(assignee_id)
            .bind(WorkflowTaskStatus::Pending.id())
            .fetch_optional(executor)
            .await
    }

    pub async fn list<'e, E: PgExecutor<'e>>(
        executor: E,
        filter: &TaskFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WorkflowTask>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_tasks
             WHERE deleted_at IS NULL
               AND ($1::BIGINT IS NULL OR assignee_id = $1)
               AND ($2::BIGINT IS NULL OR instance_id = $2)
               AND ($3::SMALLINT IS NULL OR status = $3)
             ORDER BY id DESC
             LIMIT $4 OFFSET $5"
        );
        sqlx::query_as::<_, WorkflowTask>(&query)
            .bind(filter.assignee_id)
            .bind(filter.instance_id)
            .bind(filter.status)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await
    }

    pub async fn count<'e, E: PgExecutor<'e>>(
        executor: E,
        filter: &TaskFilter,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM workflow_tasks
             WHERE deleted_at IS NULL
               AND ($1::BIGINT IS NULL OR assignee_id = $1)
               AND ($2::BIGINT IS NULL OR instance_id = $2)
               AND ($3::SMALLINT IS NULL OR status = $3)",
        )
        .bind(filter.assignee_id)
        .bind(filter.instance_id)
        .bind(filter.status)
        .fetch_one(executor)
        .await
    }

    /// Task history of one instance in creation order.
    pub async fn list_for_instance<'e, E: PgExecutor<'e>>(
        executor: E,
        instance_id: DbId,
    ) -> Result<Vec<WorkflowTask>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_tasks
             WHERE instance_id = $1 AND deleted_at IS NULL
             ORDER BY created_at, id"
        );
        sqlx::query_as::<_, WorkflowTask>(&query)
            .bind(instance_id)
            .fetch_all(executor)
            .await
    }

    /// Record a decision on a pending task. Returns `None` if it is no longer pending.
    pub async fn complete<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        status: WorkflowTaskStatus,
        action: TaskAction,
        comment: Option<&str>,
    ) -> Result<Option<WorkflowTask>, sqlx::Error> {
        let query = format!(
            "UPDATE workflow_tasks SET
                status = $2,
                action = $3,
                comment = COALESCE($4, comment),
                completed_at = NOW()
             WHERE id = $1 AND status = $5
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowTask>(&query)
            .bind(id)
            .bind(status.id())
            .bind(action.id())
            .bind(comment)
            .bind(WorkflowTaskStatus::Pending.id())
            .fetch_optional(executor)
            .await
    }

    /// Cancel every pending task of an instance, returning how many changed.
    pub async fn cancel_pending_for_instance<'e, E: PgExecutor<'e>>(
        executor: E,
        instance_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE workflow_tasks SET status = $2, completed_at = NOW()
             WHERE instance_id = $1 AND status = $3",
        )
        .bind(instance_id)
        .bind(WorkflowTaskStatus::Cancelled.id())
        .bind(WorkflowTaskStatus::Pending.id())
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Cancel the pending tasks still open on one node.
    pub async fn cancel_pending_for_node<'e, E: PgExecutor<'e>>(
        executor: E,
        instance_id: DbId,
        node_code: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE workflow_tasks SET status = $3, completed_at = NOW()
             WHERE instance_id = $1 AND node_code = $2 AND status = $4",
        )
        .bind(instance_id)
        .bind(node_code)
        .bind(WorkflowTaskStatus::Cancelled.id())
        .bind(WorkflowTaskStatus::Pending.id())
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Approved and pending tallies for a node. Published graphs are
    /// acyclic, so a node is visited at most once per instance.
    pub async fn node_counts<'e, E: PgExecutor<'e>>(
        executor: E,
        instance_id: DbId,
        node_code: &str,
    ) -> Result<NodeTaskCounts, sqlx::Error> {
        sqlx::query_as::<_, NodeTaskCounts>(
            "SELECT
                COUNT(*) FILTER (WHERE status = $3 AND action = $4) AS approved,
                COUNT(*) FILTER (WHERE status = $5) AS pending
             FROM workflow_tasks
             WHERE instance_id = $1 AND node_code = $2",
        )
        .bind(instance_id)
        .bind(node_code)
        .bind(WorkflowTaskStatus::Completed.id())
        .bind(TaskAction::Approve.id())
        .bind(WorkflowTaskStatus::Pending.id())
        .fetch_one(executor)
        .await
    }

    /// Edit the comment on a pending task held by `assignee_id`.
    pub async fn update_comment<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        assignee_id: DbId,
        comment: &str,
    ) -> Result<Option<WorkflowTask>, sqlx::Error> {
        let query = format!(
            "UPDATE workflow_tasks SET comment = $3
             WHERE id = $1 AND assignee_id = $2 AND status = $4 AND deleted_at IS NULL
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowTask>(&query)
            .bind(id)
            .bind(assignee_id)
            .bind(comment)
            .bind(WorkflowTaskStatus::Pending.id())
            .fetch_optional(executor)
            .await
    }

    /// Soft-delete a task that is no longer pending.
    pub async fn soft_delete_terminal<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE workflow_tasks SET deleted_at = NOW()
             WHERE id = $1 AND status <> $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(WorkflowTaskStatus::Pending.id())
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
