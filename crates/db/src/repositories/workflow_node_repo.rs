//! Repository for the `workflow_nodes` table.

use oa_core::status::ApprovalPolicy;
use oa_core::types::DbId;
use oa_core::workflow::node::FlowNode;
use sqlx::types::Json;
use sqlx::PgExecutor;

use crate::models::workflow::{CreateWorkflowNode, UpdateWorkflowNode, WorkflowNode};

const COLUMNS: &str = "id, definition_id, code, name, kind, sort_order, next_refs, assignment, \
                        policy, timeout_hours, version, created_at, updated_at";

pub struct WorkflowNodeRepo;

impl WorkflowNodeRepo {
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &CreateWorkflowNode,
    ) -> Result<WorkflowNode, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_nodes
                (definition_id, code, name, kind, sort_order, next_refs, assignment, policy, timeout_hours)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowNode>(&query)
            .bind(input.definition_id)
            .bind(&input.code)
            .bind(&input.name)
            .bind(input.kind)
            .bind(input.sort_order)
            .bind(Json(&input.next_refs))
            .bind(input.assignment.as_ref().map(Json))
            .bind(input.policy.unwrap_or(ApprovalPolicy::AllOf.id()))
            .bind(input.timeout_hours)
            .fetch_one(executor)
            .await
    }

    /// Insert an engine node into `definition_id`; used when compiling and cloning.
    pub async fn insert_flow_node<'e, E: PgExecutor<'e>>(
        executor: E,
        definition_id: DbId,
        node: &FlowNode,
    ) -> Result<WorkflowNode, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_nodes
                (definition_id, code, name, kind, sort_order, next_refs, assignment, policy, timeout_hours)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowNode>(&query)
            .bind(definition_id)
            .bind(&node.code)
            .bind(&node.name)
            .bind(node.kind.id())
            .bind(node.sort_order)
            .bind(Json(&node.next_refs))
            .bind(node.assignment.as_ref().map(Json))
            .bind(node.policy.id())
            .bind(node.timeout_hours)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<WorkflowNode>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflow_nodes WHERE id = $1");
        sqlx::query_as::<_, WorkflowNode>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// All nodes of a definition in `(sort_order, id)` order.
    pub async fn list_for_definition<'e, E: PgExecutor<'e>>(
        executor: E,
        definition_id: DbId,
    ) -> Result<Vec<WorkflowNode>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_nodes
             WHERE definition_id = $1
             ORDER BY sort_order, id"
        );
        sqlx::query_as::<_, WorkflowNode>(&query)
            .bind(definition_id)
            .fetch_all(executor)
            .await
    }

    /// Partial update guarded by `input.version`; `kind` arrives pre-validated.
    pub async fn update<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        input: &UpdateWorkflowNode,
    ) -> Result<Option<WorkflowNode>, sqlx::Error> {
        let query = format!(
            "UPDATE workflow_nodes SET
                name = COALESCE($3, name),
                kind = COALESCE($4, kind),
                sort_order = COALESCE($5, sort_order),
                next_refs = COALESCE($6, next_refs),
                assignment = COALESCE($7, assignment),
                policy = COALESCE($8, policy),
                timeout_hours = COALESCE($9, timeout_hours),
                version = version + 1
             WHERE id = $1 AND version = $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowNode>(&query)
            .bind(id)
            .bind(input.version)
            .bind(&input.name)
            .bind(input.kind)
            .bind(input.sort_order)
            .bind(input.next_refs.as_ref().map(Json))
            .bind(input.assignment.as_ref().map(Json))
            .bind(input.policy)
            .bind(input.timeout_hours)
            .fetch_optional(executor)
            .await
    }

    pub async fn delete<'e, E: PgExecutor<'e>>(executor: E, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM workflow_nodes WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_for_definition<'e, E: PgExecutor<'e>>(
        executor: E,
        definition_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM workflow_nodes WHERE definition_id = $1")
            .bind(definition_id)
            .fetch_one(executor)
            .await
    }

    /// Copy every node of `from_definition` into `to_definition`.
    pub async fn clone_into<'e, E: PgExecutor<'e>>(
        executor: E,
        from_definition: DbId,
        to_definition: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO workflow_nodes
                (definition_id, code, name, kind, sort_order, next_refs, assignment, policy, timeout_hours)
             SELECT $2, code, name, kind, sort_order, next_refs, assignment, policy, timeout_hours
             FROM workflow_nodes WHERE definition_id = $1
             ORDER BY sort_order, id",
        )
        .bind(from_definition)
        .bind(to_definition)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }
}
