//! Repositories for the approval facade tables.
//!
//! Flow status reuses [`DefinitionStatus`] (draft/published/disabled) and
//! record status mirrors [`InstanceStatus`].

use oa_core::status::{DefinitionStatus, InstanceStatus, StatusId, WorkflowTaskStatus};
use oa_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgExecutor;

use crate::models::approval::{
    ApprovalFlow, ApprovalNode, ApprovalRecord, ApprovalType, CreateApprovalFlow,
    CreateApprovalNode, CreateApprovalRecord, CreateApprovalType, RecordFilter,
};

const TYPE_COLUMNS: &str = "id, code, name, description, status, created_at, updated_at";

const FLOW_COLUMNS: &str = "id, type_id, name, description, status, workflow_definition_id, \
                             created_by, created_at, updated_at";

const NODE_COLUMNS: &str = "id, flow_id, name, sort_order, assignment, policy, timeout_hours, \
                             workflow_node_code, created_at, updated_at";

const RECORD_COLUMNS: &str = "id, flow_id, title, applicant_id, form_data, workflow_instance_id, \
                               status, version, completed_at, created_at, updated_at";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

pub struct ApprovalTypeRepo;

impl ApprovalTypeRepo {
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &CreateApprovalType,
    ) -> Result<ApprovalType, sqlx::Error> {
        let query = format!(
            "INSERT INTO approval_types (code, name, description)
             VALUES ($1, $2, $3)
             RETURNING {TYPE_COLUMNS}"
        );
        sqlx::query_as::<_, ApprovalType>(&query)
            .bind(&input.code)
            .bind(&input.name)
            .bind(&input.description)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<ApprovalType>, sqlx::Error> {
        let query = format!("SELECT {TYPE_COLUMNS} FROM approval_types WHERE id = $1");
        sqlx::query_as::<_, ApprovalType>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn list<'e, E: PgExecutor<'e>>(
        executor: E,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ApprovalType>, sqlx::Error> {
        let query = format!(
            "SELECT {TYPE_COLUMNS} FROM approval_types ORDER BY id LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, ApprovalType>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await
    }

    pub async fn count<'e, E: PgExecutor<'e>>(executor: E) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM approval_types")
            .fetch_one(executor)
            .await
    }
}

// ---------------------------------------------------------------------------
// Flows
// ---------------------------------------------------------------------------

pub struct ApprovalFlowRepo;

impl ApprovalFlowRepo {
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &CreateApprovalFlow,
        created_by: DbId,
    ) -> Result<ApprovalFlow, sqlx::Error> {
        let query = format!(
            "INSERT INTO approval_flows (type_id, name, description, status, created_by)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {FLOW_COLUMNS}"
        );
        sqlx::query_as::<_, ApprovalFlow>(&query)
            .bind(input.type_id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(DefinitionStatus::Draft.id())
            .bind(created_by)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<ApprovalFlow>, sqlx::Error> {
        let query = format!("SELECT {FLOW_COLUMNS} FROM approval_flows WHERE id = $1");
        sqlx::query_as::<_, ApprovalFlow>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Lock the flow row so concurrent publishes serialize.
    pub async fn find_for_update<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<ApprovalFlow>, sqlx::Error> {
        let query = format!("SELECT {FLOW_COLUMNS} FROM approval_flows WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, ApprovalFlow>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn list<'e, E: PgExecutor<'e>>(
        executor: E,
        type_id: Option<DbId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ApprovalFlow>, sqlx::Error> {
        let query = format!(
            "SELECT {FLOW_COLUMNS} FROM approval_flows
             WHERE ($1::BIGINT IS NULL OR type_id = $1)
             ORDER BY id
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, ApprovalFlow>(&query)
            .bind(type_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await
    }

    pub async fn count<'e, E: PgExecutor<'e>>(
        executor: E,
        type_id: Option<DbId>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM approval_flows WHERE ($1::BIGINT IS NULL OR type_id = $1)",
        )
        .bind(type_id)
        .fetch_one(executor)
        .await
    }

    /// Point the flow at its newly published workflow definition.
    pub async fn mark_published<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        definition_id: DbId,
    ) -> Result<ApprovalFlow, sqlx::Error> {
        let query = format!(
            "UPDATE approval_flows SET status = $2, workflow_definition_id = $3
             WHERE id = $1
             RETURNING {FLOW_COLUMNS}"
        );
        sqlx::query_as::<_, ApprovalFlow>(&query)
            .bind(id)
            .bind(DefinitionStatus::Published.id())
            .bind(definition_id)
            .fetch_one(executor)
            .await
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

pub struct ApprovalNodeRepo;

impl ApprovalNodeRepo {
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &CreateApprovalNode,
        policy: StatusId,
    ) -> Result<ApprovalNode, sqlx::Error> {
        let query = format!(
            "INSERT INTO approval_nodes (flow_id, name, sort_order, assignment, policy, timeout_hours)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {NODE_COLUMNS}"
        );
        sqlx::query_as::<_, ApprovalNode>(&query)
            .bind(input.flow_id)
            .bind(&input.name)
            .bind(input.sort_order)
            .bind(Json(&input.assignment))
            .bind(policy)
            .bind(input.timeout_hours)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<ApprovalNode>, sqlx::Error> {
        let query = format!("SELECT {NODE_COLUMNS} FROM approval_nodes WHERE id = $1");
        sqlx::query_as::<_, ApprovalNode>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Nodes of a flow in step order.
    pub async fn list_for_flow<'e, E: PgExecutor<'e>>(
        executor: E,
        flow_id: DbId,
    ) -> Result<Vec<ApprovalNode>, sqlx::Error> {
        let query = format!(
            "SELECT {NODE_COLUMNS} FROM approval_nodes
             WHERE flow_id = $1
             ORDER BY sort_order, id"
        );
        sqlx::query_as::<_, ApprovalNode>(&query)
            .bind(flow_id)
            .fetch_all(executor)
            .await
    }

    pub async fn set_workflow_node_code<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        code: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE approval_nodes SET workflow_node_code = $2 WHERE id = $1")
            .bind(id)
            .bind(code)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

pub struct ApprovalRecordRepo;

impl ApprovalRecordRepo {
    pub async fn insert<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &CreateApprovalRecord,
        applicant_id: DbId,
    ) -> Result<ApprovalRecord, sqlx::Error> {
        let query = format!(
            "INSERT INTO approval_records (flow_id, title, applicant_id, form_data, status)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {RECORD_COLUMNS}"
        );
        sqlx::query_as::<_, ApprovalRecord>(&query)
            .bind(input.flow_id)
            .bind(&input.title)
            .bind(applicant_id)
            .bind(Json(&input.form_data))
            .bind(InstanceStatus::Running.id())
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<ApprovalRecord>, sqlx::Error> {
        let query = format!("SELECT {RECORD_COLUMNS} FROM approval_records WHERE id = $1");
        sqlx::query_as::<_, ApprovalRecord>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Link a record to the instance started for it.
    pub async fn attach_instance<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        instance_id: DbId,
    ) -> Result<ApprovalRecord, sqlx::Error> {
        let query = format!(
            "UPDATE approval_records SET workflow_instance_id = $2, version = version + 1
             WHERE id = $1
             RETURNING {RECORD_COLUMNS}"
        );
        sqlx::query_as::<_, ApprovalRecord>(&query)
            .bind(id)
            .bind(instance_id)
            .fetch_one(executor)
            .await
    }

    /// Copy an instance status onto the record backed by it. Records not
    /// created through the facade are unaffected.
    pub async fn mirror_instance_status<'e, E: PgExecutor<'e>>(
        executor: E,
        instance_id: DbId,
        status: InstanceStatus,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE approval_records SET
                status = $2,
                completed_at = CASE WHEN $3 THEN NOW() ELSE NULL END,
                version = version + 1
             WHERE workflow_instance_id = $1 AND status <> $2",
        )
        .bind(instance_id)
        .bind(status.id())
        .bind(status.is_terminal())
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn list<'e, E: PgExecutor<'e>>(
        executor: E,
        filter: &RecordFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ApprovalRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM approval_records
             WHERE ($1::BIGINT IS NULL OR flow_id = $1)
               AND ($2::BIGINT IS NULL OR applicant_id = $2)
               AND ($3::SMALLINT IS NULL OR status = $3)
             ORDER BY id DESC
             LIMIT $4 OFFSET $5"
        );
        sqlx::query_as::<_, ApprovalRecord>(&query)
            .bind(filter.flow_id)
            .bind(filter.applicant_id)
            .bind(filter.status)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await
    }

    pub async fn count<'e, E: PgExecutor<'e>>(
        executor: E,
        filter: &RecordFilter,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM approval_records
             WHERE ($1::BIGINT IS NULL OR flow_id = $1)
               AND ($2::BIGINT IS NULL OR applicant_id = $2)
               AND ($3::SMALLINT IS NULL OR status = $3)",
        )
        .bind(filter.flow_id)
        .bind(filter.applicant_id)
        .bind(filter.status)
        .fetch_one(executor)
        .await
    }

    /// Records on which `user_id` holds a pending task, newest first.
    pub async fn list_pending_for_user<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ApprovalRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM approval_records r
             WHERE EXISTS(
                SELECT 1 FROM workflow_tasks t
                WHERE t.instance_id = r.workflow_instance_id
                  AND t.assignee_id = $1 AND t.status = $2)
             ORDER BY r.id DESC
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, ApprovalRecord>(&query)
            .bind(user_id)
            .bind(WorkflowTaskStatus::Pending.id())
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await
    }

    pub async fn count_pending_for_user<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM approval_records r
             WHERE EXISTS(
                SELECT 1 FROM workflow_tasks t
                WHERE t.instance_id = r.workflow_instance_id
                  AND t.assignee_id = $1 AND t.status = $2)",
        )
        .bind(user_id)
        .bind(WorkflowTaskStatus::Pending.id())
        .fetch_one(executor)
        .await
    }
}
