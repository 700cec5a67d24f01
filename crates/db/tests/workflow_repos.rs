//! Integration tests for the workflow repositories.
//!
//! Covers definition versioning, the one-published-per-(type, name) index,
//! pending-task uniqueness, node tallies and draft cascade deletes.

use oa_core::status::{
    ApprovalPolicy, DefinitionStatus, InstanceStatus, NodeKind, TaskAction, WorkflowTaskStatus,
};
use oa_core::workflow::assignment::AssignmentRule;
use oa_core::workflow::node::{DefinitionSnapshot, FlowNode, NextRef};
use oa_db::models::user::CreateUser;
use oa_db::models::workflow::{CreateWorkflowType, InstanceFilter, NewInstance, NewTask};
use oa_db::repositories::{
    UserRepo, WorkflowDefinitionRepo, WorkflowInstanceRepo, WorkflowNodeRepo, WorkflowTaskRepo,
    WorkflowTypeRepo,
};
use serde_json::Map;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn new_user(pool: &PgPool, username: &str) -> i64 {
    UserRepo::create(
        pool,
        &CreateUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            display_name: None,
            password_hash: "not-a-real-hash".to_string(),
            department_id: None,
            manager_id: None,
        },
    )
    .await
    .unwrap()
    .id
}

async fn new_type(pool: &PgPool, code: &str) -> i64 {
    WorkflowTypeRepo::create(
        pool,
        &CreateWorkflowType {
            name: format!("Type {code}"),
            code: code.to_string(),
            description: None,
            status: None,
        },
        1,
        None,
    )
    .await
    .unwrap()
    .id
}

fn simple_nodes(assignee: i64) -> Vec<FlowNode> {
    vec![
        FlowNode::new("start", "Start", NodeKind::Start).with_next(NextRef::to("review")),
        FlowNode::new("review", "Review", NodeKind::Approval)
            .with_next(NextRef::to("end"))
            .with_assignment(AssignmentRule::FixedUsers { user_ids: vec![assignee] })
            .with_policy(ApprovalPolicy::AllOf),
        FlowNode::new("end", "End", NodeKind::End),
    ]
}

async fn running_instance(pool: &PgPool, definition_id: i64, initiator: i64) -> i64 {
    WorkflowInstanceRepo::insert(
        pool,
        &NewInstance {
            definition_id,
            definition_version: 1,
            snapshot: DefinitionSnapshot {
                definition_id,
                version: 1,
                nodes: simple_nodes(initiator),
            },
            business_key: Some("BK-1".to_string()),
            initiator_id: initiator,
            current_node_code: "review".to_string(),
            variables: Map::new(),
        },
    )
    .await
    .unwrap()
    .id
}

fn task(instance_id: i64, assignee_id: i64) -> NewTask {
    NewTask {
        instance_id,
        node_code: "review".to_string(),
        node_name: "Review".to_string(),
        assignee_id,
        transferred_from: None,
    }
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_create_draft_allocates_next_version(pool: PgPool) {
    let type_id = new_type(&pool, "leave").await;
    let v1 = WorkflowDefinitionRepo::create_draft(&pool, type_id, "Leave", None, None)
        .await
        .unwrap();
    let v2 = WorkflowDefinitionRepo::create_draft(&pool, type_id, "Leave", None, None)
        .await
        .unwrap();
    let other = WorkflowDefinitionRepo::create_draft(&pool, type_id, "Expense", None, None)
        .await
        .unwrap();

    assert_eq!(v1.version, 1);
    assert_eq!(v2.version, 2);
    assert_eq!(other.version, 1);
    assert_eq!(v1.status, DefinitionStatus::Draft.id());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_second_published_version_is_rejected_by_index(pool: PgPool) {
    let type_id = new_type(&pool, "leave").await;
    let v1 = WorkflowDefinitionRepo::create_draft(&pool, type_id, "Leave", None, None)
        .await
        .unwrap();
    let v2 = WorkflowDefinitionRepo::create_draft(&pool, type_id, "Leave", None, None)
        .await
        .unwrap();

    WorkflowDefinitionRepo::set_status(&pool, v1.id, DefinitionStatus::Draft, DefinitionStatus::Published)
        .await
        .unwrap()
        .expect("v1 should publish");

    let err = WorkflowDefinitionRepo::set_status(
        &pool,
        v2.id,
        DefinitionStatus::Draft,
        DefinitionStatus::Published,
    )
    .await
    .unwrap_err();
    let constraint = err
        .as_database_error()
        .and_then(|e| e.constraint())
        .map(str::to_string);
    assert_eq!(constraint.as_deref(), Some("uq_workflow_definitions_published"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_set_status_asserts_current_status(pool: PgPool) {
    let type_id = new_type(&pool, "leave").await;
    let def = WorkflowDefinitionRepo::create_draft(&pool, type_id, "Leave", None, None)
        .await
        .unwrap();

    let moved = WorkflowDefinitionRepo::set_status(
        &pool,
        def.id,
        DefinitionStatus::Published,
        DefinitionStatus::Disabled,
    )
    .await
    .unwrap();
    assert!(moved.is_none(), "a draft must not move from published");

    let published = WorkflowDefinitionRepo::set_status(
        &pool,
        def.id,
        DefinitionStatus::Draft,
        DefinitionStatus::Published,
    )
    .await
    .unwrap()
    .unwrap();
    assert!(published.published_at.is_some());
    assert_eq!(published.lock_version, def.lock_version + 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_deleting_draft_cascades_to_nodes(pool: PgPool) {
    let type_id = new_type(&pool, "leave").await;
    let def = WorkflowDefinitionRepo::create_draft(&pool, type_id, "Leave", None, None)
        .await
        .unwrap();
    for node in simple_nodes(1) {
        WorkflowNodeRepo::insert_flow_node(&pool, def.id, &node).await.unwrap();
    }
    assert_eq!(WorkflowNodeRepo::count_for_definition(&pool, def.id).await.unwrap(), 3);

    assert!(WorkflowDefinitionRepo::delete_draft(&pool, def.id).await.unwrap());
    assert_eq!(WorkflowNodeRepo::count_for_definition(&pool, def.id).await.unwrap(), 0);
    assert!(WorkflowDefinitionRepo::find_by_id(&pool, def.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_nodes_round_trip_through_flow_node(pool: PgPool) {
    let type_id = new_type(&pool, "leave").await;
    let def = WorkflowDefinitionRepo::create_draft(&pool, type_id, "Leave", None, None)
        .await
        .unwrap();
    let nodes = simple_nodes(7);
    for (i, node) in nodes.iter().enumerate() {
        let node = node.clone().with_order(i as i32);
        WorkflowNodeRepo::insert_flow_node(&pool, def.id, &node).await.unwrap();
    }

    let rows = WorkflowNodeRepo::list_for_definition(&pool, def.id).await.unwrap();
    let loaded: Vec<FlowNode> = rows.iter().map(|r| r.to_flow_node().unwrap()).collect();
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded[1].code, "review");
    assert_eq!(
        loaded[1].assignment,
        Some(AssignmentRule::FixedUsers { user_ids: vec![7] })
    );
    assert_eq!(loaded[0].next_refs, vec![NextRef::to("review")]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_clone_into_copies_every_node(pool: PgPool) {
    let type_id = new_type(&pool, "leave").await;
    let v1 = WorkflowDefinitionRepo::create_draft(&pool, type_id, "Leave", None, None)
        .await
        .unwrap();
    for node in simple_nodes(1) {
        WorkflowNodeRepo::insert_flow_node(&pool, v1.id, &node).await.unwrap();
    }
    let v2 = WorkflowDefinitionRepo::create_draft(&pool, type_id, "Leave", None, None)
        .await
        .unwrap();

    let copied = WorkflowNodeRepo::clone_into(&pool, v1.id, v2.id).await.unwrap();
    assert_eq!(copied, 3);
    assert_eq!(WorkflowNodeRepo::count_for_definition(&pool, v1.id).await.unwrap(), 3);
}

// ---------------------------------------------------------------------------
// Instances and tasks
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_duplicate_pending_task_is_rejected(pool: PgPool) {
    let alice = new_user(&pool, "alice").await;
    let type_id = new_type(&pool, "leave").await;
    let def = WorkflowDefinitionRepo::create_draft(&pool, type_id, "Leave", None, None)
        .await
        .unwrap();
    let instance_id = running_instance(&pool, def.id, alice).await;

    WorkflowTaskRepo::insert(&pool, &task(instance_id, alice)).await.unwrap();
    let err = WorkflowTaskRepo::insert(&pool, &task(instance_id, alice))
        .await
        .unwrap_err();
    let constraint = err
        .as_database_error()
        .and_then(|e| e.constraint())
        .map(str::to_string);
    assert_eq!(constraint.as_deref(), Some("uq_workflow_tasks_pending"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_completed_task_frees_the_pending_slot(pool: PgPool) {
    let alice = new_user(&pool, "alice").await;
    let type_id = new_type(&pool, "leave").await;
    let def = WorkflowDefinitionRepo::create_draft(&pool, type_id, "Leave", None, None)
        .await
        .unwrap();
    let instance_id = running_instance(&pool, def.id, alice).await;

    let first = WorkflowTaskRepo::insert(&pool, &task(instance_id, alice)).await.unwrap();
    WorkflowTaskRepo::complete(
        &pool,
        first.id,
        WorkflowTaskStatus::Transferred,
        TaskAction::Transfer,
        None,
    )
    .await
    .unwrap()
    .unwrap();

    assert!(WorkflowTaskRepo::insert(&pool, &task(instance_id, alice)).await.is_ok());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_complete_only_touches_pending_tasks(pool: PgPool) {
    let alice = new_user(&pool, "alice").await;
    let type_id = new_type(&pool, "leave").await;
    let def = WorkflowDefinitionRepo::create_draft(&pool, type_id, "Leave", None, None)
        .await
        .unwrap();
    let instance_id = running_instance(&pool, def.id, alice).await;
    let t = WorkflowTaskRepo::insert(&pool, &task(instance_id, alice)).await.unwrap();

    let done = WorkflowTaskRepo::complete(
        &pool,
        t.id,
        WorkflowTaskStatus::Completed,
        TaskAction::Approve,
        Some("ok"),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(done.action, TaskAction::Approve.id());
    assert_eq!(done.comment.as_deref(), Some("ok"));
    assert!(done.completed_at.is_some());

    let again = WorkflowTaskRepo::complete(
        &pool,
        t.id,
        WorkflowTaskStatus::Rejected,
        TaskAction::Reject,
        None,
    )
    .await
    .unwrap();
    assert!(again.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_node_counts_and_cancellation(pool: PgPool) {
    let alice = new_user(&pool, "alice").await;
    let bob = new_user(&pool, "bob").await;
    let carol = new_user(&pool, "carol").await;
    let type_id = new_type(&pool, "leave").await;
    let def = WorkflowDefinitionRepo::create_draft(&pool, type_id, "Leave", None, None)
        .await
        .unwrap();
    let instance_id = running_instance(&pool, def.id, alice).await;

    let a = WorkflowTaskRepo::insert(&pool, &task(instance_id, alice)).await.unwrap();
    WorkflowTaskRepo::insert(&pool, &task(instance_id, bob)).await.unwrap();
    WorkflowTaskRepo::insert(&pool, &task(instance_id, carol)).await.unwrap();
    WorkflowTaskRepo::complete(&pool, a.id, WorkflowTaskStatus::Completed, TaskAction::Approve, None)
        .await
        .unwrap();

    let counts = WorkflowTaskRepo::node_counts(&pool, instance_id, "review").await.unwrap();
    assert_eq!((counts.approved, counts.pending), (1, 2));

    let cancelled = WorkflowTaskRepo::cancel_pending_for_node(&pool, instance_id, "review")
        .await
        .unwrap();
    assert_eq!(cancelled, 2);
    let counts = WorkflowTaskRepo::node_counts(&pool, instance_id, "review").await.unwrap();
    assert_eq!((counts.approved, counts.pending), (1, 0));

    let history = WorkflowTaskRepo::list_for_instance(&pool, instance_id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].assignee_id, alice);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_move_to_terminal_stamps_completion(pool: PgPool) {
    let alice = new_user(&pool, "alice").await;
    let type_id = new_type(&pool, "leave").await;
    let def = WorkflowDefinitionRepo::create_draft(&pool, type_id, "Leave", None, None)
        .await
        .unwrap();
    let instance_id = running_instance(&pool, def.id, alice).await;

    let moved = WorkflowInstanceRepo::move_to(&pool, instance_id, "end", InstanceStatus::Completed)
        .await
        .unwrap();
    assert_eq!(moved.status, InstanceStatus::Completed.id());
    assert_eq!(moved.current_node_code, "end");
    assert!(moved.completed_at.is_some());
    assert_eq!(moved.version, 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_running_instance_cannot_be_soft_deleted(pool: PgPool) {
    let alice = new_user(&pool, "alice").await;
    let type_id = new_type(&pool, "leave").await;
    let def = WorkflowDefinitionRepo::create_draft(&pool, type_id, "Leave", None, None)
        .await
        .unwrap();
    let instance_id = running_instance(&pool, def.id, alice).await;

    assert!(!WorkflowInstanceRepo::soft_delete_terminal(&pool, instance_id).await.unwrap());

    WorkflowInstanceRepo::move_to(&pool, instance_id, "review", InstanceStatus::Cancelled)
        .await
        .unwrap();
    assert!(WorkflowInstanceRepo::soft_delete_terminal(&pool, instance_id).await.unwrap());
    assert!(WorkflowInstanceRepo::find_by_id(&pool, instance_id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_update_data_is_version_guarded(pool: PgPool) {
    let alice = new_user(&pool, "alice").await;
    let type_id = new_type(&pool, "leave").await;
    let def = WorkflowDefinitionRepo::create_draft(&pool, type_id, "Leave", None, None)
        .await
        .unwrap();
    let instance_id = running_instance(&pool, def.id, alice).await;

    let updated = WorkflowInstanceRepo::update_data(&pool, instance_id, 1, Some("BK-2"), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.business_key.as_deref(), Some("BK-2"));

    let stale = WorkflowInstanceRepo::update_data(&pool, instance_id, 1, Some("BK-3"), None)
        .await
        .unwrap();
    assert!(stale.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_instance_visibility_filter(pool: PgPool) {
    let alice = new_user(&pool, "alice").await;
    let bob = new_user(&pool, "bob").await;
    let carol = new_user(&pool, "carol").await;
    let type_id = new_type(&pool, "leave").await;
    let def = WorkflowDefinitionRepo::create_draft(&pool, type_id, "Leave", None, None)
        .await
        .unwrap();
    let instance_id = running_instance(&pool, def.id, alice).await;
    WorkflowTaskRepo::insert(&pool, &task(instance_id, bob)).await.unwrap();

    let filter = InstanceFilter::default();
    for (user, expected) in [(alice, 1), (bob, 1), (carol, 0)] {
        let count = WorkflowInstanceRepo::count(&pool, &filter, Some(user)).await.unwrap();
        assert_eq!(count, expected, "user {user}");
    }
    assert_eq!(WorkflowInstanceRepo::count(&pool, &filter, None).await.unwrap(), 1);
}
