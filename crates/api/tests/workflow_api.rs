//! End-to-end tests for the workflow engine over HTTP: definition
//! lifecycle, instance routing and task decisions.

mod common;

use axum::http::StatusCode;
use common::{
    add_node, admin, create_definition, create_workflow_type, delete, employee, expect_json, get,
    instance_tasks, post, publish_single_step, put, start_instance, task_of,
};
use serde_json::{json, Value};
use sqlx::PgPool;

const PENDING: i64 = 1;
const COMPLETED: i64 = 2;
const TRANSFERRED: i64 = 4;
const CANCELLED: i64 = 5;

const ALL_OF: i16 = 1;
const ANY_OF: i16 = 2;

async fn handle(app: &axum::Router, token: &str, task_id: &Value, action: i16) -> axum::response::Response {
    put(
        app,
        &format!("/api/workflows/tasks/{task_id}/handle"),
        token,
        json!({ "action": action, "comment": "looks fine" }),
    )
    .await
}

// ---------------------------------------------------------------------------
// Approval policies
// ---------------------------------------------------------------------------

/// All-of waits for every assignee before the instance moves on.
#[sqlx::test(migrations = "../../db/migrations")]
async fn all_of_completes_after_every_approval(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let (_, alice) = employee(&pool, "alice").await;
    let (bob_id, bob) = employee(&pool, "bob").await;
    let (carol_id, carol) = employee(&pool, "carol").await;
    let app = common::build_test_app(pool);

    let def_id = publish_single_step(&app, &admin_token, &[bob_id, carol_id], ALL_OF).await;
    let instance = start_instance(&app, &alice, def_id, json!({ "days": 3 })).await;
    assert_eq!(instance["status"], 1);
    assert_eq!(instance["current_node_code"], "review");
    let instance_id = instance["id"].as_i64().unwrap();

    let tasks = instance_tasks(&app, &admin_token, instance_id).await;
    assert_eq!(tasks.len(), 2);
    let bob_task = task_of(&tasks, bob_id, PENDING).unwrap();
    let carol_task = task_of(&tasks, carol_id, PENDING).unwrap();

    let outcome = expect_json(handle(&app, &bob, &bob_task["id"], 1).await, StatusCode::OK).await;
    assert_eq!(outcome["task"]["status"], COMPLETED);
    assert_eq!(outcome["task"]["action"], 1);
    assert_eq!(outcome["instance"]["status"], 1, "still waiting for carol");

    let outcome = expect_json(handle(&app, &carol, &carol_task["id"], 1).await, StatusCode::OK).await;
    assert_eq!(outcome["instance"]["status"], 2);
    assert_eq!(outcome["instance"]["current_node_code"], "end");
    assert!(outcome["instance"]["completed_at"].is_string());
}

/// One rejection ends the instance and cancels the sibling tasks.
#[sqlx::test(migrations = "../../db/migrations")]
async fn reject_cancels_siblings(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let (_, alice) = employee(&pool, "alice").await;
    let (bob_id, bob) = employee(&pool, "bob").await;
    let (carol_id, carol) = employee(&pool, "carol").await;
    let app = common::build_test_app(pool);

    let def_id = publish_single_step(&app, &admin_token, &[bob_id, carol_id], ALL_OF).await;
    let instance = start_instance(&app, &alice, def_id, json!({})).await;
    let instance_id = instance["id"].as_i64().unwrap();
    let tasks = instance_tasks(&app, &admin_token, instance_id).await;
    let bob_task = task_of(&tasks, bob_id, PENDING).unwrap();
    let carol_task = task_of(&tasks, carol_id, PENDING).unwrap();

    let outcome = expect_json(handle(&app, &bob, &bob_task["id"], 2).await, StatusCode::OK).await;
    assert_eq!(outcome["task"]["action"], 2);
    assert_eq!(outcome["instance"]["status"], 4);

    let tasks = instance_tasks(&app, &admin_token, instance_id).await;
    assert!(task_of(&tasks, carol_id, CANCELLED).is_some());

    // Carol's task is no longer actionable.
    let json = expect_json(handle(&app, &carol, &carol_task["id"], 1).await, StatusCode::CONFLICT).await;
    assert_eq!(json["code"], "INVALID_STATE");
}

/// Any-of advances on the first approval and cancels the rest.
#[sqlx::test(migrations = "../../db/migrations")]
async fn any_of_completes_on_first_approval(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let (_, alice) = employee(&pool, "alice").await;
    let (bob_id, bob) = employee(&pool, "bob").await;
    let (carol_id, _) = employee(&pool, "carol").await;
    let app = common::build_test_app(pool);

    let def_id = publish_single_step(&app, &admin_token, &[bob_id, carol_id], ANY_OF).await;
    let instance = start_instance(&app, &alice, def_id, json!({})).await;
    let instance_id = instance["id"].as_i64().unwrap();
    let tasks = instance_tasks(&app, &admin_token, instance_id).await;
    let bob_task = task_of(&tasks, bob_id, PENDING).unwrap();

    let outcome = expect_json(handle(&app, &bob, &bob_task["id"], 1).await, StatusCode::OK).await;
    assert_eq!(outcome["instance"]["status"], 2);

    let tasks = instance_tasks(&app, &admin_token, instance_id).await;
    assert!(task_of(&tasks, carol_id, CANCELLED).is_some());
    assert!(task_of(&tasks, carol_id, PENDING).is_none());
}

// ---------------------------------------------------------------------------
// Transfer and add-sign
// ---------------------------------------------------------------------------

/// After a transfer the original assignee can no longer decide.
#[sqlx::test(migrations = "../../db/migrations")]
async fn transfer_moves_the_vote(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let (_, alice) = employee(&pool, "alice").await;
    let (bob_id, bob) = employee(&pool, "bob").await;
    let (dave_id, dave) = employee(&pool, "dave").await;
    let app = common::build_test_app(pool);

    let def_id = publish_single_step(&app, &admin_token, &[bob_id], ALL_OF).await;
    let instance = start_instance(&app, &alice, def_id, json!({})).await;
    let instance_id = instance["id"].as_i64().unwrap();
    let tasks = instance_tasks(&app, &admin_token, instance_id).await;
    let bob_task = task_of(&tasks, bob_id, PENDING).unwrap();

    let new_task = expect_json(
        put(
            &app,
            &format!("/api/workflows/tasks/{}/transfer", bob_task["id"]),
            &bob,
            json!({ "assignee_id": dave_id }),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(new_task["assignee_id"], dave_id);
    assert_eq!(new_task["transferred_from"], bob_task["id"]);

    let tasks = instance_tasks(&app, &admin_token, instance_id).await;
    assert!(task_of(&tasks, bob_id, TRANSFERRED).is_some());

    let response = handle(&app, &bob, &bob_task["id"], 1).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let outcome = expect_json(handle(&app, &dave, &new_task["id"], 1).await, StatusCode::OK).await;
    assert_eq!(outcome["instance"]["status"], 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn non_assignee_cannot_transfer_without_permission(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let (_, alice) = employee(&pool, "alice").await;
    let (bob_id, _) = employee(&pool, "bob").await;
    let (dave_id, dave) = employee(&pool, "dave").await;
    let app = common::build_test_app(pool);

    let def_id = publish_single_step(&app, &admin_token, &[bob_id], ALL_OF).await;
    let instance = start_instance(&app, &alice, def_id, json!({})).await;
    let tasks = instance_tasks(&app, &admin_token, instance["id"].as_i64().unwrap()).await;
    let bob_task = task_of(&tasks, bob_id, PENDING).unwrap();

    let response = put(
        &app,
        &format!("/api/workflows/tasks/{}/transfer", bob_task["id"]),
        &dave,
        json!({ "assignee_id": dave_id }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

/// An added assignee joins an all-of node and must approve too.
#[sqlx::test(migrations = "../../db/migrations")]
async fn added_assignee_blocks_all_of_until_approved(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let (_, alice) = employee(&pool, "alice").await;
    let (bob_id, bob) = employee(&pool, "bob").await;
    let (carol_id, carol) = employee(&pool, "carol").await;
    let app = common::build_test_app(pool);

    let def_id = publish_single_step(&app, &admin_token, &[bob_id], ALL_OF).await;
    let instance = start_instance(&app, &alice, def_id, json!({})).await;
    let instance_id = instance["id"].as_i64().unwrap();

    let added = expect_json(
        post(
            &app,
            "/api/workflows/tasks",
            &admin_token,
            json!({ "instance_id": instance_id, "assignee_id": carol_id }),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    assert_eq!(added["node_code"], "review");

    // Bob already has a pending task on this node.
    let json = expect_json(
        post(
            &app,
            "/api/workflows/tasks",
            &admin_token,
            json!({ "instance_id": instance_id, "assignee_id": bob_id }),
        )
        .await,
        StatusCode::CONFLICT,
    )
    .await;
    assert_eq!(json["code"], "CONFLICT");

    let tasks = instance_tasks(&app, &admin_token, instance_id).await;
    let bob_task = task_of(&tasks, bob_id, PENDING).unwrap();
    let outcome = expect_json(handle(&app, &bob, &bob_task["id"], 1).await, StatusCode::OK).await;
    assert_eq!(outcome["instance"]["status"], 1);

    let outcome = expect_json(handle(&app, &carol, &added["id"], 1).await, StatusCode::OK).await;
    assert_eq!(outcome["instance"]["status"], 2);
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// A condition node picks the branch from the instance variables.
#[sqlx::test(migrations = "../../db/migrations")]
async fn condition_routes_by_variables(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let (_, alice) = employee(&pool, "alice").await;
    let (finance_id, _) = employee(&pool, "finn").await;
    let (manager_id, _) = employee(&pool, "mona").await;
    let app = common::build_test_app(pool);

    let type_id = create_workflow_type(&app, &admin_token, "expense").await;
    let def_id = create_definition(&app, &admin_token, type_id, "Expense claim").await;
    for node in [
        json!({ "definition_id": def_id, "code": "start", "name": "Start", "kind": 1,
                "next_refs": [{ "next": "route" }] }),
        json!({ "definition_id": def_id, "code": "route", "name": "By amount", "kind": 3,
                "sort_order": 1,
                "next_refs": [
                    { "condition": "amount > 1000", "next": "finance" },
                    { "condition": "default", "next": "manager" }
                ] }),
        json!({ "definition_id": def_id, "code": "finance", "name": "Finance", "kind": 2,
                "sort_order": 2, "next_refs": [{ "next": "end" }],
                "assignment": { "kind": "fixed_users", "user_ids": [finance_id] } }),
        json!({ "definition_id": def_id, "code": "manager", "name": "Manager", "kind": 2,
                "sort_order": 3, "next_refs": [{ "next": "end" }],
                "assignment": { "kind": "fixed_users", "user_ids": [manager_id] } }),
        json!({ "definition_id": def_id, "code": "end", "name": "End", "kind": 6, "sort_order": 4 }),
    ] {
        add_node(&app, &admin_token, node).await;
    }
    expect_json(
        put(&app, &format!("/api/workflows/definitions/{def_id}/publish"), &admin_token, json!({})).await,
        StatusCode::OK,
    )
    .await;

    let big = start_instance(&app, &alice, def_id, json!({ "amount": 5000 })).await;
    assert_eq!(big["current_node_code"], "finance");
    let small = start_instance(&app, &alice, def_id, json!({ "amount": 20 })).await;
    assert_eq!(small["current_node_code"], "manager");

    let tasks = instance_tasks(&app, &admin_token, big["id"].as_i64().unwrap()).await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["assignee_id"], finance_id);
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn publish_rejects_an_invalid_graph(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let app = common::build_test_app(pool);

    let type_id = create_workflow_type(&app, &admin_token, "broken").await;
    let def_id = create_definition(&app, &admin_token, type_id, "No end").await;
    add_node(
        &app,
        &admin_token,
        json!({ "definition_id": def_id, "code": "start", "name": "Start", "kind": 1,
                "next_refs": [{ "next": "ghost" }] }),
    )
    .await;

    let json = expect_json(
        put(&app, &format!("/api/workflows/definitions/{def_id}/publish"), &admin_token, json!({})).await,
        StatusCode::CONFLICT,
    )
    .await;
    assert_eq!(json["code"], "BAD_DEFINITION");

    // Still a draft.
    let def = expect_json(
        get(&app, &format!("/api/workflows/definitions/{def_id}"), &admin_token).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(def["status"], 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn parallel_nodes_are_not_implemented(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let app = common::build_test_app(pool);

    let type_id = create_workflow_type(&app, &admin_token, "fanout").await;
    let def_id = create_definition(&app, &admin_token, type_id, "Fan out").await;
    for node in [
        json!({ "definition_id": def_id, "code": "start", "name": "Start", "kind": 1,
                "next_refs": [{ "next": "fork" }] }),
        json!({ "definition_id": def_id, "code": "fork", "name": "Fork", "kind": 4,
                "sort_order": 1, "next_refs": [{ "next": "end" }] }),
        json!({ "definition_id": def_id, "code": "end", "name": "End", "kind": 6, "sort_order": 2 }),
    ] {
        add_node(&app, &admin_token, node).await;
    }

    let json = expect_json(
        put(&app, &format!("/api/workflows/definitions/{def_id}/publish"), &admin_token, json!({})).await,
        StatusCode::NOT_IMPLEMENTED,
    )
    .await;
    assert_eq!(json["code"], "UNSUPPORTED");
}

/// Publishing a new version retires the old one; running instances keep
/// their snapshot.
#[sqlx::test(migrations = "../../db/migrations")]
async fn new_version_supersedes_the_published_one(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let (_, alice) = employee(&pool, "alice").await;
    let (bob_id, bob) = employee(&pool, "bob").await;
    let app = common::build_test_app(pool);

    let v1 = publish_single_step(&app, &admin_token, &[bob_id], ALL_OF).await;
    let running = start_instance(&app, &alice, v1, json!({})).await;

    let draft = expect_json(
        post(&app, &format!("/api/workflows/definitions/{v1}/versions"), &admin_token, json!({})).await,
        StatusCode::CREATED,
    )
    .await;
    assert_eq!(draft["version"], 2);
    assert_eq!(draft["status"], 1);
    let v2 = draft["id"].as_i64().unwrap();

    let nodes = expect_json(
        get(&app, &format!("/api/workflows/definitions/{v2}/nodes"), &admin_token).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(nodes["data"].as_array().unwrap().len(), 3);

    expect_json(
        put(&app, &format!("/api/workflows/definitions/{v2}/publish"), &admin_token, json!({})).await,
        StatusCode::OK,
    )
    .await;
    let old = expect_json(
        get(&app, &format!("/api/workflows/definitions/{v1}"), &admin_token).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(old["status"], 3);

    // Starting the retired version is refused.
    let response = post(&app, "/api/workflows/instances", &alice, json!({ "definition_id": v1 })).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // The instance started on v1 still finishes on its snapshot.
    let tasks = instance_tasks(&app, &admin_token, running["id"].as_i64().unwrap()).await;
    let task = task_of(&tasks, bob_id, PENDING).unwrap();
    let outcome = expect_json(handle(&app, &bob, &task["id"], 1).await, StatusCode::OK).await;
    assert_eq!(outcome["instance"]["status"], 2);
    assert_eq!(outcome["instance"]["definition_version"], 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn oversized_or_deeply_nested_conditions_are_refused(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let app = common::build_test_app(pool);

    let type_id = create_workflow_type(&app, &admin_token, "expense").await;
    let def_id = create_definition(&app, &admin_token, type_id, "Expense").await;

    let huge = format!("{}x{}", "(".repeat(5_000), ")".repeat(5_000));
    let json = expect_json(
        post(
            &app,
            "/api/workflows/nodes",
            &admin_token,
            json!({ "definition_id": def_id, "code": "start", "name": "Start", "kind": 1,
                    "next_refs": [{ "condition": huge, "next": "end" }] }),
        )
        .await,
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(json["code"], "VALIDATION_ERROR");

    // Short enough to store, too deep to parse.
    let deep = format!("{}amount > 1{}", "(".repeat(100), ")".repeat(100));
    for node in [
        json!({ "definition_id": def_id, "code": "start", "name": "Start", "kind": 1,
                "next_refs": [{ "next": "route" }] }),
        json!({ "definition_id": def_id, "code": "route", "name": "Route", "kind": 3, "sort_order": 1,
                "next_refs": [{ "condition": deep, "next": "end" }, { "condition": "default", "next": "end" }] }),
        json!({ "definition_id": def_id, "code": "end", "name": "End", "kind": 6, "sort_order": 2 }),
    ] {
        add_node(&app, &admin_token, node).await;
    }

    let json = expect_json(
        put(&app, &format!("/api/workflows/definitions/{def_id}/publish"), &admin_token, json!({})).await,
        StatusCode::CONFLICT,
    )
    .await;
    assert_eq!(json["code"], "BAD_DEFINITION");
    assert!(json["error"].as_str().unwrap().contains("nesting"), "{json}");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn disable_waits_for_running_instances(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let (_, alice) = employee(&pool, "alice").await;
    let (bob_id, _) = employee(&pool, "bob").await;
    let app = common::build_test_app(pool);

    let def_id = publish_single_step(&app, &admin_token, &[bob_id], ALL_OF).await;
    let instance = start_instance(&app, &alice, def_id, json!({})).await;
    let instance_id = instance["id"].as_i64().unwrap();

    let disable_uri = format!("/api/workflows/definitions/{def_id}/disable");
    let json = expect_json(put(&app, &disable_uri, &admin_token, json!({})).await, StatusCode::CONFLICT).await;
    assert_eq!(json["code"], "CONFLICT");

    expect_json(
        put(&app, &format!("/api/workflows/instances/{instance_id}/cancel"), &alice, json!({})).await,
        StatusCode::OK,
    )
    .await;

    let disabled = expect_json(put(&app, &disable_uri, &admin_token, json!({})).await, StatusCode::OK).await;
    assert_eq!(disabled["status"], 3);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn draft_delete_removes_nodes(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let app = common::build_test_app(pool);

    let type_id = create_workflow_type(&app, &admin_token, "scratch").await;
    let def_id = create_definition(&app, &admin_token, type_id, "Scratch").await;
    let node = add_node(
        &app,
        &admin_token,
        json!({ "definition_id": def_id, "code": "start", "name": "Start", "kind": 1 }),
    )
    .await;

    let response = delete(&app, &format!("/api/workflows/definitions/{def_id}"), &admin_token).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = get(&app, &format!("/api/workflows/definitions/{def_id}"), &admin_token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = get(&app, &format!("/api/workflows/nodes/{}", node["id"]), &admin_token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn stale_type_update_is_a_conflict(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let app = common::build_test_app(pool);

    let type_id = create_workflow_type(&app, &admin_token, "travel").await;
    let updated = expect_json(
        put(&app, &format!("/api/workflows/types/{type_id}"), &admin_token, json!({ "name": "Travel", "version": 1 })).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(updated["version"], 2);

    let response = put(
        &app,
        &format!("/api/workflows/types/{type_id}"),
        &admin_token,
        json!({ "name": "Trips", "version": 1 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

// ---------------------------------------------------------------------------
// Instances
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn initiator_cancels_and_tasks_follow(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let (_, alice) = employee(&pool, "alice").await;
    let (bob_id, bob) = employee(&pool, "bob").await;
    let app = common::build_test_app(pool);

    let def_id = publish_single_step(&app, &admin_token, &[bob_id], ALL_OF).await;
    let instance = start_instance(&app, &alice, def_id, json!({})).await;
    let instance_id = instance["id"].as_i64().unwrap();

    // Bob holds a task but is not the initiator.
    let response = put(&app, &format!("/api/workflows/instances/{instance_id}/cancel"), &bob, json!({})).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Running instances cannot be deleted.
    let response = delete(&app, &format!("/api/workflows/instances/{instance_id}"), &admin_token).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let cancelled = expect_json(
        put(&app, &format!("/api/workflows/instances/{instance_id}/cancel"), &alice, json!({})).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(cancelled["status"], 3);

    let tasks = instance_tasks(&app, &admin_token, instance_id).await;
    assert!(tasks.iter().all(|t| t["status"] == CANCELLED));

    let response = put(&app, &format!("/api/workflows/instances/{instance_id}/cancel"), &alice, json!({})).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = delete(&app, &format!("/api/workflows/instances/{instance_id}"), &admin_token).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

/// Nobody to assign: the start fails and leaves nothing behind.
#[sqlx::test(migrations = "../../db/migrations")]
async fn start_without_active_assignee_rolls_back(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let (_, alice) = employee(&pool, "alice").await;
    let (bob_id, _) = employee(&pool, "bob").await;
    let app = common::build_test_app(pool.clone());

    let def_id = publish_single_step(&app, &admin_token, &[bob_id], ALL_OF).await;
    let response = delete(&app, &format!("/api/admin/users/{bob_id}"), &admin_token).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let json = expect_json(
        post(&app, "/api/workflows/instances", &alice, json!({ "definition_id": def_id })).await,
        StatusCode::CONFLICT,
    )
    .await;
    assert_eq!(json["code"], "NO_ASSIGNEE");

    let instances: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workflow_instances")
        .fetch_one(&pool)
        .await
        .unwrap();
    let tasks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workflow_tasks")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!((instances, tasks), (0, 0));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn instances_are_private_to_participants(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let (_, alice) = employee(&pool, "alice").await;
    let (bob_id, bob) = employee(&pool, "bob").await;
    let (_, eve) = employee(&pool, "eve").await;
    let app = common::build_test_app(pool);

    let def_id = publish_single_step(&app, &admin_token, &[bob_id], ALL_OF).await;
    let instance = start_instance(&app, &alice, def_id, json!({})).await;
    let uri = format!("/api/workflows/instances/{}", instance["id"]);

    assert_eq!(get(&app, &uri, &alice).await.status(), StatusCode::OK);
    assert_eq!(get(&app, &uri, &bob).await.status(), StatusCode::OK);
    assert_eq!(get(&app, &uri, &eve).await.status(), StatusCode::FORBIDDEN);

    let listed = expect_json(get(&app, "/api/workflows/instances", &eve).await, StatusCode::OK).await;
    assert_eq!(listed["total"], 0);
    let listed = expect_json(get(&app, "/api/workflows/instances", &admin_token).await, StatusCode::OK).await;
    assert_eq!(listed["total"], 1);

    let mine = expect_json(get(&app, "/api/workflows/tasks/mine", &bob).await, StatusCode::OK).await;
    assert_eq!(mine["total"], 1);
    assert_eq!(mine["data"][0]["node_code"], "review");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn only_the_initiator_edits_variables(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let (_, alice) = employee(&pool, "alice").await;
    let (bob_id, bob) = employee(&pool, "bob").await;
    let app = common::build_test_app(pool);

    let def_id = publish_single_step(&app, &admin_token, &[bob_id], ALL_OF).await;
    let instance = start_instance(&app, &alice, def_id, json!({ "days": 1 })).await;
    let uri = format!("/api/workflows/instances/{}", instance["id"]);

    let response = put(&app, &uri, &bob, json!({ "variables": { "days": 9 }, "version": 1 })).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let version = instance["version"].as_i64().unwrap();
    let updated = expect_json(
        put(&app, &uri, &alice, json!({ "variables": { "days": 2 }, "version": version })).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(updated["variables"]["days"], 2);

    let response = put(&app, &uri, &alice, json!({ "variables": { "days": 5 }, "version": version })).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
