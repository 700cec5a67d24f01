//! Tests for `/api/approvals`: flows compiled onto the workflow engine and
//! records whose status mirrors their instance.

mod common;

use axum::http::StatusCode;
use common::{admin, employee, expect_json, get, post, put};
use oa_core::types::DbId;
use serde_json::{json, Value};
use sqlx::PgPool;

/// A published two-step purchase flow: `first` then `second`.
struct Flow {
    id: DbId,
    first: DbId,
    second: DbId,
}

async fn publish_two_step(app: &axum::Router, token: &str, first: DbId, second: DbId) -> Flow {
    let approval_type = expect_json(
        post(app, "/api/approvals/types", token, json!({ "code": "purchase", "name": "Purchase" })).await,
        StatusCode::CREATED,
    )
    .await;
    let flow = expect_json(
        post(
            app,
            "/api/approvals/flows",
            token,
            json!({ "type_id": approval_type["id"], "name": "Purchase order" }),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let flow_id = flow["id"].as_i64().unwrap();

    let mut node_ids = Vec::new();
    for (order, user) in [(1, first), (2, second)] {
        let node = expect_json(
            post(
                app,
                "/api/approvals/nodes",
                token,
                json!({
                    "flow_id": flow_id,
                    "name": format!("Step {order}"),
                    "sort_order": order,
                    "assignment": { "kind": "fixed_users", "user_ids": [user] }
                }),
            )
            .await,
            StatusCode::CREATED,
        )
        .await;
        node_ids.push(node["id"].as_i64().unwrap());
    }

    let published = expect_json(
        put(app, &format!("/api/approvals/flows/{flow_id}/publish"), token, json!({})).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(published["status"], 2);
    assert!(published["workflow_definition_id"].is_i64());

    Flow {
        id: flow_id,
        first: node_ids[0],
        second: node_ids[1],
    }
}

async fn submit(app: &axum::Router, token: &str, flow_id: DbId) -> Value {
    expect_json(
        post(
            app,
            "/api/approvals/records",
            token,
            json!({ "flow_id": flow_id, "title": "New laptop", "form_data": { "amount": 1800 } }),
        )
        .await,
        StatusCode::CREATED,
    )
    .await
}

async fn decide(
    app: &axum::Router,
    token: &str,
    record: &Value,
    verb: &str,
    node_id: DbId,
) -> axum::response::Response {
    put(
        app,
        &format!("/api/approvals/records/{}/{verb}", record["id"]),
        token,
        json!({ "node_id": node_id, "comment": "ok" }),
    )
    .await
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn record_completes_after_each_step_approves(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let (_, alice) = employee(&pool, "alice").await;
    let (bob_id, bob) = employee(&pool, "bob").await;
    let (carol_id, carol) = employee(&pool, "carol").await;
    let app = common::build_test_app(pool);

    let flow = publish_two_step(&app, &admin_token, bob_id, carol_id).await;
    let record = submit(&app, &alice, flow.id).await;
    assert_eq!(record["status"], 1);
    assert!(record["workflow_instance_id"].is_i64());

    let pending = expect_json(get(&app, "/api/approvals/pending", &bob).await, StatusCode::OK).await;
    assert_eq!(pending["total"], 1);
    let pending = expect_json(get(&app, "/api/approvals/pending", &carol).await, StatusCode::OK).await;
    assert_eq!(pending["total"], 0);

    // The second step is not current yet.
    let json = expect_json(decide(&app, &carol, &record, "approve", flow.second).await, StatusCode::CONFLICT).await;
    assert_eq!(json["code"], "INVALID_STATE");
    // Carol holds nothing on the first step.
    let response = decide(&app, &carol, &record, "approve", flow.first).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let after_first = expect_json(decide(&app, &bob, &record, "approve", flow.first).await, StatusCode::OK).await;
    assert_eq!(after_first["status"], 1);

    let done = expect_json(decide(&app, &carol, &record, "approve", flow.second).await, StatusCode::OK).await;
    assert_eq!(done["status"], 2);
    assert!(done["completed_at"].is_string());

    let detail = expect_json(
        get(&app, &format!("/api/approvals/records/{}", record["id"]), &alice).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(detail["title"], "New laptop");
    assert_eq!(detail["tasks"].as_array().unwrap().len(), 2);
    assert_eq!(detail["tasks"][0]["node_code"], format!("step_{}", flow.first));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn rejecting_a_step_rejects_the_record(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let (_, alice) = employee(&pool, "alice").await;
    let (bob_id, bob) = employee(&pool, "bob").await;
    let (carol_id, carol) = employee(&pool, "carol").await;
    let app = common::build_test_app(pool);

    let flow = publish_two_step(&app, &admin_token, bob_id, carol_id).await;
    let record = submit(&app, &alice, flow.id).await;

    let rejected = expect_json(decide(&app, &bob, &record, "reject", flow.first).await, StatusCode::OK).await;
    assert_eq!(rejected["status"], 4);

    let response = decide(&app, &carol, &record, "approve", flow.second).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn records_are_private(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let (_, alice) = employee(&pool, "alice").await;
    let (bob_id, bob) = employee(&pool, "bob").await;
    let (carol_id, _) = employee(&pool, "carol").await;
    let (_, eve) = employee(&pool, "eve").await;
    let app = common::build_test_app(pool);

    let flow = publish_two_step(&app, &admin_token, bob_id, carol_id).await;
    let record = submit(&app, &alice, flow.id).await;
    let uri = format!("/api/approvals/records/{}", record["id"]);

    assert_eq!(get(&app, &uri, &bob).await.status(), StatusCode::OK);
    assert_eq!(get(&app, &uri, &admin_token).await.status(), StatusCode::OK);
    assert_eq!(get(&app, &uri, &eve).await.status(), StatusCode::FORBIDDEN);

    // Listing without flow management is scoped to the caller's own records.
    let listed = expect_json(get(&app, "/api/approvals/records", &eve).await, StatusCode::OK).await;
    assert_eq!(listed["total"], 0);
    let listed = expect_json(get(&app, "/api/approvals/records", &alice).await, StatusCode::OK).await;
    assert_eq!(listed["total"], 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unpublished_flow_takes_no_records(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let (_, alice) = employee(&pool, "alice").await;
    let app = common::build_test_app(pool);

    let approval_type = expect_json(
        post(&app, "/api/approvals/types", &admin_token, json!({ "code": "trip", "name": "Trip" })).await,
        StatusCode::CREATED,
    )
    .await;
    let flow = expect_json(
        post(
            &app,
            "/api/approvals/flows",
            &admin_token,
            json!({ "type_id": approval_type["id"], "name": "Trip" }),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;

    // No nodes yet: nothing to compile.
    let json = expect_json(
        put(&app, &format!("/api/approvals/flows/{}/publish", flow["id"]), &admin_token, json!({})).await,
        StatusCode::CONFLICT,
    )
    .await;
    assert_eq!(json["code"], "BAD_DEFINITION");

    let response = post(
        &app,
        "/api/approvals/records",
        &alice,
        json!({ "flow_id": flow["id"], "title": "Conference" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn employees_cannot_manage_flows(pool: PgPool) {
    let (_, alice) = employee(&pool, "alice").await;
    let app = common::build_test_app(pool);

    let response = post(&app, "/api/approvals/types", &alice, json!({ "code": "x", "name": "X" })).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

/// Flow names are unique per type, so each published flow owns its own
/// definition version chain.
#[sqlx::test(migrations = "../../db/migrations")]
async fn flow_names_are_unique_within_a_type(pool: PgPool) {
    let (_, admin_token) = admin(&pool).await;
    let (bob_id, _) = employee(&pool, "bob").await;
    let (carol_id, _) = employee(&pool, "carol").await;
    let app = common::build_test_app(pool);

    let flow = publish_two_step(&app, &admin_token, bob_id, carol_id).await;
    let existing = expect_json(
        get(&app, &format!("/api/approvals/flows/{}", flow.id), &admin_token).await,
        StatusCode::OK,
    )
    .await;

    let json = expect_json(
        post(
            &app,
            "/api/approvals/flows",
            &admin_token,
            json!({ "type_id": existing["type_id"], "name": "Purchase order" }),
        )
        .await,
        StatusCode::CONFLICT,
    )
    .await;
    assert_eq!(json["code"], "CONFLICT");
}
