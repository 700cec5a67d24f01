//! Shared helpers for the HTTP integration tests.
//!
//! Every test builds the production router via [`build_test_app`] and
//! drives it with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::PgPool;
use tower::ServiceExt;

use oa_api::auth::jwt::{generate_access_token, JwtConfig};
use oa_api::auth::password::hash_password;
use oa_api::config::{MeetingConfig, ServerConfig};
use oa_api::router::build_app_router;
use oa_api::state::AppState;
use oa_core::roles::{ROLE_ADMIN, ROLE_EMPLOYEE};
use oa_core::types::DbId;
use oa_db::models::user::CreateUser;
use oa_db::repositories::{RoleRepo, UserRepo};

/// Password of users created with [`create_login_user`].
pub const TEST_PASSWORD: &str = "correct-horse-42";

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        database_url: String::new(),
        db_max_connections: 5,
        jwt: JwtConfig {
            secret: "integration-test-secret".to_string(),
            access_token_expiry_mins: 60,
            refresh_token_expiry_days: 7,
        },
        meeting: MeetingConfig::default(),
        bootstrap_admin: None,
    }
}

pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_with(pool, test_config())
}

pub fn build_test_app_with(pool: PgPool, config: ServerConfig) -> Router {
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
    };
    build_app_router(state, &config)
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str, token: &str) -> Response {
    send(app, Method::GET, uri, Some(token), None).await
}

pub async fn post(app: &Router, uri: &str, token: &str, body: Value) -> Response {
    send(app, Method::POST, uri, Some(token), Some(body)).await
}

pub async fn put(app: &Router, uri: &str, token: &str, body: Value) -> Response {
    send(app, Method::PUT, uri, Some(token), Some(body)).await
}

pub async fn delete(app: &Router, uri: &str, token: &str) -> Response {
    send(app, Method::DELETE, uri, Some(token), None).await
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert the status and return the parsed body.
pub async fn expect_json(response: Response, status: StatusCode) -> Value {
    let actual = response.status();
    let json = body_json(response).await;
    assert_eq!(actual, status, "unexpected status, body: {json}");
    json
}

// ---------------------------------------------------------------------------
// Users and tokens
// ---------------------------------------------------------------------------

/// Insert a user holding `role_code`. The stored hash is not a real hash,
/// so the user can only authenticate with a minted token.
pub async fn create_user(pool: &PgPool, username: &str, role_code: &str) -> DbId {
    insert_user(pool, username, role_code, "!unusable".to_string()).await
}

/// Insert a user whose password is [`TEST_PASSWORD`].
pub async fn create_login_user(pool: &PgPool, username: &str, role_code: &str) -> DbId {
    let hash = hash_password(TEST_PASSWORD).unwrap();
    insert_user(pool, username, role_code, hash).await
}

async fn insert_user(pool: &PgPool, username: &str, role_code: &str, password_hash: String) -> DbId {
    let user = UserRepo::create(
        pool,
        &CreateUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            display_name: None,
            password_hash,
            department_id: None,
            manager_id: None,
        },
    )
    .await
    .unwrap();
    let role = RoleRepo::find_by_code(pool, role_code).await.unwrap().unwrap();
    RoleRepo::assign_to_user(pool, user.id, role.id).await.unwrap();
    user.id
}

pub fn token_for(user_id: DbId, username: &str) -> String {
    generate_access_token(user_id, username, &test_config().jwt).unwrap()
}

/// An admin user and its bearer token.
pub async fn admin(pool: &PgPool) -> (DbId, String) {
    let id = create_user(pool, "admin", ROLE_ADMIN).await;
    (id, token_for(id, "admin"))
}

/// An employee user and its bearer token.
pub async fn employee(pool: &PgPool, username: &str) -> (DbId, String) {
    let id = create_user(pool, username, ROLE_EMPLOYEE).await;
    (id, token_for(id, username))
}

// ---------------------------------------------------------------------------
// Workflow fixtures
// ---------------------------------------------------------------------------

pub async fn create_workflow_type(app: &Router, token: &str, code: &str) -> DbId {
    let json = expect_json(
        post(
            app,
            "/api/workflows/types",
            token,
            serde_json::json!({ "name": code, "code": code }),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    json["id"].as_i64().unwrap()
}

pub async fn create_definition(app: &Router, token: &str, type_id: DbId, name: &str) -> DbId {
    let json = expect_json(
        post(
            app,
            "/api/workflows/definitions",
            token,
            serde_json::json!({ "type_id": type_id, "name": name }),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    json["id"].as_i64().unwrap()
}

pub async fn add_node(app: &Router, token: &str, node: Value) -> Value {
    expect_json(
        post(app, "/api/workflows/nodes", token, node).await,
        StatusCode::CREATED,
    )
    .await
}

/// Draft and publish `start -> review -> end`, where `review` is assigned
/// to `assignees` under `policy` (1 all-of, 2 any-of). Returns the
/// definition id.
pub async fn publish_single_step(
    app: &Router,
    token: &str,
    assignees: &[DbId],
    policy: i16,
) -> DbId {
    let type_id = create_workflow_type(app, token, "leave").await;
    let def_id = create_definition(app, token, type_id, "Leave request").await;
    add_node(
        app,
        token,
        serde_json::json!({
            "definition_id": def_id, "code": "start", "name": "Start", "kind": 1,
            "next_refs": [{ "next": "review" }]
        }),
    )
    .await;
    add_node(
        app,
        token,
        serde_json::json!({
            "definition_id": def_id, "code": "review", "name": "Review", "kind": 2,
            "sort_order": 1,
            "next_refs": [{ "next": "end" }],
            "assignment": { "kind": "fixed_users", "user_ids": assignees },
            "policy": policy
        }),
    )
    .await;
    add_node(
        app,
        token,
        serde_json::json!({
            "definition_id": def_id, "code": "end", "name": "End", "kind": 6, "sort_order": 2
        }),
    )
    .await;
    expect_json(
        put(
            app,
            &format!("/api/workflows/definitions/{def_id}/publish"),
            token,
            serde_json::json!({}),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    def_id
}

pub async fn start_instance(app: &Router, token: &str, def_id: DbId, variables: Value) -> Value {
    expect_json(
        post(
            app,
            "/api/workflows/instances",
            token,
            serde_json::json!({ "definition_id": def_id, "variables": variables }),
        )
        .await,
        StatusCode::CREATED,
    )
    .await
}

/// Task history of an instance, fetched with an all-seeing token.
pub async fn instance_tasks(app: &Router, token: &str, instance_id: DbId) -> Vec<Value> {
    let json = expect_json(
        get(app, &format!("/api/workflows/instances/{instance_id}/tasks"), token).await,
        StatusCode::OK,
    )
    .await;
    json["data"].as_array().unwrap().clone()
}

pub fn task_of(tasks: &[Value], assignee: DbId, status: i64) -> Option<Value> {
    tasks
        .iter()
        .find(|t| t["assignee_id"] == assignee && t["status"] == status)
        .cloned()
}
