//! Tests for `AppError` -> HTTP response mapping.
//!
//! These call `IntoResponse` directly; no router or database is involved.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use oa_api::error::AppError;
use oa_core::error::CoreError;
use validator::Validate;

async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn not_found_names_the_entity() {
    let (status, json) = error_to_response(AppError::Core(CoreError::NotFound {
        entity: "MeetingRoom",
        id: 42,
    }))
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "MeetingRoom with id 42 not found");
}

#[tokio::test]
async fn engine_state_errors_are_409_with_distinct_codes() {
    let cases = [
        (CoreError::InvalidState("Task 3 is completed".into()), "INVALID_STATE"),
        (CoreError::BadDefinition("Definition has no end node".into()), "BAD_DEFINITION"),
        (CoreError::NoAssignee("Node 'review' resolved to nobody".into()), "NO_ASSIGNEE"),
        (CoreError::Conflict("Room 1 is already booked".into()), "CONFLICT"),
    ];
    for (err, code) in cases {
        let message = err.to_string();
        let (status, json) = error_to_response(AppError::Core(err)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["code"], code);
        assert!(message.contains(json["error"].as_str().unwrap()));
    }
}

#[tokio::test]
async fn unsupported_is_501() {
    let (status, json) =
        error_to_response(AppError::Core(CoreError::Unsupported("parallel".into()))).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(json["code"], "UNSUPPORTED");
}

#[tokio::test]
async fn validator_errors_become_validation_error() {
    #[derive(Validate)]
    struct Form {
        #[validate(length(min = 1))]
        title: String,
    }

    let errors = Form { title: String::new() }.validate().unwrap_err();
    let (status, json) = error_to_response(AppError::from(errors)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(json["error"].as_str().unwrap().contains("title"));
}

#[tokio::test]
async fn internal_errors_hide_details() {
    let (status, json) =
        error_to_response(AppError::InternalError("pool exhausted at 10.0.0.3".into())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}

#[tokio::test]
async fn pool_timeout_is_500() {
    let (status, json) = error_to_response(AppError::Database(sqlx::Error::PoolTimedOut)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
}
