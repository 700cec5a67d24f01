//! Route definitions for the `/workflows` resource.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::{workflow_definition as def, workflow_instance as inst};
use crate::state::AppState;

/// Routes mounted at `/workflows`.
///
/// ```text
/// GET|POST        /types
/// GET|PUT|DELETE  /types/{id}
/// GET|POST        /definitions
/// GET|PUT|DELETE  /definitions/{id}
/// PUT             /definitions/{id}/publish
/// PUT             /definitions/{id}/disable
/// POST            /definitions/{id}/versions
/// GET             /definitions/{id}/nodes
/// POST            /nodes
/// GET|PUT|DELETE  /nodes/{id}
/// GET|POST        /instances
/// GET|PUT|DELETE  /instances/{id}
/// PUT             /instances/{id}/cancel
/// GET             /instances/{id}/tasks
/// GET|POST        /tasks
/// GET             /tasks/mine
/// GET|PUT|DELETE  /tasks/{id}
/// PUT             /tasks/{id}/handle
/// PUT             /tasks/{id}/transfer
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        // Types.
        .route("/types", get(def::list_types).post(def::create_type))
        .route(
            "/types/{id}",
            get(def::get_type).put(def::update_type).delete(def::delete_type),
        )
        // Definitions.
        .route(
            "/definitions",
            get(def::list_definitions).post(def::create_definition),
        )
        .route(
            "/definitions/{id}",
            get(def::get_definition)
                .put(def::update_definition)
                .delete(def::delete_definition),
        )
        .route("/definitions/{id}/publish", put(def::publish_definition))
        .route("/definitions/{id}/disable", put(def::disable_definition))
        .route("/definitions/{id}/versions", post(def::new_version))
        .route("/definitions/{id}/nodes", get(def::list_nodes))
        // Nodes.
        .route("/nodes", post(def::create_node))
        .route(
            "/nodes/{id}",
            get(def::get_node).put(def::update_node).delete(def::delete_node),
        )
        // Instances.
        .route(
            "/instances",
            get(inst::list_instances).post(inst::start_instance),
        )
        .route(
            "/instances/{id}",
            get(inst::get_instance)
                .put(inst::update_instance)
                .delete(inst::delete_instance),
        )
        .route("/instances/{id}/cancel", put(inst::cancel_instance))
        .route("/instances/{id}/tasks", get(inst::instance_tasks))
        // Tasks.
        .route("/tasks", get(inst::list_tasks).post(inst::add_assignee))
        .route("/tasks/mine", get(inst::my_tasks))
        .route(
            "/tasks/{id}",
            get(inst::get_task)
                .put(inst::update_task)
                .delete(inst::delete_task),
        )
        .route("/tasks/{id}/handle", put(inst::handle_task))
        .route("/tasks/{id}/transfer", put(inst::transfer_task))
}
