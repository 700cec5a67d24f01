use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A lifecycle transition that the current state does not allow.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The workflow graph is malformed (cycle, unreachable node, no matching branch).
    #[error("Bad definition: {0}")]
    BadDefinition(String),

    /// An assignment rule resolved to nobody.
    #[error("No assignee: {0}")]
    NoAssignee(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
