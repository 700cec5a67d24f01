//! Workflow, approval and meeting services.
//!
//! Each service function owns its transaction: it begins on the pool, runs
//! the repositories against `&mut *tx`, and commits only on success, so an
//! early `?` rolls everything back. Functions suffixed `_in_tx` take a
//! connection that already belongs to a caller's transaction.
//!
//! - [`definitions`]: workflow definition lifecycle and publish validation.
//! - [`runtime`]: starting, advancing and cancelling instances.
//! - [`dispatcher`]: handling, transferring and adding tasks.
//! - [`approval`]: approval flows compiled onto the workflow engine.
//! - [`meeting`]: reservation and maintenance state machines.

use oa_core::error::CoreError;
use oa_core::types::DbId;

use crate::error::AppError;

pub mod approval;
pub mod definitions;
pub mod dispatcher;
pub mod meeting;
pub mod runtime;

pub(crate) fn not_found(entity: &'static str, id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound { entity, id })
}

/// A guarded update matched nothing although the row exists.
pub(crate) fn stale(entity: &str, id: DbId) -> AppError {
    AppError::Core(CoreError::Conflict(format!(
        "{entity} {id} was modified concurrently; reload and retry"
    )))
}

pub(crate) fn invalid_state(msg: impl Into<String>) -> AppError {
    AppError::Core(CoreError::InvalidState(msg.into()))
}
