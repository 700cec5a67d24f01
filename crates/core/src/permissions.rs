//! Permission tags and the authorization guard.
//!
//! Tags are `resource:entity:action` strings. They must match the seed data
//! in `20260301000002_create_rbac_tables.sql`; the admin role holds all of
//! them.

use std::collections::HashSet;

use crate::error::CoreError;

pub const SYSTEM_USER_MANAGE: &str = "system:user:manage";
pub const SYSTEM_ROLE_MANAGE: &str = "system:role:manage";
pub const SYSTEM_DEPARTMENT_MANAGE: &str = "system:department:manage";

pub const WORKFLOW_TYPE_MANAGE: &str = "workflow:type:manage";
pub const WORKFLOW_DEFINITION_MANAGE: &str = "workflow:definition:manage";
pub const WORKFLOW_DEFINITION_PUBLISH: &str = "workflow:definition:publish";
pub const WORKFLOW_INSTANCE_START: &str = "workflow:instance:start";
pub const WORKFLOW_INSTANCE_CANCEL: &str = "workflow:instance:cancel";
pub const WORKFLOW_INSTANCE_VIEW: &str = "workflow:instance:view";
pub const WORKFLOW_TASK_CREATE: &str = "workflow:task:create";
pub const WORKFLOW_TASK_TRANSFER: &str = "workflow:task:transfer";

pub const APPROVAL_FLOW_MANAGE: &str = "approval:flow:manage";
pub const APPROVAL_RECORD_CREATE: &str = "approval:record:create";

pub const MEETING_ROOM_CREATE: &str = "meeting:room:create";
pub const MEETING_ROOM_UPDATE: &str = "meeting:room:update";
pub const MEETING_ROOM_DELETE: &str = "meeting:room:delete";
pub const MEETING_RESERVATION_CREATE: &str = "meeting:reservation:create";
pub const MEETING_RESERVATION_APPROVE: &str = "meeting:reservation:approve";
pub const MEETING_MAINTENANCE_MANAGE: &str = "meeting:maintenance:manage";
pub const MEETING_MINUTES_WRITE: &str = "meeting:minutes:write";

/// Every known permission tag.
pub const ALL: &[&str] = &[
    SYSTEM_USER_MANAGE,
    SYSTEM_ROLE_MANAGE,
    SYSTEM_DEPARTMENT_MANAGE,
    WORKFLOW_TYPE_MANAGE,
    WORKFLOW_DEFINITION_MANAGE,
    WORKFLOW_DEFINITION_PUBLISH,
    WORKFLOW_INSTANCE_START,
    WORKFLOW_INSTANCE_CANCEL,
    WORKFLOW_INSTANCE_VIEW,
    WORKFLOW_TASK_CREATE,
    WORKFLOW_TASK_TRANSFER,
    APPROVAL_FLOW_MANAGE,
    APPROVAL_RECORD_CREATE,
    MEETING_ROOM_CREATE,
    MEETING_ROOM_UPDATE,
    MEETING_ROOM_DELETE,
    MEETING_RESERVATION_CREATE,
    MEETING_RESERVATION_APPROVE,
    MEETING_MAINTENANCE_MANAGE,
    MEETING_MINUTES_WRITE,
];

/// Check that `granted` contains `required`.
///
/// Fails with [`CoreError::Forbidden`] naming the missing tag.
pub fn require(granted: &HashSet<String>, required: &str) -> Result<(), CoreError> {
    if granted.contains(required) {
        Ok(())
    } else {
        Err(CoreError::Forbidden(format!(
            "Missing permission '{required}'"
        )))
    }
}
