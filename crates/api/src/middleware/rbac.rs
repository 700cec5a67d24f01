//! Permission-tag extractors.
//!
//! `Require<T>` wraps [`AuthUser`] and rejects the request with 403 unless
//! the caller holds `T::TAG`, so a handler's signature states the permission
//! it needs:
//!
//! ```ignore
//! async fn create_room(
//!     Require(user, _): Require<MeetingRoomCreate>,
//!     // ...
//! ) -> AppResult<...>
//! ```

use std::marker::PhantomData;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use oa_core::permissions;

use super::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

/// A permission tag known at compile time.
pub trait PermissionTag {
    const TAG: &'static str;
}

pub struct Require<T>(pub AuthUser, pub PhantomData<T>);

impl<T> FromRequestParts<AppState> for Require<T>
where
    T: PermissionTag + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        user.require(T::TAG)?;
        Ok(Require(user, PhantomData))
    }
}

macro_rules! permission_tags {
    ($($name:ident => $tag:path),+ $(,)?) => {
        $(
            pub struct $name;

            impl PermissionTag for $name {
                const TAG: &'static str = $tag;
            }
        )+
    };
}

permission_tags! {
    SystemUserManage => permissions::SYSTEM_USER_MANAGE,
    SystemRoleManage => permissions::SYSTEM_ROLE_MANAGE,
    SystemDepartmentManage => permissions::SYSTEM_DEPARTMENT_MANAGE,
    WorkflowTypeManage => permissions::WORKFLOW_TYPE_MANAGE,
    WorkflowDefinitionManage => permissions::WORKFLOW_DEFINITION_MANAGE,
    WorkflowDefinitionPublish => permissions::WORKFLOW_DEFINITION_PUBLISH,
    WorkflowInstanceStart => permissions::WORKFLOW_INSTANCE_START,
    WorkflowTaskCreate => permissions::WORKFLOW_TASK_CREATE,
    ApprovalFlowManage => permissions::APPROVAL_FLOW_MANAGE,
    ApprovalRecordCreate => permissions::APPROVAL_RECORD_CREATE,
    MeetingRoomCreate => permissions::MEETING_ROOM_CREATE,
    MeetingRoomUpdate => permissions::MEETING_ROOM_UPDATE,
    MeetingRoomDelete => permissions::MEETING_ROOM_DELETE,
    MeetingReservationCreate => permissions::MEETING_RESERVATION_CREATE,
    MeetingReservationApprove => permissions::MEETING_RESERVATION_APPROVE,
    MeetingMaintenanceManage => permissions::MEETING_MAINTENANCE_MANAGE,
    MeetingMinutesWrite => permissions::MEETING_MINUTES_WRITE,
}
