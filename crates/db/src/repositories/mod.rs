//! Repository layer.
//!
//! Each repository is a zero-sized struct whose async functions take an
//! executor: `&PgPool` for one-shot statements or `&mut *tx` inside a
//! transaction. Identity repositories only run standalone and take the
//! pool directly.

pub mod approval_repo;
pub mod department_repo;
pub mod meeting_repo;
pub mod role_repo;
pub mod session_repo;
pub mod user_repo;
pub mod workflow_definition_repo;
pub mod workflow_instance_repo;
pub mod workflow_node_repo;
pub mod workflow_task_repo;
pub mod workflow_type_repo;

pub use approval_repo::{ApprovalFlowRepo, ApprovalNodeRepo, ApprovalRecordRepo, ApprovalTypeRepo};
pub use department_repo::DepartmentRepo;
pub use meeting_repo::{MaintenanceRepo, MeetingRoomRepo, MinutesRepo, ReservationRepo};
pub use role_repo::{PermissionRepo, RoleRepo};
pub use session_repo::SessionRepo;
pub use user_repo::UserRepo;
pub use workflow_definition_repo::WorkflowDefinitionRepo;
pub use workflow_instance_repo::WorkflowInstanceRepo;
pub use workflow_node_repo::WorkflowNodeRepo;
pub use workflow_task_repo::WorkflowTaskRepo;
pub use workflow_type_repo::WorkflowTypeRepo;
