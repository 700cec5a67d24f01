//! Status enums mapping to SMALLINT columns.
//!
//! Each variant's discriminant is the value stored in the database and
//! exchanged on the wire. Inputs are validated against the closed set with
//! [`from_id`](WorkflowTaskStatus::from_id)-style constructors.

use crate::error::CoreError;

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// All variants in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Look up a variant by its database ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some($name::$variant), )+
                    _ => None,
                }
            }

            /// Symbolic snake_case name used in logs and error messages.
            pub fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => $label, )+
                }
            }

            /// Parse an ID coming from a request, rejecting values outside the set.
            pub fn parse(id: StatusId) -> Result<Self, CoreError> {
                Self::from_id(id).ok_or_else(|| {
                    let allowed: Vec<String> = Self::ALL
                        .iter()
                        .map(|v| format!("{}={}", v.id(), v.name()))
                        .collect();
                    CoreError::Validation(format!(
                        "Invalid {} value {id}. Must be one of: {}",
                        stringify!($name),
                        allowed.join(", ")
                    ))
                })
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_i16(self.id())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let id = <StatusId as serde::Deserialize>::deserialize(deserializer)?;
                Self::from_id(id).ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        "unknown {} value {id}",
                        stringify!($name)
                    ))
                })
            }
        }
    };
}

define_status_enum! {
    /// Workflow type availability.
    WorkflowTypeStatus {
        Enabled = 1 => "enabled",
        Disabled = 2 => "disabled",
    }
}

define_status_enum! {
    /// Definition lifecycle: draft -> published -> disabled.
    DefinitionStatus {
        Draft = 1 => "draft",
        Published = 2 => "published",
        Disabled = 3 => "disabled",
    }
}

define_status_enum! {
    /// Kind of a node in a workflow definition graph.
    NodeKind {
        Start = 1 => "start",
        Approval = 2 => "approval",
        Condition = 3 => "condition",
        Parallel = 4 => "parallel",
        Join = 5 => "join",
        End = 6 => "end",
    }
}

define_status_enum! {
    /// How many approvals satisfy an approval node.
    ApprovalPolicy {
        AllOf = 1 => "all_of",
        AnyOf = 2 => "any_of",
    }
}

define_status_enum! {
    /// Workflow instance status.
    InstanceStatus {
        Running = 1 => "running",
        Completed = 2 => "completed",
        Cancelled = 3 => "cancelled",
        Rejected = 4 => "rejected",
    }
}

define_status_enum! {
    /// Workflow task status.
    WorkflowTaskStatus {
        Pending = 1 => "pending",
        Completed = 2 => "completed",
        Rejected = 3 => "rejected",
        Transferred = 4 => "transferred",
        Cancelled = 5 => "cancelled",
    }
}

define_status_enum! {
    /// Decision recorded on a task.
    TaskAction {
        None = 0 => "none",
        Approve = 1 => "approve",
        Reject = 2 => "reject",
        Transfer = 3 => "transfer",
    }
}

define_status_enum! {
    /// Meeting room availability.
    RoomStatus {
        Available = 1 => "available",
        Maintaining = 2 => "maintaining",
        Disabled = 3 => "disabled",
    }
}

define_status_enum! {
    /// Meeting reservation lifecycle.
    ReservationStatus {
        Pending = 1 => "pending",
        Approved = 2 => "approved",
        Rejected = 3 => "rejected",
        Cancelled = 4 => "cancelled",
        CheckedIn = 5 => "checked_in",
        CheckedOut = 6 => "checked_out",
    }
}

define_status_enum! {
    /// Meeting room maintenance window lifecycle.
    MaintenanceStatus {
        Planned = 1 => "planned",
        InProgress = 2 => "in_progress",
        Completed = 3 => "completed",
    }
}

impl InstanceStatus {
    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        !matches!(self, InstanceStatus::Running)
    }
}

impl WorkflowTaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, WorkflowTaskStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn task_action_wire_encoding() {
        assert_eq!(TaskAction::Approve.id(), 1);
        assert_eq!(TaskAction::Reject.id(), 2);
        assert_eq!(TaskAction::from_id(3), Some(TaskAction::Transfer));
    }

    #[test]
    fn reservation_status_ids_are_stable() {
        assert_eq!(ReservationStatus::Pending.id(), 1);
        assert_eq!(ReservationStatus::CheckedOut.id(), 6);
        assert_eq!(ReservationStatus::CheckedIn.name(), "checked_in");
    }

    #[test]
    fn parse_rejects_values_outside_the_set() {
        let err = NodeKind::parse(42).unwrap_err();
        assert_matches!(err, CoreError::Validation(msg) if msg.contains("2=approval"));
    }

    #[test]
    fn parse_accepts_known_value() {
        assert_eq!(DefinitionStatus::parse(2).unwrap(), DefinitionStatus::Published);
    }

    #[test]
    fn only_running_instance_is_non_terminal() {
        assert!(!InstanceStatus::Running.is_terminal());
        assert!(InstanceStatus::Completed.is_terminal());
        assert!(InstanceStatus::Rejected.is_terminal());
        assert!(InstanceStatus::Cancelled.is_terminal());
    }

    #[test]
    fn serde_uses_numeric_encoding() {
        let json = serde_json::to_string(&NodeKind::Condition).unwrap();
        assert_eq!(json, "3");
        let kind: NodeKind = serde_json::from_str("6").unwrap();
        assert_eq!(kind, NodeKind::End);
        assert!(serde_json::from_str::<NodeKind>("9").is_err());
    }

    #[test]
    fn display_uses_symbolic_name() {
        assert_eq!(ApprovalPolicy::AnyOf.to_string(), "any_of");
    }
}
