//! Assignment rules: who gets a task when an instance enters an approval node.
//!
//! Rules are resolved against organizational data through the
//! [`OrgDirectory`] trait, which the `db` crate implements on top of a
//! Postgres connection and tests implement in memory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::types::DbId;

/// A deterministic function from instance context to a set of user ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssignmentRule {
    /// A fixed list of users.
    FixedUsers { user_ids: Vec<DbId> },
    /// Every active member of a role.
    ByRole { role_id: DbId },
    /// The head of the department whose id is held in an instance variable.
    ByDepartmentHead { variable: String },
    /// The initiator's direct manager.
    InitiatorManager,
}

impl AssignmentRule {
    /// Whether the rule can never produce anyone, independent of org data.
    pub fn is_empty(&self) -> bool {
        match self {
            AssignmentRule::FixedUsers { user_ids } => user_ids.is_empty(),
            AssignmentRule::ByDepartmentHead { variable } => variable.trim().is_empty(),
            AssignmentRule::ByRole { .. } | AssignmentRule::InitiatorManager => false,
        }
    }

    /// Short label used in logs and error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            AssignmentRule::FixedUsers { .. } => "fixed_users",
            AssignmentRule::ByRole { .. } => "by_role",
            AssignmentRule::ByDepartmentHead { .. } => "by_department_head",
            AssignmentRule::InitiatorManager => "initiator_manager",
        }
    }
}

/// Read access to organizational data needed by assignment rules.
#[async_trait]
pub trait OrgDirectory: Send {
    /// Filter `user_ids` down to active users, keeping input order.
    async fn active_users(&mut self, user_ids: &[DbId]) -> Result<Vec<DbId>, CoreError>;

    /// Active users holding `role_id`, ordered by user id.
    async fn users_with_role(&mut self, role_id: DbId) -> Result<Vec<DbId>, CoreError>;

    /// The head of a department, if one is set.
    async fn department_head(&mut self, department_id: DbId) -> Result<Option<DbId>, CoreError>;

    /// The direct manager of a user, if one is set.
    async fn manager_of(&mut self, user_id: DbId) -> Result<Option<DbId>, CoreError>;
}

/// Inputs from the instance that rules may read.
#[derive(Debug, Clone, Copy)]
pub struct AssignmentContext<'a> {
    pub initiator_id: DbId,
    pub variables: &'a Map<String, Value>,
}

/// Resolve a rule to a non-empty, de-duplicated list of active user ids.
///
/// Fails with [`CoreError::NoAssignee`] when nobody qualifies.
pub async fn resolve_assignees<D>(
    rule: &AssignmentRule,
    ctx: AssignmentContext<'_>,
    directory: &mut D,
) -> Result<Vec<DbId>, CoreError>
where
    D: OrgDirectory + ?Sized,
{
    let candidates = match rule {
        AssignmentRule::FixedUsers { user_ids } => user_ids.clone(),
        AssignmentRule::ByRole { role_id } => directory.users_with_role(*role_id).await?,
        AssignmentRule::ByDepartmentHead { variable } => {
            let department_id = department_from_variables(ctx.variables, variable)?;
            directory
                .department_head(department_id)
                .await?
                .into_iter()
                .collect()
        }
        AssignmentRule::InitiatorManager => directory
            .manager_of(ctx.initiator_id)
            .await?
            .into_iter()
            .collect(),
    };

    let mut unique: Vec<DbId> = Vec::with_capacity(candidates.len());
    for id in candidates {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }

    let active = if unique.is_empty() {
        unique
    } else {
        directory.active_users(&unique).await?
    };

    if active.is_empty() {
        return Err(CoreError::NoAssignee(format!(
            "Assignment rule '{}' resolved to no active users",
            rule.kind_name()
        )));
    }
    Ok(active)
}

/// Read a department id from a variable holding an integer or a numeric string.
fn department_from_variables(vars: &Map<String, Value>, variable: &str) -> Result<DbId, CoreError> {
    match vars.get(variable) {
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
            CoreError::Validation(format!("Variable '{variable}' must be an integer department id"))
        }),
        Some(Value::String(s)) => s.trim().parse::<DbId>().map_err(|_| {
            CoreError::Validation(format!("Variable '{variable}' must be an integer department id"))
        }),
        Some(_) => Err(CoreError::Validation(format!(
            "Variable '{variable}' must be an integer department id"
        ))),
        None => Err(CoreError::NoAssignee(format!(
            "Variable '{variable}' naming the department is not set"
        ))),
    }
}
