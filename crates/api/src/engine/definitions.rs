//! Definition manager: draft editing, versioning, publish and disable.
//!
//! Node edits share-lock the owning definition and require it to be a
//! draft; publish and disable take the row lock exclusively, so a publish
//! never races a node edit.

use oa_core::error::CoreError;
use oa_core::status::{ApprovalPolicy, DefinitionStatus, NodeKind};
use oa_core::types::DbId;
use oa_core::workflow::graph::validate_definition;
use oa_core::workflow::node::FlowNode;
use oa_db::models::workflow::{
    CreateWorkflowNode, UpdateWorkflowDefinition, UpdateWorkflowNode, WorkflowDefinition,
    WorkflowNode,
};
use oa_db::repositories::{WorkflowDefinitionRepo, WorkflowNodeRepo, WorkflowTypeRepo};
use sqlx::{PgConnection, PgPool};

use super::{invalid_state, not_found, stale};
use crate::error::{AppError, AppResult};

fn status_of(def: &WorkflowDefinition) -> AppResult<DefinitionStatus> {
    Ok(DefinitionStatus::parse(def.status)?)
}

async fn lock_draft(conn: &mut PgConnection, definition_id: DbId) -> AppResult<WorkflowDefinition> {
    let def = WorkflowDefinitionRepo::find_for_share(&mut *conn, definition_id)
        .await?
        .ok_or_else(|| not_found("WorkflowDefinition", definition_id))?;
    if status_of(&def)? != DefinitionStatus::Draft {
        return Err(invalid_state(format!(
            "Definition {definition_id} is {} and can no longer be edited",
            status_of(&def)?
        )));
    }
    Ok(def)
}

/// Load a definition's nodes in the engine's shape.
pub async fn load_flow_nodes(
    conn: &mut PgConnection,
    definition_id: DbId,
) -> AppResult<Vec<FlowNode>> {
    let rows = WorkflowNodeRepo::list_for_definition(&mut *conn, definition_id).await?;
    rows.iter()
        .map(|n| n.to_flow_node().map_err(AppError::from))
        .collect()
}

pub async fn create_definition(
    pool: &PgPool,
    type_id: DbId,
    name: &str,
    description: Option<&str>,
    created_by: DbId,
) -> AppResult<WorkflowDefinition> {
    WorkflowTypeRepo::find_by_id(pool, type_id)
        .await?
        .ok_or_else(|| not_found("WorkflowType", type_id))?;
    let def =
        WorkflowDefinitionRepo::create_draft(pool, type_id, name.trim(), description, Some(created_by))
            .await?;
    tracing::info!(definition_id = def.id, version = def.version, "Workflow definition drafted");
    Ok(def)
}

pub async fn update_definition(
    pool: &PgPool,
    id: DbId,
    input: &UpdateWorkflowDefinition,
) -> AppResult<WorkflowDefinition> {
    if let Some(def) = WorkflowDefinitionRepo::update_draft(pool, id, input).await? {
        return Ok(def);
    }
    let def = WorkflowDefinitionRepo::find_by_id(pool, id)
        .await?
        .ok_or_else(|| not_found("WorkflowDefinition", id))?;
    if status_of(&def)? != DefinitionStatus::Draft {
        return Err(invalid_state(format!(
            "Definition {id} is {} and can no longer be edited",
            status_of(&def)?
        )));
    }
    Err(stale("WorkflowDefinition", id))
}

/// Delete a draft together with its nodes.
pub async fn delete_definition(pool: &PgPool, id: DbId) -> AppResult<()> {
    let mut tx = pool.begin().await?;
    let def = WorkflowDefinitionRepo::find_for_update(&mut *tx, id)
        .await?
        .ok_or_else(|| not_found("WorkflowDefinition", id))?;
    if status_of(&def)? != DefinitionStatus::Draft {
        return Err(invalid_state(format!(
            "Only draft definitions can be deleted; definition {id} is {}",
            status_of(&def)?
        )));
    }
    if WorkflowDefinitionRepo::has_instances(&mut *tx, id).await? {
        return Err(CoreError::Conflict(format!(
            "Definition {id} has instances and cannot be deleted"
        ))
        .into());
    }
    WorkflowDefinitionRepo::delete_draft(&mut *tx, id).await?;
    tx.commit().await?;
    tracing::info!(definition_id = id, "Draft definition deleted");
    Ok(())
}

/// Copy a definition and its nodes into the next draft version.
pub async fn new_version(pool: &PgPool, id: DbId, created_by: DbId) -> AppResult<WorkflowDefinition> {
    let mut tx = pool.begin().await?;
    let source = WorkflowDefinitionRepo::find_for_share(&mut *tx, id)
        .await?
        .ok_or_else(|| not_found("WorkflowDefinition", id))?;
    let draft = WorkflowDefinitionRepo::create_draft(
        &mut *tx,
        source.type_id,
        &source.name,
        source.description.as_deref(),
        Some(created_by),
    )
    .await?;
    let copied = WorkflowNodeRepo::clone_into(&mut *tx, source.id, draft.id).await?;
    tx.commit().await?;
    tracing::info!(
        source_id = source.id,
        definition_id = draft.id,
        version = draft.version,
        nodes = copied,
        "Definition version drafted",
    );
    Ok(draft)
}

pub async fn add_node(pool: &PgPool, input: &CreateWorkflowNode) -> AppResult<WorkflowNode> {
    NodeKind::parse(input.kind)?;
    if let Some(policy) = input.policy {
        ApprovalPolicy::parse(policy)?;
    }
    let mut tx = pool.begin().await?;
    lock_draft(&mut *tx, input.definition_id).await?;
    let node = WorkflowNodeRepo::create(&mut *tx, input).await?;
    tx.commit().await?;
    Ok(node)
}

pub async fn update_node(
    pool: &PgPool,
    id: DbId,
    input: &UpdateWorkflowNode,
) -> AppResult<WorkflowNode> {
    if let Some(kind) = input.kind {
        NodeKind::parse(kind)?;
    }
    if let Some(policy) = input.policy {
        ApprovalPolicy::parse(policy)?;
    }
    let mut tx = pool.begin().await?;
    let node = WorkflowNodeRepo::find_by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| not_found("WorkflowNode", id))?;
    lock_draft(&mut *tx, node.definition_id).await?;
    let updated = WorkflowNodeRepo::update(&mut *tx, id, input)
        .await?
        .ok_or_else(|| stale("WorkflowNode", id))?;
    tx.commit().await?;
    Ok(updated)
}

pub async fn delete_node(pool: &PgPool, id: DbId) -> AppResult<()> {
    let mut tx = pool.begin().await?;
    let node = WorkflowNodeRepo::find_by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| not_found("WorkflowNode", id))?;
    lock_draft(&mut *tx, node.definition_id).await?;
    WorkflowNodeRepo::delete(&mut *tx, id).await?;
    tx.commit().await?;
    Ok(())
}

/// Validate a draft's graph and make it the published version of its
/// `(type, name)`, disabling whichever version was published before.
pub async fn publish(pool: &PgPool, id: DbId) -> AppResult<WorkflowDefinition> {
    let mut tx = pool.begin().await?;
    let def = publish_in_tx(&mut *tx, id).await?;
    tx.commit().await?;
    Ok(def)
}

pub async fn publish_in_tx(conn: &mut PgConnection, id: DbId) -> AppResult<WorkflowDefinition> {
    let def = WorkflowDefinitionRepo::find_for_update(&mut *conn, id)
        .await?
        .ok_or_else(|| not_found("WorkflowDefinition", id))?;
    let status = status_of(&def)?;
    if status != DefinitionStatus::Draft {
        return Err(invalid_state(format!(
            "Only draft definitions can be published; definition {id} is {status}"
        )));
    }

    let nodes = load_flow_nodes(conn, id).await?;
    validate_definition(&nodes)?;

    let previous = WorkflowDefinitionRepo::find_published(&mut *conn, def.type_id, &def.name).await?;
    if let Some(prev) = &previous {
        WorkflowDefinitionRepo::set_status(
            &mut *conn,
            prev.id,
            DefinitionStatus::Published,
            DefinitionStatus::Disabled,
        )
        .await?
        .ok_or_else(|| stale("WorkflowDefinition", prev.id))?;
    }

    let published = WorkflowDefinitionRepo::set_status(
        &mut *conn,
        id,
        DefinitionStatus::Draft,
        DefinitionStatus::Published,
    )
    .await?
    .ok_or_else(|| stale("WorkflowDefinition", id))?;

    tracing::info!(
        definition_id = id,
        version = published.version,
        superseded = previous.as_ref().map(|p| p.id),
        nodes = nodes.len(),
        "Workflow definition published",
    );
    Ok(published)
}

/// Retire a published definition. Refused while any instance still runs.
pub async fn disable(pool: &PgPool, id: DbId) -> AppResult<WorkflowDefinition> {
    let mut tx = pool.begin().await?;
    let def = WorkflowDefinitionRepo::find_for_update(&mut *tx, id)
        .await?
        .ok_or_else(|| not_found("WorkflowDefinition", id))?;
    let status = status_of(&def)?;
    if status != DefinitionStatus::Published {
        return Err(invalid_state(format!(
            "Only published definitions can be disabled; definition {id} is {status}"
        )));
    }
    if WorkflowDefinitionRepo::has_running_instances(&mut *tx, id).await? {
        return Err(CoreError::Conflict(format!(
            "Definition {id} still has running instances"
        ))
        .into());
    }
    let disabled = WorkflowDefinitionRepo::set_status(
        &mut *tx,
        id,
        DefinitionStatus::Published,
        DefinitionStatus::Disabled,
    )
    .await?
    .ok_or_else(|| stale("WorkflowDefinition", id))?;
    tx.commit().await?;
    tracing::info!(definition_id = id, "Workflow definition disabled");
    Ok(disabled)
}
