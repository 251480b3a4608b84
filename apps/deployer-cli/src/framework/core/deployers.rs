//! Per item type deployers.
//!
//! Every deployer follows the same reconcile rule: look the source item up in the target
//! inventory by display name and type, replace the definition of a match wholesale, or create
//! the item when there is none. Items flagged `run_on_create` are run once after creation.

pub mod connections;
pub mod lakehouses;
pub mod notebooks;
pub mod pipelines;
pub mod reports;
pub mod semantic_models;

use std::time::Duration;

use tracing::{debug, instrument};

use super::execute::{DeploymentContext, DeploymentError, RunState};
use super::item_definition::ItemDefinition;
use super::remote_jobs;
use super::solution_plan::DeploymentItem;
use super::stages::DeployStage;
use crate::infrastructure::fabric::models::{CreateItemRequest, Item};

/// Whether [`reconcile_item`] created or updated the target
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    Created(Item),
    Updated(Item),
}

impl Reconciled {
    pub fn item(&self) -> &Item {
        match self {
            Reconciled::Created(item) | Reconciled::Updated(item) => item,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Reconciled::Created(_))
    }
}

/// Runs one stage of a deployment.
#[instrument(skip_all, fields(stage = %stage))]
pub async fn run_stage(
    ctx: &DeploymentContext<'_>,
    state: &mut RunState<'_>,
    stage: DeployStage,
) -> Result<(), DeploymentError> {
    debug!("Entering stage {}", stage);
    match stage {
        DeployStage::Connections => connections::deploy(ctx, state).await,
        DeployStage::Lakehouses => lakehouses::deploy(ctx, state).await,
        DeployStage::Shortcuts => lakehouses::deploy_shortcuts(ctx, state).await,
        DeployStage::Notebooks => notebooks::deploy(ctx, state).await,
        DeployStage::Pipelines => pipelines::deploy(ctx, state).await,
        DeployStage::SemanticModels => semantic_models::deploy(ctx, state).await,
        DeployStage::Reports => reports::deploy(ctx, state).await,
    }
}

/// Creates `source` in the target workspace or replaces the definition of its counterpart.
///
/// # Arguments
/// * `source` - The solution item
/// * `definition` - The source definition after substitution
pub async fn reconcile_item(
    ctx: &DeploymentContext<'_>,
    state: &mut RunState<'_>,
    source: &DeploymentItem,
    definition: ItemDefinition,
) -> Result<Reconciled, DeploymentError> {
    let workspace_id = state.workspace_id().to_string();

    match state
        .find_target(&source.display_name, &source.item_type)
        .cloned()
    {
        Some(existing) => {
            ctx.notifier
                .substep(format!("Update {} {}", source.item_type, source.display_name));
            ctx.store
                .update_item_definition(&workspace_id, &existing.id, definition)
                .await?;
            state.summary.updated.push(existing.qualified_name());
            Ok(Reconciled::Updated(existing))
        }
        None => {
            ctx.notifier
                .substep(format!("Create {} {}", source.item_type, source.display_name));
            let request = CreateItemRequest::new(&source.display_name, source.item_type.clone())
                .with_definition(definition);
            let created = ctx.store.create_item(&workspace_id, request).await?;
            state.summary.created.push(created.qualified_name());
            Ok(Reconciled::Created(created))
        }
    }
}

/// Runs a freshly created item when the solution asks for it.
pub(crate) async fn run_if_requested(
    ctx: &DeploymentContext<'_>,
    state: &mut RunState<'_>,
    source: &DeploymentItem,
    reconciled: &Reconciled,
    job_type: &str,
    interval: Duration,
) {
    if !(source.run_on_create && reconciled.was_created()) {
        return;
    }
    let item = reconciled.item();
    let outcome = remote_jobs::run_and_wait(
        ctx.store,
        state.workspace_id(),
        item,
        job_type,
        interval,
        ctx.notifier,
    )
    .await;
    state
        .summary
        .remote_runs
        .push((item.display_name.clone(), outcome));
}
