//! # Deployment Execution Module
//!
//! Runs a [`SolutionDeploymentPlan`] against a named target workspace. Two entry points exist:
//! - [`deploy`] recreates the target workspace from scratch
//! - [`update`] reconciles an existing workspace, either fully (followed by orphan cleanup) or
//!   for reports only
//!
//! Both walk [`DeployStage::ORDER`] through [`deployers::run_stage`]. The target inventory is
//! read once per run; items created during the run are tracked in [`RunState`] instead of being
//! re-queried.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, instrument};

use super::deployers;
use super::deployment_plan::DeploymentPlan;
use super::item_definition::DefinitionError;
use super::orphans::{self, OrphanReport};
use super::redirects::{ConnectionSecrets, RedirectError, StageRedirects};
use super::remote_jobs::{PollingSettings, RemoteRunOutcome};
use super::solution_plan::{BundleError, SolutionDeploymentPlan};
use super::stages::DeployStage;
use crate::framework::progress::ProgressNotifier;
use crate::infrastructure::exports::ExportStoreError;
use crate::infrastructure::fabric::models::{Item, ItemType, SqlEndpointInfo, Workspace};
use crate::infrastructure::fabric::{ItemStoreError, WorkspaceItemStore};
use crate::infrastructure::powerbi::SemanticModelGateway;
use crate::utilities::constants::DEFAULT_SQL_ENDPOINT_POLL_INTERVAL;
use crate::utilities::duration;

/// Errors that abort a deployment run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeploymentError {
    #[error("Workspace '{0}' does not exist")]
    WorkspaceNotFound(String),

    #[error("Failed to communicate with the workspace platform")]
    Store(#[from] ItemStoreError),

    #[error(transparent)]
    Redirect(#[from] RedirectError),

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("Failed to load the export")]
    Export(#[from] ExportStoreError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error("Failed to serialize the deploy configuration")]
    Serialize(#[from] serde_json::Error),
}

fn default_sql_endpoint_interval() -> Duration {
    duration::parse_default(DEFAULT_SQL_ENDPOINT_POLL_INTERVAL)
}

/// Knobs of the engine that come from configuration rather than from the plan
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub secrets: ConnectionSecrets,
    /// Capacity freshly created workspaces are assigned to
    pub capacity_id: Option<String>,
    pub polling: PollingSettings,
    pub sql_endpoint_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            secrets: ConnectionSecrets::default(),
            capacity_id: None,
            polling: PollingSettings::default(),
            sql_endpoint_interval: default_sql_endpoint_interval(),
        }
    }
}

/// Collaborators a run talks to
pub struct DeploymentContext<'a> {
    pub store: &'a dyn WorkspaceItemStore,
    pub models: &'a dyn SemanticModelGateway,
    pub notifier: &'a ProgressNotifier,
    pub settings: &'a EngineSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Deploy,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    #[default]
    FullUpdate,
    ReportsOnly,
}

/// A lakehouse as it exists in the target workspace
#[derive(Debug, Clone)]
pub struct TargetLakehouse {
    pub item: Item,
    pub sql_endpoint: SqlEndpointInfo,
}

/// Mutable state threaded through the stages of one run.
pub struct RunState<'p> {
    pub solution: &'p SolutionDeploymentPlan,
    pub mode: RunMode,
    pub workspace: Workspace,
    /// Target items as listed when the run started
    pub inventory: Vec<Item>,
    pub redirects: StageRedirects,
    /// Lakehouses by display name
    pub lakehouses: BTreeMap<String, TargetLakehouse>,
    /// Target semantic model ids by display name
    pub semantic_models: BTreeMap<String, String>,
    pub summary: DeploymentSummary,
}

impl<'p> RunState<'p> {
    pub fn new(
        solution: &'p SolutionDeploymentPlan,
        mode: RunMode,
        workspace: Workspace,
        inventory: Vec<Item>,
    ) -> Self {
        Self {
            solution,
            mode,
            workspace,
            inventory,
            redirects: StageRedirects::default(),
            lakehouses: BTreeMap::new(),
            semantic_models: BTreeMap::new(),
            summary: DeploymentSummary::default(),
        }
    }

    pub fn plan(&self) -> &DeploymentPlan {
        &self.solution.plan
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace.id
    }

    /// Looks an item up in the inventory read at the start of the run.
    pub fn find_target(&self, display_name: &str, item_type: &ItemType) -> Option<&Item> {
        self.inventory
            .iter()
            .find(|item| item.is(display_name, item_type))
    }
}

/// What a run did to the target workspace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentSummary {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub remote_runs: Vec<(String, RemoteRunOutcome)>,
    pub orphans: OrphanReport,
}

/// Deploys a solution into a freshly created workspace.
///
/// A workspace already carrying `target_name` is deleted first.
///
/// # Arguments
/// * `ctx` - Platform clients, progress channel and engine settings
/// * `solution` - Items, deploy configuration and the plan to apply
/// * `target_name` - Display name of the workspace to create
///
/// # Returns
/// * `Result<DeploymentSummary, DeploymentError>` - What was created, or the error that stopped the run
#[instrument(skip_all, fields(target = %target_name))]
pub async fn deploy(
    ctx: &DeploymentContext<'_>,
    solution: &SolutionDeploymentPlan,
    target_name: &str,
) -> Result<DeploymentSummary, DeploymentError> {
    ctx.notifier.solution(format!(
        "Deploy solution {} to {}",
        solution.solution_name(),
        target_name
    ));
    show_plan(ctx.notifier, &solution.plan);

    ctx.notifier.step(format!("Create workspace {target_name}"));
    if let Some(existing) = ctx.store.get_workspace_by_name(target_name).await? {
        ctx.notifier
            .substep(format!("Delete existing workspace {}", existing.display_name));
        ctx.store.delete_workspace(&existing.id).await?;
    }
    let workspace = ctx.store.create_workspace(target_name).await?;
    if let Some(capacity_id) = &ctx.settings.capacity_id {
        ctx.store
            .assign_workspace_to_capacity(&workspace.id, capacity_id)
            .await?;
    }
    set_description(ctx, &workspace, solution).await?;
    info!("Created workspace {} ({})", workspace.display_name, workspace.id);

    let mut state = RunState::new(solution, RunMode::Deploy, workspace, Vec::new());
    for stage in DeployStage::ORDER {
        deployers::run_stage(ctx, &mut state, stage).await?;
    }

    ctx.notifier.solution_complete(format!(
        "Deployed {} to {}",
        solution.solution_name(),
        target_name
    ));
    Ok(state.summary)
}

/// Reconciles an existing workspace with a solution.
///
/// `FullUpdate` runs every stage in update mode and then deletes target items the solution
/// no longer contains. `ReportsOnly` rebinds reports to the semantic models already in the
/// target and leaves everything else alone.
#[instrument(skip_all, fields(target = %target_name, mode = ?mode))]
pub async fn update(
    ctx: &DeploymentContext<'_>,
    solution: &SolutionDeploymentPlan,
    target_name: &str,
    mode: UpdateMode,
) -> Result<DeploymentSummary, DeploymentError> {
    ctx.notifier.solution(format!(
        "Update {} in {}",
        solution.solution_name(),
        target_name
    ));
    show_plan(ctx.notifier, &solution.plan);

    let workspace = ctx
        .store
        .get_workspace_by_name(target_name)
        .await?
        .ok_or_else(|| DeploymentError::WorkspaceNotFound(target_name.to_string()))?;
    let inventory = ctx.store.list_items(&workspace.id, None).await?;
    info!(
        "Target workspace {} holds {} items",
        workspace.id,
        inventory.len()
    );

    let mut state = RunState::new(solution, RunMode::Update, workspace, inventory);

    match mode {
        UpdateMode::FullUpdate => {
            set_description(ctx, &state.workspace, solution).await?;
            for stage in DeployStage::ORDER {
                deployers::run_stage(ctx, &mut state, stage).await?;
            }

            ctx.notifier.step("Remove items no longer in the solution");
            let orphans = orphans::find_orphans(&solution.config.source_item_names(), &state.inventory);
            state.summary.orphans =
                orphans::delete_orphans(ctx.store, &state.workspace.id, &orphans, ctx.notifier).await;
        }
        UpdateMode::ReportsOnly => {
            deployers::reports::bind_existing_models(&mut state);
            deployers::run_stage(ctx, &mut state, DeployStage::Reports).await?;
        }
    }

    ctx.notifier.solution_complete(format!(
        "Updated {} in {}",
        solution.solution_name(),
        target_name
    ));
    Ok(state.summary)
}

async fn set_description(
    ctx: &DeploymentContext<'_>,
    workspace: &Workspace,
    solution: &SolutionDeploymentPlan,
) -> Result<(), ItemStoreError> {
    let description = solution
        .config
        .source_workspace_description
        .as_deref()
        .unwrap_or_else(|| solution.solution_name());
    ctx.store
        .update_workspace_description(&workspace.id, description)
        .await
}

fn show_plan(notifier: &ProgressNotifier, plan: &DeploymentPlan) {
    if plan.parameters.is_empty() {
        return;
    }
    notifier.table_header(format!("Deployment plan {}", plan.name));
    for (key, value) in &plan.parameters {
        notifier.table_row(key.as_str(), value.as_str());
    }
}
