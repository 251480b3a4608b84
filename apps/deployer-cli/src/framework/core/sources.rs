//! Where a solution is deployed from.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use super::deployment_plan::DeploymentPlan;
use super::execute::DeploymentError;
use super::export::snapshot_workspace;
use super::solution_plan::{BundleError, DeployConfig, SolutionDeploymentPlan};
use crate::framework::progress::ProgressNotifier;
use crate::infrastructure::exports::ExportSource;
use crate::infrastructure::fabric::WorkspaceItemStore;
use crate::utilities::constants::DEPLOY_CONFIG_FILE;

/// A live workspace or an export, local or on a git branch.
#[derive(Clone)]
pub enum SolutionSource {
    Workspace(String),
    Export(Arc<dyn ExportSource>),
}

impl SolutionSource {
    pub fn describe(&self) -> String {
        match self {
            SolutionSource::Workspace(name) => format!("workspace {name}"),
            SolutionSource::Export(source) => source.describe(),
        }
    }

    /// Loads the solution and pairs it with `plan`.
    ///
    /// A live workspace is snapshotted exactly as an export of it would be.
    pub async fn load(
        &self,
        store: &dyn WorkspaceItemStore,
        plan: DeploymentPlan,
        notifier: &ProgressNotifier,
    ) -> Result<SolutionDeploymentPlan, DeploymentError> {
        let solution = match self {
            SolutionSource::Workspace(name) => snapshot_workspace(store, name, notifier)
                .await?
                .into_solution(plan),
            SolutionSource::Export(source) => {
                SolutionDeploymentPlan::from_bundle(plan, &source.read_bundle()?)?
            }
        };
        info!(
            "Loaded {} items of {} from {}",
            solution.items.len(),
            solution.solution_name(),
            self.describe()
        );
        Ok(solution)
    }

    /// The solution name, which tenant workspaces carry as their description.
    pub async fn solution_name(
        &self,
        store: &dyn WorkspaceItemStore,
    ) -> Result<String, DeploymentError> {
        match self {
            SolutionSource::Workspace(name) => Ok(store
                .get_workspace_by_name(name)
                .await?
                .ok_or_else(|| DeploymentError::WorkspaceNotFound(name.clone()))?
                .description
                .unwrap_or_default()),
            SolutionSource::Export(source) => {
                let bundle = source.read_bundle()?;
                let file = bundle
                    .get(DEPLOY_CONFIG_FILE)
                    .ok_or(BundleError::MissingDeployConfig)?;
                Ok(DeployConfig::from_slice(&file.content)?.solution_name)
            }
        }
    }
}

impl fmt::Debug for SolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SolutionSource").field(&self.describe()).finish()
    }
}
