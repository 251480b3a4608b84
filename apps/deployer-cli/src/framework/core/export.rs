//! Capturing a live workspace as a portable solution.
//!
//! [`snapshot_workspace`] reads a workspace into the same shape an export bundle loads into, so
//! deploying from a live workspace and deploying from an export run the same engine.
//! [`build_export_bundle`] lays a snapshot out as files.

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use super::deployment_plan::DeploymentPlan;
use super::execute::DeploymentError;
use super::item_definition::ItemDefinition;
use super::solution_plan::{
    DeployConfig, DeploymentItem, PlatformFile, SolutionDeploymentPlan, SourceConnection,
    SourceItem, SourceLakehouse, SourceShortcut,
};
use crate::framework::progress::ProgressNotifier;
use crate::infrastructure::exports::{ExportBundle, ExportFile, ExportSink};
use crate::infrastructure::fabric::models::{strip_workspace_prefix, Item, ItemType, Workspace};
use crate::infrastructure::fabric::WorkspaceItemStore;
use crate::utilities::constants::{ADLS_GEN2_SHORTCUT_TYPE, DEPLOY_CONFIG_FILE, PLATFORM_FILE};
use crate::utilities::json::{to_vec_styled, JsonStyle};

/// A workspace read into solution form
#[derive(Debug, Clone)]
pub struct WorkspaceSnapshot {
    pub workspace: Workspace,
    pub items: Vec<DeploymentItem>,
    pub config: DeployConfig,
}

impl WorkspaceSnapshot {
    pub fn into_solution(self, plan: DeploymentPlan) -> SolutionDeploymentPlan {
        SolutionDeploymentPlan::new(plan, self.items, self.config)
    }
}

/// Reads the exportable content of a workspace.
///
/// Lakehouses, notebooks, pipelines, semantic models other than lakehouse default models, and
/// reports are captured in that order. Lakehouses are captured without a definition.
#[instrument(skip(store, notifier))]
pub async fn snapshot_workspace(
    store: &dyn WorkspaceItemStore,
    workspace_name: &str,
    notifier: &ProgressNotifier,
) -> Result<WorkspaceSnapshot, DeploymentError> {
    let workspace = store
        .get_workspace_by_name(workspace_name)
        .await?
        .ok_or_else(|| DeploymentError::WorkspaceNotFound(workspace_name.to_string()))?;
    notifier.step(format!("Read workspace {}", workspace.display_name));

    let inventory = store.list_items(&workspace.id, None).await?;
    let of_type = |item_type: ItemType| {
        inventory
            .iter()
            .filter(|item| item.item_type == item_type)
            .collect::<Vec<&Item>>()
    };
    let lakehouses = of_type(ItemType::Lakehouse);
    let lakehouse_names: Vec<&str> = lakehouses
        .iter()
        .map(|item| item.display_name.as_str())
        .collect();
    let semantic_models: Vec<&Item> = of_type(ItemType::SemanticModel)
        .into_iter()
        .filter(|item| !lakehouse_names.contains(&item.display_name.as_str()))
        .collect();

    let mut captured: Vec<&Item> = lakehouses.clone();
    captured.extend(of_type(ItemType::Notebook));
    captured.extend(of_type(ItemType::DataPipeline));
    captured.extend(semantic_models);
    captured.extend(of_type(ItemType::Report));

    let mut items = Vec::with_capacity(captured.len());
    for item in &captured {
        let definition = if item.item_type == ItemType::Lakehouse {
            ItemDefinition::empty()
        } else {
            notifier.substep(format!("Read {}", item.qualified_name()));
            store
                .get_item_definition(&workspace.id, &item.id)
                .await?
                .without_part(PLATFORM_FILE)
        };
        items.push(DeploymentItem::new(
            &item.display_name,
            item.item_type.clone(),
            definition,
        ));
    }

    let mut source_lakehouses = Vec::with_capacity(lakehouses.len());
    for lakehouse in &lakehouses {
        let endpoint = store
            .get_lakehouse_sql_endpoint(&workspace.id, &lakehouse.id)
            .await?;
        let shortcuts: Vec<SourceShortcut> = store
            .list_shortcuts(&workspace.id, &lakehouse.id)
            .await?
            .into_iter()
            .filter(|shortcut| {
                shortcut
                    .shortcut_type
                    .eq_ignore_ascii_case(ADLS_GEN2_SHORTCUT_TYPE)
            })
            .map(|shortcut| SourceShortcut {
                connection_id: shortcut.connection_id,
                name: shortcut.name,
                path: shortcut.path,
                location: shortcut.location,
                subpath: shortcut.subpath,
                shortcut_type: shortcut.shortcut_type,
            })
            .collect();
        source_lakehouses.push(SourceLakehouse {
            id: lakehouse.id.clone(),
            display_name: lakehouse.display_name.clone(),
            server: endpoint.as_ref().map(|endpoint| endpoint.connection_string.clone()),
            database: endpoint.map(|endpoint| endpoint.id),
            shortcuts: (!shortcuts.is_empty()).then_some(shortcuts),
        });
    }

    let source_connections = store
        .get_workspace_connections(&workspace.id)
        .await?
        .into_iter()
        .map(|connection| SourceConnection {
            id: connection.id,
            display_name: strip_workspace_prefix(&connection.display_name).to_string(),
            connection_type: connection.connection_type,
            path: connection.path,
            credential_type: connection.credential_type,
        })
        .collect();

    let description = workspace.description.clone().unwrap_or_default();
    let config = DeployConfig {
        source_workspace_id: workspace.id.clone(),
        solution_name: description.clone(),
        source_workspace_description: Some(description),
        source_items: captured
            .iter()
            .map(|item| SourceItem {
                id: item.id.clone(),
                display_name: item.display_name.clone(),
                item_type: item.item_type.clone(),
            })
            .collect(),
        source_lakehouses,
        source_connections,
        ..DeployConfig::default()
    };

    info!(
        "Captured {} items from workspace {}",
        items.len(),
        workspace.display_name
    );
    Ok(WorkspaceSnapshot {
        workspace,
        items,
        config,
    })
}

/// Lays a snapshot out as export files.
///
/// Every item gets a `{displayName}.{type}` folder with a `.platform` file; items with a
/// definition also get their part files. `deploy.config.json` sits at the root.
pub fn build_export_bundle(snapshot: &WorkspaceSnapshot) -> Result<ExportBundle, DeploymentError> {
    let mut bundle = ExportBundle::default();

    for item in &snapshot.items {
        let folder = item.item_name();
        let mut platform = PlatformFile::new(&item.display_name, item.item_type.clone());
        if item.run_on_create {
            platform.metadata.run_on_create = Some(true);
        }
        bundle.push(ExportFile::new(
            format!("{folder}/{PLATFORM_FILE}"),
            to_vec_styled(&platform, JsonStyle::EXPORT)?,
        ));

        for part in item.definition.parts() {
            bundle.push(ExportFile::new(
                format!("{folder}/{}", part.path),
                part.bytes()?,
            ));
        }
        debug!("Laid out {}", folder);
    }

    bundle.push(ExportFile::new(
        DEPLOY_CONFIG_FILE,
        to_vec_styled(&snapshot.config, JsonStyle::EXPORT)?,
    ));
    Ok(bundle)
}

/// Exports a live workspace to `sink`.
///
/// # Arguments
/// * `export_name` - Recorded in `deploy.config.json`
/// * `comment` - Free text recorded next to the name
/// * `created` - Export timestamp
pub async fn export_workspace(
    store: &dyn WorkspaceItemStore,
    workspace_name: &str,
    export_name: &str,
    comment: Option<String>,
    created: DateTime<Utc>,
    sink: &dyn ExportSink,
    notifier: &ProgressNotifier,
) -> Result<ExportBundle, DeploymentError> {
    notifier.solution(format!("Export {} to {}", workspace_name, sink.describe()));

    let mut snapshot = snapshot_workspace(store, workspace_name, notifier).await?;
    snapshot.config.export_name = Some(export_name.to_string());
    snapshot.config.comment = comment;
    snapshot.config.created = Some(created);

    let bundle = build_export_bundle(&snapshot)?;
    notifier.step(format!("Write {} files", bundle.len()));
    sink.write_bundle(&bundle)?;

    notifier.solution_complete(format!("Exported {} as {}", workspace_name, export_name));
    Ok(bundle)
}
