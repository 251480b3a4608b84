//! The Solution Deployment Plan.
//!
//! Everything a deployment run needs to know about its source travels in one
//! [`SolutionDeploymentPlan`]: the target [`DeploymentPlan`], the recovered source items and
//! the [`DeployConfig`] inventory (`deploy.config.json`) describing the source workspace.
//!
//! Plans are built either by snapshotting a live workspace (see `framework::core::export`) or
//! by loading an [`ExportBundle`] with [`SolutionDeploymentPlan::from_bundle`].

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::framework::core::deployment_plan::DeploymentPlan;
use crate::framework::core::item_definition::{DefinitionError, DefinitionPart, ItemDefinition};
use crate::infrastructure::exports::ExportBundle;
use crate::infrastructure::fabric::models::ItemType;
use crate::utilities::constants::{
    DEPLOY_CONFIG_FILE, PLATFORM_CONFIG_VERSION, PLATFORM_FILE, PLATFORM_SCHEMA_URL,
    RUN_ON_CREATE_MARKER,
};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BundleError {
    #[error("Export bundle has no {DEPLOY_CONFIG_FILE}")]
    MissingDeployConfig,

    #[error("Failed to parse {DEPLOY_CONFIG_FILE}")]
    InvalidDeployConfig(#[source] serde_json::Error),

    #[error("Failed to parse item metadata at '{path}'")]
    InvalidPlatformFile {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

/// One deployable item recovered from a source.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentItem {
    pub display_name: String,
    pub logical_id: String,
    pub item_type: ItemType,
    pub definition: ItemDefinition,
    /// Trigger a remote run after the item is first created.
    pub run_on_create: bool,
}

impl DeploymentItem {
    pub fn new(display_name: impl Into<String>, item_type: ItemType, definition: ItemDefinition) -> Self {
        let display_name = display_name.into();
        Self {
            run_on_create: display_name.contains(RUN_ON_CREATE_MARKER),
            display_name,
            logical_id: nil_logical_id(),
            item_type,
            definition,
        }
    }

    /// `{displayName}.{type}`
    pub fn item_name(&self) -> String {
        format!("{}.{}", self.display_name, self.item_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceItem {
    pub id: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
}

impl SourceItem {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.display_name, self.item_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceShortcut {
    #[serde(default)]
    pub connection_id: Option<String>,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub subpath: Option<String>,
    #[serde(rename = "type")]
    pub shortcut_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLakehouse {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcuts: Option<Vec<SourceShortcut>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConnection {
    pub id: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub connection_type: String,
    pub path: String,
    #[serde(default)]
    pub credential_type: Option<String>,
}

/// Contents of `deploy.config.json`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created: Option<DateTime<Utc>>,
    pub source_workspace_id: String,
    #[serde(default)]
    pub solution_name: String,
    #[serde(default)]
    pub source_workspace_description: Option<String>,
    #[serde(default)]
    pub source_items: Vec<SourceItem>,
    #[serde(default)]
    pub source_lakehouses: Vec<SourceLakehouse>,
    #[serde(default)]
    pub source_connections: Vec<SourceConnection>,
}

impl DeployConfig {
    pub fn from_slice(content: &[u8]) -> Result<Self, BundleError> {
        serde_json::from_slice(content).map_err(BundleError::InvalidDeployConfig)
    }

    /// `{displayName}.{type}` of every source item.
    pub fn source_item_names(&self) -> HashSet<String> {
        self.source_items
            .iter()
            .map(SourceItem::qualified_name)
            .collect()
    }

    pub fn lakehouse_names(&self) -> HashSet<&str> {
        self.source_lakehouses
            .iter()
            .map(|lakehouse| lakehouse.display_name.as_str())
            .collect()
    }

    pub fn find_source_item(&self, display_name: &str, item_type: &ItemType) -> Option<&SourceItem> {
        self.source_items
            .iter()
            .find(|item| item.display_name == display_name && &item.item_type == item_type)
    }
}

/// Accepts RFC 3339 as well as zone-less timestamps, and drops anything unparseable.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|text| {
        DateTime::parse_from_rfc3339(&text)
            .map(|parsed| parsed.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }))
}

/// The `.platform` file stored in every exported item folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformFile {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub metadata: PlatformMetadata,
    pub config: PlatformConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformMetadata {
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_on_create: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConfig {
    pub version: String,
    pub logical_id: String,
}

impl PlatformFile {
    pub fn new(display_name: &str, item_type: ItemType) -> Self {
        Self {
            schema: Some(PLATFORM_SCHEMA_URL.to_string()),
            metadata: PlatformMetadata {
                item_type,
                display_name: display_name.to_string(),
                description: None,
                run_on_create: None,
            },
            config: PlatformConfig {
                version: PLATFORM_CONFIG_VERSION.to_string(),
                logical_id: nil_logical_id(),
            },
        }
    }
}

pub fn nil_logical_id() -> String {
    uuid::Uuid::nil().to_string()
}

#[derive(Debug, Clone)]
pub struct SolutionDeploymentPlan {
    pub plan: DeploymentPlan,
    pub items: Vec<DeploymentItem>,
    pub config: DeployConfig,
}

impl SolutionDeploymentPlan {
    pub fn new(plan: DeploymentPlan, items: Vec<DeploymentItem>, config: DeployConfig) -> Self {
        Self {
            plan,
            items,
            config,
        }
    }

    /// Builds a plan from an export bundle.
    ///
    /// Every folder holding a `.platform` file is one item; the other files under that folder
    /// become its definition parts, with paths relative to the folder. Files are visited in
    /// path order so part order is stable across stores.
    pub fn from_bundle(plan: DeploymentPlan, bundle: &ExportBundle) -> Result<Self, BundleError> {
        let config = bundle
            .get(DEPLOY_CONFIG_FILE)
            .ok_or(BundleError::MissingDeployConfig)
            .and_then(|file| DeployConfig::from_slice(&file.content))?;

        let mut files: Vec<_> = bundle.files().iter().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let mut items: BTreeMap<String, DeploymentItem> = BTreeMap::new();
        for file in files.iter().filter(|file| is_platform_file(&file.path)) {
            let metadata: PlatformFile = serde_json::from_slice(&file.content).map_err(|source| {
                BundleError::InvalidPlatformFile {
                    path: file.path.clone(),
                    source,
                }
            })?;
            let folder = parent_folder(&file.path).to_string();
            let display_name = metadata.metadata.display_name;
            let run_on_create = metadata
                .metadata
                .run_on_create
                .unwrap_or_else(|| display_name.contains(RUN_ON_CREATE_MARKER));

            items.insert(
                folder,
                DeploymentItem {
                    display_name,
                    logical_id: metadata.config.logical_id,
                    item_type: metadata.metadata.item_type,
                    definition: ItemDefinition::empty(),
                    run_on_create,
                },
            );
        }

        for file in files.iter().filter(|file| !is_platform_file(&file.path)) {
            let owner = items
                .keys()
                .filter(|folder| !folder.is_empty() && file.path.starts_with(&format!("{folder}/")))
                .max_by_key(|folder| folder.len())
                .cloned();

            match owner {
                Some(folder) => {
                    let relative = &file.path[folder.len() + 1..];
                    if let Some(item) = items.get_mut(&folder) {
                        item.definition
                            .push_part(DefinitionPart::from_bytes(relative, &file.content))?;
                    }
                }
                None if file.path == DEPLOY_CONFIG_FILE => {}
                None => debug!("Ignoring bundle file outside any item: {}", file.path),
            }
        }

        Ok(Self::new(plan, items.into_values().collect(), config))
    }

    pub fn items_of_type<'a>(
        &'a self,
        item_type: &'a ItemType,
    ) -> impl Iterator<Item = &'a DeploymentItem> + 'a {
        self.items
            .iter()
            .filter(move |item| &item.item_type == item_type)
    }

    pub fn solution_name(&self) -> &str {
        &self.config.solution_name
    }
}

fn is_platform_file(path: &str) -> bool {
    path.rsplit('/').next() == Some(PLATFORM_FILE)
}

fn parent_folder(path: &str) -> &str {
    path.rfind('/').map(|idx| &path[..idx]).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::exports::ExportFile;
    use crate::utilities::json::{to_vec_styled, JsonStyle};

    fn platform(display_name: &str, item_type: ItemType) -> Vec<u8> {
        to_vec_styled(&PlatformFile::new(display_name, item_type), JsonStyle::EXPORT).unwrap()
    }

    fn config_json() -> Vec<u8> {
        br#"{
            "exportName": "nightly",
            "created": "2024-03-05T10:15:00.123",
            "sourceWorkspaceId": "ws-1",
            "solutionName": "Product Sales",
            "sourceWorkspaceDescription": "Product Sales",
            "sourceItems": [
                {"id": "lh-1", "displayName": "sales", "type": "Lakehouse"},
                {"id": "nb-1", "displayName": "Create Tables", "type": "Notebook"}
            ],
            "sourceLakehouses": [
                {"id": "lh-1", "displayName": "sales", "server": "srv.sql", "database": "ep-1"}
            ],
            "sourceConnections": [
                {"id": "c-1", "displayName": "Web", "type": "Web", "path": "https://a/b/", "credentialType": "Anonymous"}
            ]
        }"#
        .to_vec()
    }

    #[test]
    fn test_deploy_config_parses_camel_case() {
        let config = DeployConfig::from_slice(&config_json()).unwrap();

        assert_eq!(config.source_workspace_id, "ws-1");
        assert_eq!(config.solution_name, "Product Sales");
        assert!(config.created.is_some());
        assert_eq!(config.source_items[1].item_type, ItemType::Notebook);
        assert!(config.source_lakehouses[0].shortcuts.is_none());
        assert!(config.source_item_names().contains("Create Tables.Notebook"));
    }

    #[test]
    fn test_unparseable_created_is_dropped() {
        let config =
            DeployConfig::from_slice(br#"{"sourceWorkspaceId":"ws","created":"yesterday"}"#).unwrap();
        assert!(config.created.is_none());
    }

    #[test]
    fn test_bundle_loading_groups_parts_by_item_folder() {
        let bundle = ExportBundle::new(vec![
            ExportFile::new("deploy.config.json", config_json()),
            ExportFile::new("sales.Lakehouse/.platform", platform("sales", ItemType::Lakehouse)),
            ExportFile::new(
                "Create Tables.Notebook/notebook-content.py",
                b"spark.sql('x')".to_vec(),
            ),
            ExportFile::new(
                "Create Tables.Notebook/.platform",
                platform("Create Tables", ItemType::Notebook),
            ),
            ExportFile::new(
                "Sales.Report/StaticResources/theme.json",
                b"{}".to_vec(),
            ),
            ExportFile::new("Sales.Report/.platform", platform("Sales", ItemType::Report)),
            ExportFile::new("README.md", b"notes".to_vec()),
        ]);

        let plan = SolutionDeploymentPlan::from_bundle(DeploymentPlan::staged(), &bundle).unwrap();

        assert_eq!(plan.items.len(), 3);
        let notebook = plan.items_of_type(&ItemType::Notebook).next().unwrap();
        assert!(notebook.run_on_create);
        assert_eq!(
            notebook.definition.part_text("notebook-content.py").unwrap().unwrap(),
            "spark.sql('x')"
        );

        let report = plan.items_of_type(&ItemType::Report).next().unwrap();
        assert!(!report.run_on_create);
        assert!(report.definition.part("StaticResources/theme.json").is_some());

        let lakehouse = plan.items_of_type(&ItemType::Lakehouse).next().unwrap();
        assert!(lakehouse.definition.is_empty());
    }

    #[test]
    fn test_explicit_run_on_create_wins_over_name() {
        let mut metadata = PlatformFile::new("Load Data", ItemType::DataPipeline);
        metadata.metadata.run_on_create = Some(true);

        let bundle = ExportBundle::new(vec![
            ExportFile::new("deploy.config.json", config_json()),
            ExportFile::new(
                "Load Data.DataPipeline/.platform",
                to_vec_styled(&metadata, JsonStyle::EXPORT).unwrap(),
            ),
        ]);

        let plan = SolutionDeploymentPlan::from_bundle(DeploymentPlan::staged(), &bundle).unwrap();
        assert!(plan.items[0].run_on_create);
    }

    #[test]
    fn test_missing_deploy_config() {
        let bundle = ExportBundle::new(vec![ExportFile::new(
            "sales.Lakehouse/.platform",
            platform("sales", ItemType::Lakehouse),
        )]);

        assert!(matches!(
            SolutionDeploymentPlan::from_bundle(DeploymentPlan::staged(), &bundle),
            Err(BundleError::MissingDeployConfig)
        ));
    }
}
