//! Redirect maps.
//!
//! A [`RedirectMap`] rewrites source identifiers and paths (connection ids, storage urls,
//! workspace and lakehouse ids, SQL endpoint names) into their target equivalents. Each
//! deployment stage gets its own map, see [`StageRedirects`], all layered on top of the
//! connection redirects produced by [`build_connection_redirects`].
//!
//! # Substitution policy
//!
//! [`RedirectMap::apply`] replaces all keys in a single left-to-right pass. At any position the
//! longest matching key wins, and replaced text is never scanned again, so the outcome does not
//! depend on insertion order even when one key is a substring of another.

use std::collections::BTreeMap;

use itertools::Itertools;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::framework::core::deployment_plan::{DeploymentPlan, ParameterKey};
use crate::framework::core::item_definition::DefinitionError;
use crate::framework::core::solution_plan::{SourceConnection, SourceLakehouse};
use crate::framework::progress::ProgressNotifier;
use crate::infrastructure::fabric::models::{
    strip_workspace_prefix, workspace_connection_name, Connection, ConnectionCredentials,
    CreateConnectionRequest, SqlEndpointInfo,
};
use crate::infrastructure::fabric::{ItemStoreError, WorkspaceItemStore};
use crate::utilities::constants::{ADLS_HOST_SUFFIX, LAKEHOUSE_CONNECTION_MARKER};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RedirectError {
    #[error("Connection '{name}' has unsupported type '{connection_type}'")]
    UnsupportedConnectionType {
        name: String,
        connection_type: String,
    },

    #[error("'{0}' is not an ADLS Gen2 location")]
    InvalidAdlsPath(String),

    #[error("Semantic model '{0}' does not exist in the target workspace")]
    ModelNotFound(String),

    #[error("Failed to build the substitution pattern")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Store(#[from] ItemStoreError),
}

/// Source string to target string substitutions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectMap {
    entries: BTreeMap<String, String>,
}

impl RedirectMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or overwrites a substitution. Empty keys and identity pairs are ignored.
    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let from = from.into();
        let to = to.into();
        if from.is_empty() || from == to {
            return;
        }
        self.entries.insert(from, to);
    }

    /// Adds a substitution unless one already exists for `from`.
    pub fn insert_if_absent(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let from = from.into();
        if !self.entries.contains_key(&from) {
            self.insert(from, to);
        }
    }

    pub fn get(&self, from: &str) -> Option<&str> {
        self.entries.get(from).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Rewrites every occurrence of every key in one pass.
    pub fn apply(&self, text: &str) -> Result<String, RedirectError> {
        if self.entries.is_empty() {
            return Ok(text.to_string());
        }

        // longest first so a key never loses to one of its own prefixes
        let pattern = self
            .entries
            .keys()
            .sorted_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)))
            .map(|key| regex::escape(key))
            .join("|");
        let regex = Regex::new(&pattern)?;

        Ok(regex
            .replace_all(text, |captures: &regex::Captures| {
                let matched = &captures[0];
                self.entries
                    .get(matched)
                    .cloned()
                    .unwrap_or_else(|| matched.to_string())
            })
            .into_owned())
    }
}

impl FromIterator<(String, String)> for RedirectMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut map = RedirectMap::new();
        for (from, to) in iter {
            map.insert(from, to);
        }
        map
    }
}

/// An ADLS Gen2 location split into account server, container and path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdlsLocation {
    /// `https://{account}.dfs.core.windows.net`, no trailing slash
    pub server: String,
    pub container_name: String,
    /// Path inside the container, starting with `/`
    pub container_path: String,
}

impl AdlsLocation {
    pub fn parse(path: &str) -> Result<Self, RedirectError> {
        let (account, rest) = path
            .split_once(ADLS_HOST_SUFFIX)
            .ok_or_else(|| RedirectError::InvalidAdlsPath(path.to_string()))?;
        let rest = rest.trim_start_matches('/');
        let (container_name, container_path) = match rest.split_once('/') {
            Some((container, tail)) => (container, format!("/{tail}")),
            None => (rest, "/".to_string()),
        };
        if container_name.is_empty() {
            return Err(RedirectError::InvalidAdlsPath(path.to_string()));
        }

        Ok(Self {
            server: format!("{account}{ADLS_HOST_SUFFIX}"),
            container_name: container_name.to_string(),
            container_path,
        })
    }

    /// `/{container}{containerPath}`, the connection path below the server.
    pub fn connection_path(&self) -> String {
        format!("/{}{}", self.container_name, self.container_path)
    }

    /// Full url of the location, without a trailing slash.
    pub fn root_url(&self) -> String {
        format!(
            "{}{}",
            self.server,
            self.connection_path().trim_end_matches('/')
        )
    }

    pub fn is_container_root(&self) -> bool {
        self.container_path.trim_matches('/').is_empty()
    }

    pub fn with_override(&self, plan: &DeploymentPlan) -> Self {
        match plan.adls_override() {
            Some(adls) => Self {
                server: adls.server.trim_end_matches('/').to_string(),
                container_name: adls.container_name.to_string(),
                container_path: adls.container_path.to_string(),
            },
            None => self.clone(),
        }
    }
}

/// Secrets used when connections are recreated in a target workspace.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConnectionSecrets {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub storage_account_key: String,
}

impl ConnectionSecrets {
    pub fn service_principal(&self) -> ConnectionCredentials {
        ConnectionCredentials::ServicePrincipal {
            tenant_id: self.tenant_id.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }

    pub fn storage_account_key(&self) -> ConnectionCredentials {
        ConnectionCredentials::AccountKey(self.storage_account_key.clone())
    }
}

impl std::fmt::Debug for ConnectionSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSecrets")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Recreates the source connections in the target workspace and returns their redirects.
///
/// Connections already present in `existing` (matched by name once the `Workspace[{id}]-`
/// prefix is removed) are reused instead of recreated, which keeps repeated updates from
/// producing duplicates.
///
/// # Arguments
/// * `store` - Platform to create connections on
/// * `source_connections` - Connections recorded for the source workspace
/// * `target_workspace_id` - Workspace the new connections are named after
/// * `plan` - Supplies the web and ADLS overrides
/// * `secrets` - Credentials attached to recreated connections
/// * `existing` - Connections already owned by the target workspace
///
/// # Returns
/// * A map with `sourceId -> targetId` and `sourcePath -> targetPath` entries
pub async fn build_connection_redirects(
    store: &dyn WorkspaceItemStore,
    source_connections: &[SourceConnection],
    target_workspace_id: &str,
    plan: &DeploymentPlan,
    secrets: &ConnectionSecrets,
    existing: &[Connection],
    notifier: &ProgressNotifier,
) -> Result<RedirectMap, RedirectError> {
    let mut redirects = RedirectMap::new();

    for source in source_connections {
        if source.display_name.contains(LAKEHOUSE_CONNECTION_MARKER) {
            debug!("Skipping lakehouse connection {}", source.display_name);
            continue;
        }

        let name = strip_workspace_prefix(&source.display_name);
        let reused = existing
            .iter()
            .find(|connection| strip_workspace_prefix(&connection.display_name) == name);

        match source.connection_type.as_str() {
            "Web" => {
                let url = plan
                    .parameter(ParameterKey::WebDatasourcePath)
                    .unwrap_or(&source.path);
                let mut target = match reused {
                    Some(connection) => connection.clone(),
                    None => {
                        notifier.substep(format!("Create connection to {url}"));
                        store
                            .create_connection(CreateConnectionRequest::anonymous_web(
                                workspace_connection_name(target_workspace_id, name),
                                url,
                            ))
                            .await?
                    }
                };
                if target.path.is_empty() {
                    target.path = url.to_string();
                }
                redirects.insert(source.id.as_str(), target.id.as_str());
                redirects.insert(source.path.as_str(), target.path.as_str());
            }
            "AzureDataLakeStorage" => {
                let source_location = AdlsLocation::parse(&source.path)?;
                let (target_id, target_location) = match reused {
                    Some(connection) => (
                        connection.id.clone(),
                        AdlsLocation::parse(&connection.path)
                            .unwrap_or_else(|_| source_location.with_override(plan)),
                    ),
                    None => {
                        let location = source_location.with_override(plan);
                        notifier.substep(format!(
                            "Create ADLS connection to {}{}",
                            location.server,
                            location.connection_path()
                        ));
                        let created = store
                            .create_connection(CreateConnectionRequest::adls_gen2(
                                workspace_connection_name(target_workspace_id, name),
                                &location.server,
                                &location.connection_path(),
                                secrets.storage_account_key(),
                            ))
                            .await?;
                        (created.id, location)
                    }
                };
                redirects.insert(source.id.as_str(), target_id);
                redirects.insert(source_location.root_url(), target_location.root_url());
                // a container root path is just "/", which must never become a key
                if !source_location.is_container_root() {
                    redirects.insert(
                        source_location.container_path.as_str(),
                        target_location.container_path.as_str(),
                    );
                }
                redirects.insert(source_location.server, target_location.server);
                redirects.insert(source_location.container_name, target_location.container_name);
            }
            other => {
                return Err(RedirectError::UnsupportedConnectionType {
                    name: source.display_name.clone(),
                    connection_type: other.to_string(),
                })
            }
        }
    }

    info!("Built {} connection redirects", redirects.len());
    Ok(redirects)
}

/// Per-stage redirect maps, each a superset of the connection redirects.
#[derive(Debug, Clone, Default)]
pub struct StageRedirects {
    pub shortcut: RedirectMap,
    pub notebook: RedirectMap,
    pub pipeline: RedirectMap,
    pub semantic_model: RedirectMap,
    pub report: RedirectMap,
}

impl StageRedirects {
    pub fn new(connections: &RedirectMap, source_workspace_id: &str, target_workspace_id: &str) -> Self {
        let mut workspace_scoped = connections.clone();
        workspace_scoped.insert(source_workspace_id, target_workspace_id);

        Self {
            shortcut: connections.clone(),
            notebook: workspace_scoped.clone(),
            pipeline: workspace_scoped,
            semantic_model: connections.clone(),
            report: connections.clone(),
        }
    }

    pub fn add_lakehouse(&mut self, source_id: &str, target_id: &str) {
        self.notebook.insert(source_id, target_id);
        self.pipeline.insert(source_id, target_id);
    }

    /// Records where a source lakehouse's SQL endpoint now lives.
    ///
    /// The database name is the endpoint id. All lakehouses of a workspace usually share one
    /// server, so the server entry is only added the first time it is seen.
    pub fn add_sql_endpoint(&mut self, source: &SourceLakehouse, target: &SqlEndpointInfo) {
        if let Some(database) = &source.database {
            self.semantic_model.insert(database.as_str(), target.id.as_str());
        }
        if let Some(server) = &source.server {
            self.semantic_model
                .insert_if_absent(server.as_str(), target.connection_string.as_str());
        }
    }

    pub fn add_notebook(&mut self, source_id: &str, target_id: &str) {
        self.pipeline.insert(source_id, target_id);
    }

    pub fn add_semantic_model(&mut self, source_id: &str, target_id: &str) {
        self.report.insert(source_id, target_id);
    }
}
