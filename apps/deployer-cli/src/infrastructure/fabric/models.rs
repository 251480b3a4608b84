use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::framework::core::item_definition::ItemDefinition;

lazy_static! {
    static ref WORKSPACE_CONNECTION_PREFIX: Regex =
        Regex::new(r"^Workspace\[[^\]]*\]-").expect("static regex is valid");
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemType {
    Lakehouse,
    Notebook,
    DataPipeline,
    SemanticModel,
    Report,
    SqlEndpoint,
    Other(String),
}

impl ItemType {
    pub fn as_str(&self) -> &str {
        match self {
            ItemType::Lakehouse => "Lakehouse",
            ItemType::Notebook => "Notebook",
            ItemType::DataPipeline => "DataPipeline",
            ItemType::SemanticModel => "SemanticModel",
            ItemType::Report => "Report",
            ItemType::SqlEndpoint => "SQLEndpoint",
            ItemType::Other(name) => name,
        }
    }
}

impl From<&str> for ItemType {
    fn from(value: &str) -> Self {
        match value {
            "Lakehouse" => ItemType::Lakehouse,
            "Notebook" => ItemType::Notebook,
            "DataPipeline" => ItemType::DataPipeline,
            "SemanticModel" => ItemType::SemanticModel,
            "Report" => ItemType::Report,
            "SQLEndpoint" => ItemType::SqlEndpoint,
            other => ItemType::Other(other.to_string()),
        }
    }
}

impl From<String> for ItemType {
    fn from(value: String) -> Self {
        ItemType::from(value.as_str())
    }
}

impl From<ItemType> for String {
    fn from(value: ItemType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub capacity_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(default)]
    pub description: Option<String>,
}

impl Item {
    /// `{displayName}.{type}`, the name used for export folders and orphan detection.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.display_name, self.item_type)
    }

    pub fn is(&self, display_name: &str, item_type: &ItemType) -> bool {
        self.display_name == display_name && &self.item_type == item_type
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateItemRequest {
    pub display_name: String,
    pub item_type: ItemType,
    pub definition: Option<ItemDefinition>,
}

impl CreateItemRequest {
    pub fn new(display_name: impl Into<String>, item_type: ItemType) -> Self {
        Self {
            display_name: display_name.into(),
            item_type,
            definition: None,
        }
    }

    pub fn with_definition(mut self, definition: ItemDefinition) -> Self {
        self.definition = Some(definition);
        self
    }
}

/// Provisioned query surface of a lakehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlEndpointInfo {
    pub id: String,
    pub connection_string: String,
    pub provisioning_status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcut {
    pub name: String,
    pub path: String,
    pub shortcut_type: String,
    pub location: Option<String>,
    pub subpath: Option<String>,
    pub connection_id: Option<String>,
}

impl Shortcut {
    /// `{path}/{name}`, how shortcuts are compared between source and target lakehouses.
    pub fn full_path(&self) -> String {
        format!("{}/{}", self.path, self.name)
    }
}

/// ADLS Gen2 shortcut creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateShortcutRequest {
    pub name: String,
    pub path: String,
    pub location: String,
    pub subpath: String,
    pub connection_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: String,
    pub display_name: String,
    pub connection_type: String,
    pub path: String,
    pub credential_type: Option<String>,
}

#[derive(Clone, PartialEq, Eq)]
pub enum ConnectionCredentials {
    Anonymous,
    ServicePrincipal {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    AccountKey(String),
}

impl ConnectionCredentials {
    pub fn credential_type(&self) -> &'static str {
        match self {
            ConnectionCredentials::Anonymous => "Anonymous",
            ConnectionCredentials::ServicePrincipal { .. } => "ServicePrincipal",
            ConnectionCredentials::AccountKey(_) => "Key",
        }
    }
}

impl fmt::Debug for ConnectionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionCredentials::Anonymous => f.write_str("Anonymous"),
            ConnectionCredentials::ServicePrincipal {
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("ServicePrincipal")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
            ConnectionCredentials::AccountKey(_) => f.write_str("AccountKey(<redacted>)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateConnectionRequest {
    pub display_name: String,
    pub connection_type: String,
    pub creation_method: String,
    pub parameters: Vec<(String, String)>,
    pub credentials: ConnectionCredentials,
}

impl CreateConnectionRequest {
    pub fn anonymous_web(display_name: String, url: &str) -> Self {
        Self {
            display_name,
            connection_type: "Web".to_string(),
            creation_method: "Web".to_string(),
            parameters: vec![("url".to_string(), url.to_string())],
            credentials: ConnectionCredentials::Anonymous,
        }
    }

    pub fn adls_gen2(
        display_name: String,
        server: &str,
        path: &str,
        credentials: ConnectionCredentials,
    ) -> Self {
        Self {
            display_name,
            connection_type: "AzureDataLakeStorage".to_string(),
            creation_method: "AzureDataLakeStorage".to_string(),
            parameters: vec![
                ("server".to_string(), server.to_string()),
                ("path".to_string(), path.to_string()),
            ],
            credentials,
        }
    }

    pub fn sql(
        display_name: String,
        server: &str,
        database: &str,
        credentials: ConnectionCredentials,
    ) -> Self {
        Self {
            display_name,
            connection_type: "SQL".to_string(),
            creation_method: "Sql".to_string(),
            parameters: vec![
                ("server".to_string(), server.to_string()),
                ("database".to_string(), database.to_string()),
            ],
            credentials,
        }
    }

    /// Value of a creation parameter such as `url` or `server`.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// `Workspace[{workspace_id}]-{suffix}`, how workspace-scoped connections are named.
pub fn workspace_connection_name(workspace_id: &str, suffix: &str) -> String {
    format!("Workspace[{workspace_id}]-{suffix}")
}

/// Removes the `Workspace[...]-` prefix, if any.
pub fn strip_workspace_prefix(display_name: &str) -> &str {
    match WORKSPACE_CONNECTION_PREFIX.find(display_name) {
        Some(prefix) => &display_name[prefix.end()..],
        None => display_name,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInstanceRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Deduped,
    Unknown(String),
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::NotStarted | JobStatus::InProgress)
    }
}

impl From<&str> for JobStatus {
    fn from(value: &str) -> Self {
        match value {
            "NotStarted" => JobStatus::NotStarted,
            "InProgress" => JobStatus::InProgress,
            "Completed" => JobStatus::Completed,
            "Failed" => JobStatus::Failed,
            "Cancelled" => JobStatus::Cancelled,
            "Deduped" => JobStatus::Deduped,
            other => JobStatus::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInstance {
    pub id: String,
    pub status: JobStatus,
    pub failure_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_type_wire_names() {
        assert_eq!(ItemType::from("SQLEndpoint"), ItemType::SqlEndpoint);
        assert_eq!(ItemType::SqlEndpoint.to_string(), "SQLEndpoint");
        assert_eq!(
            ItemType::from("Warehouse"),
            ItemType::Other("Warehouse".to_string())
        );

        let item: Item =
            serde_json::from_str(r#"{"id":"1","displayName":"sales","type":"Lakehouse"}"#).unwrap();
        assert_eq!(item.item_type, ItemType::Lakehouse);
        assert_eq!(item.qualified_name(), "sales.Lakehouse");
    }

    #[test]
    fn test_strip_workspace_prefix() {
        let name = workspace_connection_name("7d3b1c2e-0000-4000-8000-000000000001", "Web");
        assert_eq!(strip_workspace_prefix(&name), "Web");
        assert_eq!(strip_workspace_prefix("ADLS"), "ADLS");
    }

    #[test]
    fn test_credentials_debug_hides_secrets() {
        let creds = ConnectionCredentials::ServicePrincipal {
            tenant_id: "t".to_string(),
            client_id: "c".to_string(),
            client_secret: "hunter2".to_string(),
        };
        assert!(!format!("{creds:?}").contains("hunter2"));
        assert!(!format!("{:?}", ConnectionCredentials::AccountKey("k3y".to_string())).contains("k3y"));
    }

    #[test]
    fn test_job_status_activity() {
        assert!(JobStatus::from("NotStarted").is_active());
        assert!(JobStatus::from("InProgress").is_active());
        assert!(!JobStatus::from("Deduped").is_active());
        assert_eq!(JobStatus::from("Weird"), JobStatus::Unknown("Weird".to_string()));
    }
}
