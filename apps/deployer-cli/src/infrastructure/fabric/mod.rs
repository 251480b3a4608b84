use async_trait::async_trait;

use crate::framework::core::item_definition::{DefinitionError, ItemDefinition};

pub mod config;
pub mod models;
pub mod rest_client;

use models::{
    Connection, CreateConnectionRequest, CreateItemRequest, CreateShortcutRequest, Item,
    ItemType, JobInstance, JobInstanceRef, Shortcut, SqlEndpointInfo, Workspace,
};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ItemStoreError {
    #[error("Request to {url} failed with status {status}: {message}")]
    Http {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Failed to reach the workspace platform")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response from the workspace platform")]
    Decode(#[from] serde_json::Error),

    #[error("{kind} '{name}' was not found")]
    NotFound { kind: &'static str, name: String },

    #[error("Long running operation {operation} ended with status {status}")]
    OperationFailed { operation: String, status: String },

    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

/// Operations the deployment engine performs against the workspace platform
#[async_trait]
pub trait WorkspaceItemStore: Send + Sync {
    async fn list_workspaces(&self) -> Result<Vec<Workspace>, ItemStoreError>;

    /// Finds a workspace by exact display name
    async fn get_workspace_by_name(&self, name: &str) -> Result<Option<Workspace>, ItemStoreError> {
        Ok(self
            .list_workspaces()
            .await?
            .into_iter()
            .find(|workspace| workspace.display_name == name))
    }

    async fn create_workspace(&self, name: &str) -> Result<Workspace, ItemStoreError>;

    async fn delete_workspace(&self, workspace_id: &str) -> Result<(), ItemStoreError>;

    async fn update_workspace_description(
        &self,
        workspace_id: &str,
        description: &str,
    ) -> Result<(), ItemStoreError>;

    async fn assign_workspace_to_capacity(
        &self,
        workspace_id: &str,
        capacity_id: &str,
    ) -> Result<(), ItemStoreError>;

    /// Lists the items of a workspace
    ///
    /// # Arguments
    /// * `workspace_id` - The workspace to list
    /// * `item_type` - Restrict the listing to one item type
    async fn list_items(
        &self,
        workspace_id: &str,
        item_type: Option<&ItemType>,
    ) -> Result<Vec<Item>, ItemStoreError>;

    async fn get_item_definition(
        &self,
        workspace_id: &str,
        item_id: &str,
    ) -> Result<ItemDefinition, ItemStoreError>;

    async fn create_item(
        &self,
        workspace_id: &str,
        request: CreateItemRequest,
    ) -> Result<Item, ItemStoreError>;

    /// Replaces the whole definition of an existing item
    async fn update_item_definition(
        &self,
        workspace_id: &str,
        item_id: &str,
        definition: ItemDefinition,
    ) -> Result<(), ItemStoreError>;

    async fn delete_item(&self, workspace_id: &str, item: &Item) -> Result<(), ItemStoreError>;

    /// Returns the SQL endpoint of a lakehouse, `None` until the platform has provisioned it
    async fn get_lakehouse_sql_endpoint(
        &self,
        workspace_id: &str,
        lakehouse_id: &str,
    ) -> Result<Option<SqlEndpointInfo>, ItemStoreError>;

    /// Asks the SQL endpoint to pick up tables created since it was provisioned
    async fn refresh_sql_endpoint_metadata(&self, sql_endpoint_id: &str)
        -> Result<(), ItemStoreError>;

    async fn list_shortcuts(
        &self,
        workspace_id: &str,
        lakehouse_id: &str,
    ) -> Result<Vec<Shortcut>, ItemStoreError>;

    async fn create_shortcut(
        &self,
        workspace_id: &str,
        lakehouse_id: &str,
        request: CreateShortcutRequest,
    ) -> Result<Shortcut, ItemStoreError>;

    async fn list_connections(&self) -> Result<Vec<Connection>, ItemStoreError>;

    /// Connections that belong to a workspace carry its id in their display name
    async fn get_workspace_connections(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<Connection>, ItemStoreError> {
        Ok(self
            .list_connections()
            .await?
            .into_iter()
            .filter(|connection| connection.display_name.contains(workspace_id))
            .collect())
    }

    /// Creates a connection, returning the existing one when the name is already taken
    async fn create_connection(
        &self,
        request: CreateConnectionRequest,
    ) -> Result<Connection, ItemStoreError>;

    async fn run_item_job(
        &self,
        workspace_id: &str,
        item_id: &str,
        job_type: &str,
    ) -> Result<JobInstanceRef, ItemStoreError>;

    async fn get_job_instance(
        &self,
        workspace_id: &str,
        item_id: &str,
        job_id: &str,
    ) -> Result<JobInstance, ItemStoreError>;
}
