//! In-memory stand-ins for the workspace platform used across unit tests.
//!
//! [`MockItemStore`] keeps workspaces, items, definitions, shortcuts and connections in
//! memory and behaves like the real platform where the engine depends on it: names are
//! unique per type, connections are deduplicated by display name and lakehouses expose a
//! SQL endpoint once provisioned. [`MockGateway`] records model bindings and refreshes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::framework::core::item_definition::ItemDefinition;
use crate::infrastructure::fabric::models::{
    Connection, CreateConnectionRequest, CreateItemRequest, CreateShortcutRequest, Item,
    ItemType, JobInstance, JobInstanceRef, JobStatus, Shortcut, SqlEndpointInfo, Workspace,
};
use crate::infrastructure::fabric::{ItemStoreError, WorkspaceItemStore};
use crate::infrastructure::powerbi::{Datasource, SemanticModelGateway};

#[derive(Default)]
struct StoreState {
    next_id: u64,
    workspaces: Vec<Workspace>,
    /// (workspace id, item)
    items: Vec<(String, Item)>,
    definitions: HashMap<String, ItemDefinition>,
    shortcuts: HashMap<String, Vec<Shortcut>>,
    connections: Vec<Connection>,
    failing_deletions: HashSet<String>,
    job_script: VecDeque<JobStatus>,
    job_polls: usize,
    endpoint_pending_polls: usize,
    refreshed_endpoints: Vec<String>,
}

impl StoreState {
    /// Fixed width so that no id is a substring of another
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:06}", self.next_id)
    }
}

#[derive(Default)]
pub struct MockItemStore {
    state: Mutex<StoreState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn not_found(kind: &'static str, name: &str) -> ItemStoreError {
    ItemStoreError::NotFound {
        kind,
        name: name.to_string(),
    }
}

impl MockItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        lock(&self.state)
    }

    pub fn add_workspace(&self, name: &str, description: Option<&str>) -> Workspace {
        let mut state = self.state();
        let workspace = Workspace {
            id: state.next_id("ws"),
            display_name: name.to_string(),
            description: description.map(str::to_string),
            capacity_id: None,
        };
        state.workspaces.push(workspace.clone());
        workspace
    }

    pub fn add_item(&self, workspace_id: &str, name: &str, item_type: ItemType) -> Item {
        let mut state = self.state();
        let item = Item {
            id: state.next_id("item"),
            display_name: name.to_string(),
            item_type,
            description: None,
        };
        state.items.push((workspace_id.to_string(), item.clone()));
        item
    }

    pub fn set_definition(&self, item_id: &str, definition: ItemDefinition) {
        self.state()
            .definitions
            .insert(item_id.to_string(), definition);
    }

    pub fn add_shortcut(&self, lakehouse_id: &str, shortcut: Shortcut) {
        self.state()
            .shortcuts
            .entry(lakehouse_id.to_string())
            .or_default()
            .push(shortcut);
    }

    pub fn add_connection(&self, name: &str, connection_type: &str, path: &str) -> Connection {
        let mut state = self.state();
        let connection = Connection {
            id: state.next_id("conn"),
            display_name: name.to_string(),
            connection_type: connection_type.to_string(),
            path: path.to_string(),
            credential_type: None,
        };
        state.connections.push(connection.clone());
        connection
    }

    /// Makes every later deletion of `item_id` fail with a server error
    pub fn fail_deletion_of(&self, item_id: &str) {
        self.state().failing_deletions.insert(item_id.to_string());
    }

    /// Statuses returned by successive job polls; `Completed` once exhausted
    pub fn script_job(&self, statuses: Vec<JobStatus>) {
        self.state().job_script = statuses.into();
    }

    pub fn job_polls(&self) -> usize {
        self.state().job_polls
    }

    /// Number of SQL endpoint lookups that report provisioning still in progress
    pub fn set_endpoint_pending_polls(&self, polls: usize) {
        self.state().endpoint_pending_polls = polls;
    }

    pub fn refreshed_endpoints(&self) -> Vec<String> {
        self.state().refreshed_endpoints.clone()
    }

    pub fn items(&self, workspace_id: &str) -> Vec<Item> {
        self.state()
            .items
            .iter()
            .filter(|(workspace, _)| workspace == workspace_id)
            .map(|(_, item)| item.clone())
            .collect()
    }

    pub fn definition(&self, item_id: &str) -> Option<ItemDefinition> {
        self.state().definitions.get(item_id).cloned()
    }

    pub fn workspace_by_name(&self, name: &str) -> Option<Workspace> {
        self.state()
            .workspaces
            .iter()
            .find(|workspace| workspace.display_name == name)
            .cloned()
    }

    pub fn workspaces(&self) -> Vec<Workspace> {
        self.state().workspaces.clone()
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.state().connections.clone()
    }

    pub fn shortcuts(&self, lakehouse_id: &str) -> Vec<Shortcut> {
        self.state()
            .shortcuts
            .get(lakehouse_id)
            .cloned()
            .unwrap_or_default()
    }

    fn workspace_mut<'s>(
        state: &'s mut StoreState,
        workspace_id: &str,
    ) -> Result<&'s mut Workspace, ItemStoreError> {
        state
            .workspaces
            .iter_mut()
            .find(|workspace| workspace.id == workspace_id)
            .ok_or_else(|| not_found("Workspace", workspace_id))
    }
}

#[async_trait]
impl WorkspaceItemStore for MockItemStore {
    async fn list_workspaces(&self) -> Result<Vec<Workspace>, ItemStoreError> {
        Ok(self.workspaces())
    }

    async fn create_workspace(&self, name: &str) -> Result<Workspace, ItemStoreError> {
        if self.workspace_by_name(name).is_some() {
            return Err(ItemStoreError::Http {
                url: "/workspaces".to_string(),
                status: 409,
                message: format!("Workspace {name} already exists"),
            });
        }
        Ok(self.add_workspace(name, None))
    }

    async fn delete_workspace(&self, workspace_id: &str) -> Result<(), ItemStoreError> {
        let mut state = self.state();
        let before = state.workspaces.len();
        state.workspaces.retain(|workspace| workspace.id != workspace_id);
        if state.workspaces.len() == before {
            return Err(not_found("Workspace", workspace_id));
        }
        state.items.retain(|(workspace, _)| workspace != workspace_id);
        Ok(())
    }

    async fn update_workspace_description(
        &self,
        workspace_id: &str,
        description: &str,
    ) -> Result<(), ItemStoreError> {
        let mut state = self.state();
        Self::workspace_mut(&mut state, workspace_id)?.description = Some(description.to_string());
        Ok(())
    }

    async fn assign_workspace_to_capacity(
        &self,
        workspace_id: &str,
        capacity_id: &str,
    ) -> Result<(), ItemStoreError> {
        let mut state = self.state();
        Self::workspace_mut(&mut state, workspace_id)?.capacity_id = Some(capacity_id.to_string());
        Ok(())
    }

    async fn list_items(
        &self,
        workspace_id: &str,
        item_type: Option<&ItemType>,
    ) -> Result<Vec<Item>, ItemStoreError> {
        Ok(self
            .items(workspace_id)
            .into_iter()
            .filter(|item| item_type.map_or(true, |wanted| &item.item_type == wanted))
            .collect())
    }

    async fn get_item_definition(
        &self,
        workspace_id: &str,
        item_id: &str,
    ) -> Result<ItemDefinition, ItemStoreError> {
        let state = self.state();
        if !state
            .items
            .iter()
            .any(|(workspace, item)| workspace == workspace_id && item.id == item_id)
        {
            return Err(not_found("Item", item_id));
        }
        Ok(state
            .definitions
            .get(item_id)
            .cloned()
            .unwrap_or_else(ItemDefinition::empty))
    }

    async fn create_item(
        &self,
        workspace_id: &str,
        request: CreateItemRequest,
    ) -> Result<Item, ItemStoreError> {
        let taken = self
            .items(workspace_id)
            .iter()
            .any(|item| item.is(&request.display_name, &request.item_type));
        if taken {
            return Err(ItemStoreError::Http {
                url: format!("/workspaces/{workspace_id}/items"),
                status: 409,
                message: format!("{} already exists", request.display_name),
            });
        }

        let item = self.add_item(workspace_id, &request.display_name, request.item_type);
        if let Some(definition) = request.definition {
            self.set_definition(&item.id, definition);
        }
        Ok(item)
    }

    async fn update_item_definition(
        &self,
        workspace_id: &str,
        item_id: &str,
        definition: ItemDefinition,
    ) -> Result<(), ItemStoreError> {
        let mut state = self.state();
        if !state
            .items
            .iter()
            .any(|(workspace, item)| workspace == workspace_id && item.id == item_id)
        {
            return Err(not_found("Item", item_id));
        }
        state.definitions.insert(item_id.to_string(), definition);
        Ok(())
    }

    async fn delete_item(&self, workspace_id: &str, item: &Item) -> Result<(), ItemStoreError> {
        let mut state = self.state();
        if state.failing_deletions.contains(&item.id) {
            return Err(ItemStoreError::Http {
                url: format!("/workspaces/{workspace_id}/items/{}", item.id),
                status: 500,
                message: "deletion refused".to_string(),
            });
        }
        state
            .items
            .retain(|(workspace, existing)| !(workspace == workspace_id && existing.id == item.id));
        state.definitions.remove(&item.id);
        Ok(())
    }

    async fn get_lakehouse_sql_endpoint(
        &self,
        workspace_id: &str,
        lakehouse_id: &str,
    ) -> Result<Option<SqlEndpointInfo>, ItemStoreError> {
        let mut state = self.state();
        let status = if state.endpoint_pending_polls > 0 {
            state.endpoint_pending_polls -= 1;
            "InProgress"
        } else {
            "Success"
        };
        Ok(Some(SqlEndpointInfo {
            id: format!("{lakehouse_id}-sql"),
            connection_string: format!("{workspace_id}.datawarehouse.example"),
            provisioning_status: status.to_string(),
        }))
    }

    async fn refresh_sql_endpoint_metadata(
        &self,
        sql_endpoint_id: &str,
    ) -> Result<(), ItemStoreError> {
        self.state()
            .refreshed_endpoints
            .push(sql_endpoint_id.to_string());
        Ok(())
    }

    async fn list_shortcuts(
        &self,
        _workspace_id: &str,
        lakehouse_id: &str,
    ) -> Result<Vec<Shortcut>, ItemStoreError> {
        Ok(self.shortcuts(lakehouse_id))
    }

    async fn create_shortcut(
        &self,
        _workspace_id: &str,
        lakehouse_id: &str,
        request: CreateShortcutRequest,
    ) -> Result<Shortcut, ItemStoreError> {
        let shortcut = Shortcut {
            name: request.name,
            path: request.path,
            shortcut_type: "AdlsGen2".to_string(),
            location: Some(request.location),
            subpath: Some(request.subpath),
            connection_id: Some(request.connection_id),
        };
        self.add_shortcut(lakehouse_id, shortcut.clone());
        Ok(shortcut)
    }

    async fn list_connections(&self) -> Result<Vec<Connection>, ItemStoreError> {
        Ok(self.connections())
    }

    async fn create_connection(
        &self,
        request: CreateConnectionRequest,
    ) -> Result<Connection, ItemStoreError> {
        if let Some(existing) = self
            .connections()
            .into_iter()
            .find(|connection| connection.display_name == request.display_name)
        {
            return Ok(existing);
        }

        let path = match (request.parameter("url"), request.parameter("server")) {
            (Some(url), _) => url.to_string(),
            (None, Some(server)) => match request.parameter("path") {
                Some(path) => format!("{server}{path}"),
                None => server.to_string(),
            },
            (None, None) => String::new(),
        };
        let mut connection =
            self.add_connection(&request.display_name, &request.connection_type, &path);
        connection.credential_type = Some(request.credentials.credential_type().to_string());

        let mut state = self.state();
        if let Some(stored) = state
            .connections
            .iter_mut()
            .find(|stored| stored.id == connection.id)
        {
            stored.credential_type = connection.credential_type.clone();
        }
        Ok(connection)
    }

    async fn run_item_job(
        &self,
        _workspace_id: &str,
        _item_id: &str,
        _job_type: &str,
    ) -> Result<JobInstanceRef, ItemStoreError> {
        Ok(JobInstanceRef {
            id: self.state().next_id("job"),
        })
    }

    async fn get_job_instance(
        &self,
        _workspace_id: &str,
        _item_id: &str,
        job_id: &str,
    ) -> Result<JobInstance, ItemStoreError> {
        let mut state = self.state();
        state.job_polls += 1;
        let status = state.job_script.pop_front().unwrap_or(JobStatus::Completed);
        let failure_reason = (status == JobStatus::Failed).then(|| "scripted failure".to_string());
        Ok(JobInstance {
            id: job_id.to_string(),
            status,
            failure_reason,
        })
    }
}

#[derive(Default)]
struct GatewayState {
    datasources: Vec<Datasource>,
    /// (model id, connection id)
    bindings: Vec<(String, String)>,
    refreshes: usize,
}

/// Reports the same data sources for every model.
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<GatewayState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_datasources(&self, datasources: Vec<Datasource>) {
        lock(&self.state).datasources = datasources;
    }

    pub fn bindings(&self) -> Vec<(String, String)> {
        lock(&self.state).bindings.clone()
    }

    pub fn refreshes(&self) -> usize {
        lock(&self.state).refreshes
    }
}

#[async_trait]
impl SemanticModelGateway for MockGateway {
    async fn get_datasources(
        &self,
        _workspace_id: &str,
        _model_id: &str,
    ) -> Result<Vec<Datasource>, ItemStoreError> {
        Ok(lock(&self.state).datasources.clone())
    }

    async fn bind_to_connection(
        &self,
        _workspace_id: &str,
        model_id: &str,
        connection_id: &str,
    ) -> Result<(), ItemStoreError> {
        lock(&self.state)
            .bindings
            .push((model_id.to_string(), connection_id.to_string()));
        Ok(())
    }

    async fn refresh(&self, _workspace_id: &str, _model_id: &str) -> Result<(), ItemStoreError> {
        lock(&self.state).refreshes += 1;
        Ok(())
    }
}
