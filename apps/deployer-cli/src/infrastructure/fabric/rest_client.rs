//! REST implementation of [`WorkspaceItemStore`].
//!
//! Talks to the workspace platform's public v1 API with a bearer token taken from
//! configuration. Calls that the platform answers with `202 Accepted` are long running
//! operations; they are polled through `/operations/{id}` until they finish.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::config::{FabricConfig, PowerBiConfig};
use super::models::{
    Connection, ConnectionCredentials, CreateConnectionRequest, CreateItemRequest,
    CreateShortcutRequest, Item, ItemType, JobInstance, JobInstanceRef, JobStatus, Shortcut,
    SqlEndpointInfo, Workspace,
};
use super::{ItemStoreError, WorkspaceItemStore};
use crate::framework::core::item_definition::ItemDefinition;

const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(2);
const OPERATION_ID_HEADER: &str = "x-ms-operation-id";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    value: Vec<T>,
    #[serde(default)]
    continuation_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationState {
    status: String,
}

#[derive(Debug, Deserialize)]
struct DefinitionEnvelope {
    definition: ItemDefinition,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LakehouseResponse {
    properties: Option<LakehouseProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LakehouseProperties {
    sql_endpoint_properties: Option<SqlEndpointProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SqlEndpointProperties {
    id: Option<String>,
    connection_string: Option<String>,
    provisioning_status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireShortcut {
    name: String,
    path: String,
    target: WireShortcutTarget,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireShortcutTarget {
    #[serde(rename = "type", default)]
    target_type: Option<String>,
    adls_gen2: Option<WireAdlsTarget>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAdlsTarget {
    location: Option<String>,
    subpath: Option<String>,
    connection_id: Option<String>,
}

impl From<WireShortcut> for Shortcut {
    fn from(wire: WireShortcut) -> Self {
        let shortcut_type = wire
            .target
            .target_type
            .map(|t| t.to_lowercase())
            .unwrap_or_else(|| {
                if wire.target.adls_gen2.is_some() {
                    "adlsgen2".to_string()
                } else {
                    "unknown".to_string()
                }
            });
        let adls = wire.target.adls_gen2;
        Shortcut {
            name: wire.name,
            path: wire.path,
            shortcut_type,
            location: adls.as_ref().and_then(|a| a.location.clone()),
            subpath: adls.as_ref().and_then(|a| a.subpath.clone()),
            connection_id: adls.and_then(|a| a.connection_id),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireConnection {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
    connection_details: WireConnectionDetails,
    #[serde(default)]
    credential_details: Option<WireCredentialDetails>,
}

#[derive(Debug, Deserialize)]
struct WireConnectionDetails {
    #[serde(rename = "type")]
    connection_type: String,
    #[serde(default)]
    path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCredentialDetails {
    credential_type: Option<String>,
}

impl From<WireConnection> for Connection {
    fn from(wire: WireConnection) -> Self {
        Connection {
            id: wire.id,
            display_name: wire.display_name.unwrap_or_default(),
            connection_type: wire.connection_details.connection_type,
            path: wire.connection_details.path,
            credential_type: wire.credential_details.and_then(|c| c.credential_type),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireJobInstance {
    id: String,
    status: String,
    #[serde(default)]
    failure_reason: Option<WireFailureReason>,
}

#[derive(Debug, Deserialize)]
struct WireFailureReason {
    message: Option<String>,
}

pub struct FabricRestClient {
    http: reqwest::Client,
    fabric: FabricConfig,
    power_bi: PowerBiConfig,
}

impl FabricRestClient {
    pub fn new(fabric: FabricConfig, power_bi: PowerBiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            fabric,
            power_bi,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.fabric.api_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.fabric.access_token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ItemStoreError> {
        let response = request.send().await?;
        check_status(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ItemStoreError> {
        let response = self.send(self.request(Method::GET, url)).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Follows `continuationUri` until every page has been read.
    async fn get_paged<T: DeserializeOwned>(&self, url: String) -> Result<Vec<T>, ItemStoreError> {
        let mut results = Vec::new();
        let mut next = Some(url);
        while let Some(url) = next {
            let page: Page<T> = self.get_json(&url).await?;
            results.extend(page.value);
            next = page.continuation_uri;
        }
        Ok(results)
    }

    /// Waits for a long running operation when the platform answered `202 Accepted`.
    ///
    /// # Returns
    /// * The response body, or the operation result when `fetch_result` is set
    async fn complete(
        &self,
        response: Response,
        fetch_result: bool,
    ) -> Result<Option<Value>, ItemStoreError> {
        if response.status() != StatusCode::ACCEPTED {
            let body = response.bytes().await?;
            if body.iter().all(u8::is_ascii_whitespace) {
                return Ok(None);
            }
            return Ok(Some(serde_json::from_slice(&body)?));
        }

        let operation_id = match header(&response, OPERATION_ID_HEADER) {
            Some(id) => id,
            None => return Ok(None),
        };
        let retry_after = header(&response, "retry-after")
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RETRY_AFTER);

        loop {
            tokio::time::sleep(retry_after).await;
            let state: OperationState = self
                .get_json(&self.url(&format!("operations/{operation_id}")))
                .await?;
            debug!("Operation {} is {}", operation_id, state.status);
            match state.status.as_str() {
                "Succeeded" => break,
                "Failed" | "Undefined" => {
                    return Err(ItemStoreError::OperationFailed {
                        operation: operation_id,
                        status: state.status,
                    })
                }
                _ => continue,
            }
        }

        if !fetch_result {
            return Ok(None);
        }
        let result: Value = self
            .get_json(&self.url(&format!("operations/{operation_id}/result")))
            .await?;
        Ok(Some(result))
    }
}

async fn check_status(response: Response) -> Result<Response, ItemStoreError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Err(ItemStoreError::Http {
        url,
        status,
        message,
    })
}

fn header(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Job instance urls end with the instance id.
fn job_id_from_location(location: &str) -> Option<String> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

fn credentials_body(credentials: &ConnectionCredentials) -> Value {
    match credentials {
        ConnectionCredentials::Anonymous => json!({ "credentialType": "Anonymous" }),
        ConnectionCredentials::ServicePrincipal {
            tenant_id,
            client_id,
            client_secret,
        } => json!({
            "credentialType": "ServicePrincipal",
            "tenantId": tenant_id,
            "servicePrincipalClientId": client_id,
            "servicePrincipalSecret": client_secret,
        }),
        ConnectionCredentials::AccountKey(key) => json!({
            "credentialType": "Key",
            "key": key,
        }),
    }
}

fn connection_body(request: &CreateConnectionRequest) -> Value {
    let parameters: Vec<Value> = request
        .parameters
        .iter()
        .map(|(name, value)| json!({ "dataType": "Text", "name": name, "value": value }))
        .collect();

    json!({
        "connectivityType": "ShareableCloud",
        "displayName": request.display_name,
        "connectionDetails": {
            "type": request.connection_type,
            "creationMethod": request.creation_method,
            "parameters": parameters,
        },
        "privacyLevel": "Organizational",
        "credentialDetails": {
            "singleSignOnType": "None",
            "connectionEncryption": "NotEncrypted",
            "skipTestConnection": false,
            "credentials": credentials_body(&request.credentials),
        },
    })
}

#[async_trait]
impl WorkspaceItemStore for FabricRestClient {
    async fn list_workspaces(&self) -> Result<Vec<Workspace>, ItemStoreError> {
        self.get_paged(self.url("workspaces")).await
    }

    async fn create_workspace(&self, name: &str) -> Result<Workspace, ItemStoreError> {
        let response = self
            .send(
                self.request(Method::POST, &self.url("workspaces"))
                    .json(&json!({ "displayName": name })),
            )
            .await?;
        let workspace: Workspace = serde_json::from_slice(&response.bytes().await?)?;
        info!("Created workspace {} ({})", workspace.display_name, workspace.id);
        Ok(workspace)
    }

    async fn delete_workspace(&self, workspace_id: &str) -> Result<(), ItemStoreError> {
        self.send(self.request(
            Method::DELETE,
            &self.url(&format!("workspaces/{workspace_id}")),
        ))
        .await?;
        Ok(())
    }

    async fn update_workspace_description(
        &self,
        workspace_id: &str,
        description: &str,
    ) -> Result<(), ItemStoreError> {
        self.send(
            self.request(
                Method::PATCH,
                &self.url(&format!("workspaces/{workspace_id}")),
            )
            .json(&json!({ "description": description })),
        )
        .await?;
        Ok(())
    }

    async fn assign_workspace_to_capacity(
        &self,
        workspace_id: &str,
        capacity_id: &str,
    ) -> Result<(), ItemStoreError> {
        let response = self
            .send(
                self.request(
                    Method::POST,
                    &self.url(&format!("workspaces/{workspace_id}/assignToCapacity")),
                )
                .json(&json!({ "capacityId": capacity_id })),
            )
            .await?;
        self.complete(response, false).await?;
        Ok(())
    }

    async fn list_items(
        &self,
        workspace_id: &str,
        item_type: Option<&ItemType>,
    ) -> Result<Vec<Item>, ItemStoreError> {
        let mut url = self.url(&format!("workspaces/{workspace_id}/items"));
        if let Some(item_type) = item_type {
            url = format!("{url}?type={item_type}");
        }
        self.get_paged(url).await
    }

    async fn get_item_definition(
        &self,
        workspace_id: &str,
        item_id: &str,
    ) -> Result<ItemDefinition, ItemStoreError> {
        let response = self
            .send(self.request(
                Method::POST,
                &self.url(&format!(
                    "workspaces/{workspace_id}/items/{item_id}/getDefinition"
                )),
            ))
            .await?;
        match self.complete(response, true).await? {
            Some(body) => Ok(serde_json::from_value::<DefinitionEnvelope>(body)?.definition),
            None => Ok(ItemDefinition::empty()),
        }
    }

    async fn create_item(
        &self,
        workspace_id: &str,
        request: CreateItemRequest,
    ) -> Result<Item, ItemStoreError> {
        let mut body = json!({
            "displayName": request.display_name,
            "type": request.item_type.as_str(),
        });
        if let Some(definition) = &request.definition {
            body["definition"] = serde_json::to_value(definition)?;
        }

        let response = self
            .send(
                self.request(
                    Method::POST,
                    &self.url(&format!("workspaces/{workspace_id}/items")),
                )
                .json(&body),
            )
            .await?;

        match self.complete(response, true).await? {
            Some(created) => Ok(serde_json::from_value(created)?),
            None => self
                .list_items(workspace_id, Some(&request.item_type))
                .await?
                .into_iter()
                .find(|item| item.display_name == request.display_name)
                .ok_or(ItemStoreError::NotFound {
                    kind: "Item",
                    name: request.display_name,
                }),
        }
    }

    async fn update_item_definition(
        &self,
        workspace_id: &str,
        item_id: &str,
        definition: ItemDefinition,
    ) -> Result<(), ItemStoreError> {
        let response = self
            .send(
                self.request(
                    Method::POST,
                    &self.url(&format!(
                        "workspaces/{workspace_id}/items/{item_id}/updateDefinition"
                    )),
                )
                .json(&json!({ "definition": definition })),
            )
            .await?;
        self.complete(response, false).await?;
        Ok(())
    }

    async fn delete_item(&self, workspace_id: &str, item: &Item) -> Result<(), ItemStoreError> {
        self.send(self.request(
            Method::DELETE,
            &self.url(&format!("workspaces/{workspace_id}/items/{}", item.id)),
        ))
        .await?;
        Ok(())
    }

    async fn get_lakehouse_sql_endpoint(
        &self,
        workspace_id: &str,
        lakehouse_id: &str,
    ) -> Result<Option<SqlEndpointInfo>, ItemStoreError> {
        let lakehouse: LakehouseResponse = self
            .get_json(&self.url(&format!(
                "workspaces/{workspace_id}/lakehouses/{lakehouse_id}"
            )))
            .await?;

        let endpoint = lakehouse
            .properties
            .and_then(|properties| properties.sql_endpoint_properties);
        Ok(endpoint.and_then(|endpoint| {
            Some(SqlEndpointInfo {
                id: endpoint.id?,
                connection_string: endpoint.connection_string.unwrap_or_default(),
                provisioning_status: endpoint.provisioning_status.unwrap_or_default(),
            })
        }))
    }

    async fn refresh_sql_endpoint_metadata(
        &self,
        sql_endpoint_id: &str,
    ) -> Result<(), ItemStoreError> {
        let url = format!(
            "{}/v1.0/myorg/lhdatamarts/{}",
            self.power_bi.api_url.trim_end_matches('/'),
            sql_endpoint_id
        );
        self.send(
            self.http
                .post(&url)
                .bearer_auth(&self.power_bi.access_token)
                .json(&json!({ "commands": [{ "$type": "MetadataRefreshCommand" }] })),
        )
        .await?;
        Ok(())
    }

    async fn list_shortcuts(
        &self,
        workspace_id: &str,
        lakehouse_id: &str,
    ) -> Result<Vec<Shortcut>, ItemStoreError> {
        let shortcuts: Vec<WireShortcut> = self
            .get_paged(self.url(&format!(
                "workspaces/{workspace_id}/items/{lakehouse_id}/shortcuts"
            )))
            .await?;
        Ok(shortcuts.into_iter().map(Shortcut::from).collect())
    }

    async fn create_shortcut(
        &self,
        workspace_id: &str,
        lakehouse_id: &str,
        request: CreateShortcutRequest,
    ) -> Result<Shortcut, ItemStoreError> {
        let body = json!({
            "name": request.name,
            "path": request.path,
            "target": {
                "adlsGen2": {
                    "location": request.location,
                    "subpath": request.subpath,
                    "connectionId": request.connection_id,
                }
            }
        });
        let response = self
            .send(
                self.request(
                    Method::POST,
                    &self.url(&format!(
                        "workspaces/{workspace_id}/items/{lakehouse_id}/shortcuts"
                    )),
                )
                .json(&body),
            )
            .await?;
        let created: WireShortcut = serde_json::from_slice(&response.bytes().await?)?;
        Ok(created.into())
    }

    async fn list_connections(&self) -> Result<Vec<Connection>, ItemStoreError> {
        let connections: Vec<WireConnection> = self.get_paged(self.url("connections")).await?;
        Ok(connections.into_iter().map(Connection::from).collect())
    }

    async fn create_connection(
        &self,
        request: CreateConnectionRequest,
    ) -> Result<Connection, ItemStoreError> {
        if let Some(existing) = self
            .list_connections()
            .await?
            .into_iter()
            .find(|connection| connection.display_name == request.display_name)
        {
            debug!("Reusing existing connection {}", existing.display_name);
            return Ok(existing);
        }

        let response = self
            .send(
                self.request(Method::POST, &self.url("connections"))
                    .json(&connection_body(&request)),
            )
            .await?;
        let created: WireConnection = serde_json::from_slice(&response.bytes().await?)?;
        info!("Created connection {}", request.display_name);
        Ok(created.into())
    }

    async fn run_item_job(
        &self,
        workspace_id: &str,
        item_id: &str,
        job_type: &str,
    ) -> Result<JobInstanceRef, ItemStoreError> {
        let url = self.url(&format!(
            "workspaces/{workspace_id}/items/{item_id}/jobs/instances?jobType={job_type}"
        ));
        let response = self.send(self.request(Method::POST, &url)).await?;
        header(&response, "location")
            .as_deref()
            .and_then(job_id_from_location)
            .map(|id| JobInstanceRef { id })
            .ok_or(ItemStoreError::NotFound {
                kind: "Job instance",
                name: format!("{job_type} for {item_id}"),
            })
    }

    async fn get_job_instance(
        &self,
        workspace_id: &str,
        item_id: &str,
        job_id: &str,
    ) -> Result<JobInstance, ItemStoreError> {
        let wire: WireJobInstance = self
            .get_json(&self.url(&format!(
                "workspaces/{workspace_id}/items/{item_id}/jobs/instances/{job_id}"
            )))
            .await?;
        Ok(JobInstance {
            id: wire.id,
            status: JobStatus::from(wire.status.as_str()),
            failure_reason: wire.failure_reason.and_then(|reason| reason.message),
        })
    }
}
