//! Semantic model operations that only the reporting API exposes: data source discovery,
//! binding a model to a connection and refreshing it.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::infrastructure::fabric::config::PowerBiConfig;
use crate::infrastructure::fabric::ItemStoreError;

const REFRESH_PENDING_STATUS: &str = "Unknown";

/// A data source auto-detected in a semantic model
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Datasource {
    /// `sql`, `web`, ... in lower case
    pub datasource_type: String,
    pub server: Option<String>,
    pub database: Option<String>,
    pub url: Option<String>,
}

#[async_trait]
pub trait SemanticModelGateway: Send + Sync {
    async fn get_datasources(
        &self,
        workspace_id: &str,
        model_id: &str,
    ) -> Result<Vec<Datasource>, ItemStoreError>;

    async fn bind_to_connection(
        &self,
        workspace_id: &str,
        model_id: &str,
        connection_id: &str,
    ) -> Result<(), ItemStoreError>;

    /// Starts a refresh and waits until the platform reports its outcome
    async fn refresh(&self, workspace_id: &str, model_id: &str) -> Result<(), ItemStoreError>;
}

#[derive(Debug, Deserialize)]
struct DatasourceList {
    value: Vec<WireDatasource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDatasource {
    datasource_type: String,
    #[serde(default)]
    connection_details: WireDatasourceDetails,
}

#[derive(Debug, Default, Deserialize)]
struct WireDatasourceDetails {
    server: Option<String>,
    database: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshDetails {
    status: String,
}

pub struct PowerBiRestClient {
    http: reqwest::Client,
    config: PowerBiConfig,
}

impl PowerBiRestClient {
    pub fn new(config: PowerBiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn dataset_url(&self, workspace_id: &str, model_id: &str, suffix: &str) -> String {
        format!(
            "{}/v1.0/myorg/groups/{}/datasets/{}/{}",
            self.config.api_url.trim_end_matches('/'),
            workspace_id,
            model_id,
            suffix
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ItemStoreError> {
        let response = request
            .bearer_auth(&self.config.access_token)
            .send()
            .await?;
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
}

#[async_trait]
impl SemanticModelGateway for PowerBiRestClient {
    async fn get_datasources(
        &self,
        workspace_id: &str,
        model_id: &str,
    ) -> Result<Vec<Datasource>, ItemStoreError> {
        let response = self
            .send(self.http.get(self.dataset_url(workspace_id, model_id, "datasources")))
            .await?;
        let list: DatasourceList = serde_json::from_slice(&response.bytes().await?)?;
        Ok(list
            .value
            .into_iter()
            .map(|wire| Datasource {
                datasource_type: wire.datasource_type.to_lowercase(),
                server: wire.connection_details.server,
                database: wire.connection_details.database,
                url: wire.connection_details.url,
            })
            .collect())
    }

    async fn bind_to_connection(
        &self,
        workspace_id: &str,
        model_id: &str,
        connection_id: &str,
    ) -> Result<(), ItemStoreError> {
        self.send(
            self.http
                .post(self.dataset_url(workspace_id, model_id, "Default.BindToGateway"))
                .json(&json!({ "datasourceObjectIds": [connection_id] })),
        )
        .await?;
        Ok(())
    }

    async fn refresh(&self, workspace_id: &str, model_id: &str) -> Result<(), ItemStoreError> {
        let response = self
            .send(
                self.http
                    .post(self.dataset_url(workspace_id, model_id, "refreshes"))
                    .json(&json!({ "notifyOption": "NoNotification", "type": "Automatic" })),
            )
            .await?;

        let request_id = response
            .headers()
            .get("x-ms-request-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or(ItemStoreError::NotFound {
                kind: "Refresh request",
                name: model_id.to_string(),
            })?;

        loop {
            let response = self
                .send(self.http.get(self.dataset_url(
                    workspace_id,
                    model_id,
                    &format!("refreshes/{request_id}"),
                )))
                .await?;
            let details: RefreshDetails = serde_json::from_slice(&response.bytes().await?)?;
            if details.status != REFRESH_PENDING_STATUS {
                debug!("Refresh of {} finished with {}", model_id, details.status);
                return Ok(());
            }
            tokio::time::sleep(self.config.refresh_poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datasource_list_parsing() {
        let list: DatasourceList = serde_json::from_str(
            r#"{"value":[
                {"datasourceType":"Sql","connectionDetails":{"server":"x.datawarehouse.fabric.microsoft.com","database":"ep-1"}},
                {"datasourceType":"Web","connectionDetails":{"url":"https://a/b/"}},
                {"datasourceType":"Extension"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(list.value.len(), 3);
        assert_eq!(list.value[0].connection_details.database.as_deref(), Some("ep-1"));
        assert_eq!(list.value[1].connection_details.url.as_deref(), Some("https://a/b/"));
        assert!(list.value[2].connection_details.server.is_none());
    }

    #[test]
    fn test_dataset_url() {
        let client = PowerBiRestClient::new(PowerBiConfig {
            api_url: "https://api.powerbi.com/".to_string(),
            ..PowerBiConfig::default()
        });
        assert_eq!(
            client.dataset_url("w", "m", "datasources"),
            "https://api.powerbi.com/v1.0/myorg/groups/w/datasets/m/datasources"
        );
    }
}
