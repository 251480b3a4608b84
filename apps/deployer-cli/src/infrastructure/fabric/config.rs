use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utilities::constants::{
    DEFAULT_FABRIC_API_URL, DEFAULT_POWER_BI_API_URL, DEFAULT_REFRESH_POLL_INTERVAL,
    DEFAULT_SQL_ENDPOINT_POLL_INTERVAL,
};
use crate::utilities::duration;

fn default_fabric_api_url() -> String {
    DEFAULT_FABRIC_API_URL.to_string()
}

fn default_power_bi_api_url() -> String {
    DEFAULT_POWER_BI_API_URL.to_string()
}

fn default_refresh_poll_interval() -> Duration {
    duration::parse_default(DEFAULT_REFRESH_POLL_INTERVAL)
}

fn default_sql_endpoint_poll_interval() -> Duration {
    duration::parse_default(DEFAULT_SQL_ENDPOINT_POLL_INTERVAL)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricConfig {
    #[serde(default = "default_fabric_api_url")]
    pub api_url: String,
    /// Bearer token for the workspace platform
    #[serde(default)]
    pub access_token: String,
    /// Capacity new workspaces are assigned to
    #[serde(default)]
    pub capacity_id: Option<String>,
    #[serde(
        default = "default_sql_endpoint_poll_interval",
        with = "duration"
    )]
    pub sql_endpoint_poll_interval: Duration,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            api_url: default_fabric_api_url(),
            access_token: String::new(),
            capacity_id: None,
            sql_endpoint_poll_interval: default_sql_endpoint_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerBiConfig {
    #[serde(default = "default_power_bi_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_refresh_poll_interval", with = "duration")]
    pub refresh_poll_interval: Duration,
}

impl Default for PowerBiConfig {
    fn default() -> Self {
        Self {
            api_url: default_power_bi_api_url(),
            access_token: String::new(),
            refresh_poll_interval: default_refresh_poll_interval(),
        }
    }
}
