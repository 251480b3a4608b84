//! Deployment plans and the built-in customer catalog.
//!
//! A [`DeploymentPlan`] names a deployment target and carries the parameters that control
//! how source paths are redirected for it. Staged deployments use an ad hoc plan with no
//! parameters; customer tenants come from [`CustomerCatalog`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utilities::constants::TENANT_WORKSPACE_PREFIX;

const SAMPLE_DATA_WEB_ROOT: &str =
    "https://fabricdevcamp.blob.core.windows.net/sampledata/ProductSales/";
const SAMPLE_DATA_ADLS_SERVER: &str = "https://fabricdevcamp.dfs.core.windows.net/";
const SAMPLE_DATA_CONTAINER: &str = "sampledata";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentPlanType {
    StagedDeployment,
    CustomerTenantDeployment,
}

/// The fixed vocabulary of deployment parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParameterKey {
    #[serde(rename = "webDatasourcePath")]
    WebDatasourcePath,
    #[serde(rename = "adlsServer")]
    AdlsServer,
    #[serde(rename = "adlsContainerName")]
    AdlsContainerName,
    #[serde(rename = "adlsContainerPath")]
    AdlsContainerPath,
}

impl ParameterKey {
    pub const ALL: [ParameterKey; 4] = [
        ParameterKey::WebDatasourcePath,
        ParameterKey::AdlsServer,
        ParameterKey::AdlsContainerName,
        ParameterKey::AdlsContainerPath,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterKey::WebDatasourcePath => "webDatasourcePath",
            ParameterKey::AdlsServer => "adlsServer",
            ParameterKey::AdlsContainerName => "adlsContainerName",
            ParameterKey::AdlsContainerPath => "adlsContainerPath",
        }
    }
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParameterKey::ALL
            .into_iter()
            .find(|key| key.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown deployment parameter '{s}'"))
    }
}

/// Resolved ADLS override, present only when all three ADLS parameters are set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdlsOverride<'a> {
    pub server: &'a str,
    pub container_name: &'a str,
    pub container_path: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub plan_type: DeploymentPlanType,
    pub parameters: BTreeMap<ParameterKey, String>,
}

impl DeploymentPlan {
    pub fn new(id: impl Into<String>, name: impl Into<String>, plan_type: DeploymentPlanType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            plan_type,
            parameters: BTreeMap::new(),
        }
    }

    /// Ad hoc plan for deploying the solution as-is into a staging workspace.
    pub fn staged() -> Self {
        Self::new("Staged", "Staged Deployment", DeploymentPlanType::StagedDeployment)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_parameter(mut self, key: ParameterKey, value: impl Into<String>) -> Self {
        self.parameters.insert(key, value.into());
        self
    }

    pub fn parameter(&self, key: ParameterKey) -> Option<&str> {
        self.parameters.get(&key).map(String::as_str)
    }

    pub fn adls_override(&self) -> Option<AdlsOverride<'_>> {
        Some(AdlsOverride {
            server: self.parameter(ParameterKey::AdlsServer)?,
            container_name: self.parameter(ParameterKey::AdlsContainerName)?,
            container_path: self.parameter(ParameterKey::AdlsContainerPath)?,
        })
    }

    pub fn target_workspace_name(&self) -> String {
        format!("{TENANT_WORKSPACE_PREFIX}{}", self.name)
    }

    pub fn is_customer_tenant(&self) -> bool {
        self.plan_type == DeploymentPlanType::CustomerTenantDeployment
    }
}

/// The built-in customer tenants.
pub struct CustomerCatalog;

impl CustomerCatalog {
    const CUSTOMERS: [(&'static str, &'static str); 6] = [
        ("AdventureWorks", "Adventure Works"),
        ("Contoso", "Contoso"),
        ("Fabrikam", "Fabrikam"),
        ("Northwind", "Northwind Traders"),
        ("SeamarkFarms", "Seamark Farms"),
        ("Wingtip", "Wingtip Toys"),
    ];

    pub fn all() -> Vec<DeploymentPlan> {
        Self::CUSTOMERS
            .iter()
            .map(|(id, name)| Self::customer_plan(id, name))
            .collect()
    }

    pub fn get(id: &str) -> Option<DeploymentPlan> {
        Self::CUSTOMERS
            .iter()
            .find(|(customer_id, _)| customer_id.eq_ignore_ascii_case(id))
            .map(|(id, name)| Self::customer_plan(id, name))
    }

    /// Finds the customer whose tenant workspace is `workspace_name`.
    pub fn find_by_workspace_name(workspace_name: &str) -> Option<DeploymentPlan> {
        Self::all()
            .into_iter()
            .find(|plan| plan.target_workspace_name() == workspace_name)
    }

    fn customer_plan(id: &str, name: &str) -> DeploymentPlan {
        DeploymentPlan::new(id, name, DeploymentPlanType::CustomerTenantDeployment)
            .with_description(format!("Customer tenant for {name}"))
            .with_parameter(
                ParameterKey::WebDatasourcePath,
                format!("{SAMPLE_DATA_WEB_ROOT}Customers/{id}/"),
            )
            .with_parameter(ParameterKey::AdlsServer, SAMPLE_DATA_ADLS_SERVER)
            .with_parameter(ParameterKey::AdlsContainerName, SAMPLE_DATA_CONTAINER)
            .with_parameter(
                ParameterKey::AdlsContainerPath,
                format!("/ProductSales/Customers/{id}/"),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_has_six_customers() {
        let ids: Vec<String> = CustomerCatalog::all().into_iter().map(|p| p.id).collect();
        assert_eq!(
            ids,
            vec![
                "AdventureWorks",
                "Contoso",
                "Fabrikam",
                "Northwind",
                "SeamarkFarms",
                "Wingtip"
            ]
        );
    }

    #[test]
    fn test_customer_parameters() {
        let plan = CustomerCatalog::get("northwind").unwrap();

        assert_eq!(plan.name, "Northwind Traders");
        assert!(plan.is_customer_tenant());
        assert_eq!(plan.target_workspace_name(), "Tenant - Northwind Traders");
        assert_eq!(
            plan.parameter(ParameterKey::WebDatasourcePath),
            Some("https://fabricdevcamp.blob.core.windows.net/sampledata/ProductSales/Customers/Northwind/")
        );

        let adls = plan.adls_override().unwrap();
        assert_eq!(adls.container_name, "sampledata");
        assert_eq!(adls.container_path, "/ProductSales/Customers/Northwind/");
    }

    #[test]
    fn test_staged_plan_has_no_parameters() {
        let plan = DeploymentPlan::staged();
        assert!(plan.parameters.is_empty());
        assert!(plan.adls_override().is_none());
        assert!(!plan.is_customer_tenant());
    }

    #[test]
    fn test_adls_override_requires_all_three() {
        let plan = DeploymentPlan::staged()
            .with_parameter(ParameterKey::AdlsServer, "https://acct.dfs.core.windows.net/")
            .with_parameter(ParameterKey::AdlsContainerName, "data");
        assert!(plan.adls_override().is_none());
    }

    #[test]
    fn test_workspace_name_lookup() {
        let plan = CustomerCatalog::find_by_workspace_name("Tenant - Wingtip Toys").unwrap();
        assert_eq!(plan.id, "Wingtip");
        assert!(CustomerCatalog::find_by_workspace_name("Tenant - Nobody").is_none());
    }

    #[test]
    fn test_parameter_key_parsing() {
        assert_eq!(
            "webdatasourcepath".parse::<ParameterKey>(),
            Ok(ParameterKey::WebDatasourcePath)
        );
        assert!("bogus".parse::<ParameterKey>().is_err());
    }
}
