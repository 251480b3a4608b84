pub const CLI_NAME: &str = "deployer-cli";
pub const CLI_USER_DIRECTORY: &str = ".deployer";
pub const CLI_CONFIG_FILE: &str = "config.toml";
pub const ENV_PREFIX: &str = "DEPLOYER";

pub const DEFAULT_FABRIC_API_URL: &str = "https://api.fabric.microsoft.com/v1";
pub const DEFAULT_POWER_BI_API_URL: &str = "https://api.powerbi.com";

// Export bundle layout
pub const PLATFORM_FILE: &str = ".platform";
pub const DEPLOY_CONFIG_FILE: &str = "deploy.config.json";
pub const PLATFORM_SCHEMA_URL: &str =
    "https://developer.microsoft.com/json-schemas/fabric/gitIntegration/platformProperties/2.0.0/schema.json";
pub const PLATFORM_CONFIG_VERSION: &str = "2.0";

// Item definition parts rewritten during deployment
pub const NOTEBOOK_CONTENT_PART: &str = "notebook-content.py";
pub const PIPELINE_CONTENT_PART: &str = "pipeline-content.json";
pub const SEMANTIC_MODEL_EXPRESSIONS_PART: &str = "definition/expressions.tmdl";
pub const REPORT_DEFINITION_PART: &str = "definition.pbir";
pub const REPORT_LAYOUT_PART: &str = "report.json";

/// Connections whose display name contains this marker belong to a lakehouse
/// SQL endpoint and are never recreated.
pub const LAKEHOUSE_CONNECTION_MARKER: &str = "Lakehouse";

/// Legacy naming convention for bootstrap notebooks and pipelines.
pub const RUN_ON_CREATE_MARKER: &str = "Create";

pub const TENANT_WORKSPACE_PREFIX: &str = "Tenant - ";

pub const ADLS_HOST_SUFFIX: &str = "dfs.core.windows.net";
pub const ADLS_GEN2_SHORTCUT_TYPE: &str = "adlsgen2";

pub const NOTEBOOK_JOB_TYPE: &str = "RunNotebook";
pub const PIPELINE_JOB_TYPE: &str = "Pipeline";
pub const SQL_ENDPOINT_READY_STATUS: &str = "Success";

pub const DEFAULT_NOTEBOOK_POLL_INTERVAL: &str = "20s";
pub const DEFAULT_PIPELINE_POLL_INTERVAL: &str = "10s";
pub const DEFAULT_SQL_ENDPOINT_POLL_INTERVAL: &str = "10s";
pub const DEFAULT_REFRESH_POLL_INTERVAL: &str = "5s";

pub const GIT_MAIN_BRANCH: &str = "main";
