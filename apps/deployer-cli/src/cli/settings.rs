//! User settings.
//!
//! Read from `~/.deployer/config.toml` (or the file given with `--config`), then overridden by
//! environment variables prefixed with `DEPLOYER_`, using `__` between a group and its key:
//!
//! ```toml
//! [fabric]
//! access_token = "..."
//! capacity_id = "..."
//!
//! [polling]
//! notebook_interval = "30s"
//! ```
//!
//! is equivalent to `DEPLOYER_FABRIC__ACCESS_TOKEN=...` and so on.

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::cli::logger::LoggerSettings;
use crate::framework::core::execute::EngineSettings;
use crate::framework::core::redirects::ConnectionSecrets;
use crate::framework::core::remote_jobs::PollingSettings;
use crate::infrastructure::fabric::config::{FabricConfig, PowerBiConfig};
use crate::utilities::constants::{CLI_CONFIG_FILE, CLI_USER_DIRECTORY, ENV_PREFIX};
use crate::utilities::git::GitConfig;

fn default_exports_root() -> PathBuf {
    user_directory().join("exports")
}

#[derive(Deserialize, Debug, Clone)]
pub struct ExportsSettings {
    /// Folder holding one sub folder per local export
    #[serde(default = "default_exports_root")]
    pub root: PathBuf,
}

impl Default for ExportsSettings {
    fn default() -> Self {
        Self {
            root: default_exports_root(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub logger: LoggerSettings,
    #[serde(default)]
    pub fabric: FabricConfig,
    #[serde(default)]
    pub power_bi: PowerBiConfig,
    #[serde(default)]
    pub credentials: ConnectionSecrets,
    #[serde(default)]
    pub exports: ExportsSettings,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub polling: PollingSettings,
}

impl Settings {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            secrets: self.credentials.clone(),
            capacity_id: self.fabric.capacity_id.clone(),
            polling: self.polling.clone(),
            sql_endpoint_interval: self.fabric.sql_endpoint_poll_interval,
        }
    }
}

pub fn user_directory() -> PathBuf {
    home::home_dir()
        .unwrap_or_default()
        .join(CLI_USER_DIRECTORY)
}

pub fn setup_user_directory() -> std::io::Result<PathBuf> {
    let directory = user_directory();
    std::fs::create_dir_all(&directory)?;
    Ok(directory)
}

pub fn config_file() -> PathBuf {
    user_directory().join(CLI_CONFIG_FILE)
}

/// Reads settings from `path` (the user config file when `None`) and the environment.
///
/// A missing file is not an error; every setting has a default.
pub fn read_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let file = path.map(Path::to_path_buf).unwrap_or_else(config_file);

    Config::builder()
        .add_source(File::from(file).format(FileFormat::Toml).required(path.is_some()))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::logger::LogFormat;
    use serial_test::serial;
    use std::time::Duration;

    #[test]
    #[serial]
    fn test_file_values_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[fabric]
access_token = "token"
capacity_id = "cap-1"

[credentials]
tenant_id = "tenant"

[polling]
notebook_interval = "1m"

[exports]
root = "/srv/exports"
"#,
        )
        .unwrap();

        let settings = read_settings(Some(&path)).unwrap();

        assert_eq!(settings.fabric.access_token, "token");
        assert_eq!(settings.polling.notebook_interval, Duration::from_secs(60));
        assert_eq!(settings.polling.pipeline_interval, Duration::from_secs(10));
        assert_eq!(settings.exports.root, PathBuf::from("/srv/exports"));
        assert_eq!(settings.logger.format, LogFormat::Text);

        let engine = settings.engine_settings();
        assert_eq!(engine.capacity_id.as_deref(), Some("cap-1"));
        assert_eq!(engine.secrets.tenant_id, "tenant");
        assert_eq!(engine.sql_endpoint_interval, Duration::from_secs(10));
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[logger]\nstdout = false\n").unwrap();

        std::env::set_var("DEPLOYER_LOGGER__STDOUT", "true");
        std::env::set_var("DEPLOYER_POWER_BI__ACCESS_TOKEN", "from-env");
        let settings = read_settings(Some(&path));
        std::env::remove_var("DEPLOYER_LOGGER__STDOUT");
        std::env::remove_var("DEPLOYER_POWER_BI__ACCESS_TOKEN");

        let settings = settings.unwrap();
        assert!(settings.logger.stdout);
        assert_eq!(settings.power_bi.access_token, "from-env");
    }

    #[test]
    #[serial]
    fn test_explicit_file_must_exist() {
        assert!(read_settings(Some(Path::new("/nonexistent/deployer.toml"))).is_err());
    }
}
