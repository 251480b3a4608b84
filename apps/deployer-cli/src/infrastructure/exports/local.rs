use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{
    validate_export_name, validate_relative_path, ExportBundle, ExportFile, ExportSink,
    ExportSource, ExportStoreError,
};
use crate::framework::core::solution_plan::DeployConfig;
use crate::utilities::constants::DEPLOY_CONFIG_FILE;

/// Exports kept as folders under a single root directory.
#[derive(Debug, Clone)]
pub struct LocalExportStore {
    root: PathBuf,
}

impl LocalExportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of all exports, sorted.
    pub fn list_exports(&self) -> Result<Vec<String>, ExportStoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|source| io_error(&self.root, source))? {
            let entry = entry.map_err(|source| io_error(&self.root, source))?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn read_deploy_config(&self, name: &str) -> Result<DeployConfig, ExportStoreError> {
        let path = self.export_path(name)?.join(DEPLOY_CONFIG_FILE);
        if !path.exists() {
            return Err(ExportStoreError::ExportNotFound(name.to_string()));
        }
        let content = fs::read(&path).map_err(|source| io_error(&path, source))?;
        Ok(DeployConfig::from_slice(&content)?)
    }

    /// Deploy configurations of every export that has one.
    pub fn list_export_configs(&self) -> Result<Vec<(String, DeployConfig)>, ExportStoreError> {
        let mut configs = Vec::new();
        for name in self.list_exports()? {
            match self.read_deploy_config(&name) {
                Ok(config) => configs.push((name, config)),
                Err(ExportStoreError::ExportNotFound(_)) => {
                    debug!("Skipping folder without {DEPLOY_CONFIG_FILE}: {name}")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(configs)
    }

    pub fn delete_export(&self, name: &str) -> Result<(), ExportStoreError> {
        let path = self.export_path(name)?;
        if !path.exists() {
            return Err(ExportStoreError::ExportNotFound(name.to_string()));
        }
        fs::remove_dir_all(&path).map_err(|source| io_error(&path, source))?;
        info!("Deleted export {}", path.display());
        Ok(())
    }

    pub fn read_bundle(&self, name: &str) -> Result<ExportBundle, ExportStoreError> {
        let path = self.export_path(name)?;
        if !path.is_dir() {
            return Err(ExportStoreError::ExportNotFound(name.to_string()));
        }

        let mut files = Vec::new();
        collect_files(&path, &path, &mut files)?;
        Ok(ExportBundle::new(files))
    }

    /// Replaces the contents of the export folder with `bundle`.
    pub fn write_bundle(&self, name: &str, bundle: &ExportBundle) -> Result<(), ExportStoreError> {
        let path = self.export_path(name)?;
        for file in bundle.files() {
            validate_relative_path(&file.path)?;
        }

        if path.exists() {
            fs::remove_dir_all(&path).map_err(|source| io_error(&path, source))?;
        }
        fs::create_dir_all(&path).map_err(|source| io_error(&path, source))?;

        for file in bundle.files() {
            let target = path.join(&file.path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
            }
            fs::write(&target, &file.content).map_err(|source| io_error(&target, source))?;
        }

        info!(
            "Wrote {} files to export {}",
            bundle.len(),
            path.display()
        );
        Ok(())
    }

    pub fn export(&self, name: &str) -> LocalExport {
        LocalExport {
            store: self.clone(),
            name: name.to_string(),
        }
    }

    fn export_path(&self, name: &str) -> Result<PathBuf, ExportStoreError> {
        validate_export_name(name)?;
        Ok(self.root.join(name))
    }
}

/// A single named export inside a [`LocalExportStore`].
#[derive(Debug, Clone)]
pub struct LocalExport {
    store: LocalExportStore,
    name: String,
}

impl ExportSource for LocalExport {
    fn read_bundle(&self) -> Result<ExportBundle, ExportStoreError> {
        self.store.read_bundle(&self.name)
    }

    fn describe(&self) -> String {
        format!("export '{}'", self.name)
    }
}

impl ExportSink for LocalExport {
    fn write_bundle(&self, bundle: &ExportBundle) -> Result<(), ExportStoreError> {
        self.store.write_bundle(&self.name, bundle)
    }

    fn describe(&self) -> String {
        format!("export '{}'", self.name)
    }
}

fn collect_files(
    root: &Path,
    dir: &Path,
    files: &mut Vec<ExportFile>,
) -> Result<(), ExportStoreError> {
    for entry in fs::read_dir(dir).map_err(|source| io_error(dir, source))? {
        let entry = entry.map_err(|source| io_error(dir, source))?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, files)?;
            continue;
        }

        let relative = path
            .strip_prefix(root)
            .map_err(|_| ExportStoreError::InvalidPath(path.display().to_string()))?
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let content = fs::read(&path).map_err(|source| io_error(&path, source))?;
        files.push(ExportFile::new(relative, content));
    }
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> ExportStoreError {
    ExportStoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bundle() -> ExportBundle {
        ExportBundle::new(vec![
            ExportFile::new(
                "deploy.config.json",
                br#"{"sourceWorkspaceId":"ws-1","solutionName":"Sales"}"#.to_vec(),
            ),
            ExportFile::new("Load.Notebook/.platform", b"{}".to_vec()),
            ExportFile::new("Load.Notebook/notebook-content.py", b"print(1)".to_vec()),
            ExportFile::new("Sales.Report/StaticResources/theme.json", b"{}".to_vec()),
        ])
    }

    #[test]
    fn test_write_then_read_preserves_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalExportStore::new(dir.path());

        store.write_bundle("nightly", &sample_bundle()).unwrap();
        let read = store.read_bundle("nightly").unwrap();

        assert_eq!(read, sample_bundle());
        assert!(dir
            .path()
            .join("nightly/Sales.Report/StaticResources/theme.json")
            .exists());
    }

    #[test]
    fn test_write_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalExportStore::new(dir.path());
        store.write_bundle("nightly", &sample_bundle()).unwrap();

        let smaller = ExportBundle::new(vec![ExportFile::new(
            "deploy.config.json",
            br#"{"sourceWorkspaceId":"ws-2"}"#.to_vec(),
        )]);
        store.write_bundle("nightly", &smaller).unwrap();

        assert_eq!(store.read_bundle("nightly").unwrap().len(), 1);
        assert!(!dir.path().join("nightly/Load.Notebook").exists());
    }

    #[test]
    fn test_list_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalExportStore::new(dir.path());
        store.write_bundle("b-export", &sample_bundle()).unwrap();
        store.write_bundle("a-export", &sample_bundle()).unwrap();
        fs::create_dir(dir.path().join("scratch")).unwrap();

        assert_eq!(
            store.list_exports().unwrap(),
            vec!["a-export", "b-export", "scratch"]
        );

        let configs = store.list_export_configs().unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].1.solution_name, "Sales");

        store.delete_export("a-export").unwrap();
        assert!(matches!(
            store.delete_export("a-export"),
            Err(ExportStoreError::ExportNotFound(_))
        ));
    }

    #[test]
    fn test_missing_root_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalExportStore::new(dir.path().join("absent"));
        assert!(store.list_exports().unwrap().is_empty());
        assert!(matches!(
            store.read_bundle("nope"),
            Err(ExportStoreError::ExportNotFound(_))
        ));
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalExportStore::new(dir.path());
        let bundle = ExportBundle::new(vec![ExportFile::new("../outside", vec![])]);

        assert!(matches!(
            store.write_bundle("bad", &bundle),
            Err(ExportStoreError::InvalidPath(_))
        ));
    }
}
