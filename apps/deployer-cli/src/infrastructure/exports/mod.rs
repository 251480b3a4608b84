//! Export stores.
//!
//! An export is a portable snapshot of a workspace: one folder per item named
//! `{displayName}.{type}` holding a `.platform` file and the item's part files, plus a
//! `deploy.config.json` at the root. The same logical layout is stored either in a local
//! folder ([`local::LocalExportStore`]) or on a branch of a git repository
//! ([`git::GitExportStore`]).

pub mod git;
pub mod local;

use std::path::PathBuf;

use thiserror::Error;

use crate::framework::core::solution_plan::BundleError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExportStoreError {
    #[error("Export '{0}' does not exist")]
    ExportNotFound(String),

    #[error("Project '{0}' does not exist")]
    ProjectNotFound(String),

    #[error("Branch '{branch}' does not exist in project '{project}'")]
    BranchNotFound { project: String, branch: String },

    #[error("'{0}' is not a valid export name")]
    InvalidName(String),

    #[error("Export file path '{0}' escapes the export folder")]
    InvalidPath(String),

    #[error("Failed to access {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Git operation failed")]
    Git(#[from] git2::Error),

    #[error(transparent)]
    Bundle(#[from] BundleError),
}

/// One file of an export, addressed by its `/`-separated path relative to the export root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub path: String,
    pub content: Vec<u8>,
}

impl ExportFile {
    pub fn new(path: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            content,
        }
    }
}

/// The files of one export, kept sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportBundle {
    files: Vec<ExportFile>,
}

impl ExportBundle {
    pub fn new(mut files: Vec<ExportFile>) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Self { files }
    }

    pub fn files(&self) -> &[ExportFile] {
        &self.files
    }

    pub fn get(&self, path: &str) -> Option<&ExportFile> {
        self.files.iter().find(|file| file.path == path)
    }

    pub fn push(&mut self, file: ExportFile) {
        let position = self
            .files
            .partition_point(|existing| existing.path < file.path);
        self.files.insert(position, file);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Somewhere an export can be read from.
pub trait ExportSource: Send + Sync {
    fn read_bundle(&self) -> Result<ExportBundle, ExportStoreError>;

    /// Human readable location, used in progress output.
    fn describe(&self) -> String;
}

/// Somewhere an export can be written to.
pub trait ExportSink: Send + Sync {
    fn write_bundle(&self, bundle: &ExportBundle) -> Result<(), ExportStoreError>;

    fn describe(&self) -> String;
}

/// Rejects export paths that could leave the export root.
pub(crate) fn validate_relative_path(path: &str) -> Result<(), ExportStoreError> {
    let invalid = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|segment| segment.is_empty() || segment == "..");
    if invalid {
        return Err(ExportStoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Export names become folder names and branch names.
pub(crate) fn validate_export_name(name: &str) -> Result<(), ExportStoreError> {
    let invalid = name.trim().is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if invalid {
        return Err(ExportStoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_stays_sorted() {
        let mut bundle = ExportBundle::new(vec![
            ExportFile::new("b/.platform", vec![]),
            ExportFile::new("a/.platform", vec![]),
        ]);
        bundle.push(ExportFile::new("a/content.py", vec![1]));

        let paths: Vec<&str> = bundle.files().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a/.platform", "a/content.py", "b/.platform"]);
        assert_eq!(bundle.get("a/content.py").unwrap().content, vec![1]);
    }

    #[test]
    fn test_path_validation() {
        assert!(validate_relative_path("Sales.Report/report.json").is_ok());
        assert!(validate_relative_path("../etc/passwd").is_err());
        assert!(validate_relative_path("/abs").is_err());
        assert!(validate_relative_path("a//b").is_err());
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_export_name("Product Sales 2024-05-01").is_ok());
        assert!(validate_export_name("").is_err());
        assert!(validate_export_name(".hidden").is_err());
        assert!(validate_export_name("a/b").is_err());
    }
}
