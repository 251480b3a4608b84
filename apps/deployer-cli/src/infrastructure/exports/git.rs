//! Exports stored as branches of per-project git repositories.
//!
//! A project is a repository directory under [`GitConfig::repositories_root`]; each export is a
//! branch forked from the main branch. Bundles are read straight from the branch tree and
//! written by building a tree in memory and committing it, so no working copy is ever checked
//! out or modified.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use git2::{
    BranchType, IndexEntry, IndexTime, ObjectType, Oid, Reference, Repository, TreeWalkMode,
    TreeWalkResult,
};
use tracing::info;

use super::{
    validate_export_name, validate_relative_path, ExportBundle, ExportFile, ExportSink,
    ExportSource, ExportStoreError,
};
use crate::utilities::git::{is_git_repo, open_or_init_repository, GitConfig};

const FILE_MODE: u32 = 0o100644;

#[derive(Debug, Clone)]
pub struct GitExportStore {
    config: GitConfig,
}

impl GitExportStore {
    pub fn new(config: GitConfig) -> Self {
        Self { config }
    }

    pub fn project_path(&self, project: &str) -> Result<PathBuf, ExportStoreError> {
        validate_export_name(project)?;
        Ok(self.config.repositories_root.join(project))
    }

    /// Export branches of a project, i.e. every local branch except the main one.
    pub fn list_branches(&self, project: &str) -> Result<Vec<String>, ExportStoreError> {
        let repo = self.open_project(project)?;
        let mut names = Vec::new();
        for branch in repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            if let Some(name) = branch.name()? {
                if name != self.config.main_branch_name {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn branch_exists(&self, project: &str, branch: &str) -> Result<bool, ExportStoreError> {
        let path = self.project_path(project)?;
        if !is_git_repo(&path)? {
            return Ok(false);
        }
        let repo = Repository::open(&path)?;
        let exists = repo.find_branch(branch, BranchType::Local).is_ok();
        Ok(exists)
    }

    /// `{project}_{yyyy-MM-dd}`, or with the time appended when that branch is taken.
    pub fn suggest_export_name(
        &self,
        project: &str,
        now: NaiveDateTime,
    ) -> Result<String, ExportStoreError> {
        let daily = format!("{} {}", project, now.format("%Y-%m-%d")).replace(' ', "_");
        if !self.branch_exists(project, &daily)? {
            return Ok(daily);
        }
        Ok(format!("{} {}", project, now.format("%Y-%m-%d-%H-%M")).replace(' ', "_"))
    }

    pub fn read_bundle(&self, project: &str, branch: &str) -> Result<ExportBundle, ExportStoreError> {
        let repo = self.open_project(project)?;
        let tip = repo
            .find_branch(branch, BranchType::Local)
            .map_err(|_| ExportStoreError::BranchNotFound {
                project: project.to_string(),
                branch: branch.to_string(),
            })?
            .get()
            .peel_to_commit()?;
        let tree = tip.tree()?;

        let mut blobs: Vec<(String, Oid)> = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    blobs.push((format!("{root}{name}"), entry.id()));
                }
            }
            TreeWalkResult::Ok
        })?;

        let mut files = Vec::with_capacity(blobs.len());
        for (path, id) in blobs {
            let blob = repo.find_blob(id)?;
            files.push(ExportFile::new(path, blob.content().to_vec()));
        }
        Ok(ExportBundle::new(files))
    }

    /// Commits `bundle` as the whole content of `branch`.
    ///
    /// A missing branch is forked from the main branch; an existing one gets a new commit on
    /// top of its tip. The project repository is created when it does not exist yet.
    pub fn write_bundle(
        &self,
        project: &str,
        branch: &str,
        bundle: &ExportBundle,
        message: &str,
    ) -> Result<Oid, ExportStoreError> {
        let reference = format!("refs/heads/{branch}");
        if !Reference::is_valid_name(&reference) || branch == self.config.main_branch_name {
            return Err(ExportStoreError::InvalidName(branch.to_string()));
        }
        for file in bundle.files() {
            validate_relative_path(&file.path)?;
        }

        let path = self.project_path(project)?;
        let repo = open_or_init_repository(&path, &self.config)?;

        let mut index = git2::Index::new()?;
        for file in bundle.files() {
            let id = repo.blob(&file.content)?;
            index.add(&index_entry(&file.path, id, file.content.len()))?;
        }
        let tree_id = index.write_tree_to(&repo)?;
        let tree = repo.find_tree(tree_id)?;

        let parent = match repo.find_branch(branch, BranchType::Local) {
            Ok(existing) => existing.get().peel_to_commit()?,
            Err(_) => repo
                .find_branch(&self.config.main_branch_name, BranchType::Local)?
                .get()
                .peel_to_commit()?,
        };

        let author = self.config.signature()?;
        let oid = repo.commit(
            Some(reference.as_str()),
            &author,
            &author,
            message,
            &tree,
            &[&parent],
        )?;
        info!("Committed export {} to {}:{}", oid, project, branch);
        Ok(oid)
    }

    pub fn export(&self, project: &str, branch: &str) -> GitExport {
        GitExport {
            store: self.clone(),
            project: project.to_string(),
            branch: branch.to_string(),
            message: format!("Export {branch}"),
        }
    }

    fn open_project(&self, project: &str) -> Result<Repository, ExportStoreError> {
        let path = self.project_path(project)?;
        if !is_git_repo(&path)? {
            return Err(ExportStoreError::ProjectNotFound(project.to_string()));
        }
        Ok(Repository::open(&path)?)
    }
}

fn index_entry(path: &str, id: Oid, size: usize) -> IndexEntry {
    IndexEntry {
        ctime: IndexTime::new(0, 0),
        mtime: IndexTime::new(0, 0),
        dev: 0,
        ino: 0,
        mode: FILE_MODE,
        uid: 0,
        gid: 0,
        file_size: size as u32,
        id,
        flags: path.len().min(0xfff) as u16,
        flags_extended: 0,
        path: path.as_bytes().to_vec(),
    }
}

/// One export branch of one project.
#[derive(Debug, Clone)]
pub struct GitExport {
    store: GitExportStore,
    project: String,
    branch: String,
    message: String,
}

impl GitExport {
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl ExportSource for GitExport {
    fn read_bundle(&self) -> Result<ExportBundle, ExportStoreError> {
        self.store.read_bundle(&self.project, &self.branch)
    }

    fn describe(&self) -> String {
        format!("branch '{}' of project '{}'", self.branch, self.project)
    }
}

impl ExportSink for GitExport {
    fn write_bundle(&self, bundle: &ExportBundle) -> Result<(), ExportStoreError> {
        self.store
            .write_bundle(&self.project, &self.branch, bundle, &self.message)
            .map(|_| ())
    }

    fn describe(&self) -> String {
        format!("branch '{}' of project '{}'", self.branch, self.project)
    }
}
