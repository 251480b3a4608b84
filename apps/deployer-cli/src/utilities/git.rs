use std::path::{Path, PathBuf};

use git2::{Error, Repository, RepositoryInitOptions, Signature};
use serde::{Deserialize, Serialize};

use super::constants::{CLI_USER_DIRECTORY, GIT_MAIN_BRANCH};

fn default_branch() -> String {
    GIT_MAIN_BRANCH.to_string()
}

fn default_repositories_root() -> PathBuf {
    home::home_dir()
        .unwrap_or_default()
        .join(CLI_USER_DIRECTORY)
        .join("repositories")
}

fn default_author_name() -> String {
    "Deployer CLI".to_string()
}

fn default_author_email() -> String {
    "noreply@deployer.local".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GitConfig {
    #[serde(default = "default_repositories_root")]
    pub repositories_root: PathBuf,
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
    #[serde(default = "default_branch")]
    pub main_branch_name: String,
}

impl Default for GitConfig {
    fn default() -> GitConfig {
        GitConfig {
            repositories_root: default_repositories_root(),
            author_name: default_author_name(),
            author_email: default_author_email(),
            main_branch_name: default_branch(),
        }
    }
}

impl GitConfig {
    pub fn signature(&self) -> Result<Signature<'static>, Error> {
        Signature::now(&self.author_name, &self.author_email)
    }
}

pub fn is_git_repo(dir_path: &Path) -> Result<bool, Error> {
    match Repository::open(dir_path) {
        Ok(_) => Ok(true),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Opens the repository at `dir_path`, creating it with an empty initial commit on the
/// main branch when it does not exist yet.
pub fn open_or_init_repository(dir_path: &Path, config: &GitConfig) -> Result<Repository, Error> {
    if is_git_repo(dir_path)? {
        return Repository::open(dir_path);
    }

    let mut repo_create_options = RepositoryInitOptions::new();
    repo_create_options.initial_head(&config.main_branch_name);
    let repo = Repository::init_opts(dir_path, &repo_create_options)?;

    {
        let author = config.signature()?;
        let empty_tree_id = repo.treebuilder(None)?.write()?;
        let tree = repo.find_tree(empty_tree_id)?;

        // empty parent because it's the first commit
        repo.commit(Some("HEAD"), &author, &author, "Initial commit", &tree, &[])?;
    }

    Ok(repo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_main_with_empty_commit() {
        let dir = tempfile::tempdir().unwrap();
        let config = GitConfig::default();
        let path = dir.path().join("product-sales");

        assert!(!is_git_repo(&path).unwrap());
        let repo = open_or_init_repository(&path, &config).unwrap();

        let head = repo.head().unwrap();
        assert_eq!(head.shorthand(), Some("main"));
        let commit = head.peel_to_commit().unwrap();
        assert_eq!(commit.tree().unwrap().len(), 0);

        // opening again reuses the repository
        let reopened = open_or_init_repository(&path, &config).unwrap();
        assert_eq!(
            reopened.head().unwrap().peel_to_commit().unwrap().id(),
            commit.id()
        );
    }
}
