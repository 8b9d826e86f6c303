use std::path::Path;

use git2::{BranchType, Direction, ObjectType, Oid, Repository, ResetType, Sort, Tree};
use log::{debug, trace};
use thiserror::Error;

use crate::{
    flock::FileLock,
    model::{component::ComponentType, identity::RepositoryIdentity},
};

use super::cache::{CacheError, ComponentGitCache};

/// Directory older repositories used instead of `modules/`.
const LEGACY_SOFTWARE_DIR: &str = "software";

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("Git error: {0}")]
    GitError(#[from] git2::Error),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("Branch '{branch}' not found in '{repository}'")]
    BranchNotFound { repository: String, branch: String },
    #[error("Repository '{repository}' ({branch}) does not contain a '{expected}/' directory{hint}")]
    InvalidRepositoryLayout {
        repository: String,
        branch: String,
        expected: String,
        hint: String,
    },
    #[error("Could not determine the default branch of '{repository}'")]
    UnknownDefaultBranch { repository: String },
    #[error("Repository '{repository}' has no working tree")]
    Bare { repository: String },
}

/// A locked, checked-out clone inside the cache.
pub struct CachedRepository<'a> {
    cache: &'a ComponentGitCache,
    git_repo: Repository,
    identity: RepositoryIdentity,
    _lock: FileLock,
}

impl<'a> CachedRepository<'a> {
    pub(super) fn new(
        cache: &'a ComponentGitCache,
        git_repo: Repository,
        identity: RepositoryIdentity,
        lock: FileLock,
    ) -> CachedRepository<'a> {
        CachedRepository {
            cache,
            git_repo,
            identity,
            _lock: lock,
        }
    }

    pub fn identity(&self) -> &RepositoryIdentity {
        &self.identity
    }

    pub(crate) fn git_repo(&self) -> &Repository {
        &self.git_repo
    }

    /// Working tree of the clone.
    pub fn path(&self) -> &Path {
        self.git_repo
            .workdir()
            .unwrap_or_else(|| self.git_repo.path())
    }

    /// Pulls the latest state of every branch from `origin`.
    pub fn refresh(&self) -> Result<(), RepoError> {
        self.cache.pull(&self.git_repo, &self.identity)?;
        Ok(())
    }

    /// The branch `origin/HEAD` points to. Asks the remote when the clone
    /// does not record it.
    pub fn default_branch(&self) -> Result<String, RepoError> {
        match self.git_repo.find_reference("refs/remotes/origin/HEAD") {
            Ok(reference) => {
                if let Some(branch) = reference
                    .symbolic_target()
                    .and_then(|target| target.strip_prefix("refs/remotes/origin/"))
                {
                    debug!("Default branch of {} is {}", self.identity.full_name(), branch);
                    return Ok(branch.to_owned());
                }
            }
            Err(error) if error.code() == git2::ErrorCode::NotFound => {
                trace!("No origin/HEAD reference, asking the remote");
            }
            Err(error) => return Err(error.into()),
        }

        let mut remote = self.git_repo.find_remote("origin")?;
        let connection =
            remote.connect_auth(Direction::Fetch, Some(self.cache.remote_callbacks()), None)?;
        let buf = connection.default_branch()?;
        buf.as_str()
            .map(|name| name.trim_start_matches("refs/heads/").to_owned())
            .ok_or_else(|| RepoError::UnknownDefaultBranch {
                repository: self.identity.full_name(),
            })
    }

    /// Points the working tree at the tip of `origin/<branch>`.
    pub fn checkout_branch(&self, branch: &str) -> Result<(), RepoError> {
        let commit = self
            .git_repo
            .find_reference(&format!("refs/remotes/origin/{branch}"))
            .and_then(|reference| reference.peel_to_commit())
            .map_err(|_| RepoError::BranchNotFound {
                repository: self.identity.full_name(),
                branch: branch.to_owned(),
            })?;

        if self.git_repo.find_branch(branch, BranchType::Local).is_err() {
            self.git_repo.branch(branch, &commit, false)?;
        }
        self.git_repo.set_head(&format!("refs/heads/{branch}"))?;
        self.git_repo
            .reset(commit.as_object(), ResetType::Hard, None)?;

        debug!(
            "Checked out {} of {} at {}",
            branch,
            self.identity.full_name(),
            commit.id()
        );
        Ok(())
    }

    /// Verifies that the checked-out tree has a top-level modules directory.
    pub fn verify_layout(&self, branch: &str) -> Result<(), RepoError> {
        let workdir = self.git_repo.workdir().ok_or_else(|| RepoError::Bare {
            repository: self.identity.full_name(),
        })?;
        let expected = ComponentType::Module.dir_name();
        if workdir.join(expected).is_dir() {
            return Ok(());
        }
        let hint = if workdir.join(LEGACY_SOFTWARE_DIR).is_dir() {
            format!(
                ".\nThe '{}/' directory should be renamed to '{}/'",
                LEGACY_SOFTWARE_DIR, expected
            )
        } else {
            String::new()
        };
        Err(RepoError::InvalidRepositoryLayout {
            repository: self.identity.full_name(),
            branch: branch.to_owned(),
            expected: expected.to_owned(),
            hint,
        })
    }

    /// Content of a file in the checked-out commit, if present.
    pub fn read_head_file(&self, path: &str) -> Result<Option<Vec<u8>>, RepoError> {
        let tree = self.git_repo.head()?.peel_to_tree()?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(error) if error.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        match entry.kind() {
            Some(ObjectType::Blob) => {
                let blob = self.git_repo.find_blob(entry.id())?;
                Ok(Some(blob.content().to_vec()))
            }
            _ => Ok(None),
        }
    }

    /// Most recent commit of the checked-out branch that changed `path`.
    pub fn latest_revision(&self, path: &str) -> Result<Option<String>, RepoError> {
        let mut revwalk = self.git_repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

        for oid in revwalk {
            let commit = self.git_repo.find_commit(oid?)?;
            let current = entry_id(&commit.tree()?, path);
            let previous = match commit.parent(0) {
                Ok(parent) => entry_id(&parent.tree()?, path),
                Err(_) => None,
            };
            if current.is_some() && current != previous {
                return Ok(Some(commit.id().to_string()));
            }
        }
        Ok(None)
    }

    /// True when `revision` is the checked-out commit or one of its ancestors.
    pub fn contains_revision(&self, revision: &str) -> Result<bool, RepoError> {
        let commit = match self
            .git_repo
            .revparse_single(revision)
            .and_then(|object| object.peel_to_commit())
        {
            Ok(commit) => commit,
            Err(error) => {
                trace!("Revision {} not found: {}", revision, error);
                return Ok(false);
            }
        };
        let head = self.git_repo.head()?.peel_to_commit()?.id();
        Ok(head == commit.id() || self.git_repo.graph_descendant_of(head, commit.id())?)
    }
}

fn entry_id(tree: &Tree<'_>, path: &str) -> Option<Oid> {
    tree.get_path(Path::new(path)).ok().map(|entry| entry.id())
}
