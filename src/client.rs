use std::{
    cell::OnceCell,
    collections::{BTreeMap, BTreeSet},
    io::Write,
    path::{Path, PathBuf},
};

use log::{debug, info, trace};
use thiserror::Error;

use crate::{
    context::{ProjectConfig, PROJECT_CONFIG_FILES},
    git::{
        cache::{CacheError, ComponentGitCache},
        repository::{CachedRepository, RepoError},
    },
    model::{
        component::ComponentType,
        identity::{RepositoryIdentity, DEFAULT_BRANCH},
        tree::{FileHandle, RemoteFileTree, TreeError},
        ParseError,
    },
    reconcile::KnownRemote,
    remote::{GitHubApi, RemoteApi, RemoteError},
};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error("No {component_type} found in {repository}")]
    EmptyRepository {
        repository: String,
        component_type: ComponentType,
    },
    #[error("Could not write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Where components are installed from.
pub trait ComponentSource {
    fn remote_url(&self) -> &str;

    fn branch(&self) -> &str;

    /// Directory components of this source are installed under, inside
    /// `<project>/<type>/`.
    fn install_dir(&self) -> &str;

    /// Pulls the latest state of the tracked branch.
    fn refresh(&mut self) -> Result<(), ClientError>;

    fn available_components(
        &self,
        component_type: ComponentType,
    ) -> Result<BTreeSet<String>, ClientError>;

    /// Most recent commit of the tracked branch that changed the component.
    fn latest_revision(
        &self,
        component_type: ComponentType,
        name: &str,
    ) -> Result<Option<String>, ClientError>;

    fn revision_exists(&self, revision: &str) -> Result<bool, ClientError>;

    fn file_handles_for(
        &self,
        component_type: ComponentType,
        name: &str,
        revision: Option<&str>,
    ) -> Result<BTreeMap<String, FileHandle>, ClientError>;

    /// Writes the file a handle points to at `destination`.
    fn download(&self, handle: &FileHandle, destination: &Path) -> Result<(), ClientError>;

    fn known_remote(&self) -> KnownRemote {
        KnownRemote {
            remote_url: self.remote_url().to_owned(),
            install_dir: self.install_dir().to_owned(),
            branch: Some(self.branch().to_owned()),
        }
    }
}

/// A component repository mirrored in the local cache, checked out at the
/// tracked branch.
pub struct ComponentRepository<'a> {
    repository: CachedRepository<'a>,
    remote_url: String,
    branch: String,
    install_dir: String,
    api: Option<GitHubApi>,
    tree: OnceCell<RemoteFileTree>,
}

impl<'a> ComponentRepository<'a> {
    /// Clones or pulls `remote_url` and checks out `branch`, the default
    /// branch of the remote when none is given.
    ///
    /// Files are read from the clone unless an API client is given.
    pub fn open(
        cache: &'a ComponentGitCache,
        remote_url: &str,
        branch: Option<&str>,
        api: Option<GitHubApi>,
    ) -> Result<ComponentRepository<'a>, ClientError> {
        let identity = RepositoryIdentity::from_url(remote_url)?;
        let repository = cache.repository(&identity, Some(remote_url))?;
        let branch = match branch.filter(|branch| !branch.is_empty()) {
            Some(branch) => branch.to_owned(),
            None if identity.is_default_repository() => DEFAULT_BRANCH.to_owned(),
            None => repository.default_branch()?,
        };

        let mut client = ComponentRepository {
            repository,
            remote_url: remote_url.to_owned(),
            branch,
            install_dir: identity.owner.clone(),
            api,
            tree: OnceCell::new(),
        };
        client.setup()?;
        info!(
            "Using {} installing into '{}'",
            client.identity().clone().with_branch(client.branch.as_str()),
            client.install_dir
        );
        Ok(client)
    }

    pub fn identity(&self) -> &RepositoryIdentity {
        self.repository.identity()
    }

    fn setup(&mut self) -> Result<(), ClientError> {
        self.repository.checkout_branch(&self.branch)?;
        let identity = self.repository.identity();
        if !(identity.is_default_repository() && self.branch == DEFAULT_BRANCH) {
            self.repository.verify_layout(&self.branch)?;
        }
        self.install_dir = self.read_install_dir()?;
        Ok(())
    }

    fn read_install_dir(&self) -> Result<String, ClientError> {
        for file in PROJECT_CONFIG_FILES {
            if let Some(contents) = self.repository.read_head_file(file)? {
                let config = ProjectConfig::from_str(&String::from_utf8_lossy(&contents))?;
                if let Some(org_path) = config.org_path.filter(|path| !path.is_empty()) {
                    trace!("{} sets org_path to {}", file, org_path);
                    return Ok(org_path);
                }
                break;
            }
        }
        Ok(self.identity().owner.clone())
    }

    fn remote(&self) -> &dyn RemoteApi {
        match &self.api {
            Some(api) => api,
            None => &self.repository,
        }
    }

    fn tree(&self) -> Result<&RemoteFileTree, ClientError> {
        if let Some(tree) = self.tree.get() {
            return Ok(tree);
        }
        let identity = self.identity();
        let listing = self.remote().list_tree(identity, &self.branch)?;
        let tree = RemoteFileTree::from_listing(listing, &identity.full_name(), &self.branch)?;
        debug!("Indexed {} entries of {}", tree.len(), identity);
        Ok(self.tree.get_or_init(|| tree))
    }
}

impl ComponentSource for ComponentRepository<'_> {
    fn remote_url(&self) -> &str {
        &self.remote_url
    }

    fn branch(&self) -> &str {
        &self.branch
    }

    fn install_dir(&self) -> &str {
        &self.install_dir
    }

    fn refresh(&mut self) -> Result<(), ClientError> {
        self.repository.refresh()?;
        self.tree = OnceCell::new();
        self.setup()
    }

    fn available_components(
        &self,
        component_type: ComponentType,
    ) -> Result<BTreeSet<String>, ClientError> {
        let components = self.tree()?.available_components(component_type);
        if components.is_empty() {
            return Err(ClientError::EmptyRepository {
                repository: self.identity().full_name(),
                component_type,
            });
        }
        Ok(components)
    }

    fn latest_revision(
        &self,
        component_type: ComponentType,
        name: &str,
    ) -> Result<Option<String>, ClientError> {
        let path = format!("{}/{}", component_type.dir_name(), name);
        Ok(self.repository.latest_revision(&path)?)
    }

    fn revision_exists(&self, revision: &str) -> Result<bool, ClientError> {
        Ok(self.repository.contains_revision(revision)?)
    }

    fn file_handles_for(
        &self,
        component_type: ComponentType,
        name: &str,
        revision: Option<&str>,
    ) -> Result<BTreeMap<String, FileHandle>, ClientError> {
        Ok(self.tree()?.file_handles_for(component_type, name, revision))
    }

    fn download(&self, handle: &FileHandle, destination: &Path) -> Result<(), ClientError> {
        let content = self.remote().fetch(self.identity(), handle)?;
        write_file(destination, &content)
    }
}

/// Writes `content` to a temporary file next to `path` and moves it into
/// place, so `path` never holds a partial file.
pub(crate) fn write_file(path: &Path, content: &[u8]) -> Result<(), ClientError> {
    let write_error = |source| ClientError::Write {
        path: path.to_path_buf(),
        source,
    };
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(write_error)?;
    let mut file = tempfile::NamedTempFile::new_in(parent).map_err(write_error)?;
    file.write_all(content).map_err(write_error)?;
    file.persist(path).map_err(|e| write_error(e.error))?;
    trace!("Wrote {}", path.display());
    Ok(())
}
