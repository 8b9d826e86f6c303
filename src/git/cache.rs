use std::path::{Path, PathBuf};

use git2::{
    build::RepoBuilder, cert::Cert, AutotagOption, CertificateCheckStatus, Config, Cred,
    CredentialType, FetchOptions, RemoteCallbacks, Repository,
};
use log::{debug, info, trace, warn};
use ssh_key::{known_hosts::HostPatterns, KnownHosts};
use thiserror::Error;

use crate::{flock::FileLock, git::repository::CachedRepository, model::identity::RepositoryIdentity};

const GLOBAL_KNOWN_HOSTS: &str = "/etc/ssh/ssh_known_hosts";

/// Directory of local clones, one per `owner/name` pair.
pub struct ComponentGitCache {
    location: PathBuf,
    git_config: Config,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
    #[error("Cache location {location} is not a directory")]
    BadLocation { location: String },
    #[error("The repository {repository} has not been used before and no remote url was provided")]
    MissingRemote { repository: String },
    #[error("Failed to clone {repository} from the remote `{url}`: {source}")]
    CloneFailed {
        repository: String,
        url: String,
        source: git2::Error,
    },
    #[error("Failed to pull the latest changes of {repository}: {source}")]
    RefreshFailed {
        repository: String,
        source: git2::Error,
    },
    #[error("Cache lock cannot be acquired")]
    Lock(#[from] crate::flock::Error),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

impl ComponentGitCache {
    pub fn new(location: PathBuf, git_config: Config) -> Result<ComponentGitCache, CacheError> {
        if location.exists() {
            if !location.is_dir() {
                return Err(CacheError::BadLocation {
                    location: location.to_str().unwrap_or("").to_string(),
                });
            }
        } else {
            std::fs::create_dir_all(&location)?;
        }

        Ok(ComponentGitCache {
            location,
            git_config,
        })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        if self.location.exists() {
            info!(
                "Clearing component repository cache {}.",
                &self.location.display()
            );
            std::fs::remove_dir_all(&self.location)?;
        }
        Ok(())
    }

    /// Opens the local clone of a repository, cloning it on first use and
    /// pulling from `origin` otherwise.
    ///
    /// The clone stays locked until the returned handle is dropped.
    pub fn repository(
        &self,
        identity: &RepositoryIdentity,
        remote_url: Option<&str>,
    ) -> Result<CachedRepository<'_>, CacheError> {
        let path = self.location.join(identity.to_path());
        let lock = self.acquire_lock(&path.with_file_name(format!("{}.lock", identity.name)))?;
        let remote_url = remote_url.filter(|url| !url.trim().is_empty());

        let repo = if path.join(".git").exists() {
            let repo = self.open_entry(&path, remote_url)?;
            self.pull(&repo, identity)?;
            repo
        } else {
            let url = remote_url.ok_or_else(|| CacheError::MissingRemote {
                repository: identity.full_name(),
            })?;
            self.clone_repo(&path, url, identity)?
        };

        Ok(CachedRepository::new(self, repo, identity.clone(), lock))
    }

    fn acquire_lock(&self, location: &Path) -> Result<FileLock, CacheError> {
        if let Some(parent) = location.parent() {
            std::fs::create_dir_all(parent)?;
        }
        debug!("Acquiring a lock on the cache entry: {}", location.display());
        let lock = FileLock::new(location)?;
        trace!("Acquired a lock on {}", location.display());
        Ok(lock)
    }

    fn open_entry(&self, path: &Path, url: Option<&str>) -> Result<Repository, CacheError> {
        trace!("Opening existing repository at {}", path.display());

        let repo = Repository::open(path)?;

        if let Some(url) = url {
            let remote = repo.find_remote("origin")?;
            if remote.url() != Some(url) {
                trace!(
                    "Updating remote existing url {:?} to new url {}",
                    remote.url(),
                    url
                );
                repo.remote_set_url("origin", url)?;
            }
        }

        Ok(repo)
    }

    fn clone_repo(
        &self,
        path: &Path,
        url: &str,
        identity: &RepositoryIdentity,
    ) -> Result<Repository, CacheError> {
        info!("Cloning {} into {}", url, path.display());

        let mut builder = RepoBuilder::new();
        builder.fetch_options(self.fetch_options());
        builder.clone(url, path).map_err(|source| {
            if path.exists() {
                if let Err(error) = std::fs::remove_dir_all(path) {
                    warn!(
                        "Could not remove the partial clone at {}: {}",
                        path.display(),
                        error
                    );
                }
            }
            CacheError::CloneFailed {
                repository: identity.full_name(),
                url: url.to_owned(),
                source,
            }
        })
    }

    /// Fetches every branch of `origin`. The working tree is left untouched
    /// so a failed pull keeps the previous checkout usable.
    pub(super) fn pull(
        &self,
        repo: &Repository,
        identity: &RepositoryIdentity,
    ) -> Result<(), CacheError> {
        debug!("Pulling the latest changes of {}", identity.full_name());
        let refresh_failed = |source| CacheError::RefreshFailed {
            repository: identity.full_name(),
            source,
        };
        let mut remote = repo.find_remote("origin").map_err(refresh_failed)?;
        remote
            .fetch::<&str>(&[], Some(&mut self.fetch_options()), None)
            .map_err(refresh_failed)?;
        Ok(())
    }

    pub(super) fn fetch_options(&self) -> FetchOptions<'_> {
        let mut fetch_options = FetchOptions::new();
        fetch_options
            .remote_callbacks(self.remote_callbacks())
            .download_tags(AutotagOption::None);
        fetch_options
    }

    pub(super) fn remote_callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |url, username, allowed_types| {
            trace!(
                "Requested credentials for {}, username {:?}, allowed types {:?}",
                url,
                username,
                allowed_types
            );
            // Asking for ssh username
            if allowed_types.contains(CredentialType::USERNAME) {
                return Cred::username("git");
            }
            // SSH auth
            if allowed_types.contains(CredentialType::SSH_KEY) {
                return Cred::ssh_key_from_agent(username.unwrap_or("git"));
            }
            // HTTP auth
            if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
                return Cred::credential_helper(&self.git_config, url, username);
            }
            Err(git2::Error::from_str("no valid authentication available"))
        });

        callbacks.certificate_check(|certificate, host| self.check_certificate(certificate, host));
        callbacks
    }

    fn check_certificate(
        &self,
        certificate: &Cert<'_>,
        host: &str,
    ) -> Result<CertificateCheckStatus, git2::Error> {
        if let Some(hostkey) = certificate.as_hostkey().and_then(|h| h.hostkey()) {
            trace!("Loading {}", GLOBAL_KNOWN_HOSTS);
            match KnownHosts::read_file(GLOBAL_KNOWN_HOSTS) {
                Ok(entries) => {
                    for entry in entries {
                        if host_matches_patterns(host, entry.host_patterns()) {
                            trace!(
                                "Found known host entry for {} ({})",
                                host,
                                entry.public_key().algorithm()
                            );
                            if entry.public_key().to_bytes().as_deref() == Ok(hostkey) {
                                trace!("Known host entry matches the host key");
                                return Ok(CertificateCheckStatus::CertificateOk);
                            }
                        }
                    }
                    trace!("No know host entry matched the host key");
                }
                Err(error) => trace!("Could not load {}: {}", GLOBAL_KNOWN_HOSTS, error),
            }
        }
        Ok(CertificateCheckStatus::CertificatePassthrough)
    }
}

fn host_matches_patterns(host: &str, patterns: &HostPatterns) -> bool {
    match patterns {
        HostPatterns::Patterns(patterns) => {
            let mut match_found = false;
            for pattern in patterns {
                let pattern = pattern.to_lowercase();
                // * and ? wildcards are not yet supported
                if let Some(pattern) = pattern.strip_prefix('!') {
                    if pattern == host {
                        return false;
                    }
                } else {
                    match_found |= pattern == host;
                }
            }
            match_found
        }
        // Not yet supported
        HostPatterns::HashedName { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::git::testing::{commit_files, init_origin};

    fn cache(dir: &Path) -> ComponentGitCache {
        ComponentGitCache::new(dir.join("cache"), Config::new().unwrap()).unwrap()
    }

    #[test]
    fn host_patterns() {
        let patterns = HostPatterns::Patterns(vec![
            "github.com".to_owned(),
            "!evil.github.com".to_owned(),
        ]);
        assert!(host_matches_patterns("github.com", &patterns));
        assert!(!host_matches_patterns("evil.github.com", &patterns));
        assert!(!host_matches_patterns("gitlab.com", &patterns));
    }

    #[test]
    fn missing_remote_without_existing_clone() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let identity = RepositoryIdentity::from_url("https://example.com/acme/widgets").unwrap();
        let err = cache
            .repository(&identity, Some(""))
            .err()
            .expect("should require a remote");
        assert!(matches!(err, CacheError::MissingRemote { .. }));
    }

    #[test]
    fn clone_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let url = format!("file://{}/nowhere/widgets.git", dir.path().display());
        let identity = RepositoryIdentity::from_url(&url).unwrap();
        let err = cache
            .repository(&identity, Some(&url))
            .err()
            .expect("should fail to clone");
        assert!(matches!(err, CacheError::CloneFailed { .. }));
        assert!(!cache.location().join("nowhere/widgets").exists());
    }

    #[test]
    fn clone_then_pull() {
        let dir = tempfile::tempdir().unwrap();
        let (origin, url) = init_origin(dir.path(), "main");
        commit_files(&origin, &[("modules/fastqc/main.nf", "process FASTQC {}")]);

        let cache = cache(dir.path());
        let identity = RepositoryIdentity::from_url(&url).unwrap();
        {
            let repository = cache.repository(&identity, Some(&url)).unwrap();
            assert!(repository.path().join("modules/fastqc/main.nf").exists());
        }

        commit_files(&origin, &[("modules/multiqc/main.nf", "process MULTIQC {}")]);
        // The url is only required for the first clone.
        let repository = cache.repository(&identity, None).unwrap();
        repository.checkout_branch("main").unwrap();
        assert!(repository.path().join("modules/multiqc/main.nf").exists());
    }

    #[test]
    fn refresh_failure_keeps_the_clone() {
        let dir = tempfile::tempdir().unwrap();
        let (origin, url) = init_origin(dir.path(), "main");
        commit_files(&origin, &[("modules/fastqc/main.nf", "process FASTQC {}")]);

        let cache = cache(dir.path());
        let identity = RepositoryIdentity::from_url(&url).unwrap();
        let clone = cache.repository(&identity, Some(&url)).unwrap().path().to_path_buf();

        drop(origin);
        std::fs::remove_dir_all(dir.path().join("remotes")).unwrap();
        let err = cache
            .repository(&identity, Some(&url))
            .err()
            .expect("should fail to pull");
        assert!(matches!(err, CacheError::RefreshFailed { .. }));
        assert!(clone.join("modules/fastqc/main.nf").is_file());
    }

    #[test]
    fn clear_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        std::fs::create_dir_all(cache.location().join("acme/widgets")).unwrap();
        cache.clear().unwrap();
        assert!(!cache.location().exists());
    }
}
