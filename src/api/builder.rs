use std::{env, path::PathBuf};

use anyhow::Context;
use home::home_dir;

use crate::{
    git::cache::ComponentGitCache, model::identity::DEFAULT_REMOTE_URL, Modkeeper,
    RemoteSettings,
};

#[derive(Default)]
pub struct ModkeeperBuilder {
    // All other paths are relative to `root`
    root: Option<PathBuf>,
    cache_directory_path: Option<PathBuf>,
    remote_url: Option<String>,
    branch: Option<String>,
    api_url: Option<String>,
    api_token: Option<String>,
}

impl ModkeeperBuilder {
    /// Workflow project directory.
    ///
    /// Defaults to the current directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Location of the repository cache.
    ///
    /// Defaults to `$HOME/.modkeeper/cache`.
    pub fn cache_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_directory_path = Some(path.into());
        self
    }

    /// Remote of the component repository.
    ///
    /// Defaults to the nf-core modules repository.
    pub fn remote_url(mut self, url: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Reads component files through a forge REST API instead of the
    /// local clone.
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn try_build(self) -> anyhow::Result<Modkeeper> {
        let Self {
            root,
            cache_directory_path,
            remote_url,
            branch,
            api_url,
            api_token,
        } = self;
        let root = match root {
            Some(root) => root,
            None => env::current_dir()?,
        };

        let cache_directory = match cache_directory_path {
            Some(path) => root.join(path),
            None => default_cache_directory()?,
        };

        let git_config = git2::Config::open_default()?;

        let cache = ComponentGitCache::new(cache_directory, git_config)?;

        let remote = RemoteSettings {
            url: remote_url.unwrap_or_else(|| DEFAULT_REMOTE_URL.to_owned()),
            branch,
            api_url,
            api_token,
        };

        Ok(Modkeeper {
            cache,
            root,
            remote,
        })
    }
}

fn default_cache_directory() -> anyhow::Result<PathBuf> {
    let mut cache_directory =
        home_dir().context("Could not find home dir. Please define $HOME env variable.")?;
    cache_directory.push(".modkeeper/cache");
    Ok(cache_directory)
}
