use std::{fmt::Display, path::PathBuf};

use regex_lite::Regex;

use crate::model::ParseError;

/// The component repository used when no remote is configured.
pub const DEFAULT_REMOTE_URL: &str = "https://github.com/nf-core/modules.git";
pub const DEFAULT_REPOSITORY: &str = "nf-core/modules";
pub const DEFAULT_BRANCH: &str = "master";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct RepositoryIdentity {
    pub owner: String,
    pub name: String,
    pub branch: Option<String>,
}

impl RepositoryIdentity {
    /// Parses the owner and repository name out of a git remote.
    ///
    /// Accepts scp-like ssh remotes (`git@host:owner/name.git`) as well as
    /// `ssh://`, `https://`, `http://` and `file://` URLs.
    pub fn from_url(url: &str) -> Result<RepositoryIdentity, ParseError> {
        let re: Regex = Regex::new(
            r"^(?:[A-Za-z][A-Za-z0-9+.-]*://)?(?:[^@/]+@)?(?P<host>[^/:]*)(?::[0-9]+)?[:/](?P<path>.+?)/*$",
        )
        .expect("remote url pattern is valid");

        let path = re
            .captures(url.trim())
            .and_then(|c| c.name("path"))
            .map(|m| m.as_str().to_owned())
            .ok_or_else(|| ParseError::MalformedRemote {
                url: url.to_owned(),
            })?;

        let mut segments = path.split('/').filter(|s| !s.is_empty()).rev();
        match (segments.next(), segments.next()) {
            (Some(name), Some(owner)) => Ok(RepositoryIdentity {
                owner: owner.to_owned(),
                name: strip_extension(name).to_owned(),
                branch: None,
            }),
            _ => Err(ParseError::MalformedRemote {
                url: url.to_owned(),
            }),
        }
    }

    pub fn with_branch(self, branch: impl Into<String>) -> RepositoryIdentity {
        RepositoryIdentity {
            branch: Some(branch.into()),
            ..self
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn is_default_repository(&self) -> bool {
        self.full_name() == DEFAULT_REPOSITORY
    }

    /// Location of the local clone, relative to the cache directory.
    pub fn to_path(&self) -> PathBuf {
        let mut result = PathBuf::new();
        result.push(&self.owner);
        result.push(&self.name);
        result
    }
}

/// Drops the last `.ext` of a name, leading dots excluded.
fn strip_extension(name: &str) -> &str {
    let leading = name.len() - name.trim_start_matches('.').len();
    match name[leading..].rfind('.') {
        Some(index) => &name[..leading + index],
        None => name,
    }
}

impl Display for RepositoryIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.branch {
            Some(branch) => write!(f, "{}/{} ({})", self.owner, self.name, branch),
            None => write!(f, "{}/{}", self.owner, self.name),
        }
    }
}
