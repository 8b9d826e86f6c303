use std::path::{Path, PathBuf};

use log::{debug, trace};
use serde::Deserialize;
use thiserror::Error;

use crate::model::ParseError;

/// Project configuration files, `.yml` takes precedence.
pub const PROJECT_CONFIG_FILES: [&str; 2] = [".nf-core.yml", ".nf-core.yaml"];
/// Files marking the root of a workflow project.
const PIPELINE_MARKERS: [&str; 2] = ["main.nf", "nextflow.config"];

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("{path} is neither a workflow project nor a component repository: {reason}")]
    InvalidContext { path: PathBuf, reason: String },
    #[error("Could not read the project configuration in {path}: {source}")]
    Config { path: PathBuf, source: ParseError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    Pipeline,
    Modules,
}

/// The subset of `.nf-core.yml` this crate reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub repository_type: Option<RepositoryType>,
    /// Install directory name of a component repository.
    #[serde(default)]
    pub org_path: Option<String>,
}

impl ProjectConfig {
    pub fn from_str(s: &str) -> Result<ProjectConfig, ParseError> {
        if s.trim().is_empty() {
            return Ok(ProjectConfig::default());
        }
        Ok(serde_yaml::from_str(s)?)
    }

    /// Reads the project configuration of `dir`, if there is one.
    pub fn load(dir: &Path) -> Result<Option<ProjectConfig>, ParseError> {
        match find_existing(dir, &PROJECT_CONFIG_FILES) {
            Some(path) => {
                debug!("Reading project configuration {}", path.display());
                let contents = std::fs::read_to_string(&path)?;
                ProjectConfig::from_str(&contents).map(Some)
            }
            None => Ok(None),
        }
    }
}

/// Where the orchestrator operates, resolved once per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectContext {
    /// A workflow project consuming components.
    Pipeline { root: PathBuf },
    /// A clone of a component repository.
    ComponentRepository { root: PathBuf },
}

impl ProjectContext {
    /// Walks up from `dir` to the closest directory with a project
    /// configuration and decides what kind of directory it is.
    pub fn resolve(dir: &Path) -> Result<ProjectContext, ContextError> {
        if !dir.is_dir() {
            return Err(ContextError::InvalidContext {
                path: dir.to_path_buf(),
                reason: "directory does not exist".to_owned(),
            });
        }
        let dir = dir.canonicalize().map_err(|error| ContextError::InvalidContext {
            path: dir.to_path_buf(),
            reason: error.to_string(),
        })?;
        let root = find_project_root(&dir).unwrap_or(dir);
        let config = ProjectConfig::load(&root).map_err(|source| ContextError::Config {
            path: root.clone(),
            source,
        })?;

        let has_marker = PIPELINE_MARKERS
            .iter()
            .any(|marker| root.join(marker).exists());

        match config.and_then(|config| config.repository_type) {
            Some(RepositoryType::Modules) => Ok(ProjectContext::ComponentRepository { root }),
            Some(RepositoryType::Pipeline) | None if has_marker => {
                Ok(ProjectContext::Pipeline { root })
            }
            Some(RepositoryType::Pipeline) | None => Err(ContextError::InvalidContext {
                reason: format!(
                    "could not find a '{}' or '{}' file",
                    PIPELINE_MARKERS[0], PIPELINE_MARKERS[1]
                ),
                path: root,
            }),
        }
    }

    pub fn root(&self) -> &Path {
        match self {
            ProjectContext::Pipeline { root } | ProjectContext::ComponentRepository { root } => {
                root
            }
        }
    }
}

fn find_existing(dir: &Path, names: &[&str]) -> Option<PathBuf> {
    names
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

fn find_project_root(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .find(|ancestor| find_existing(ancestor, &PROJECT_CONFIG_FILES).is_some())
        .map(|ancestor| {
            trace!("Found project configuration in {}", ancestor.display());
            ancestor.to_path_buf()
        })
}
