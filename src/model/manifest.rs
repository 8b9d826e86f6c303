use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::component::{ComponentType, Revision};

pub const MANIFEST_FILE_NAME: &str = "modules.json";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest {path} is corrupt: {source}")]
    ManifestCorrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Could not serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("IO error on manifest {path}: {source}")]
    IO {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Branch and commit an installed component was taken from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentEntry {
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub git_sha: Revision,
}

type TypeEntries = BTreeMap<ComponentType, BTreeMap<String, ComponentEntry>>;
type InstallDirEntries = BTreeMap<String, TypeEntries>;

/// Flattened view of one manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledComponentRecord {
    pub component_type: ComponentType,
    pub install_dir: String,
    pub name: String,
    pub branch: Option<String>,
    pub revision: Revision,
    pub remote_url: String,
    /// Paths written on install, relative to the component directory.
    pub files: Vec<PathBuf>,
}

impl InstalledComponentRecord {
    pub fn component_path(&self) -> PathBuf {
        self.component_type.install_path(&self.install_dir, &self.name)
    }
}

/// Record of every component installed in a project, keyed by remote url,
/// install directory, component type and component name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstallManifest {
    repos: BTreeMap<String, InstallDirEntries>,
}

impl InstallManifest {
    pub fn path(root: &Path) -> PathBuf {
        root.join(MANIFEST_FILE_NAME)
    }

    /// Reads the manifest of a project. An absent file is not an error.
    pub fn load(root: &Path) -> Result<Option<InstallManifest>, ManifestError> {
        let path = Self::path(root);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!("No manifest found at {}", path.display());
                return Ok(None);
            }
            Err(source) => return Err(ManifestError::IO { path, source }),
        };
        Self::from_str(&contents)
            .map(Some)
            .map_err(|source| ManifestError::ManifestCorrupt { path, source })
    }

    pub fn from_str(s: &str) -> Result<InstallManifest, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn to_string(&self) -> Result<String, serde_json::Error> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }

    /// Writes the manifest next to the project root, replacing the previous
    /// file atomically.
    pub fn save(&self, root: &Path) -> Result<(), ManifestError> {
        let path = Self::path(root);
        let text = self.to_string()?;
        let io_error = |source| ManifestError::IO {
            path: path.clone(),
            source,
        };
        let mut file = tempfile::NamedTempFile::new_in(root).map_err(io_error)?;
        file.write_all(text.as_bytes()).map_err(io_error)?;
        file.persist(&path).map_err(|e| io_error(e.error))?;
        debug!("Wrote manifest to {}", path.display());
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.records().next().is_none()
    }

    /// Remote urls that have components installed under `install_dir`.
    pub fn remotes_for_install_dir<'a>(
        &'a self,
        install_dir: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.repos
            .iter()
            .filter(move |(_, dirs)| dirs.contains_key(install_dir))
            .map(|(url, _)| url.as_str())
    }

    pub fn records(&self) -> impl Iterator<Item = InstalledComponentRecord> + '_ {
        self.repos.iter().flat_map(|(url, dirs)| {
            dirs.iter().flat_map(move |(install_dir, types)| {
                types.iter().flat_map(move |(component_type, components)| {
                    components
                        .iter()
                        .map(move |(name, entry)| InstalledComponentRecord {
                            component_type: *component_type,
                            install_dir: install_dir.clone(),
                            name: name.clone(),
                            branch: entry.branch.clone(),
                            revision: entry.git_sha.clone(),
                            remote_url: url.clone(),
                            files: Vec::new(),
                        })
                })
            })
        })
    }

    pub fn get(
        &self,
        remote_url: &str,
        install_dir: &str,
        component_type: ComponentType,
        name: &str,
    ) -> Option<&ComponentEntry> {
        self.repos
            .get(remote_url)?
            .get(install_dir)?
            .get(&component_type)?
            .get(name)
    }

    /// True when any remote has `name` installed under `install_dir`.
    pub fn contains(&self, install_dir: &str, component_type: ComponentType, name: &str) -> bool {
        self.repos.values().any(|dirs| {
            dirs.get(install_dir)
                .and_then(|types| types.get(&component_type))
                .is_some_and(|components| components.contains_key(name))
        })
    }

    /// Inserts or replaces the entry for a component.
    pub fn record_install(&mut self, record: &InstalledComponentRecord) {
        self.repos
            .entry(record.remote_url.clone())
            .or_default()
            .entry(record.install_dir.clone())
            .or_default()
            .entry(record.component_type)
            .or_default()
            .insert(
                record.name.clone(),
                ComponentEntry {
                    branch: record.branch.clone(),
                    git_sha: record.revision.clone(),
                },
            );
    }

    /// Removes the entry of a component, pruning maps left empty. Returns
    /// the removed entry if there was one.
    pub fn record_removal(
        &mut self,
        remote_url: &str,
        install_dir: &str,
        component_type: ComponentType,
        name: &str,
    ) -> Option<ComponentEntry> {
        let dirs = self.repos.get_mut(remote_url)?;
        let types = dirs.get_mut(install_dir)?;
        let components = types.get_mut(&component_type)?;
        let removed = components.remove(name);

        if components.is_empty() {
            types.remove(&component_type);
        }
        if types.is_empty() {
            dirs.remove(install_dir);
        }
        if dirs.is_empty() {
            self.repos.remove(remote_url);
        }
        removed
    }

    pub fn all_components_from(
        &self,
        remote_url: &str,
        component_type: ComponentType,
    ) -> Vec<(String, String)> {
        self.repos
            .get(remote_url)
            .into_iter()
            .flat_map(|dirs| dirs.iter())
            .flat_map(|(install_dir, types)| {
                types
                    .get(&component_type)
                    .into_iter()
                    .flat_map(|components| components.keys())
                    .map(move |name| (install_dir.clone(), name.clone()))
            })
            .collect()
    }
}
