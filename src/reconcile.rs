use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use thiserror::Error;
use walkdir::WalkDir;

use crate::model::{
    component::{is_test_path, ComponentType, Revision, LOCAL_INSTALL_DIR},
    manifest::{InstallManifest, InstalledComponentRecord, ManifestError},
};

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("Could not scan {path}: {source}")]
    Scan {
        path: PathBuf,
        source: walkdir::Error,
    },
}

/// A remote whose components are expected under `install_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownRemote {
    pub remote_url: String,
    pub install_dir: String,
    pub branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ComponentKey {
    pub component_type: ComponentType,
    pub install_dir: String,
    pub name: String,
}

impl Display for ComponentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.component_type, self.install_dir, self.name)
    }
}

/// Discrepancies between the manifest and the disk that were repaired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub added: Vec<ComponentKey>,
    pub removed: Vec<ComponentKey>,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Components present on disk under `<root>/<type>/`, keyed by install
/// directory. A component is a directory holding the entry file.
/// Project-local components and test fixtures are ignored.
pub fn scan_installed(
    root: &Path,
    component_type: ComponentType,
) -> Result<BTreeMap<String, BTreeSet<String>>, ReconcileError> {
    let base = root.join(component_type.dir_name());
    let mut found: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    if !base.is_dir() {
        return Ok(found);
    }

    let walker = WalkDir::new(&base)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() != 1 || entry.file_name() != LOCAL_INSTALL_DIR
        });
    for entry in walker {
        let entry = entry.map_err(|source| ReconcileError::Scan {
            path: base.clone(),
            source,
        })?;
        if !entry.file_type().is_file() || entry.file_name() != component_type.entry_file() {
            continue;
        }
        let Some(relative) = entry
            .path()
            .parent()
            .and_then(|dir| dir.strip_prefix(&base).ok())
        else {
            continue;
        };
        let segments: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        // <install_dir>/<name>[/<subtool>]
        if segments.len() < 2 {
            continue;
        }
        let name = segments[1..].join("/");
        // Hidden directories hold in-flight installs.
        if is_test_path(&name) || segments.iter().any(|segment| segment.starts_with('.')) {
            continue;
        }
        found.entry(segments[0].clone()).or_default().insert(name);
    }
    Ok(found)
}

/// Builds a manifest from the components found on disk and persists it.
/// Revisions are unknown at this point.
pub fn bootstrap(root: &Path, known: &[KnownRemote]) -> Result<InstallManifest, ReconcileError> {
    info!("Creating {}", InstallManifest::path(root).display());
    let mut manifest = InstallManifest::default();
    check_up_to_date(&mut manifest, root, known)?;
    manifest.save(root)?;
    Ok(manifest)
}

/// Brings the manifest in line with the disk: records of missing directories
/// are dropped and untracked components are added. The manifest is only
/// written when something changed.
pub fn check_up_to_date(
    manifest: &mut InstallManifest,
    root: &Path,
    known: &[KnownRemote],
) -> Result<RepairReport, ReconcileError> {
    let mut report = RepairReport::default();

    let missing: Vec<InstalledComponentRecord> = manifest
        .records()
        .filter(|record| !root.join(record.component_path()).is_dir())
        .collect();
    for record in missing {
        warn!(
            "Removing {} '{}' from the manifest, its directory {} does not exist",
            record.component_type.noun(),
            record.name,
            record.component_path().display()
        );
        manifest.record_removal(
            &record.remote_url,
            &record.install_dir,
            record.component_type,
            &record.name,
        );
        report.removed.push(ComponentKey {
            component_type: record.component_type,
            install_dir: record.install_dir,
            name: record.name,
        });
    }

    for component_type in ComponentType::ALL {
        for (install_dir, names) in scan_installed(root, component_type)? {
            let untracked: Vec<_> = names
                .into_iter()
                .filter(|name| !manifest.contains(&install_dir, component_type, name))
                .collect();
            if untracked.is_empty() {
                continue;
            }
            let Some((remote_url, branch)) = remote_for(manifest, known, &install_dir) else {
                warn!(
                    "Could not find the remote of '{}/{}', {} component(s) left untracked",
                    component_type,
                    install_dir,
                    untracked.len()
                );
                continue;
            };
            for name in untracked {
                warn!(
                    "Adding {} '{}' found in {}/{} to the manifest",
                    component_type.noun(),
                    name,
                    component_type,
                    install_dir
                );
                manifest.record_install(&InstalledComponentRecord {
                    component_type,
                    install_dir: install_dir.clone(),
                    name: name.clone(),
                    branch: branch.clone(),
                    revision: Revision::Unresolved,
                    remote_url: remote_url.clone(),
                    files: Vec::new(),
                });
                report.added.push(ComponentKey {
                    component_type,
                    install_dir: install_dir.clone(),
                    name,
                });
            }
        }
    }

    if report.is_clean() {
        debug!("Manifest is up to date");
    } else {
        manifest.save(root)?;
    }
    Ok(report)
}

/// The remote components under `install_dir` come from: one already in the
/// manifest, else one of the known remotes.
fn remote_for(
    manifest: &InstallManifest,
    known: &[KnownRemote],
    install_dir: &str,
) -> Option<(String, Option<String>)> {
    if let Some(record) = manifest
        .records()
        .find(|record| record.install_dir == install_dir)
    {
        return Some((record.remote_url, record.branch));
    }
    known
        .iter()
        .find(|remote| remote.install_dir == install_dir)
        .map(|remote| (remote.remote_url.clone(), remote.branch.clone()))
}
