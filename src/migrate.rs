use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;
use walkdir::WalkDir;

use crate::{
    client::{ClientError, ComponentSource},
    model::{
        component::{is_test_path, ComponentType},
        manifest::InstallManifest,
    },
    reconcile::{check_up_to_date, KnownRemote, ReconcileError},
};

const PATCH_EXTENSION: &str = "diff";

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error(
        "Could not move {} component(s) out of the legacy layout: {}",
        .failed.len(),
        describe_failures(.failed)
    )]
    MigrationIO { failed: Vec<(PathBuf, String)> },
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error("Could not scan {path}: {source}")]
    Scan {
        path: PathBuf,
        source: walkdir::Error,
    },
}

/// A component installed under `<type>/<install_dir>/<type>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyLayoutEntry {
    pub install_dir: String,
    pub name: String,
    /// Component directory relative to the project root.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub moved: Vec<LegacyLayoutEntry>,
}

/// Moves components out of the layout with an extra `<type>` level between
/// the install directory and the component name.
pub struct StructureMigrator<'a> {
    root: &'a Path,
    component_type: ComponentType,
}

impl<'a> StructureMigrator<'a> {
    pub fn new(root: &'a Path, component_type: ComponentType) -> StructureMigrator<'a> {
        StructureMigrator {
            root,
            component_type,
        }
    }

    pub fn detect(&self) -> Result<Vec<LegacyLayoutEntry>, MigrationError> {
        let type_dir = self.component_type.dir_name();
        let base = self.root.join(type_dir);
        let mut entries = Vec::new();
        if !base.is_dir() {
            return Ok(entries);
        }

        for entry in WalkDir::new(&base).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|source| MigrationError::Scan {
                path: base.clone(),
                source,
            })?;
            if !entry.file_type().is_file()
                || entry.file_name() != self.component_type.entry_file()
            {
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
            if segments.len() < 3 || segments[1] != type_dir {
                continue;
            }
            let name = segments[2..].join("/");
            if is_test_path(&name) {
                continue;
            }
            entries.push(LegacyLayoutEntry {
                install_dir: segments[0].clone(),
                name,
                path: Path::new(type_dir).join(relative),
            });
        }
        Ok(entries)
    }

    /// Moves every legacy entry into place, then repairs the manifest.
    ///
    /// Nothing is deleted and the manifest is left alone when any move fails.
    pub fn run<S: ComponentSource>(
        &self,
        source: &mut S,
        manifest: &mut InstallManifest,
        known: &[KnownRemote],
    ) -> Result<MigrationReport, MigrationError> {
        let legacy = self.detect()?;
        if legacy.is_empty() {
            return Ok(MigrationReport::default());
        }
        info!(
            "The {} directory structure is outdated, moving {} component(s)",
            self.component_type,
            legacy.len()
        );
        source.refresh()?;

        // Sub-tools of a legacy tool travel with their parent directory.
        let (nested, outer): (Vec<_>, Vec<_>) = legacy.iter().cloned().partition(|entry| {
            legacy
                .iter()
                .any(|other| other.path != entry.path && entry.path.starts_with(&other.path))
        });

        let mut report = MigrationReport::default();
        let mut failed = Vec::new();
        for entry in outer {
            match self.move_entry(&entry) {
                Ok(target) => {
                    info!("Moved {} to {}", entry.path.display(), target.display());
                    report.moved.push(entry);
                }
                Err(reason) => failed.push((entry.path, reason)),
            }
        }
        for entry in nested {
            let carried = report
                .moved
                .iter()
                .any(|parent| entry.path.starts_with(&parent.path));
            if !carried {
                continue;
            }
            let relative_target = self
                .component_type
                .install_path(&entry.install_dir, &entry.name);
            debug!("{} moved along with its parent", entry.path.display());
            self.rewrite_patches(&self.root.join(&relative_target), &entry, &relative_target);
            report.moved.push(entry);
        }
        if !failed.is_empty() {
            return Err(MigrationError::MigrationIO { failed });
        }

        let legacy_dirs: std::collections::BTreeSet<_> = report
            .moved
            .iter()
            .map(|entry| self.legacy_dir(&entry.install_dir))
            .collect();
        for dir in legacy_dirs {
            remove_if_empty(&dir);
        }

        check_up_to_date(manifest, self.root, known)?;
        Ok(report)
    }

    fn legacy_dir(&self, install_dir: &str) -> PathBuf {
        let type_dir = self.component_type.dir_name();
        self.root.join(type_dir).join(install_dir).join(type_dir)
    }

    fn move_entry(&self, entry: &LegacyLayoutEntry) -> Result<PathBuf, String> {
        let relative_target = self
            .component_type
            .install_path(&entry.install_dir, &entry.name);
        let target = self.root.join(&relative_target);
        if target.exists() {
            return Err(format!("{} already exists", relative_target.display()));
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|error| error.to_string())?;
        }
        std::fs::rename(self.root.join(&entry.path), &target).map_err(|error| error.to_string())?;
        self.rewrite_patches(&target, entry, &relative_target);
        Ok(relative_target)
    }

    /// Patches created against the legacy layout name the old paths.
    fn rewrite_patches(&self, dir: &Path, entry: &LegacyLayoutEntry, target: &Path) {
        let Ok(files) = std::fs::read_dir(dir) else {
            return;
        };
        let old = format!("{}/", path_string(&entry.path));
        let new = format!("{}/", path_string(target));
        for file in files.flatten() {
            let path = file.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(PATCH_EXTENSION) {
                continue;
            }
            let result = std::fs::read_to_string(&path).and_then(|contents| {
                if contents.contains(&old) {
                    info!("Updating paths in {}", path.display());
                    std::fs::write(&path, contents.replace(&old, &new))
                } else {
                    Ok(())
                }
            });
            if let Err(error) = result {
                warn!("Could not update the patch {}: {}", path.display(), error);
            }
        }
    }
}

fn describe_failures(failed: &[(PathBuf, String)]) -> String {
    failed
        .iter()
        .map(|(path, reason)| format!("{} ({})", path.display(), reason))
        .collect::<Vec<_>>()
        .join(", ")
}

fn path_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Removes `dir` when only empty directories are left in it.
fn remove_if_empty(dir: &Path) {
    let has_files = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .any(|entry| !entry.file_type().is_dir());
    if has_files {
        warn!("Keeping {}, it still contains files", dir.display());
        return;
    }
    match std::fs::remove_dir_all(dir) {
        Ok(()) => debug!("Removed {}", dir.display()),
        Err(error) => warn!("Could not remove {}: {}", dir.display(), error),
    }
}
