use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use thiserror::Error;
use walkdir::WalkDir;

use crate::{
    client::{ClientError, ComponentSource},
    context::ProjectContext,
    migrate::{MigrationError, StructureMigrator},
    model::{
        component::{validate_name, ComponentType, Revision},
        manifest::{InstallManifest, InstalledComponentRecord, ManifestError},
        ParseError,
    },
    reconcile::{bootstrap, check_up_to_date, ReconcileError, RepairReport},
};

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("{path} is not a workflow project, components can only be installed into one")]
    InvalidContext { path: PathBuf },
    #[error("{component_type} '{name}' does not exist in {repository}")]
    ComponentNotFound {
        component_type: ComponentType,
        name: String,
        repository: String,
    },
    #[error("Revision {revision} of '{name}' not found in {repository}")]
    RevisionNotFound {
        name: String,
        revision: String,
        repository: String,
    },
    #[error("{component_type} '{name}' is not installed")]
    NotInstalled {
        component_type: ComponentType,
        name: String,
    },
    #[error("Failed to install '{name}': {source}")]
    InstallFailed { name: String, source: ClientError },
    #[error(transparent)]
    InvalidName(#[from] ParseError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error("IO error on {path}: {source}")]
    IO {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Commit to install, the latest one touching the component when absent.
    pub revision: Option<String>,
    /// Reinstall over an existing copy.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed(InstalledComponentRecord),
    AlreadyInstalled(InstalledComponentRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated {
        previous: Revision,
        record: InstalledComponentRecord,
    },
    UpToDate(InstalledComponentRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed(PathBuf),
    NotInstalled { stale_record_removed: bool },
}

/// A workflow line that includes a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeStatement {
    /// Relative to the project root.
    pub file: PathBuf,
    pub line_number: usize,
    pub line: String,
}

/// Installs, updates and removes components of one type in a workflow
/// project, keeping the manifest in line with the disk.
pub struct ComponentInstaller<S: ComponentSource> {
    source: S,
    component_type: ComponentType,
    context: ProjectContext,
}

impl<S: ComponentSource> ComponentInstaller<S> {
    pub fn new(
        source: S,
        component_type: ComponentType,
        context: ProjectContext,
    ) -> ComponentInstaller<S> {
        ComponentInstaller {
            source,
            component_type,
            context,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Moves components out of the legacy layout and repairs the manifest
    /// without installing anything.
    pub fn check(&mut self) -> Result<RepairReport, InstallError> {
        let root = self.pipeline_root()?;
        let mut manifest = self.prepare(&root)?;
        Ok(check_up_to_date(
            &mut manifest,
            &root,
            &[self.source.known_remote()],
        )?)
    }

    pub fn install(
        &mut self,
        name: &str,
        options: &InstallOptions,
    ) -> Result<InstallOutcome, InstallError> {
        validate_name(name)?;
        let root = self.pipeline_root()?;
        let mut manifest = self.prepare(&root)?;
        check_up_to_date(&mut manifest, &root, &[self.source.known_remote()])?;
        self.install_into(&root, &mut manifest, name, options)
    }

    /// Reinstalls a component when its pinned revision differs from
    /// `revision`, or from the latest one when absent.
    pub fn update(
        &mut self,
        name: &str,
        revision: Option<&str>,
    ) -> Result<UpdateOutcome, InstallError> {
        validate_name(name)?;
        let root = self.pipeline_root()?;
        let mut manifest = self.prepare(&root)?;
        check_up_to_date(&mut manifest, &root, &[self.source.known_remote()])?;

        let previous = manifest
            .get(
                self.source.remote_url(),
                self.source.install_dir(),
                self.component_type,
                name,
            )
            .map(|entry| entry.git_sha.clone())
            .ok_or_else(|| InstallError::NotInstalled {
                component_type: self.component_type,
                name: name.to_owned(),
            })?;
        let target = match revision {
            Some(revision) => revision.to_owned(),
            None => self.latest_revision(name)?,
        };

        if previous.sha() == Some(target.as_str()) {
            debug!("'{}' is already at {}", name, target);
            return Ok(UpdateOutcome::UpToDate(self.record(name, previous)));
        }
        let options = InstallOptions {
            revision: Some(target),
            force: true,
        };
        match self.install_into(&root, &mut manifest, name, &options)? {
            InstallOutcome::Installed(record) | InstallOutcome::AlreadyInstalled(record) => {
                Ok(UpdateOutcome::Updated { previous, record })
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Result<RemoveOutcome, InstallError> {
        validate_name(name)?;
        let root = self.pipeline_root()?;
        let mut manifest = self.prepare(&root)?;
        let install_dir = self.source.install_dir().to_owned();
        let relative = self.component_type.install_path(&install_dir, name);
        let path = root.join(&relative);
        let owner = manifest
            .remotes_for_install_dir(&install_dir)
            .find(|url| {
                manifest
                    .get(url, &install_dir, self.component_type, name)
                    .is_some()
            })
            .map(str::to_owned);

        if !path.is_dir() {
            let stale_record_removed = match owner {
                Some(url) => {
                    manifest.record_removal(&url, &install_dir, self.component_type, name);
                    manifest.save(&root)?;
                    warn!(
                        "{} '{}' was recorded in the manifest but not installed, removed the record",
                        self.component_type.noun(),
                        name
                    );
                    true
                }
                None => false,
            };
            return Ok(RemoveOutcome::NotInstalled {
                stale_record_removed,
            });
        }
        if owner.is_none() && !path.join(self.component_type.entry_file()).is_file() {
            warn!(
                "{} is neither tracked nor a {}, leaving it in place",
                relative.display(),
                self.component_type.noun()
            );
            return Ok(RemoveOutcome::NotInstalled {
                stale_record_removed: false,
            });
        }

        std::fs::remove_dir_all(&path).map_err(|source| InstallError::IO {
            path: path.clone(),
            source,
        })?;
        // A tool directory left without sub-tools
        if name.contains('/') {
            if let Some(parent) = path.parent() {
                if is_empty_dir(parent) {
                    match std::fs::remove_dir(parent) {
                        Ok(()) => debug!("Removed empty directory {}", parent.display()),
                        Err(error) => debug!("Could not remove {}: {}", parent.display(), error),
                    }
                }
            }
        }
        if let Some(url) = owner {
            manifest.record_removal(&url, &install_dir, self.component_type, name);
            manifest.save(&root)?;
        }
        info!("Removed {} '{}'", self.component_type.noun(), name);

        let includes = find_includes(&root, self.component_type, &install_dir, name);
        if !includes.is_empty() {
            warn!(
                "The {} '{}' is still included by workflow files:",
                self.component_type.noun(),
                name
            );
            for include in &includes {
                warn!(
                    "  {}:{}: {}",
                    include.file.display(),
                    include.line_number,
                    include.line.trim()
                );
            }
        }
        Ok(RemoveOutcome::Removed(relative))
    }

    pub fn available(&self) -> Result<BTreeSet<String>, InstallError> {
        Ok(self.source.available_components(self.component_type)?)
    }

    fn pipeline_root(&self) -> Result<PathBuf, InstallError> {
        match &self.context {
            ProjectContext::Pipeline { root } => Ok(root.clone()),
            ProjectContext::ComponentRepository { root } => Err(InstallError::InvalidContext {
                path: root.clone(),
            }),
        }
    }

    /// Loads the manifest, rebuilding it when absent or unreadable, and
    /// moves components out of the legacy layout.
    fn prepare(&mut self, root: &Path) -> Result<InstallManifest, InstallError> {
        let known = [self.source.known_remote()];
        let mut manifest = match InstallManifest::load(root) {
            Ok(Some(manifest)) => manifest,
            Ok(None) => bootstrap(root, &known)?,
            Err(ManifestError::ManifestCorrupt { path, source }) => {
                warn!(
                    "Manifest {} is corrupt ({}), rebuilding it",
                    path.display(),
                    source
                );
                bootstrap(root, &known)?
            }
            Err(error) => return Err(error.into()),
        };
        StructureMigrator::new(root, self.component_type).run(
            &mut self.source,
            &mut manifest,
            &known,
        )?;
        Ok(manifest)
    }

    fn latest_revision(&self, name: &str) -> Result<String, InstallError> {
        self.source
            .latest_revision(self.component_type, name)?
            .ok_or_else(|| self.not_found(name))
    }

    fn not_found(&self, name: &str) -> InstallError {
        InstallError::ComponentNotFound {
            component_type: self.component_type,
            name: name.to_owned(),
            repository: self.source.remote_url().to_owned(),
        }
    }

    fn record(&self, name: &str, revision: Revision) -> InstalledComponentRecord {
        InstalledComponentRecord {
            component_type: self.component_type,
            install_dir: self.source.install_dir().to_owned(),
            name: name.to_owned(),
            branch: Some(self.source.branch().to_owned()),
            revision,
            remote_url: self.source.remote_url().to_owned(),
            files: Vec::new(),
        }
    }

    fn install_into(
        &self,
        root: &Path,
        manifest: &mut InstallManifest,
        name: &str,
        options: &InstallOptions,
    ) -> Result<InstallOutcome, InstallError> {
        if !self
            .source
            .available_components(self.component_type)?
            .contains(name)
        {
            return Err(self.not_found(name));
        }
        let revision = match &options.revision {
            Some(revision) => {
                if !self.source.revision_exists(revision)? {
                    return Err(InstallError::RevisionNotFound {
                        name: name.to_owned(),
                        revision: revision.clone(),
                        repository: self.source.remote_url().to_owned(),
                    });
                }
                revision.clone()
            }
            None => self.latest_revision(name)?,
        };

        let install_dir = self.source.install_dir();
        let relative = self.component_type.install_path(install_dir, name);
        let target = root.join(&relative);
        if target.exists() && !options.force {
            let revision = manifest
                .get(
                    self.source.remote_url(),
                    install_dir,
                    self.component_type,
                    name,
                )
                .map(|entry| entry.git_sha.clone())
                .unwrap_or_default();
            info!(
                "{} '{}' is already installed, use force to reinstall it",
                self.component_type.noun(),
                name
            );
            return Ok(InstallOutcome::AlreadyInstalled(self.record(name, revision)));
        }

        let handles = self.source.file_handles_for(
            self.component_type,
            name,
            options.revision.as_deref(),
        )?;
        let prefix = format!("{}/{}/", self.component_type.dir_name(), name);

        let io_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source| InstallError::IO { path, source }
        };
        let staging_parent = root.join(self.component_type.dir_name()).join(install_dir);
        std::fs::create_dir_all(&staging_parent).map_err(io_error(&staging_parent))?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&staging_parent)
            .map_err(io_error(&staging_parent))?;

        let mut files = Vec::with_capacity(handles.len());
        for (path, handle) in &handles {
            let file = PathBuf::from(path.strip_prefix(&prefix).unwrap_or(path));
            self.source
                .download(handle, &staging.path().join(&file))
                .map_err(|source| InstallError::InstallFailed {
                    name: name.to_owned(),
                    source,
                })?;
            files.push(file);
        }

        if target.exists() {
            debug!("Removing previous copy at {}", target.display());
            std::fs::remove_dir_all(&target).map_err(io_error(&target))?;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        std::fs::rename(staging.path(), &target).map_err(io_error(&target))?;

        let mut record = self.record(name, Revision::pinned(revision));
        record.files = files;
        manifest.record_install(&record);
        manifest.save(root)?;
        info!(
            "Installed {} '{}' at {} into {}",
            self.component_type.noun(),
            name,
            record.revision,
            relative.display()
        );
        Ok(InstallOutcome::Installed(record))
    }
}

/// Components of one type recorded in the manifest of a project.
pub fn installed_components(
    context: &ProjectContext,
    component_type: ComponentType,
) -> Result<Vec<InstalledComponentRecord>, InstallError> {
    let manifest = InstallManifest::load(context.root())?.unwrap_or_default();
    Ok(manifest
        .records()
        .filter(|record| record.component_type == component_type)
        .collect())
}

/// `include` statements of the project's `.nf` files that still point at
/// `<type>/<install_dir>/<name>/main`.
pub fn find_includes(
    root: &Path,
    component_type: ComponentType,
    install_dir: &str,
    name: &str,
) -> Vec<IncludeStatement> {
    let target = format!("{}/{}/{}/main", component_type.dir_name(), install_dir, name);
    let files = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
        })
        .filter_map(Result::ok)
        .filter(|entry| {
            entry.file_type().is_file()
                && entry.path().extension().and_then(|ext| ext.to_str()) == Some("nf")
        });

    let mut includes = Vec::new();
    for entry in files {
        let Ok(contents) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        let file = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();
        for (index, line) in contents.lines().enumerate() {
            if line.trim_start().starts_with("include") && line.contains(&target) {
                includes.push(IncludeStatement {
                    file: file.clone(),
                    line_number: index + 1,
                    line: line.to_owned(),
                });
            }
        }
    }
    includes
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::client::fake::{FakeSource, URL};

    fn pipeline(components: &[&str]) -> (tempfile::TempDir, ComponentInstaller<FakeSource>) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.nf"), "workflow {}").unwrap();
        let context = ProjectContext::Pipeline {
            root: dir.path().to_path_buf(),
        };
        let installer =
            ComponentInstaller::new(FakeSource::new(components), ComponentType::Module, context);
        (dir, installer)
    }

    #[test]
    fn install_then_remove() {
        let (dir, mut installer) = pipeline(&["fastqc", "samtools/sort"]);

        let outcome = installer
            .install("samtools/sort", &InstallOptions::default())
            .unwrap();
        let InstallOutcome::Installed(record) = outcome else {
            panic!("expected a fresh install");
        };
        assert_eq!(record.revision, Revision::pinned("2222222"));
        assert_eq!(
            record.files,
            vec![PathBuf::from("main.nf"), PathBuf::from("meta.yml")]
        );
        let component = dir.path().join("modules/nf-core/samtools/sort");
        assert!(component.join("main.nf").is_file());
        assert!(!component.join("tests").exists());

        let manifest = InstallManifest::load(dir.path()).unwrap().unwrap();
        assert_eq!(
            manifest
                .get(URL, "nf-core", ComponentType::Module, "samtools/sort")
                .unwrap()
                .git_sha,
            Revision::pinned("2222222")
        );

        assert_eq!(
            installer.remove("samtools/sort").unwrap(),
            RemoveOutcome::Removed(PathBuf::from("modules/nf-core/samtools/sort"))
        );
        assert!(!component.exists());
        // The tool directory had no other sub-tool.
        assert!(!dir.path().join("modules/nf-core/samtools").exists());
        let manifest = InstallManifest::load(dir.path()).unwrap().unwrap();
        assert!(manifest.is_empty());
    }

    #[test]
    fn install_is_idempotent_unless_forced() {
        let (dir, mut installer) = pipeline(&["fastqc"]);
        installer.install("fastqc", &InstallOptions::default()).unwrap();
        let before = std::fs::read_to_string(dir.path().join("modules.json")).unwrap();

        let outcome = installer.install("fastqc", &InstallOptions::default()).unwrap();
        assert!(matches!(outcome, InstallOutcome::AlreadyInstalled(_)));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("modules.json")).unwrap(),
            before
        );

        let outcome = installer
            .install(
                "fastqc",
                &InstallOptions {
                    revision: Some("1111111".to_owned()),
                    force: true,
                },
            )
            .unwrap();
        let InstallOutcome::Installed(record) = outcome else {
            panic!("expected a forced install");
        };
        assert_eq!(record.revision, Revision::pinned("1111111"));
    }

    #[test]
    fn unknown_component_and_revision() {
        let (_dir, mut installer) = pipeline(&["fastqc"]);
        let err = installer
            .install("bowtie2", &InstallOptions::default())
            .unwrap_err();
        assert!(matches!(err, InstallError::ComponentNotFound { .. }));

        let err = installer
            .install(
                "fastqc",
                &InstallOptions {
                    revision: Some("deadbeef".to_owned()),
                    force: false,
                },
            )
            .unwrap_err();
        assert!(matches!(err, InstallError::RevisionNotFound { .. }));
    }

    #[test]
    fn failed_download_leaves_nothing_behind() {
        let (dir, mut installer) = pipeline(&["fastqc"]);
        installer
            .source
            .broken
            .insert("modules/fastqc/meta.yml".to_owned());

        let err = installer
            .install("fastqc", &InstallOptions::default())
            .unwrap_err();
        assert!(matches!(err, InstallError::InstallFailed { .. }));
        let install_dir = dir.path().join("modules/nf-core");
        assert_eq!(std::fs::read_dir(&install_dir).unwrap().count(), 0);
        let manifest = InstallManifest::load(dir.path()).unwrap().unwrap();
        assert!(!manifest.contains("nf-core", ComponentType::Module, "fastqc"));
    }

    #[test]
    fn remove_drops_stale_record() {
        let (dir, mut installer) = pipeline(&["fastqc"]);
        installer.install("fastqc", &InstallOptions::default()).unwrap();
        std::fs::remove_dir_all(dir.path().join("modules/nf-core/fastqc")).unwrap();

        assert_eq!(
            installer.remove("fastqc").unwrap(),
            RemoveOutcome::NotInstalled {
                stale_record_removed: true
            }
        );
        assert!(InstallManifest::load(dir.path()).unwrap().unwrap().is_empty());
        assert_eq!(
            installer.remove("fastqc").unwrap(),
            RemoveOutcome::NotInstalled {
                stale_record_removed: false
            }
        );
    }

    #[test]
    fn migrates_legacy_layout_before_installing() {
        let (dir, mut installer) = pipeline(&["foo/bar", "fastqc"]);
        let legacy = dir.path().join("modules/nf-core/modules/foo/bar");
        std::fs::create_dir_all(&legacy).unwrap();
        std::fs::write(legacy.join("main.nf"), "process FOO_BAR {}").unwrap();

        installer.install("fastqc", &InstallOptions::default()).unwrap();

        assert!(dir.path().join("modules/nf-core/foo/bar/main.nf").is_file());
        assert!(!dir.path().join("modules/nf-core/modules").exists());
        let manifest = InstallManifest::load(dir.path()).unwrap().unwrap();
        assert!(manifest.contains("nf-core", ComponentType::Module, "foo/bar"));
        assert!(!manifest.contains("nf-core", ComponentType::Module, "modules/foo/bar"));
        assert_eq!(
            manifest
                .get(URL, "nf-core", ComponentType::Module, "foo/bar")
                .unwrap()
                .git_sha,
            Revision::Unresolved
        );
        assert_eq!(installer.source().refreshes, 1);
    }

    #[test]
    fn update_reinstalls_when_behind() {
        let (_dir, mut installer) = pipeline(&["fastqc"]);
        installer
            .install(
                "fastqc",
                &InstallOptions {
                    revision: Some("1111111".to_owned()),
                    force: false,
                },
            )
            .unwrap();

        let outcome = installer.update("fastqc", None).unwrap();
        let UpdateOutcome::Updated { previous, record } = outcome else {
            panic!("expected an update");
        };
        assert_eq!(previous, Revision::pinned("1111111"));
        assert_eq!(record.revision, Revision::pinned("2222222"));

        assert!(matches!(
            installer.update("fastqc", None).unwrap(),
            UpdateOutcome::UpToDate(_)
        ));
        assert!(matches!(
            installer.update("multiqc", None).unwrap_err(),
            InstallError::NotInstalled { .. }
        ));
    }

    #[test]
    fn check_repairs_manifest() {
        let (dir, mut installer) = pipeline(&["fastqc"]);
        let component = dir.path().join("modules/nf-core/multiqc");
        std::fs::create_dir_all(&component).unwrap();
        std::fs::write(component.join("main.nf"), "process MULTIQC {}").unwrap();
        std::fs::write(dir.path().join("modules.json"), "{ \"broken\": ").unwrap();

        let report = installer.check().unwrap();
        // The corrupt manifest was rebuilt from the disk first.
        assert!(report.is_clean());
        let manifest = InstallManifest::load(dir.path()).unwrap().unwrap();
        assert!(manifest.contains("nf-core", ComponentType::Module, "multiqc"));
    }

    #[test]
    fn component_repository_context_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut installer = ComponentInstaller::new(
            FakeSource::new(&["fastqc"]),
            ComponentType::Module,
            ProjectContext::ComponentRepository {
                root: dir.path().to_path_buf(),
            },
        );
        let err = installer
            .install("fastqc", &InstallOptions::default())
            .unwrap_err();
        assert!(matches!(err, InstallError::InvalidContext { .. }));
        assert_eq!(InstallManifest::load(dir.path()).unwrap(), None);
    }

    #[test]
    fn installed_lists_manifest_records() {
        let (dir, mut installer) = pipeline(&["fastqc", "multiqc"]);
        installer.install("multiqc", &InstallOptions::default()).unwrap();
        installer.install("fastqc", &InstallOptions::default()).unwrap();
        let context = ProjectContext::Pipeline {
            root: dir.path().to_path_buf(),
        };
        assert!(installed_components(&context, ComponentType::Subworkflow)
            .unwrap()
            .is_empty());
        let names: Vec<_> = installed_components(&context, ComponentType::Module)
            .unwrap()
            .into_iter()
            .map(|record| record.name)
            .collect();
        assert_eq!(names, vec!["fastqc", "multiqc"]);
        assert_eq!(installer.available().unwrap().len(), 2);
    }

    #[test]
    fn invalid_names_touch_nothing() {
        let (dir, mut installer) = pipeline(&["fastqc", "multiqc"]);
        installer.install("fastqc", &InstallOptions::default()).unwrap();
        installer.install("multiqc", &InstallOptions::default()).unwrap();
        let local = dir.path().join("modules/local/mine");
        std::fs::create_dir_all(&local).unwrap();
        std::fs::write(local.join("main.nf"), "process MINE {}").unwrap();

        for name in ["", "..", ".", "../local/mine", "/tmp"] {
            assert!(
                matches!(
                    installer.remove(name).unwrap_err(),
                    InstallError::InvalidName(ParseError::InvalidComponentName(_))
                ),
                "{name:?} was accepted"
            );
        }
        assert!(matches!(
            installer.install("..", &InstallOptions::default()).unwrap_err(),
            InstallError::InvalidName(_)
        ));
        assert!(matches!(
            installer.update("", None).unwrap_err(),
            InstallError::InvalidName(_)
        ));
        assert!(dir.path().join("modules/nf-core/fastqc/main.nf").is_file());
        assert!(dir.path().join("modules/nf-core/multiqc/main.nf").is_file());
        assert!(local.join("main.nf").is_file());
        let manifest = InstallManifest::load(dir.path()).unwrap().unwrap();
        assert!(manifest.contains("nf-core", ComponentType::Module, "fastqc"));
    }

    #[test]
    fn remove_leaves_untracked_directories_alone() {
        let (dir, mut installer) = pipeline(&["fastqc"]);
        let notes = dir.path().join("modules/nf-core/mytool");
        std::fs::create_dir_all(&notes).unwrap();
        std::fs::write(notes.join("notes.txt"), "todo").unwrap();

        assert_eq!(
            installer.remove("mytool").unwrap(),
            RemoveOutcome::NotInstalled {
                stale_record_removed: false
            }
        );
        assert!(notes.join("notes.txt").is_file());
    }

    #[test]
    fn finds_remaining_includes() {
        let (dir, mut installer) = pipeline(&["fastqc", "samtools/sort"]);
        installer.install("fastqc", &InstallOptions::default()).unwrap();
        installer
            .install("samtools/sort", &InstallOptions::default())
            .unwrap();
        let workflows = dir.path().join("workflows");
        std::fs::create_dir_all(&workflows).unwrap();
        std::fs::write(
            workflows.join("pipeline.nf"),
            "include { FASTQC } from '../modules/nf-core/fastqc/main'\n\
             include { SAMTOOLS_SORT } from '../modules/nf-core/samtools/sort/main'\n\
             // '../modules/nf-core/fastqc/main'\n\
             workflow { FASTQC() }\n",
        )
        .unwrap();
        let hidden = dir.path().join(".nextflow");
        std::fs::create_dir_all(&hidden).unwrap();
        std::fs::write(
            hidden.join("cached.nf"),
            "include { FASTQC } from './modules/nf-core/fastqc/main'\n",
        )
        .unwrap();

        assert_eq!(
            find_includes(dir.path(), ComponentType::Module, "nf-core", "fastqc"),
            vec![IncludeStatement {
                file: PathBuf::from("workflows/pipeline.nf"),
                line_number: 1,
                line: "include { FASTQC } from '../modules/nf-core/fastqc/main'".to_owned(),
            }]
        );
        assert_eq!(
            find_includes(dir.path(), ComponentType::Module, "nf-core", "sort"),
            vec![]
        );

        // Removal still goes ahead.
        assert_eq!(
            installer.remove("fastqc").unwrap(),
            RemoveOutcome::Removed(PathBuf::from("modules/nf-core/fastqc"))
        );
        assert_eq!(
            find_includes(dir.path(), ComponentType::Module, "nf-core", "fastqc").len(),
            1
        );
    }
}
