use std::{collections::BTreeSet, path::PathBuf};

use crate::{
    cli::command_handlers::{
        do_available, do_check, do_clear_cache, do_install, do_installed, do_remove, do_update,
    },
    git::cache::ComponentGitCache,
    install::{InstallOptions, InstallOutcome, RemoveOutcome, UpdateOutcome},
    model::{component::ComponentType, manifest::InstalledComponentRecord},
    reconcile::RepairReport,
};

mod builder;

pub use builder::ModkeeperBuilder;

/// The component repository to install from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub url: String,
    /// Defaults to the branch `HEAD` points to on the remote.
    pub branch: Option<String>,
    /// Forge API to read files from instead of the local clone.
    pub api_url: Option<String>,
    pub api_token: Option<String>,
}

pub struct Modkeeper {
    cache: ComponentGitCache,
    root: PathBuf,
    remote: RemoteSettings,
}

impl Modkeeper {
    pub fn builder() -> ModkeeperBuilder {
        ModkeeperBuilder::default()
    }

    /// Components offered by the remote repository
    pub fn available(&self, component_type: ComponentType) -> anyhow::Result<BTreeSet<String>> {
        do_available(&self.cache, &self.root, &self.remote, component_type)
    }

    /// Components recorded in the project manifest
    pub fn installed(
        &self,
        component_type: ComponentType,
    ) -> anyhow::Result<Vec<InstalledComponentRecord>> {
        do_installed(&self.root, component_type)
    }

    pub fn install(
        &self,
        component_type: ComponentType,
        name: &str,
        options: &InstallOptions,
    ) -> anyhow::Result<InstallOutcome> {
        do_install(
            &self.cache,
            &self.root,
            &self.remote,
            component_type,
            name,
            options,
        )
    }

    /// Moves a component to `revision`, or to its latest revision
    pub fn update(
        &self,
        component_type: ComponentType,
        name: &str,
        revision: Option<&str>,
    ) -> anyhow::Result<UpdateOutcome> {
        do_update(
            &self.cache,
            &self.root,
            &self.remote,
            component_type,
            name,
            revision,
        )
    }

    pub fn remove(
        &self,
        component_type: ComponentType,
        name: &str,
    ) -> anyhow::Result<RemoveOutcome> {
        do_remove(&self.cache, &self.root, &self.remote, component_type, name)
    }

    /// Repairs the directory layout and the manifest of the project
    pub fn check(&self) -> anyhow::Result<RepairReport> {
        do_check(&self.cache, &self.root, &self.remote)
    }

    pub fn clear_cache(&self) -> anyhow::Result<()> {
        do_clear_cache(&self.cache)
    }
}
