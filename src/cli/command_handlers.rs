use std::{collections::BTreeSet, path::Path};

use log::{debug, info};

use crate::{
    api::RemoteSettings,
    client::ComponentRepository,
    context::ProjectContext,
    git::cache::ComponentGitCache,
    install::{
        installed_components, ComponentInstaller, InstallOptions, InstallOutcome, RemoveOutcome,
        UpdateOutcome,
    },
    model::{component::ComponentType, manifest::InstalledComponentRecord},
    reconcile::RepairReport,
    remote::GitHubApi,
};

/// Handler to list the components offered by the remote
pub fn do_available(
    cache: &ComponentGitCache,
    root: &Path,
    remote: &RemoteSettings,
    component_type: ComponentType,
) -> anyhow::Result<BTreeSet<String>> {
    let installer = open_installer(cache, root, remote, component_type)?;
    Ok(installer.available()?)
}

/// Handler to list the components recorded in the manifest
pub fn do_installed(
    root: &Path,
    component_type: ComponentType,
) -> anyhow::Result<Vec<InstalledComponentRecord>> {
    let context = ProjectContext::resolve(root)?;
    Ok(installed_components(&context, component_type)?)
}

pub fn do_install(
    cache: &ComponentGitCache,
    root: &Path,
    remote: &RemoteSettings,
    component_type: ComponentType,
    name: &str,
    options: &InstallOptions,
) -> anyhow::Result<InstallOutcome> {
    let mut installer = open_installer(cache, root, remote, component_type)?;
    Ok(installer.install(name, options)?)
}

pub fn do_update(
    cache: &ComponentGitCache,
    root: &Path,
    remote: &RemoteSettings,
    component_type: ComponentType,
    name: &str,
    revision: Option<&str>,
) -> anyhow::Result<UpdateOutcome> {
    let mut installer = open_installer(cache, root, remote, component_type)?;
    Ok(installer.update(name, revision)?)
}

pub fn do_remove(
    cache: &ComponentGitCache,
    root: &Path,
    remote: &RemoteSettings,
    component_type: ComponentType,
    name: &str,
) -> anyhow::Result<RemoveOutcome> {
    let mut installer = open_installer(cache, root, remote, component_type)?;
    Ok(installer.remove(name)?)
}

/// Handler to check command
/// Migrates every component type out of the legacy layout and repairs the
/// manifest, reusing one clone of the remote.
pub fn do_check(
    cache: &ComponentGitCache,
    root: &Path,
    remote: &RemoteSettings,
) -> anyhow::Result<RepairReport> {
    let context = ProjectContext::resolve(root)?;
    let mut source = open_client(cache, remote)?;
    let mut report = RepairReport::default();
    for component_type in ComponentType::ALL {
        let mut installer = ComponentInstaller::new(source, component_type, context.clone());
        let repaired = installer.check()?;
        report.added.extend(repaired.added);
        report.removed.extend(repaired.removed);
        source = installer.into_source();
    }
    if report.is_clean() {
        info!("{} is up to date", context.root().display());
    }
    Ok(report)
}

pub fn do_clear_cache(cache: &ComponentGitCache) -> anyhow::Result<()> {
    Ok(cache.clear()?)
}

fn open_client<'a>(
    cache: &'a ComponentGitCache,
    remote: &RemoteSettings,
) -> anyhow::Result<ComponentRepository<'a>> {
    let api = match &remote.api_url {
        Some(url) => {
            debug!("Reading component files through {}", url);
            Some(GitHubApi::new(url.as_str(), remote.api_token.clone())?)
        }
        None => None,
    };
    Ok(ComponentRepository::open(
        cache,
        &remote.url,
        remote.branch.as_deref(),
        api,
    )?)
}

fn open_installer<'a>(
    cache: &'a ComponentGitCache,
    root: &Path,
    remote: &RemoteSettings,
    component_type: ComponentType,
) -> anyhow::Result<ComponentInstaller<ComponentRepository<'a>>> {
    let context = ProjectContext::resolve(root)?;
    let source = open_client(cache, remote)?;
    Ok(ComponentInstaller::new(source, component_type, context))
}
