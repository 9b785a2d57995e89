use anyhow::Result;
use tracing::{debug, info, warn};

use crate::{
    config::{ModuleKind, ModuleType, ProjectConfig},
    module::unlink_module,
    registry::InstalledPackages,
    runtime::Runtime,
};

use super::{Project, Settings, SyncOutcome, SyncRequest, sync};

/// Composer script events wpsync can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum HookEvent {
    PostCreateProjectCmd,
    PostInstallCmd,
    PostUpdateCmd,
    PrePackageInstall,
    PrePackageUninstall,
}

impl HookEvent {
    fn is_pre_package(&self) -> bool {
        matches!(
            self,
            HookEvent::PrePackageInstall | HookEvent::PrePackageUninstall
        )
    }
}

/// Run the work attached to a Composer event.
///
/// Post events synchronize every module type. Pre-package events only take
/// the packages' links out of the farm so Composer can replace their storage;
/// they return `None`.
#[tracing::instrument(skip(runtime, settings))]
pub fn hook<R: Runtime>(
    runtime: &R,
    settings: &Settings,
    event: HookEvent,
    packages: &[String],
) -> Result<Option<SyncOutcome>> {
    if !event.is_pre_package() {
        let request = SyncRequest {
            kinds: ModuleKind::ALL.to_vec(),
            fresh: event == HookEvent::PostCreateProjectCmd,
            installed: packages.to_vec(),
        };
        return sync(runtime, settings, &request).map(Some);
    }

    if packages.is_empty() {
        anyhow::bail!("No package given, use --package <name>");
    }

    let project = Project::load(runtime, settings)?;
    let installed = InstalledPackages::load(runtime, &project.config.vendor_dir)?;
    for package in packages {
        let Some((module_type, name)) = locate_module(&project.config, &installed, package) else {
            debug!("{} is not a WordPress module, nothing to unlink", package);
            continue;
        };
        if unlink_module(runtime, module_type, &name)? {
            info!("Unlinked {} {} for {}", module_type.label, name, package);
        } else {
            warn!("{} {} has no link to remove", module_type.label, name);
        }
    }
    Ok(None)
}

/// Module type and directory name of a package. Installed metadata wins since
/// it knows about installer names and package types.
fn locate_module<'c>(
    config: &'c ProjectConfig,
    installed: &InstalledPackages,
    package: &str,
) -> Option<(&'c ModuleType, String)> {
    let from_installed = config.module_types.iter().find_map(|module_type| {
        installed
            .modules_for(module_type)
            .into_iter()
            .find(|(_, module)| module.package == package)
            .map(|(name, _)| (module_type, name))
    });
    from_installed.or_else(|| config.module_for_package(package))
}
