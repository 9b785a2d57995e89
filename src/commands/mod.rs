use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::{
    config::ProjectConfig,
    manifest::Manifest,
    module::MissingPolicy,
    registry::{ComposerRepository, InstalledPackages, Registry},
    runtime::Runtime,
    wpcli::WpCli,
};

mod hook;
mod status;
mod sync;

pub use hook::{HookEvent, hook};
pub use status::{TypeStatus, status};
pub use sync::{SyncOutcome, SyncRequest, sync};

/// Options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Project root; the current directory when unset
    pub root: Option<PathBuf>,
    /// Explicit WP-CLI binary
    pub wp_cli: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub interactive: bool,
    pub missing_policy: MissingPolicy,
    /// Only use installed packages for lookups
    pub offline: bool,
}

/// A loaded project: its layout and its manifest.
pub struct Project {
    pub config: ProjectConfig,
    pub manifest: Manifest,
}

impl Project {
    #[tracing::instrument(skip(runtime, settings))]
    pub fn load<R: Runtime>(runtime: &R, settings: &Settings) -> Result<Self> {
        let current = runtime.current_dir()?;
        let root = match &settings.root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => current.join(root),
            None => current,
        };
        debug!("Project root {:?}", root);

        let manifest_path = ProjectConfig::manifest_path(&root);
        let manifest = Manifest::load(runtime, &manifest_path)
            .with_context(|| format!("{:?} is not a Composer project", root))?;
        let config = ProjectConfig::from_manifest(runtime, &root, &manifest)?;
        Ok(Self { config, manifest })
    }

    pub fn wp_cli<'a, R: Runtime>(&self, runtime: &'a R, settings: &Settings) -> WpCli<'a, R> {
        let binary =
            WpCli::resolve_binary(runtime, settings.wp_cli.as_deref(), &self.config.vendor_dir);
        WpCli::new(
            runtime,
            binary,
            self.config.wordpress_dir.clone(),
            self.config.root.clone(),
            settings.timeout,
        )
    }

    /// Installed packages plus the manifest's repositories, unless offline.
    pub fn registry<'a, R: Runtime>(&self, runtime: &'a R, settings: &Settings) -> Result<Registry<'a>> {
        let installed = InstalledPackages::load(runtime, &self.config.vendor_dir)?;
        let mut registry = Registry::new(installed);
        if settings.offline {
            debug!("Offline, skipping remote repositories");
            return Ok(registry);
        }

        let cache_root = runtime.cache_dir().map(|dir| dir.join("wpsync").join("repo"));
        for url in &self.config.repositories {
            registry = registry.with_source(ComposerRepository::new(runtime, url, cache_root.clone())?);
        }
        Ok(registry)
    }
}
