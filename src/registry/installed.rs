//! Packages Composer has installed, read from `vendor/composer/installed.json`.

use anyhow::{Context, Result};
use glob::Pattern;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{InstalledModule, Package, PackageEntry, PackageSource};
use crate::config::ModuleType;
use crate::runtime::Runtime;

/// Composer 2 wraps the list, Composer 1 writes a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InstalledFile {
    V2 { packages: Vec<PackageEntry> },
    V1(Vec<PackageEntry>),
}

#[derive(Debug, Default, Clone)]
pub struct InstalledPackages {
    packages: Vec<Package>,
}

impl InstalledPackages {
    pub fn installed_json(vendor_dir: &Path) -> PathBuf {
        vendor_dir.join("composer").join("installed.json")
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: InstalledFile =
            serde_json::from_str(content).context("installed.json has an unexpected shape")?;
        let entries = match file {
            InstalledFile::V2 { packages } => packages,
            InstalledFile::V1(packages) => packages,
        };
        Ok(Self {
            packages: entries.into_iter().map(Package::from).collect(),
        })
    }

    /// Load the installed packages. A project without a vendor directory has none.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, vendor_dir: &Path) -> Result<Self> {
        let path = Self::installed_json(vendor_dir);
        if !runtime.exists(&path) {
            debug!("{:?} does not exist, no packages installed", path);
            return Ok(Self::default());
        }
        let content = runtime.read_to_string(&path)?;
        Self::parse(&content).with_context(|| format!("Failed to read {:?}", path))
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    /// Installed packages of `module_type`, keyed by module directory name.
    ///
    /// A package belongs to the type when its name is `<vendor>/<module>` for the
    /// type's package vendor, or when its package type is `wordpress-<type>`.
    pub fn modules_for(&self, module_type: &ModuleType) -> BTreeMap<String, InstalledModule> {
        let vendor_pattern =
            Pattern::new(&format!("{}/*", Pattern::escape(&module_type.package_vendor)));
        let package_type = module_type.package_type();

        let mut modules = BTreeMap::new();
        for package in &self.packages {
            let by_name = vendor_pattern
                .as_ref()
                .is_ok_and(|pattern| pattern.matches(&package.name));
            let by_type = package.package_type.as_deref() == Some(package_type.as_str());
            if !by_name && !by_type {
                continue;
            }

            let module_name = package
                .installer_name
                .clone()
                .or_else(|| package.name.split_once('/').map(|(_, m)| m.to_string()));
            let Some(module_name) = module_name.filter(|m| !m.is_empty()) else {
                warn!("Cannot derive a module name from package {}", package.name);
                continue;
            };

            modules.insert(
                module_name,
                InstalledModule {
                    package: package.name.clone(),
                    version: Some(package.pretty_version.clone()).filter(|v| !v.is_empty()),
                },
            );
        }
        modules
    }
}

impl PackageSource for InstalledPackages {
    fn describe(&self) -> String {
        "installed packages".to_string()
    }

    fn versions(&self, package: &str) -> Result<Vec<Package>> {
        Ok(self
            .packages
            .iter()
            .filter(|p| p.name == package)
            .cloned()
            .collect())
    }
}
