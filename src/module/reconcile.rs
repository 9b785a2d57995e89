//! One synchronization pass for one module type.
//!
//! Three views of the installed modules are merged here: what Composer
//! installed, what sits in custom storage, and what WordPress reports. Real
//! directories found in the project directory are either turned into
//! Composer requirements or moved to custom storage, and the project
//! directory is then rebuilt as a farm of links.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info};

use super::discovery::find_module_dirs;
use super::farm::rebuild_farm;
use crate::config::ModuleType;
use crate::error::ReconcileError;
use crate::manifest::Manifest;
use crate::registry::{InstalledModule, PackageLookup};
use crate::runtime::adapter::{move_replacing, remove_path};
use crate::runtime::{Runtime, is_path_under};
use crate::version::build_constraint;
use crate::wpcli::{ModuleVisibility, VisibleModules};

/// What to do with a module WordPress no longer recognizes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MissingPolicy {
    /// Keep it and print a warning
    #[default]
    Warn,
    /// Ask before removing; only with an interactive terminal
    Prompt,
    /// Remove it
    Remove,
}

#[derive(Debug, Default, Clone)]
pub struct ReconcileOptions {
    pub fresh_install: bool,
    pub missing_policy: MissingPolicy,
    pub interactive: bool,
    /// Packages installed by the running Composer command. WordPress cannot
    /// know them yet.
    pub recently_installed: BTreeSet<String>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcileReport {
    /// `(package, constraint)` pairs added to `require`
    pub added_requirements: Vec<(String, String)>,
    pub removed_requirements: Vec<String>,
    /// Modules moved into custom storage
    pub relocated: Vec<String>,
    /// Modules deleted because WordPress no longer knows them
    pub removed_modules: Vec<String>,
    /// Stale real copies of managed modules dropped on a fresh install
    pub pruned: Vec<String>,
    pub linked: Vec<String>,
    pub warnings: Vec<String>,
}

impl ReconcileReport {
    pub fn manifest_updated(&self) -> bool {
        !self.added_requirements.is_empty() || !self.removed_requirements.is_empty()
    }

    /// Record a soft failure for the caller to print.
    fn warn(&mut self, message: String) {
        debug!("{}", message);
        self.warnings.push(message);
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Origin {
    Managed { package: String },
    Custom,
}

pub struct Reconciler<'a, R: Runtime, P: PackageLookup, V: ModuleVisibility> {
    runtime: &'a R,
    packages: &'a P,
    visibility: &'a V,
}

impl<'a, R: Runtime, P: PackageLookup, V: ModuleVisibility> Reconciler<'a, R, P, V> {
    pub fn new(runtime: &'a R, packages: &'a P, visibility: &'a V) -> Self {
        Self {
            runtime,
            packages,
            visibility,
        }
    }

    /// Run one pass for `module_type`, editing `manifest` in memory.
    ///
    /// Fails without touching anything when a module is both managed and
    /// custom, or when WordPress' module list cannot be read. Everything
    /// else is reported as a warning.
    #[tracing::instrument(skip(self, module_type, manifest, options), fields(kind = %module_type.kind))]
    pub fn reconcile(
        &self,
        module_type: &ModuleType,
        manifest: &mut Manifest,
        options: &ReconcileOptions,
    ) -> Result<ReconcileReport, ReconcileError> {
        let mut report = ReconcileReport::default();
        let fresh = options.fresh_install;

        let managed = self.packages.installed_modules(module_type)?;
        let custom = find_module_dirs(self.runtime, &module_type.custom_dir)?;

        let conflicts: Vec<String> = custom
            .iter()
            .filter(|name| managed.contains_key(*name))
            .cloned()
            .collect();
        if !conflicts.is_empty() {
            for name in &conflicts {
                error!(
                    "{} {} is both a Composer package and a custom module",
                    module_type.label, name
                );
            }
            return Err(ReconcileError::Conflict {
                kind: module_type.label.clone(),
                names: conflicts,
            });
        }

        let discovered = find_module_dirs(self.runtime, &module_type.project_dir)?;
        let (new, discovered_managed): (Vec<&String>, Vec<&String>) = discovered
            .iter()
            .filter(|name| !custom.contains(*name))
            .partition(|name| !managed.contains_key(*name));
        // Real copies of custom modules, e.g. after WordPress updated one in place
        let discovered_custom: Vec<&String> = discovered
            .iter()
            .filter(|name| custom.contains(*name))
            .collect();
        debug!(
            "Discovered {} new, {} managed and {} custom {} directories",
            new.len(),
            discovered_managed.len(),
            discovered_custom.len(),
            module_type.label
        );

        let visible = if fresh {
            None
        } else {
            Some(self.visibility.visible_modules(module_type)?)
        };
        let is_visible = |name: &str| visible.as_ref().is_none_or(|v| v.contains_key(name));

        // New directories become requirements when a package exists, custom otherwise.
        let mut to_custom = Vec::new();
        for name in new {
            if !is_visible(name.as_str()) {
                debug!("{} is not known to WordPress, keeping it as custom", name);
                to_custom.push(name.clone());
                continue;
            }
            if self.convert_to_requirement(module_type, name, visible.as_ref(), manifest, &mut report) {
                continue;
            }
            to_custom.push(name.clone());
        }

        // The project copy replaces the stored one
        to_custom.extend(discovered_custom.into_iter().cloned());

        for name in &discovered_managed {
            let Some(installed) = managed.get(*name) else {
                continue;
            };
            if fresh {
                if !self.runtime.is_dir(&module_type.composer_dir.join(name.as_str())) {
                    debug!("{} has no copy in {:?}, not pruning it", name, module_type.composer_dir);
                    continue;
                }
                // A copy left over from before the first install; storage has the real one.
                match remove_path(self.runtime, &module_type.project_dir.join(name)) {
                    Ok(_) => report.pruned.push((*name).clone()),
                    Err(e) => report.warn(format!("Failed to remove stale copy of {}: {:#}", name, e)),
                }
            } else if !is_visible(name.as_str()) && !options.recently_installed.contains(&installed.package) {
                let origin = Origin::Managed {
                    package: installed.package.clone(),
                };
                self.handle_missing(module_type, name, &origin, manifest, options, &mut report);
            }
        }

        for name in to_custom {
            let from = module_type.project_dir.join(&name);
            let to = module_type.custom_dir.join(&name);
            match move_replacing(self.runtime, &from, &to) {
                Ok(()) => {
                    info!("Moved {} {} to {:?}", module_type.label, name, module_type.custom_dir);
                    report.relocated.push(name);
                }
                Err(e) => report.warn(format!("Failed to move {} to custom storage: {:#}", name, e)),
            }
        }

        if !fresh {
            self.check_undiscovered(
                module_type,
                &managed,
                &custom,
                &discovered,
                &is_visible,
                manifest,
                options,
                &mut report,
            );
        }

        let managed_names: BTreeSet<String> = managed.keys().cloned().collect();
        let farm = rebuild_farm(self.runtime, module_type, &managed_names)?;
        report.relocated.extend(farm.relocated);
        report.linked = farm.linked;
        for name in farm.kept {
            report.warn(format!(
                "{} {} is installed by Composer but not in {:?}; leaving it in place",
                module_type.label, name, module_type.composer_dir
            ));
        }
        for name in farm.failed {
            report.warn(format!("{} {} could not be linked", module_type.label, name));
        }

        Ok(report)
    }

    /// Look `name` up in the registry and add a requirement for it.
    /// Returns false when the module has to stay custom.
    fn convert_to_requirement(
        &self,
        module_type: &ModuleType,
        name: &str,
        visible: Option<&VisibleModules>,
        manifest: &mut Manifest,
        report: &mut ReconcileReport,
    ) -> bool {
        let known_version = visible.and_then(|v| v.get(name).cloned().flatten());
        let package_name = module_type.package_name(name);

        let found = match self
            .packages
            .find_package(&package_name, known_version.as_deref())
        {
            Ok(Some(found)) => found,
            Ok(None) => {
                debug!("No package for {} {}", module_type.label, name);
                return false;
            }
            Err(e) => {
                report.warn(format!(
                    "Could not look up {}, keeping it as custom: {:#}",
                    package_name, e
                ));
                return false;
            }
        };

        let Some(constraint) = build_constraint(&found.pretty_version) else {
            report.warn(format!(
                "Cannot build a constraint from {} {}, keeping {} as custom",
                found.name, found.pretty_version, name
            ));
            return false;
        };

        if manifest.add_requirement(&package_name, &constraint) {
            info!("Requiring {} {}", package_name, constraint);
            report
                .added_requirements
                .push((package_name.clone(), constraint));
        }
        if let Err(e) = remove_path(self.runtime, &module_type.project_dir.join(name)) {
            report.warn(format!("Failed to remove {} after requiring it: {:#}", name, e));
        }
        true
    }

    /// Known modules that were not found as real directories and that
    /// WordPress no longer lists.
    #[allow(clippy::too_many_arguments)]
    fn check_undiscovered(
        &self,
        module_type: &ModuleType,
        managed: &BTreeMap<String, InstalledModule>,
        custom: &BTreeSet<String>,
        discovered: &BTreeSet<String>,
        is_visible: &dyn Fn(&str) -> bool,
        manifest: &mut Manifest,
        options: &ReconcileOptions,
        report: &mut ReconcileReport,
    ) {
        let known = managed
            .iter()
            .map(|(name, installed)| {
                (
                    name,
                    Origin::Managed {
                        package: installed.package.clone(),
                    },
                )
            })
            .chain(custom.iter().map(|name| (name, Origin::Custom)));

        for (name, origin) in known {
            if discovered.contains(name) || is_visible(name.as_str()) {
                continue;
            }
            if let Origin::Managed { package } = &origin
                && options.recently_installed.contains(package)
            {
                continue;
            }
            self.handle_missing(module_type, name, &origin, manifest, options, report);
        }
    }

    /// Apply the missing-module policy to one module.
    fn handle_missing(
        &self,
        module_type: &ModuleType,
        name: &str,
        origin: &Origin,
        manifest: &mut Manifest,
        options: &ReconcileOptions,
        report: &mut ReconcileReport,
    ) {
        let remove = match options.missing_policy {
            MissingPolicy::Warn => false,
            MissingPolicy::Remove => true,
            MissingPolicy::Prompt if options.interactive => {
                let prompt = format!(
                    "{} {} is no longer recognized by WordPress. Remove it?",
                    module_type.label, name
                );
                self.runtime.confirm(&prompt, false).unwrap_or_else(|e| {
                    debug!("Prompt failed: {:#}", e);
                    false
                })
            }
            MissingPolicy::Prompt => false,
        };

        if !remove {
            report.warn(format!(
                "{} {} is not recognized by WordPress; keeping it",
                module_type.label, name
            ));
            return;
        }

        let storage_root = match origin {
            Origin::Managed { .. } => &module_type.composer_dir,
            Origin::Custom => &module_type.custom_dir,
        };
        let storage = storage_root.join(name);
        // Installer names come from package metadata
        if storage == *storage_root || !is_path_under(&storage, storage_root) {
            report.warn(format!(
                "Refusing to remove {:?}, it is outside {:?}",
                storage, storage_root
            ));
            return;
        }

        if let Origin::Managed { package } = origin
            && manifest.remove_requirement(package)
        {
            info!("Removed requirement {}", package);
            report.removed_requirements.push(package.clone());
        }

        let removed = remove_path(self.runtime, &storage)
            .and_then(|_| remove_path(self.runtime, &module_type.project_dir.join(name)));
        match removed {
            Ok(_) => {
                info!("Removed {} {}", module_type.label, name);
                report.removed_modules.push(name.to_string());
            }
            Err(e) => report.warn(format!("Failed to remove {}: {:#}", name, e)),
        }
    }
}
