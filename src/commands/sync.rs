use anyhow::Result;
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::{
    config::ModuleKind,
    error::ReconcileError,
    module::{ReconcileOptions, ReconcileReport, Reconciler, prepare_module_dirs},
    runtime::Runtime,
};

use super::{Project, Settings};

#[derive(Debug, Clone, Default)]
pub struct SyncRequest {
    /// Module types to synchronize; all when empty
    pub kinds: Vec<ModuleKind>,
    /// Treat every pass as a fresh install
    pub fresh: bool,
    /// Packages the running Composer command has just installed
    pub installed: Vec<String>,
}

#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub reports: Vec<(ModuleKind, ReconcileReport)>,
    /// Module types whose pass failed
    pub failed: Vec<ModuleKind>,
    pub manifest_saved: bool,
}

impl SyncOutcome {
    pub fn requirements_changed(&self) -> bool {
        self.reports.iter().any(|(_, r)| r.manifest_updated())
    }
}

/// Synchronize the module directories with Composer and WordPress.
///
/// One failing module type does not stop the others. `composer.json` is only
/// written when its content changed.
#[tracing::instrument(skip(runtime, settings))]
pub fn sync<R: Runtime>(runtime: &R, settings: &Settings, request: &SyncRequest) -> Result<SyncOutcome> {
    let mut project = Project::load(runtime, settings)?;
    let baseline = project.manifest.content_hash()?;

    let wp = project.wp_cli(runtime, settings);
    let registry = project.registry(runtime, settings)?;
    let reconciler = Reconciler::new(runtime, &registry, &wp);

    let wordpress_installed = request.fresh || wp.is_installed();
    if !wordpress_installed {
        info!("WordPress is not installed yet, treating this as a fresh install");
    }

    let kinds = if request.kinds.is_empty() {
        ModuleKind::ALL.to_vec()
    } else {
        request.kinds.clone()
    };
    let recently_installed: BTreeSet<String> = request.installed.iter().cloned().collect();

    let mut outcome = SyncOutcome::default();
    for kind in kinds {
        let Some(module_type) = project.config.module_type(kind).cloned() else {
            warn!("No {} directories configured", kind);
            continue;
        };

        let prepared_fresh = match prepare_module_dirs(runtime, &module_type) {
            Ok(fresh) => fresh,
            Err(e) => {
                print_failure(&module_type.label, &ReconcileError::from(e));
                outcome.failed.push(kind);
                continue;
            }
        };
        let options = ReconcileOptions {
            fresh_install: request.fresh || prepared_fresh || !wordpress_installed,
            missing_policy: settings.missing_policy,
            interactive: settings.interactive,
            recently_installed: recently_installed.clone(),
        };

        match reconciler.reconcile(&module_type, &mut project.manifest, &options) {
            Ok(report) => {
                print_report(&module_type.label, &report);
                outcome.reports.push((kind, report));
            }
            Err(e) => {
                print_failure(&module_type.label, &e);
                outcome.failed.push(kind);
            }
        }
    }

    outcome.manifest_saved =
        project
            .manifest
            .save_if_changed(runtime, &project.config.manifest_path, &baseline)?;
    if outcome.manifest_saved {
        println!("Updated {}", project.config.manifest_path.display());
    }
    if outcome.requirements_changed() {
        println!("Run `composer update` to apply the changed requirements.");
    }
    Ok(outcome)
}

fn print_report(label: &str, report: &ReconcileReport) {
    for (package, constraint) in &report.added_requirements {
        println!("Added requirement {}: {}", package, constraint);
    }
    for package in &report.removed_requirements {
        println!("Removed requirement {}", package);
    }
    for name in &report.relocated {
        println!("Moved {} {} to custom storage", label, name);
    }
    for name in &report.removed_modules {
        println!("Removed {} {}", label, name);
    }
    println!("Linked {} {}(s)", report.linked.len(), label);
    for warning in &report.warnings {
        eprintln!("Warning: {}", warning);
    }
}

fn print_failure(label: &str, error: &ReconcileError) {
    eprintln!("Error: {:#}", error);
    if let ReconcileError::Conflict { .. } = error {
        eprintln!("Remove either the Composer package or the custom copy, then run again.");
    }
    if error.is_hard_failure() {
        eprintln!("No {} directories were changed.", label);
    }
}
