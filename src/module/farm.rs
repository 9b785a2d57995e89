use anyhow::Result;
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

use super::discovery::list_entries;
use crate::config::ModuleType;
use crate::runtime::Runtime;
use crate::runtime::adapter::{ensure_dir, link_relative, move_replacing, remove_path};

/// Outcome of a farm rebuild.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FarmReport {
    /// Entries linked into the project directory
    pub linked: Vec<String>,
    /// Real directories moved to custom storage
    pub relocated: Vec<String>,
    /// Composer-managed real directories with no copy in managed storage
    pub kept: Vec<String>,
    /// Entries that could not be linked
    pub failed: Vec<String>,
}

/// Rebuild the project directory as links into custom and managed storage.
///
/// Existing links are dropped. A real directory of a module in `managed` is
/// dropped when managed storage has its copy and left alone otherwise. Any
/// other real directory is dropped when only managed storage has a copy, and
/// moved to custom storage (replacing what is there) otherwise. Hidden
/// entries and plain files are left alone.
#[tracing::instrument(skip(runtime, module_type, managed), fields(kind = %module_type.kind))]
pub fn rebuild_farm<R: Runtime>(
    runtime: &R,
    module_type: &ModuleType,
    managed: &BTreeSet<String>,
) -> Result<FarmReport> {
    let mut report = FarmReport::default();
    ensure_dir(runtime, &module_type.project_dir)?;

    for entry in list_entries(runtime, &module_type.project_dir)? {
        if entry.is_symlink {
            remove_path(runtime, &entry.path)?;
            continue;
        }
        if !entry.is_dir {
            continue;
        }

        let in_custom = runtime.exists(&module_type.custom_dir.join(&entry.name));
        let in_composer = runtime.exists(&module_type.composer_dir.join(&entry.name));
        if managed.contains(&entry.name) {
            if in_composer {
                debug!("Dropping real copy of {}", entry.name);
                remove_path(runtime, &entry.path)?;
            } else {
                warn!(
                    "{} {} is managed by Composer but has no copy in {:?}",
                    module_type.label, entry.name, module_type.composer_dir
                );
                report.kept.push(entry.name);
            }
        } else if in_composer && !in_custom {
            debug!("Dropping real copy of {}", entry.name);
            remove_path(runtime, &entry.path)?;
        } else {
            info!(
                "Moving {} {} to {:?}",
                module_type.label, entry.name, module_type.custom_dir
            );
            move_replacing(runtime, &entry.path, &module_type.custom_dir.join(&entry.name))?;
            report.relocated.push(entry.name);
        }
    }

    // Managed storage comes last so it wins over a same-named custom entry.
    for storage in [&module_type.custom_dir, &module_type.composer_dir] {
        for entry in list_entries(runtime, storage)? {
            if entry.is_symlink {
                continue;
            }
            if report.kept.contains(&entry.name) {
                continue;
            }
            let link = module_type.project_dir.join(&entry.name);
            if runtime.exists(&link) || runtime.is_symlink(&link) {
                debug!("Replacing existing {:?}", link);
                remove_path(runtime, &link)?;
            }
            if link_relative(runtime, &entry.path, &link) {
                report.linked.push(entry.name);
            } else {
                report.failed.push(entry.name);
            }
        }
    }

    info!(
        "Linked {} {} module(s) into {:?}",
        report.linked.len(),
        module_type.label,
        module_type.project_dir
    );
    Ok(report)
}

/// Remove the farm link of one module, leaving its storage untouched.
/// Returns whether a link was removed.
pub fn unlink_module<R: Runtime>(runtime: &R, module_type: &ModuleType, name: &str) -> Result<bool> {
    let link = module_type.project_dir.join(name);
    if !runtime.is_symlink(&link) {
        if runtime.exists(&link) {
            error!("{:?} is not a link, leaving it in place", link);
        }
        return Ok(false);
    }
    runtime.remove_symlink(&link)?;
    debug!("Unlinked {:?}", link);
    Ok(true)
}
