use anyhow::Result;
use tracing::{debug, info, warn};

use super::discovery::list_entries;
use crate::config::ModuleType;
use crate::runtime::Runtime;
use crate::runtime::adapter::{ensure_dir, link_relative, move_path, remove_path};
use crate::runtime::path::normalize_path;

/// Put the module directories of one type in place.
///
/// The first time, WordPress' own directory becomes the project directory and
/// WordPress gets a link to it instead. Returns true when the project
/// directory was created by this call, which makes the following pass a
/// fresh install.
#[tracing::instrument(skip(runtime, module_type), fields(kind = %module_type.kind))]
pub fn prepare_module_dirs<R: Runtime>(runtime: &R, module_type: &ModuleType) -> Result<bool> {
    let source = &module_type.source_dir;
    let project = &module_type.project_dir;
    let source_is_real_dir = !runtime.is_symlink(source) && runtime.is_dir(source);

    let mut fresh = false;
    if !runtime.exists(project) && !runtime.is_symlink(project) {
        if source_is_real_dir {
            info!("Moving {:?} to {:?}", source, project);
            move_path(runtime, source, project)?;
        } else {
            ensure_dir(runtime, project)?;
        }
        fresh = true;
    } else if source_is_real_dir {
        // A WordPress update recreated its directory; take over what it brought.
        merge_into(runtime, module_type)?;
    }

    if runtime.is_symlink(source) {
        let target = runtime.resolve_link(source)?;
        if normalize_path(&target) != normalize_path(project) {
            warn!("{:?} points to {:?}, relinking to {:?}", source, target, project);
            remove_path(runtime, source)?;
        }
    }
    if !runtime.is_symlink(source) {
        if let Some(parent) = source.parent() {
            ensure_dir(runtime, parent)?;
        }
        link_relative(runtime, project, source);
    }

    ensure_dir(runtime, &module_type.custom_dir)?;
    ensure_dir(runtime, &module_type.composer_dir)?;
    Ok(fresh)
}

fn merge_into<R: Runtime>(runtime: &R, module_type: &ModuleType) -> Result<()> {
    let source = &module_type.source_dir;
    for entry in list_entries(runtime, source)? {
        let destination = module_type.project_dir.join(&entry.name);
        if runtime.exists(&destination) || runtime.is_symlink(&destination) {
            debug!("{} already present in {:?}", entry.name, module_type.project_dir);
            continue;
        }
        move_path(runtime, &entry.path, &destination)?;
    }
    remove_path(runtime, source)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModuleKind;
    use crate::runtime::RealRuntime;
    use std::path::Path;
    use tempfile::tempdir;

    fn plugins(root: &Path) -> ModuleType {
        ModuleType::new(
            ModuleKind::Plugin,
            root,
            &root.join("wordpress/wp-content"),
            "wpackagist-",
        )
    }

    #[test]
    fn test_first_run_moves_wordpress_directory() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let module_type = plugins(dir.path());
        runtime
            .create_dir_all(&module_type.source_dir.join("akismet"))
            .unwrap();

        let fresh = prepare_module_dirs(&runtime, &module_type).unwrap();

        assert!(fresh);
        assert!(module_type.project_dir.join("akismet").is_dir());
        assert!(runtime.is_symlink(&module_type.source_dir));
        assert!(module_type.source_dir.join("akismet").is_dir());
        assert!(module_type.custom_dir.is_dir());
        assert!(module_type.composer_dir.is_dir());
    }

    #[test]
    fn test_first_run_without_wordpress_directory() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let module_type = plugins(dir.path());

        assert!(prepare_module_dirs(&runtime, &module_type).unwrap());
        assert!(module_type.project_dir.is_dir());
        assert!(runtime.is_symlink(&module_type.source_dir));
    }

    #[test]
    fn test_second_run_is_not_fresh() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let module_type = plugins(dir.path());

        assert!(prepare_module_dirs(&runtime, &module_type).unwrap());
        assert!(!prepare_module_dirs(&runtime, &module_type).unwrap());
        assert!(runtime.is_symlink(&module_type.source_dir));
    }

    #[test]
    fn test_recreated_wordpress_directory_is_merged() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let module_type = plugins(dir.path());
        runtime
            .create_dir_all(&module_type.project_dir.join("akismet"))
            .unwrap();
        runtime
            .write(&module_type.project_dir.join("akismet/version"), b"project")
            .unwrap();
        runtime
            .create_dir_all(&module_type.source_dir.join("akismet"))
            .unwrap();
        runtime
            .write(&module_type.source_dir.join("akismet/version"), b"bundled")
            .unwrap();
        runtime
            .create_dir_all(&module_type.source_dir.join("hello-dolly"))
            .unwrap();

        let fresh = prepare_module_dirs(&runtime, &module_type).unwrap();

        assert!(!fresh);
        assert!(module_type.project_dir.join("hello-dolly").is_dir());
        assert_eq!(
            std::fs::read_to_string(module_type.project_dir.join("akismet/version")).unwrap(),
            "project"
        );
        assert!(runtime.is_symlink(&module_type.source_dir));
    }
}
