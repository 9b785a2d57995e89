use anyhow::Result;
use std::collections::BTreeSet;

use crate::{
    config::ModuleKind,
    module::{find_module_dirs, list_entries},
    registry::InstalledPackages,
    runtime::Runtime,
};

use super::{Project, Settings};

/// Where the modules of one type currently live.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeStatus {
    pub kind: ModuleKind,
    /// Modules installed by Composer
    pub managed: BTreeSet<String>,
    /// Modules in custom storage
    pub custom: BTreeSet<String>,
    /// Links currently in the project directory
    pub linked: BTreeSet<String>,
}

/// Print where every module lives and whether WordPress is installed.
#[tracing::instrument(skip(runtime, settings))]
pub fn status<R: Runtime>(runtime: &R, settings: &Settings) -> Result<(bool, Vec<TypeStatus>)> {
    let project = Project::load(runtime, settings)?;
    let installed = InstalledPackages::load(runtime, &project.config.vendor_dir)?;
    let wordpress_installed = project.wp_cli(runtime, settings).is_installed();

    println!(
        "WordPress: {}",
        if wordpress_installed {
            "installed"
        } else {
            "not installed"
        }
    );

    let mut statuses = Vec::new();
    for module_type in &project.config.module_types {
        let status = TypeStatus {
            kind: module_type.kind,
            managed: installed.modules_for(module_type).into_keys().collect(),
            custom: find_module_dirs(runtime, &module_type.custom_dir)?,
            linked: list_entries(runtime, &module_type.project_dir)?
                .into_iter()
                .filter(|entry| entry.is_symlink)
                .map(|entry| entry.name)
                .collect(),
        };

        println!("{}:", module_type.kind.plural());
        print_names("managed", &status.managed);
        print_names("custom", &status.custom);
        print_names("linked", &status.linked);
        statuses.push(status);
    }
    Ok((wordpress_installed, statuses))
}

fn print_names(heading: &str, names: &BTreeSet<String>) {
    if names.is_empty() {
        println!("  {}: (none)", heading);
    } else {
        let list: Vec<&str> = names.iter().map(String::as_str).collect();
        println!("  {}: {}", heading, list.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use tempfile::tempdir;

    #[test]
    fn test_status_lists_storage_and_links() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let root = dir.path();
        runtime.write(&root.join("composer.json"), b"{}").unwrap();
        runtime.create_dir_all(&root.join("vendor/composer")).unwrap();
        runtime
            .write(
                &root.join("vendor/composer/installed.json"),
                br#"{"packages": [{"name": "wpackagist-plugin/akismet", "version": "5.3"}]}"#,
            )
            .unwrap();
        runtime
            .create_dir_all(&root.join("vendor-wp/plugins/akismet"))
            .unwrap();
        runtime
            .create_dir_all(&root.join("custom/themes/acme-theme"))
            .unwrap();
        runtime.create_dir_all(&root.join("themes")).unwrap();
        runtime
            .symlink(
                &root.join("custom/themes/acme-theme"),
                &root.join("themes/acme-theme"),
            )
            .unwrap();

        let settings = Settings {
            root: Some(root.to_path_buf()),
            wp_cli: Some(root.join("missing-wp")),
            ..Default::default()
        };
        let (wordpress_installed, statuses) = status(&runtime, &settings).unwrap();

        assert!(!wordpress_installed);
        assert_eq!(statuses.len(), 2);

        let plugins = &statuses[0];
        assert_eq!(plugins.kind, ModuleKind::Plugin);
        assert!(plugins.managed.contains("akismet"));
        assert!(plugins.linked.is_empty());

        let themes = &statuses[1];
        assert!(themes.managed.is_empty());
        assert!(themes.custom.contains("acme-theme"));
        assert!(themes.linked.contains("acme-theme"));
    }

    #[test]
    fn test_status_does_not_modify_project() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let root = dir.path();
        runtime.write(&root.join("composer.json"), b"{}").unwrap();

        let settings = Settings {
            root: Some(root.to_path_buf()),
            wp_cli: Some(root.join("missing-wp")),
            ..Default::default()
        };
        status(&runtime, &settings).unwrap();

        assert!(!root.join("plugins").exists());
        assert!(!root.join("custom").exists());
    }
}
