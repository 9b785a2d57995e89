//! Project layout and module type descriptors.
//!
//! Everything here is built once from `composer.json` (`extra.wpsync`) and
//! the environment, then passed by reference into the synchronization code.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::manifest::{MANIFEST_FILE, Manifest};
use crate::runtime::Runtime;

pub const DEFAULT_WORDPRESS_DIR: &str = "wordpress";
pub const DEFAULT_CONTENT_DIR: &str = "wp-content";
pub const DEFAULT_PACKAGE_PREFIX: &str = "wpackagist-";
pub const DEFAULT_VENDOR_DIR: &str = "vendor";
pub const PACKAGIST_URL: &str = "https://repo.packagist.org";

/// The kinds of WordPress modules that are synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
pub enum ModuleKind {
    Plugin,
    Theme,
}

impl ModuleKind {
    pub const ALL: [ModuleKind; 2] = [ModuleKind::Plugin, ModuleKind::Theme];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::Plugin => "plugin",
            ModuleKind::Theme => "theme",
        }
    }

    /// Directory name WordPress uses under its content directory.
    pub fn plural(&self) -> &'static str {
        match self {
            ModuleKind::Plugin => "plugins",
            ModuleKind::Theme => "themes",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plugin" | "plugins" => Ok(ModuleKind::Plugin),
            "theme" | "themes" => Ok(ModuleKind::Theme),
            other => anyhow::bail!("Unknown module type '{}'", other),
        }
    }
}

/// Everything the engine needs to know about one module type.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleType {
    pub kind: ModuleKind,
    /// Human readable singular name used in messages
    pub label: String,
    /// WordPress' own location, `<wordpress>/<content>/plugins`
    pub source_dir: PathBuf,
    /// Project-facing directory that holds the symlink farm
    pub project_dir: PathBuf,
    /// Storage for modules that are not Composer dependencies
    pub custom_dir: PathBuf,
    /// Where Composer installs module packages
    pub composer_dir: PathBuf,
    /// WP-CLI command group and subcommand listing installed modules
    pub list_command: (String, String),
    /// Package vendor for registry lookups, e.g. `wpackagist-plugin`
    pub package_vendor: String,
}

impl ModuleType {
    pub fn new(kind: ModuleKind, root: &Path, content_dir: &Path, prefix: &str) -> Self {
        let plural = kind.plural();
        Self {
            kind,
            label: kind.as_str().to_string(),
            source_dir: content_dir.join(plural),
            project_dir: root.join(plural),
            custom_dir: root.join("custom").join(plural),
            composer_dir: root.join("vendor-wp").join(plural),
            list_command: (kind.as_str().to_string(), "list".to_string()),
            package_vendor: format!("{}{}", prefix, kind.as_str()),
        }
    }

    /// Registry identifier for a module of this type.
    pub fn package_name(&self, module: &str) -> String {
        format!("{}/{}", self.package_vendor, module)
    }

    /// Module name for a conventionally named package, if it follows the convention.
    pub fn module_name<'a>(&self, package: &'a str) -> Option<&'a str> {
        package
            .strip_prefix(self.package_vendor.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|name| !name.is_empty())
    }

    /// Composer package type handled by composer/installers for this kind.
    pub fn package_type(&self) -> String {
        format!("wordpress-{}", self.kind.as_str())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct ExtraSettings {
    wordpress_dir: Option<String>,
    content_dir: Option<String>,
    package_prefix: Option<String>,
    modules: BTreeMap<String, ModuleSettings>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct ModuleSettings {
    project_dir: Option<String>,
    custom_dir: Option<String>,
    composer_dir: Option<String>,
}

/// Resolved layout of one project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectConfig {
    pub root: PathBuf,
    pub manifest_path: PathBuf,
    pub wordpress_dir: PathBuf,
    pub vendor_dir: PathBuf,
    pub package_prefix: String,
    pub module_types: Vec<ModuleType>,
    /// Composer repository base URLs, queried in order
    pub repositories: Vec<String>,
}

impl ProjectConfig {
    pub fn manifest_path(root: &Path) -> PathBuf {
        root.join(MANIFEST_FILE)
    }

    /// Build the layout from the manifest. `COMPOSER_VENDOR_DIR` overrides
    /// `config.vendor-dir`, like it does for Composer.
    pub fn from_manifest<R: Runtime>(runtime: &R, root: &Path, manifest: &Manifest) -> Result<Self> {
        let settings: ExtraSettings = match manifest.extra("wpsync") {
            Some(value) => serde_json::from_value(value.clone())
                .context("Invalid extra.wpsync section in composer.json")?,
            None => ExtraSettings::default(),
        };

        let wordpress_dir = root.join(
            settings
                .wordpress_dir
                .as_deref()
                .unwrap_or(DEFAULT_WORDPRESS_DIR),
        );
        let content_dir =
            wordpress_dir.join(settings.content_dir.as_deref().unwrap_or(DEFAULT_CONTENT_DIR));
        let package_prefix = settings
            .package_prefix
            .clone()
            .unwrap_or_else(|| DEFAULT_PACKAGE_PREFIX.to_string());

        let vendor_dir = match runtime.env_var("COMPOSER_VENDOR_DIR") {
            Ok(dir) if !dir.is_empty() => root.join(dir),
            _ => root.join(manifest.vendor_dir().unwrap_or(DEFAULT_VENDOR_DIR)),
        };

        let mut module_types = Vec::new();
        for kind in ModuleKind::ALL {
            let mut module = ModuleType::new(kind, root, &content_dir, &package_prefix);
            let overrides = settings
                .modules
                .get(kind.as_str())
                .or_else(|| settings.modules.get(kind.plural()));
            if let Some(overrides) = overrides {
                if let Some(dir) = &overrides.project_dir {
                    module.project_dir = root.join(dir);
                }
                if let Some(dir) = &overrides.custom_dir {
                    module.custom_dir = root.join(dir);
                }
                if let Some(dir) = &overrides.composer_dir {
                    module.composer_dir = root.join(dir);
                }
            }
            module_types.push(module);
        }

        let (entries, packagist) = manifest.repositories();
        let mut repositories: Vec<String> = entries.into_iter().map(|e| e.url).collect();
        if packagist {
            repositories.push(PACKAGIST_URL.to_string());
        }

        Ok(Self {
            root: root.to_path_buf(),
            manifest_path: Self::manifest_path(root),
            wordpress_dir,
            vendor_dir,
            package_prefix,
            module_types,
            repositories,
        })
    }

    pub fn module_type(&self, kind: ModuleKind) -> Option<&ModuleType> {
        self.module_types.iter().find(|m| m.kind == kind)
    }

    /// Module type and module name for a package, by naming convention.
    pub fn module_for_package(&self, package: &str) -> Option<(&ModuleType, String)> {
        self.module_types.iter().find_map(|module| {
            module
                .module_name(package)
                .map(|name| (module, name.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;

    fn runtime_without_vendor_override() -> MockRuntime {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_env_var()
            .with(eq("COMPOSER_VENDOR_DIR"))
            .returning(|_| Err(std::env::VarError::NotPresent));
        runtime
    }

    #[test]
    fn test_module_kind_parsing() {
        assert_eq!("plugin".parse::<ModuleKind>().unwrap(), ModuleKind::Plugin);
        assert_eq!("Themes".parse::<ModuleKind>().unwrap(), ModuleKind::Theme);
        assert!("widget".parse::<ModuleKind>().is_err());
        assert_eq!(ModuleKind::Theme.to_string(), "theme");
    }

    #[test]
    fn test_default_layout() {
        let runtime = runtime_without_vendor_override();
        let root = PathBuf::from("/srv/site");
        let manifest = Manifest::parse("{}").unwrap();

        let config = ProjectConfig::from_manifest(&runtime, &root, &manifest).unwrap();

        assert_eq!(config.wordpress_dir, root.join("wordpress"));
        assert_eq!(config.vendor_dir, root.join("vendor"));
        assert_eq!(config.repositories, vec![PACKAGIST_URL.to_string()]);

        let plugins = config.module_type(ModuleKind::Plugin).unwrap();
        assert_eq!(plugins.source_dir, root.join("wordpress/wp-content/plugins"));
        assert_eq!(plugins.project_dir, root.join("plugins"));
        assert_eq!(plugins.custom_dir, root.join("custom/plugins"));
        assert_eq!(plugins.composer_dir, root.join("vendor-wp/plugins"));
        assert_eq!(plugins.package_vendor, "wpackagist-plugin");
        assert_eq!(
            plugins.list_command,
            ("plugin".to_string(), "list".to_string())
        );

        let themes = config.module_type(ModuleKind::Theme).unwrap();
        assert_eq!(themes.package_name("astra"), "wpackagist-theme/astra");
        assert_eq!(themes.package_type(), "wordpress-theme");
    }

    #[test]
    fn test_layout_overrides() {
        let runtime = runtime_without_vendor_override();
        let root = PathBuf::from("/srv/site");
        let manifest = Manifest::parse(
            r#"{
                "config": {"vendor-dir": "lib"},
                "repositories": [{"type": "composer", "url": "https://wpackagist.org"}],
                "extra": {"wpsync": {
                    "wordpress-dir": "web/wp",
                    "content-dir": "content",
                    "package-prefix": "acme-",
                    "modules": {"plugin": {"custom-dir": "site-plugins"}}
                }}
            }"#,
        )
        .unwrap();

        let config = ProjectConfig::from_manifest(&runtime, &root, &manifest).unwrap();

        assert_eq!(config.wordpress_dir, root.join("web/wp"));
        assert_eq!(config.vendor_dir, root.join("lib"));
        assert_eq!(
            config.repositories,
            vec!["https://wpackagist.org".to_string(), PACKAGIST_URL.to_string()]
        );
        let plugins = config.module_type(ModuleKind::Plugin).unwrap();
        assert_eq!(plugins.source_dir, root.join("web/wp/content/plugins"));
        assert_eq!(plugins.custom_dir, root.join("site-plugins"));
        assert_eq!(plugins.package_vendor, "acme-plugin");
    }

    #[test]
    fn test_vendor_dir_from_environment() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_env_var()
            .with(eq("COMPOSER_VENDOR_DIR"))
            .returning(|_| Ok("deps".to_string()));
        let root = PathBuf::from("/srv/site");
        let manifest = Manifest::parse(r#"{"config": {"vendor-dir": "lib"}}"#).unwrap();

        let config = ProjectConfig::from_manifest(&runtime, &root, &manifest).unwrap();
        assert_eq!(config.vendor_dir, root.join("deps"));
    }

    #[test]
    fn test_invalid_extra_section() {
        let runtime = runtime_without_vendor_override();
        let manifest =
            Manifest::parse(r#"{"extra": {"wpsync": {"wordpress-dir": 42}}}"#).unwrap();
        assert!(ProjectConfig::from_manifest(&runtime, Path::new("/srv"), &manifest).is_err());
    }

    #[test]
    fn test_module_for_package() {
        let runtime = runtime_without_vendor_override();
        let manifest = Manifest::parse("{}").unwrap();
        let config = ProjectConfig::from_manifest(&runtime, Path::new("/srv"), &manifest).unwrap();

        let (module, name) = config.module_for_package("wpackagist-theme/astra").unwrap();
        assert_eq!(module.kind, ModuleKind::Theme);
        assert_eq!(name, "astra");
        assert!(config.module_for_package("wpackagist-plugin/").is_none());
        assert!(config.module_for_package("acme/library").is_none());
    }
}
