//! Package lookup across the installed packages and Composer repositories.

mod installed;
mod remote;
pub mod retry;

use anyhow::{Result, anyhow};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::ModuleType;
use crate::version::{TRUNK_CONSTRAINT, Version, is_trunk};

pub use installed::InstalledPackages;
pub use remote::ComposerRepository;

/// One version of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    /// Normalized version, e.g. `3.1.0.0`
    pub version: String,
    /// Version as the author wrote it, e.g. `3.1.0`
    pub pretty_version: String,
    pub package_type: Option<String>,
    /// `extra.installer-name`, which overrides the install directory name
    pub installer_name: Option<String>,
}

/// A package version as Composer writes it in `installed.json` and
/// repository metadata.
#[derive(Debug, Deserialize)]
pub(crate) struct PackageEntry {
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    version_normalized: Option<String>,
    #[serde(default, rename = "type")]
    package_type: Option<String>,
    #[serde(default)]
    extra: Value,
}

impl From<PackageEntry> for Package {
    fn from(entry: PackageEntry) -> Self {
        let version = entry
            .version_normalized
            .clone()
            .or_else(|| Version::parse(&entry.version).map(|v| v.normalized()))
            .unwrap_or_else(|| entry.version.clone());
        let installer_name = entry
            .extra
            .get("installer-name")
            .and_then(Value::as_str)
            .map(str::to_string);
        Package {
            name: entry.name,
            version,
            pretty_version: entry.version,
            package_type: entry.package_type,
            installer_name,
        }
    }
}

/// A Composer-managed module present in managed storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledModule {
    pub package: String,
    pub version: Option<String>,
}

/// A repository that can list the versions of a package.
pub trait PackageSource {
    fn describe(&self) -> String;

    /// All known versions of `package`. An unknown package yields an empty list.
    fn versions(&self, package: &str) -> Result<Vec<Package>>;
}

/// What the synchronization engine needs from Composer's side.
pub trait PackageLookup {
    /// Installed packages that belong to `module_type`, by module name.
    fn installed_modules(&self, module_type: &ModuleType) -> Result<BTreeMap<String, InstalledModule>>;

    /// The best available version of `package` not older than `min_version`.
    fn find_package(&self, package: &str, min_version: Option<&str>) -> Result<Option<Package>>;
}

/// Pick the best candidate.
///
/// Only parseable, non-zero versions not older than `min_version` qualify, and
/// stable releases win over pre-releases. With a minimum the lowest such
/// version is taken, which is the one closest to the copy on disk; without
/// one the highest. `dev-trunk` is accepted only without a minimum and when
/// no numbered release qualifies.
pub fn select_best(candidates: &[Package], min_version: Option<&str>) -> Option<Package> {
    let minimum = min_version
        .filter(|v| !is_trunk(v))
        .and_then(Version::parse);

    let numbered: Vec<(Version, &Package)> = candidates
        .iter()
        .filter_map(|p| Version::parse(&p.pretty_version).map(|v| (v, p)))
        .filter(|(v, _)| !v.is_zero())
        .filter(|(v, _)| minimum.as_ref().is_none_or(|min| v >= min))
        .collect();

    let has_stable = numbered.iter().any(|(v, _)| v.is_stable());
    let eligible = numbered
        .into_iter()
        .filter(|(v, _)| !has_stable || v.is_stable());

    let best = if minimum.is_some() {
        eligible.min_by(|(a, _), (b, _)| a.cmp(b))
    } else {
        eligible.max_by(|(a, _), (b, _)| a.cmp(b))
    };
    if let Some((_, package)) = best {
        return Some(package.clone());
    }

    if min_version.is_none() || min_version.is_some_and(is_trunk) {
        return candidates
            .iter()
            .find(|p| is_trunk(&p.pretty_version) || p.version == TRUNK_CONSTRAINT)
            .cloned();
    }
    None
}

/// Installed packages first, then the remote repositories in order.
pub struct Registry<'a> {
    installed: InstalledPackages,
    remotes: Vec<Box<dyn PackageSource + 'a>>,
}

impl<'a> Registry<'a> {
    pub fn new(installed: InstalledPackages) -> Self {
        Self {
            installed,
            remotes: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: impl PackageSource + 'a) -> Self {
        self.remotes.push(Box::new(source));
        self
    }

    pub fn installed(&self) -> &InstalledPackages {
        &self.installed
    }
}

impl PackageLookup for Registry<'_> {
    fn installed_modules(&self, module_type: &ModuleType) -> Result<BTreeMap<String, InstalledModule>> {
        Ok(self.installed.modules_for(module_type))
    }

    #[tracing::instrument(skip(self))]
    fn find_package(&self, package: &str, min_version: Option<&str>) -> Result<Option<Package>> {
        let mut failures = Vec::new();
        let sources = std::iter::once(&self.installed as &dyn PackageSource)
            .chain(self.remotes.iter().map(|s| s.as_ref() as &dyn PackageSource));

        for source in sources {
            match source.versions(package) {
                Ok(candidates) => {
                    if let Some(found) = select_best(&candidates, min_version) {
                        debug!(
                            "{} {} found in {}",
                            found.name,
                            found.pretty_version,
                            source.describe()
                        );
                        return Ok(Some(found));
                    }
                }
                Err(e) => {
                    warn!("Lookup of {} in {} failed: {:#}", package, source.describe(), e);
                    failures.push(source.describe());
                }
            }
        }

        if failures.is_empty() {
            Ok(None)
        } else {
            Err(anyhow!(
                "{} could not be looked up in {}",
                package,
                failures.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(name: &str, pretty_version: &str) -> Package {
        Package {
            name: name.to_string(),
            version: Version::parse(pretty_version)
                .map(|v| v.normalized())
                .unwrap_or_else(|| format!("dev-{}", pretty_version)),
            pretty_version: pretty_version.to_string(),
            package_type: Some("wordpress-plugin".to_string()),
            installer_name: None,
        }
    }

    struct FixedSource(Vec<Package>);

    impl PackageSource for FixedSource {
        fn describe(&self) -> String {
            "fixed".to_string()
        }

        fn versions(&self, package: &str) -> Result<Vec<Package>> {
            Ok(self.0.iter().filter(|p| p.name == package).cloned().collect())
        }
    }

    struct BrokenSource;

    impl PackageSource for BrokenSource {
        fn describe(&self) -> String {
            "broken".to_string()
        }

        fn versions(&self, _package: &str) -> Result<Vec<Package>> {
            Err(anyhow!("connection refused"))
        }
    }

    fn seo_tool_versions() -> Vec<Package> {
        ["2.9.1", "3.0.0", "3.1.0", "3.2.0-beta1", "3.2.0", "0.0.0"]
            .iter()
            .map(|v| package("wpackagist-plugin/seo-tool", v))
            .collect()
    }

    #[test]
    fn test_select_lowest_satisfying_with_minimum() {
        let best = select_best(&seo_tool_versions(), Some("3.1.0")).unwrap();
        assert_eq!(best.pretty_version, "3.1.0");

        let best = select_best(&seo_tool_versions(), Some("3.0.5")).unwrap();
        assert_eq!(best.pretty_version, "3.1.0");
    }

    #[test]
    fn test_select_highest_without_minimum() {
        let best = select_best(&seo_tool_versions(), None).unwrap();
        assert_eq!(best.pretty_version, "3.2.0");
    }

    #[test]
    fn test_select_prefers_stable() {
        let versions = vec![
            package("a/b", "3.2.0-beta1"),
            package("a/b", "3.1.0"),
        ];
        let best = select_best(&versions, Some("3.1.5")).unwrap();
        assert_eq!(best.pretty_version, "3.2.0-beta1");

        let best = select_best(&versions, None).unwrap();
        assert_eq!(best.pretty_version, "3.1.0");
    }

    #[test]
    fn test_select_nothing_newer() {
        assert_eq!(select_best(&seo_tool_versions(), Some("9.0")), None);
    }

    #[test]
    fn test_zero_versions_are_no_match() {
        let versions = vec![package("a/b", "0.0.0"), package("a/b", "0")];
        assert_eq!(select_best(&versions, None), None);
    }

    #[test]
    fn test_trunk_only_without_minimum() {
        let versions = vec![package("a/b", "dev-trunk")];
        assert_eq!(
            select_best(&versions, None).unwrap().pretty_version,
            "dev-trunk"
        );
        assert_eq!(
            select_best(&versions, Some("trunk")).unwrap().pretty_version,
            "dev-trunk"
        );
        assert_eq!(select_best(&versions, Some("1.0")), None);
    }

    #[test]
    fn test_registry_checks_sources_in_order() {
        let registry = Registry::new(InstalledPackages::default())
            .with_source(FixedSource(vec![package("wpackagist-plugin/seo-tool", "3.1.0")]))
            .with_source(FixedSource(vec![package("wpackagist-plugin/seo-tool", "3.2.0")]));

        let found = registry
            .find_package("wpackagist-plugin/seo-tool", None)
            .unwrap()
            .unwrap();
        assert_eq!(found.pretty_version, "3.1.0");
        assert_eq!(registry.find_package("wpackagist-plugin/other", None).unwrap(), None);
    }

    #[test]
    fn test_registry_skips_failing_source() {
        let registry = Registry::new(InstalledPackages::default())
            .with_source(BrokenSource)
            .with_source(FixedSource(vec![package("wpackagist-plugin/seo-tool", "3.1.0")]));
        assert!(
            registry
                .find_package("wpackagist-plugin/seo-tool", Some("3.0"))
                .unwrap()
                .is_some()
        );

        let registry = Registry::new(InstalledPackages::default()).with_source(BrokenSource);
        let err = registry
            .find_package("wpackagist-plugin/seo-tool", None)
            .unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
