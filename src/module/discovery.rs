use anyhow::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;
use crate::runtime::adapter::is_hidden;

/// One entry of a module directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub is_symlink: bool,
}

/// List the non-hidden entries of `dir`. A missing directory has none.
#[tracing::instrument(skip(runtime))]
pub fn list_entries<R: Runtime>(runtime: &R, dir: &Path) -> Result<Vec<DirEntry>> {
    if !runtime.is_dir(dir) {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for path in runtime.read_dir(dir)? {
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if is_hidden(&name) {
            continue;
        }
        let is_symlink = runtime.is_symlink(&path);
        // A link to a directory is reported as a link only
        let is_dir = !is_symlink && runtime.is_dir(&path);
        entries.push(DirEntry {
            name,
            path,
            is_dir,
            is_symlink,
        });
    }
    Ok(entries)
}

/// Names of the real (non-link, non-hidden) module directories in `dir`.
pub fn find_module_dirs<R: Runtime>(runtime: &R, dir: &Path) -> Result<BTreeSet<String>> {
    Ok(list_entries(runtime, dir)?
        .into_iter()
        .filter(|entry| entry.is_dir)
        .map(|entry| entry.name)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use mockall::predicate::eq;
    use tempfile::tempdir;

    #[test]
    fn test_find_module_dirs() {
        let mut runtime = MockRuntime::new();

        // --- Setup Paths ---
        let root = PathBuf::from("/srv/site/plugins");
        let akismet = root.join("akismet");
        let linked = root.join("linked");
        let hidden = root.join(".git");
        let readme = root.join("index.php");

        // Directory exists
        runtime
            .expect_is_dir()
            .with(eq(root.clone()))
            .returning(|_| true);

        // Read dir -> four entries
        runtime.expect_read_dir().with(eq(root.clone())).returning({
            let entries = vec![akismet.clone(), linked.clone(), hidden.clone(), readme.clone()];
            move |_| Ok(entries.clone())
        });

        // --- Classify entries ---
        runtime
            .expect_is_symlink()
            .with(eq(linked.clone()))
            .returning(|_| true);
        runtime.expect_is_symlink().returning(|_| false);
        runtime
            .expect_is_dir()
            .with(eq(akismet.clone()))
            .returning(|_| true);
        runtime
            .expect_is_dir()
            .with(eq(readme.clone()))
            .returning(|_| false);

        // --- Execute & Verify ---
        let entries = list_entries(&runtime, &root).unwrap();
        assert_eq!(entries.len(), 3, "hidden entries are skipped");
        assert!(entries.iter().any(|e| e.name == "linked" && e.is_symlink && !e.is_dir));

        let modules = find_module_dirs(&runtime, &root).unwrap();
        assert_eq!(modules.into_iter().collect::<Vec<_>>(), vec!["akismet"]);
    }

    #[test]
    fn test_find_module_dirs_missing_directory() {
        let mut runtime = MockRuntime::new();
        let root = PathBuf::from("/srv/site/themes");

        runtime
            .expect_is_dir()
            .with(eq(root.clone()))
            .returning(|_| false);
        runtime.expect_read_dir().never();

        assert!(find_module_dirs(&runtime, &root).unwrap().is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn test_find_module_dirs_on_disk() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let farm = dir.path().join("plugins");
        runtime.create_dir_all(&farm.join("acme-plugin")).unwrap();
        runtime.create_dir_all(&farm.join(".cache")).unwrap();
        runtime.create_dir_all(&dir.path().join("storage/linked")).unwrap();
        runtime
            .symlink(&dir.path().join("storage/linked"), &farm.join("linked"))
            .unwrap();

        let modules = find_module_dirs(&runtime, &farm).unwrap();
        assert_eq!(modules.into_iter().collect::<Vec<_>>(), vec!["acme-plugin"]);
    }
}
