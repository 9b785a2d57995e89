//! Symlink operations (create, read, resolve, remove).
//!
//! On Windows, directory links fall back to junctions when the process may not
//! create symbolic links (no elevation and no developer mode).

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::RealRuntime;
use super::path::normalize_path;

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn symlink_impl(&self, original: &Path, link: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::symlink as unix_symlink;
            unix_symlink(original, link)
                .with_context(|| format!("Failed to create symlink {:?} -> {:?}", link, original))?;
        }
        #[cfg(windows)]
        {
            use anyhow::bail;
            use std::os::windows::fs::{symlink_dir, symlink_file};
            use tracing::debug;

            // `is_dir()` on a relative path is relative to CWD; we want it relative to the link's parent.
            let target_path = if original.is_absolute() {
                original.to_path_buf()
            } else {
                normalize_path(
                    &link
                        .parent()
                        .context("Failed to get parent directory for symlink")?
                        .join(original),
                )
            };

            if target_path.is_dir() {
                if let Err(e) = symlink_dir(original, link) {
                    debug!("Symlink not permitted ({}), creating junction {:?}", e, link);
                    create_junction(&target_path, link)?;
                }
            } else {
                symlink_file(original, link).context("Failed to create file symlink")?;
            }

            if fs::symlink_metadata(link).is_err() {
                bail!(
                    "Link creation reported success but link does not exist: link={:?} target={:?}",
                    link,
                    original
                );
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn read_link_impl(&self, path: &Path) -> Result<PathBuf> {
        fs::read_link(path).with_context(|| format!("Failed to read symlink {:?}", path))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn resolve_link_impl(&self, path: &Path) -> Result<PathBuf> {
        let target = self.read_link_impl(path)?;
        if target.is_absolute() {
            Ok(target)
        } else {
            let parent = path
                .parent()
                .context("Failed to get parent directory of symlink")?;
            Ok(normalize_path(&parent.join(&target)))
        }
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn is_symlink_impl(&self, path: &Path) -> bool {
        // Junctions are name-surrogate reparse points and report as symlinks too.
        fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn remove_symlink_impl(&self, path: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            fs::remove_file(path).with_context(|| format!("Failed to remove symlink {:?}", path))?;
        }
        #[cfg(windows)]
        {
            // Directory symlinks and junctions need remove_dir, file symlinks remove_file.
            fs::remove_dir(path)
                .or_else(|_| fs::remove_file(path))
                .with_context(|| format!("Failed to remove symlink {:?}", path))?;
        }
        Ok(())
    }
}

#[cfg(windows)]
fn create_junction(target: &Path, link: &Path) -> Result<()> {
    use anyhow::bail;
    use std::process::Command;

    let output = Command::new("cmd")
        .arg("/C")
        .arg("mklink")
        .arg("/J")
        .arg(link)
        .arg(target)
        .output()
        .context("Failed to run mklink")?;
    if !output.status.success() {
        bail!(
            "mklink /J {:?} {:?} failed: {}",
            link,
            target,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::runtime::{RealRuntime, Runtime};
    use std::path::Path;
    use tempfile::tempdir;

    #[test]
    fn test_real_runtime_symlink_ops() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let target = dir.path().join("storage");
        runtime.create_dir_all(&target).unwrap();

        let link = dir.path().join("link");
        runtime.symlink(&target, &link).unwrap();
        assert!(runtime.is_symlink(&link));
        assert!(!runtime.is_symlink(&target));
        assert_eq!(runtime.resolve_link(&link).unwrap(), target);

        runtime.remove_symlink(&link).unwrap();
        assert!(!runtime.exists(&link));
        assert!(runtime.exists(&target));
    }

    #[test]
    fn test_symlink_to_directory_lists_through_link() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let target = dir.path().join("akismet");
        runtime.create_dir_all(&target).unwrap();
        runtime.write(&target.join("akismet.php"), b"<?php").unwrap();

        let link = dir.path().join("plugins-akismet");
        runtime.symlink(&target, &link).unwrap();

        assert!(runtime.is_dir(&link));
        assert_eq!(
            runtime.read_to_string(&link.join("akismet.php")).unwrap(),
            "<?php"
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_resolve_link_relative_target_parent_dir() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let storage = dir.path().join("custom/acme");
        runtime.create_dir_all(&storage).unwrap();
        let farm = dir.path().join("plugins");
        runtime.create_dir_all(&farm).unwrap();

        let link = farm.join("acme");
        runtime
            .symlink(Path::new("../custom/acme"), &link)
            .unwrap();

        assert_eq!(runtime.resolve_link(&link).unwrap(), storage);
        assert_eq!(
            runtime.read_link(&link).unwrap(),
            Path::new("../custom/acme")
        );
    }

    #[test]
    fn test_dangling_symlink_is_still_a_symlink() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let target = dir.path().join("gone");
        runtime.create_dir_all(&target).unwrap();
        let link = dir.path().join("link");
        runtime.symlink(&target, &link).unwrap();
        runtime.remove_dir_all(&target).unwrap();

        assert!(runtime.is_symlink(&link));
        assert!(!runtime.exists(&link));
        runtime.remove_symlink(&link).unwrap();
        assert!(!runtime.is_symlink(&link));
    }

    #[test]
    fn test_is_symlink_on_missing_path() {
        let runtime = RealRuntime;
        assert!(!runtime.is_symlink(Path::new("/nonexistent/wpsync/path")));
    }
}
