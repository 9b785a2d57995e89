//! Idempotent directory and link helpers.
//!
//! These are the filesystem operations the synchronization engine relies on.
//! They are written against [`Runtime`] so they behave the same for real and
//! mocked filesystems.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, error};

use super::{Runtime, relative_symlink_path};

/// Entries whose name starts with this marker are never touched.
pub const HIDDEN_MARKER: char = '.';

pub fn is_hidden(name: &str) -> bool {
    name.starts_with(HIDDEN_MARKER)
}

/// Create `path` and its parents unless it already is a directory.
pub fn ensure_dir<R: Runtime>(runtime: &R, path: &Path) -> Result<()> {
    if runtime.is_dir(path) {
        return Ok(());
    }
    runtime.create_dir_all(path)
}

/// Remove whatever sits at `path`: a link, a directory tree or a file.
///
/// Links are removed without touching their target. Missing paths are a no-op.
/// Returns whether something was removed.
pub fn remove_path<R: Runtime>(runtime: &R, path: &Path) -> Result<bool> {
    if runtime.is_symlink(path) {
        runtime.remove_symlink(path)?;
    } else if runtime.is_dir(path) {
        runtime.remove_dir_all(path)?;
    } else if runtime.exists(path) {
        runtime.remove_file(path)?;
    } else {
        return Ok(false);
    }
    debug!("Removed {:?}", path);
    Ok(true)
}

/// Move `from` to `to`, creating the destination's parent first.
///
/// A plain rename is tried first. When it fails (the storage directories may
/// live on different volumes) the tree is copied and the source removed.
pub fn move_path<R: Runtime>(runtime: &R, from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        ensure_dir(runtime, parent)?;
    }

    if let Err(e) = runtime.rename(from, to) {
        debug!("Rename {:?} -> {:?} failed ({:#}), copying instead", from, to, e);
        runtime
            .copy_tree(from, to)
            .with_context(|| format!("Failed to move {:?} to {:?}", from, to))?;
        remove_path(runtime, from)?;
    }
    Ok(())
}

/// Move `from` to `to`, replacing anything already at `to`.
pub fn move_replacing<R: Runtime>(runtime: &R, from: &Path, to: &Path) -> Result<()> {
    if remove_path(runtime, to)? {
        debug!("Replaced existing {:?}", to);
    }
    move_path(runtime, from, to)
}

/// Create a link at `link` pointing to `source`, relative when possible.
///
/// A missing source or an occupied link location means an earlier step left
/// the layout inconsistent: this is logged and the link is not created.
/// Returns whether the link was created.
pub fn link_relative<R: Runtime>(runtime: &R, source: &Path, link: &Path) -> bool {
    if !runtime.exists(source) {
        error!("Cannot link {:?}: source {:?} does not exist", link, source);
        return false;
    }
    if runtime.exists(link) || runtime.is_symlink(link) {
        error!("Cannot link {:?} -> {:?}: target already exists", link, source);
        return false;
    }

    let target = relative_symlink_path(link, source).unwrap_or_else(|| source.to_path_buf());
    match runtime.symlink(&target, link) {
        Ok(()) => {
            debug!("Linked {:?} -> {:?}", link, target);
            true
        }
        Err(e) => {
            error!("Failed to link {:?} -> {:?}: {:#}", link, target, e);
            false
        }
    }
}
