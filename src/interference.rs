//! Files that stop the patched executable from working (anti-cheat launcher,
//! installer manifest) are neutralized by renaming them to `<name>.disabled`.

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::backup::DISABLED_SUFFIX;
use crate::error::Result;
use crate::fileops;

pub fn disabled_path(path: &Path) -> PathBuf {
    fileops::with_suffix(path, DISABLED_SUFFIX)
}

/// Rename `path` to its disabled sibling. Returns `false` when there was nothing to do.
///
/// A disabled sibling left over from an earlier run is stale and is deleted first,
/// so at most one of the two names exists afterwards.
pub fn disable(path: &Path) -> Result<bool> {
    if !path.exists() {
        debug!("{} not present, nothing to disable", path.display());
        return Ok(false);
    }
    let disabled = disabled_path(path);
    if disabled.exists() {
        fileops::remove(&disabled);
    }
    if let Err(e) = fileops::move_replace(path, &disabled) {
        // The original is still in place; drop any copy made under the disabled name.
        fileops::remove(&disabled);
        return Err(e);
    }
    info!("disabled {}", path.display());
    Ok(true)
}

/// Rename the disabled sibling back to `path`. Returns `false` when there was nothing to do.
pub fn enable(path: &Path) -> Result<bool> {
    let disabled = disabled_path(path);
    if !disabled.exists() {
        return Ok(false);
    }
    let existed = path.exists();
    if let Err(e) = fileops::move_replace(&disabled, path) {
        if !existed {
            fileops::remove(path);
        }
        return Err(e);
    }
    info!("re-enabled {}", path.display());
    Ok(true)
}
