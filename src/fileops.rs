//! File primitives the patch and restore flows are built from.

use std::io;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::{PatchError, Result};

/// Append `suffix` to the full path, e.g. `game.exe` + `.bak` = `game.exe.bak`.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// Copy `src` over `dst`, replacing it if present.
pub fn copy(src: &Path, dst: &Path) -> Result<()> {
    std::fs::copy(src, dst)
        .map(|_| ())
        .map_err(|source| PatchError::Copy {
            from: src.to_path_buf(),
            to: dst.to_path_buf(),
            source,
        })
}

/// Rename `src` to `dst`, replacing an existing destination.
///
/// `std::fs::rename` already replaces on both Unix and Windows. When the rename
/// itself is refused (e.g. across volumes) the file is copied and the source removed.
/// `Ok` means only `dst` remains. If the source cannot be removed after the copy the
/// move fails, even though `dst` has been written.
pub fn move_replace(src: &Path, dst: &Path) -> Result<()> {
    move_with(
        src,
        dst,
        |from, to| std::fs::rename(from, to),
        |path| std::fs::remove_file(path),
    )
}

fn move_with(
    src: &Path,
    dst: &Path,
    rename: impl FnOnce(&Path, &Path) -> io::Result<()>,
    unlink: impl FnOnce(&Path) -> io::Result<()>,
) -> Result<()> {
    let move_err = |source: io::Error| PatchError::Move {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source,
    };
    let rename_err = match rename(src, dst) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    if !src.is_file() || std::fs::copy(src, dst).is_err() {
        return Err(move_err(rename_err));
    }
    match unlink(src) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        // `dst` already holds the copy; callers decide how to undo it.
        Err(e) => Err(move_err(e)),
    }
}

/// Best-effort delete. Returns whether `path` is gone afterwards.
///
/// Failures are logged, never propagated: this discards files nobody needs anymore.
pub fn remove(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!("could not remove {}: {e}", path.display());
            false
        }
    }
}

/// Whether both paths resolve to the same underlying file.
/// Any error (including either path missing) counts as "different".
pub fn is_same_file(a: &Path, b: &Path) -> bool {
    same_file::is_same_file(a, b).unwrap_or(false)
}
