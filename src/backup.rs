//! "Original file before modification" backups.
//!
//! The backup sibling is the only durable record that a file has been modified:
//! a target is considered patched if and only if `<target>.bak` exists.

use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{PatchError, Result};
use crate::fileops;

/// Suffix of the pre-modification backup.
pub const BACKUP_SUFFIX: &str = ".bak";
/// Suffix of the delta output before it is swapped in.
pub const IN_PROGRESS_SUFFIX: &str = ".patched";
/// Suffix of a file neutralized by renaming.
pub const DISABLED_SUFFIX: &str = ".disabled";
/// Suffix of a locked side file displaced instead of overwritten.
pub const DISPLACED_SUFFIX: &str = ".old";

pub fn backup_path(target: &Path) -> PathBuf {
    fileops::with_suffix(target, BACKUP_SUFFIX)
}

pub fn in_progress_path(target: &Path) -> PathBuf {
    fileops::with_suffix(target, IN_PROGRESS_SUFFIX)
}

pub fn has_backup(target: &Path) -> bool {
    backup_path(target).exists()
}

/// Back up `target`, discarding any stale backup from an earlier run first.
pub fn create(target: &Path) -> Result<PathBuf> {
    let backup = backup_path(target);
    fileops::remove(&backup);
    fileops::copy(target, &backup)?;
    debug!("backed up {} to {}", target.display(), backup.display());
    Ok(backup)
}

/// Copy the backup over `target`, then delete the backup.
///
/// Once this returns `Ok`, `target` no longer counts as patched. A backup that
/// cannot be deleted after a successful copy is left behind and logged.
pub fn restore(target: &Path) -> Result<()> {
    let backup = backup_path(target);
    if !backup.exists() {
        return Err(PatchError::NoBackup { path: backup });
    }
    fileops::copy(&backup, target)?;
    fileops::remove(&backup);
    debug!("restored {} from {}", target.display(), backup.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_paths() {
        let target = Path::new("/games/bfn/PVZBattleforNeighborville.exe");
        assert_eq!(
            backup_path(target),
            PathBuf::from("/games/bfn/PVZBattleforNeighborville.exe.bak")
        );
        assert_eq!(
            in_progress_path(target),
            PathBuf::from("/games/bfn/PVZBattleforNeighborville.exe.patched")
        );
    }

    #[test]
    fn test_create_replaces_stale_backup() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("game.exe");
        std::fs::write(&target, b"current").unwrap();
        std::fs::write(backup_path(&target), b"stale from a failed run").unwrap();

        let backup = create(&target).unwrap();
        assert_eq!(std::fs::read(backup).unwrap(), b"current");
        assert!(has_backup(&target));
    }

    #[test]
    fn test_create_missing_target_fails() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("game.exe");
        assert!(create(&target).is_err());
        assert!(!has_backup(&target));
    }

    #[test]
    fn test_restore_copies_back_and_clears_backup() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("game.exe");
        std::fs::write(&target, b"A").unwrap();
        create(&target).unwrap();
        std::fs::write(&target, b"B").unwrap();

        restore(&target).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"A");
        assert!(!has_backup(&target));
    }

    #[test]
    fn test_restore_without_backup_fails() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("game.exe");
        std::fs::write(&target, b"B").unwrap();

        let err = restore(&target).unwrap_err();
        assert!(matches!(err, PatchError::NoBackup { .. }));
        assert_eq!(std::fs::read(&target).unwrap(), b"B");
    }
}
