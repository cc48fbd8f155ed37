//! The companion library dropped next to the game executable.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;

use crate::backup::{DISABLED_SUFFIX, DISPLACED_SUFFIX};
use crate::error::{PatchError, Result};
use crate::fileops;

/// Canonical file name of the side file, always a sibling of the executable.
pub const SIDE_FILE_NAME: &str = "dinput8.dll";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SideFileState {
    Installed,
    Disabled,
    Missing,
}

/// What `install` actually did, so a rollback knows whether to undo it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Source and destination are the same file; nothing was written.
    AlreadyInPlace,
    Copied,
    /// The locked destination was renamed to `.old` before copying.
    Displaced,
}

impl InstallOutcome {
    pub fn changed_anything(self) -> bool {
        self != Self::AlreadyInPlace
    }
}

/// Side file destination for the executable at `target`.
pub fn destination_for(target: &Path) -> PathBuf {
    target
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(SIDE_FILE_NAME)
}

pub fn disabled_path(destination: &Path) -> PathBuf {
    fileops::with_suffix(destination, DISABLED_SUFFIX)
}

pub fn state(destination: &Path) -> SideFileState {
    if destination.exists() {
        SideFileState::Installed
    } else if disabled_path(destination).exists() {
        SideFileState::Disabled
    } else {
        SideFileState::Missing
    }
}

pub fn install(source: &Path, destination: &Path) -> Result<InstallOutcome> {
    if destination.exists() && fileops::is_same_file(source, destination) {
        debug!("{} is already in place", destination.display());
        return Ok(InstallOutcome::AlreadyInPlace);
    }

    let first_err = match fileops::copy(source, destination) {
        Ok(()) => {
            info!("installed {}", destination.display());
            return Ok(InstallOutcome::Copied);
        }
        Err(e) => e,
    };
    if !destination.exists() {
        return Err(first_err);
    }

    // Most likely mapped by a running game: move it aside instead of overwriting.
    warn!("{first_err}; displacing the existing file");
    let displaced = fileops::with_suffix(destination, DISPLACED_SUFFIX);
    fileops::move_replace(destination, &displaced)?;
    fileops::copy(source, destination)?;
    info!(
        "installed {} (previous copy moved to {})",
        destination.display(),
        displaced.display()
    );
    Ok(InstallOutcome::Displaced)
}

/// Best-effort removal; never fatal.
pub fn remove(destination: &Path) {
    if destination.exists() && fileops::remove(destination) {
        info!("removed {}", destination.display());
    }
}

/// Rename the installed side file to its `.disabled` sibling.
pub fn disable(destination: &Path) -> Result<()> {
    if !destination.exists() {
        return Err(PatchError::SideFileMissing {
            path: destination.to_path_buf(),
        });
    }
    fileops::move_replace(destination, &disabled_path(destination))?;
    info!("disabled {}", destination.display());
    Ok(())
}

/// Bring a `.disabled` side file back under its canonical name.
pub fn enable(destination: &Path) -> Result<()> {
    let disabled = disabled_path(destination);
    if !disabled.exists() {
        return Err(PatchError::SideFileMissing { path: disabled });
    }
    fileops::move_replace(&disabled, destination)?;
    info!("enabled {}", destination.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_is_sibling_of_executable() {
        assert_eq!(
            destination_for(Path::new("/games/GW2/GW2.Main_Win64_Retail.exe")),
            PathBuf::from("/games/GW2/dinput8.dll")
        );
    }

    #[test]
    fn test_install_copies_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("helper.dll");
        let dest = dir.path().join("game").join(SIDE_FILE_NAME);
        std::fs::create_dir(dir.path().join("game")).unwrap();
        std::fs::write(&source, b"library").unwrap();

        let outcome = install(&source, &dest).unwrap();
        assert_eq!(outcome, InstallOutcome::Copied);
        assert!(outcome.changed_anything());
        assert_eq!(std::fs::read(&dest).unwrap(), b"library");
    }

    #[test]
    fn test_install_same_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join(SIDE_FILE_NAME);
        std::fs::write(&dest, b"SENTINEL").unwrap();

        let outcome = install(&dest, &dest).unwrap();
        assert_eq!(outcome, InstallOutcome::AlreadyInPlace);
        assert!(!outcome.changed_anything());
        assert_eq!(std::fs::read(&dest).unwrap(), b"SENTINEL");
    }

    #[test]
    fn test_install_displaces_unwritable_destination() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("helper.dll");
        let dest = dir.path().join(SIDE_FILE_NAME);
        std::fs::write(&source, b"library").unwrap();
        // Cannot be overwritten by a copy, but can still be renamed.
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("marker"), b"in use").unwrap();

        let outcome = install(&source, &dest).unwrap();
        assert_eq!(outcome, InstallOutcome::Displaced);
        assert!(outcome.changed_anything());
        assert_eq!(std::fs::read(&dest).unwrap(), b"library");
        let displaced = dir.path().join("dinput8.dll.old");
        assert_eq!(std::fs::read(displaced.join("marker")).unwrap(), b"in use");
    }

    #[test]
    fn test_install_missing_source_fails_without_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join(SIDE_FILE_NAME);
        let err = install(&dir.path().join("helper.dll"), &dest).unwrap_err();
        assert!(matches!(err, PatchError::Copy { .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn test_disable_enable_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join(SIDE_FILE_NAME);
        assert_eq!(state(&dest), SideFileState::Missing);
        assert!(matches!(enable(&dest), Err(PatchError::SideFileMissing { .. })));

        std::fs::write(&dest, b"library").unwrap();
        assert_eq!(state(&dest), SideFileState::Installed);

        disable(&dest).unwrap();
        assert_eq!(state(&dest), SideFileState::Disabled);
        assert!(disabled_path(&dest).exists());

        enable(&dest).unwrap();
        assert_eq!(state(&dest), SideFileState::Installed);
        assert!(!disabled_path(&dest).exists());
    }

    #[test]
    fn test_remove_is_quiet_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join(SIDE_FILE_NAME);
        remove(&dest);
        std::fs::write(&dest, b"library").unwrap();
        remove(&dest);
        assert!(!dest.exists());
    }
}
