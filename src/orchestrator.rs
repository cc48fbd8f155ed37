//! Patch, restore and state query for one title.
//!
//! Only the primary executable is protected transactionally: every step up to and
//! including swapping the patched executable into place is rolled back on failure.
//! After that the run is committed, and auxiliary files and interfering files are
//! handled best-effort, logging failures instead of reporting them.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;

use crate::backup;
use crate::delta::{self, DeltaEngine, Xdelta3};
use crate::error::{PatchError, Result};
use crate::fileops;
use crate::interference;
use crate::side_file::{self, InstallOutcome, SideFileState};
use crate::title::{DeltaLayout, Title, TitleSpec};

#[derive(Debug)]
pub struct ApplySummary {
    pub side_file_installed: bool,
    pub auxiliary_patched: usize,
    pub auxiliary_skipped: usize,
    pub interfering_disabled: usize,
}

#[derive(Debug)]
pub struct RestoreSummary {
    pub auxiliary_restored: usize,
    pub interfering_enabled: usize,
}

#[derive(Debug, Serialize)]
pub struct PatchStatus {
    pub title: Title,
    pub target: PathBuf,
    pub patched: bool,
    pub side_file: SideFileState,
    pub executable_blake3: Option<String>,
    pub backup_blake3: Option<String>,
    /// Auxiliary files that currently have a backup.
    pub auxiliary_backups: Vec<PathBuf>,
    /// Interfering files currently renamed out of the way.
    pub disabled_files: Vec<PathBuf>,
    /// Interfering files currently active.
    pub interfering_files: Vec<PathBuf>,
}

/// Mutations made so far by one `apply` call, undone if the primary patch fails.
struct PatchRun {
    in_progress: PathBuf,
    backup: Option<PathBuf>,
    side_file: Option<PathBuf>,
}

impl PatchRun {
    fn new(target: &Path) -> Self {
        Self {
            in_progress: backup::in_progress_path(target),
            backup: None,
            side_file: None,
        }
    }

    /// Put the backup back over `target` after a failed swap may have written to it.
    fn reinstate(&self, target: &Path) {
        if let Some(backup) = &self.backup {
            reinstate(backup, target);
        }
    }

    fn rollback(self) {
        fileops::remove(&self.in_progress);
        if let Some(backup) = self.backup {
            fileops::remove(&backup);
        }
        if let Some(side_file) = self.side_file {
            side_file::remove(&side_file);
        }
    }
}

fn require(what: &'static str, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() || !path.exists() {
        return Err(PatchError::MissingInput {
            what,
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn reinstate(backup: &Path, target: &Path) {
    if let Err(e) = fileops::copy(backup, target) {
        warn!("could not reinstate {}: {e}", target.display());
    }
}

fn game_dir(target: &Path) -> &Path {
    target.parent().unwrap_or_else(|| Path::new(""))
}

pub struct PatchOrchestrator {
    spec: &'static TitleSpec,
    engine: Box<dyn DeltaEngine>,
}

impl PatchOrchestrator {
    /// Orchestrator decoding deltas in-process with xdelta3.
    pub fn new(title: Title) -> Self {
        Self::with_engine(title, Box::new(Xdelta3))
    }

    pub fn with_engine(title: Title, engine: Box<dyn DeltaEngine>) -> Self {
        Self {
            spec: title.spec(),
            engine,
        }
    }

    /// Patched means a backup of the executable exists and the side file is installed.
    /// A backup without the side file (interrupted run) is reported as not patched.
    pub fn is_patched(&self, target: &Path) -> bool {
        if target.as_os_str().is_empty() || !target.exists() {
            return false;
        }
        backup::has_backup(target) && side_file::destination_for(target).exists()
    }

    /// Patch the executable at `target` and install the side file next to it.
    ///
    /// `delta_location` is the executable's delta file for single-file titles, or the
    /// root of a directory mirroring the install layout for titles with auxiliary files.
    pub fn apply(
        &self,
        target: &Path,
        delta_location: &Path,
        side_file_source: &Path,
    ) -> Result<ApplySummary> {
        if !self.spec.has_executable_delta() {
            return Err(PatchError::NoExecutableDelta {
                title: self.spec.title,
            });
        }

        require("Game executable", target)?;
        match self.spec.delta_layout {
            DeltaLayout::Directory => require("Patches directory", delta_location)?,
            _ => require("Patch file", delta_location)?,
        }
        require("Side file source", side_file_source)?;
        let exe_delta = self
            .spec
            .executable_delta(delta_location)
            .ok_or(PatchError::NoExecutableDelta {
                title: self.spec.title,
            })?;
        require("Executable delta", &exe_delta)?;

        info!("patching {} ({})", target.display(), self.spec.title);
        let mut run = PatchRun::new(target);

        run.backup = Some(backup::create(target)?);

        let side_dest = side_file::destination_for(target);
        let side_file_installed = match side_file::install(side_file_source, &side_dest) {
            Ok(outcome) => outcome.changed_anything(),
            Err(e) => {
                run.rollback();
                return Err(e);
            }
        };
        if side_file_installed {
            run.side_file = Some(side_dest);
        }

        if let Err(diag) = delta::apply_delta(&*self.engine, target, &exe_delta, &run.in_progress) {
            run.rollback();
            return Err(diag.into());
        }
        if let Err(e) = fileops::move_replace(&run.in_progress, target) {
            run.reinstate(target);
            run.rollback();
            return Err(e);
        }
        info!("patched {}", target.display());

        let dir = game_dir(target);
        let mut summary = ApplySummary {
            side_file_installed,
            auxiliary_patched: 0,
            auxiliary_skipped: 0,
            interfering_disabled: 0,
        };

        for (file, delta) in self.spec.auxiliary_pairs(dir, delta_location) {
            if !file.exists() || !delta.exists() {
                debug!("skipping {}: file or delta not present", file.display());
                continue;
            }
            if self.patch_auxiliary(&file, &delta) {
                summary.auxiliary_patched += 1;
            } else {
                summary.auxiliary_skipped += 1;
            }
        }

        for path in self.spec.interfering_paths(dir) {
            match interference::disable(&path) {
                Ok(true) => summary.interfering_disabled += 1,
                Ok(false) => {}
                Err(e) => warn!("{e}"),
            }
        }

        Ok(summary)
    }

    /// Back up and patch one auxiliary file. Failures leave the file untouched and are logged.
    fn patch_auxiliary(&self, file: &Path, delta: &Path) -> bool {
        let backup = match backup::create(file) {
            Ok(backup) => backup,
            Err(e) => {
                warn!("skipping {}: {e}", file.display());
                return false;
            }
        };

        let in_progress = backup::in_progress_path(file);
        let result = delta::apply_delta(&*self.engine, file, delta, &in_progress)
            .map_err(PatchError::from)
            .and_then(|()| {
                fileops::move_replace(&in_progress, file)
                    .inspect_err(|_| reinstate(&backup, file))
            });

        match result {
            Ok(()) => {
                info!("patched {}", file.display());
                true
            }
            Err(e) => {
                warn!("skipping {}: {e}", file.display());
                fileops::remove(&in_progress);
                fileops::remove(&backup);
                false
            }
        }
    }

    /// Put the original executable back and undo everything `apply` did.
    pub fn restore(&self, target: &Path) -> Result<RestoreSummary> {
        if !self.spec.has_executable_delta() {
            return Err(PatchError::NoExecutableDelta {
                title: self.spec.title,
            });
        }
        if !backup::has_backup(target) {
            return Err(PatchError::NoBackup {
                path: backup::backup_path(target),
            });
        }

        info!("restoring {} ({})", target.display(), self.spec.title);
        backup::restore(target)?;
        side_file::remove(&side_file::destination_for(target));

        let dir = game_dir(target);
        let mut summary = RestoreSummary {
            auxiliary_restored: 0,
            interfering_enabled: 0,
        };

        for file in self.spec.auxiliary_paths(dir) {
            if !backup::has_backup(&file) {
                continue;
            }
            match backup::restore(&file) {
                Ok(()) => summary.auxiliary_restored += 1,
                Err(e) => warn!("could not restore {}: {e}", file.display()),
            }
        }

        for path in self.spec.interfering_paths(dir) {
            match interference::enable(&path) {
                Ok(true) => summary.interfering_enabled += 1,
                Ok(false) => {}
                Err(e) => warn!("{e}"),
            }
        }

        info!("restored {}", target.display());
        Ok(summary)
    }

    /// Apply a single delta outside the title flows.
    pub fn apply_raw(&self, reference: &Path, delta: &Path, output: &Path) -> Result<()> {
        apply_raw(&*self.engine, reference, delta, output)
    }

    pub fn status(&self, target: &Path) -> PatchStatus {
        let dir = game_dir(target);
        let backup = backup::backup_path(target);
        let (disabled_files, interfering_files) = self
            .spec
            .interfering_paths(dir)
            .into_iter()
            .fold((Vec::new(), Vec::new()), |(mut off, mut on), path| {
                let disabled = interference::disabled_path(&path);
                if disabled.exists() {
                    off.push(disabled);
                }
                if path.exists() {
                    on.push(path);
                }
                (off, on)
            });

        PatchStatus {
            title: self.spec.title,
            target: target.to_path_buf(),
            patched: self.is_patched(target),
            side_file: self.side_file_state(target),
            executable_blake3: crate::util::file_digest(target),
            backup_blake3: crate::util::file_digest(&backup),
            auxiliary_backups: self
                .spec
                .auxiliary_paths(dir)
                .into_iter()
                .filter(|file| backup::has_backup(file))
                .collect(),
            disabled_files,
            interfering_files,
        }
    }

    pub fn side_file_state(&self, target: &Path) -> SideFileState {
        side_file::state(&side_file::destination_for(target))
    }

    pub fn install_side_file(&self, target: &Path, source: &Path) -> Result<InstallOutcome> {
        require("Game executable", target)?;
        require("Side file source", source)?;
        side_file::install(source, &side_file::destination_for(target))
    }

    pub fn set_side_file_enabled(&self, target: &Path, enabled: bool) -> Result<()> {
        require("Game executable", target)?;
        let dest = side_file::destination_for(target);
        if enabled {
            side_file::enable(&dest)
        } else {
            side_file::disable(&dest)
        }
    }

    pub fn remove_side_file(&self, target: &Path) {
        side_file::remove(&side_file::destination_for(target));
    }
}

/// Apply `delta` to `reference` into `output`, after checking both inputs exist.
pub fn apply_raw<E: DeltaEngine + ?Sized>(
    engine: &E,
    reference: &Path,
    delta: &Path,
    output: &Path,
) -> Result<()> {
    require("Original file", reference)?;
    require("Patch file", delta)?;
    delta::apply_delta(engine, reference, delta, output)?;
    Ok(())
}
