//! Per-title file layouts.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::fileops;

/// Extension of every delta file, appended to the patched file's full name.
pub const DELTA_EXTENSION: &str = "xdelta";

const EA_ANTI_CHEAT: &str = "EAAntiCheat.GameServiceLauncher.exe";
const INSTALL_SCRIPT: &str = "installScript.vdf";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Title {
    /// Garden Warfare
    #[default]
    Gw1,
    /// Garden Warfare 2
    Gw2,
    /// Battle for Neighborville
    Bfn,
}

impl fmt::Display for Title {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gw1 => "GW1",
            Self::Gw2 => "GW2",
            Self::Bfn => "BFN",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaLayout {
    /// Nothing to patch; only the side file is managed.
    None,
    /// The delta location is the executable's delta file itself.
    SingleFile,
    /// The delta location is a directory mirroring the install layout.
    Directory,
}

#[derive(Debug)]
pub struct TitleSpec {
    pub title: Title,
    /// File name of the main executable.
    pub executable: &'static str,
    pub delta_layout: DeltaLayout,
    /// Optional patchable files, relative to the executable's directory.
    pub auxiliary_files: &'static [&'static str],
    /// Files renamed out of the way while patched, in the executable's directory.
    pub interfering_files: &'static [&'static str],
}

static GW1: TitleSpec = TitleSpec {
    title: Title::Gw1,
    executable: "PVZ.Main_Win64_Retail.exe",
    delta_layout: DeltaLayout::None,
    auxiliary_files: &[],
    interfering_files: &[],
};

static GW2: TitleSpec = TitleSpec {
    title: Title::Gw2,
    executable: "GW2.Main_Win64_Retail.exe",
    delta_layout: DeltaLayout::SingleFile,
    auxiliary_files: &[],
    interfering_files: &[EA_ANTI_CHEAT, INSTALL_SCRIPT],
};

static BFN: TitleSpec = TitleSpec {
    title: Title::Bfn,
    executable: "PVZBattleforNeighborville.exe",
    delta_layout: DeltaLayout::Directory,
    auxiliary_files: &[
        "Core/Activation.dll",
        "Core/Activation64.dll",
        "__Installer/Cleanup.dat",
        "__Installer/Cleanup.exe",
        "__Installer/Touchup.dat",
        "__Installer/Touchup.exe",
        "__Installer/installerdata.xml",
    ],
    interfering_files: &[EA_ANTI_CHEAT, INSTALL_SCRIPT],
};

impl Title {
    pub fn spec(self) -> &'static TitleSpec {
        match self {
            Self::Gw1 => &GW1,
            Self::Gw2 => &GW2,
            Self::Bfn => &BFN,
        }
    }

    /// Key used for the per-title config section and the `patches/<key>` directory.
    pub fn key(self) -> &'static str {
        match self {
            Self::Gw1 => "gw1",
            Self::Gw2 => "gw2",
            Self::Bfn => "bfn",
        }
    }
}

/// `<root>/<relative>.xdelta`
fn delta_under(root: &Path, relative: &Path) -> PathBuf {
    fileops::with_suffix(&root.join(relative), &format!(".{DELTA_EXTENSION}"))
}

impl TitleSpec {
    pub fn has_executable_delta(&self) -> bool {
        self.delta_layout != DeltaLayout::None
    }

    /// Where the executable's delta lives, given the caller-supplied delta location.
    pub fn executable_delta(&self, delta_location: &Path) -> Option<PathBuf> {
        match self.delta_layout {
            DeltaLayout::None => None,
            DeltaLayout::SingleFile => Some(delta_location.to_path_buf()),
            DeltaLayout::Directory => Some(delta_under(delta_location, Path::new(self.executable))),
        }
    }

    /// `(file on disk, expected delta)` pairs for the auxiliary files.
    /// Empty unless the delta location is a directory root.
    pub fn auxiliary_pairs(&self, game_dir: &Path, delta_location: &Path) -> Vec<(PathBuf, PathBuf)> {
        if self.delta_layout != DeltaLayout::Directory {
            return Vec::new();
        }
        self.auxiliary_files
            .iter()
            .map(|rel| (game_dir.join(rel), delta_under(delta_location, Path::new(rel))))
            .collect()
    }

    pub fn auxiliary_paths(&self, game_dir: &Path) -> Vec<PathBuf> {
        self.auxiliary_files.iter().map(|rel| game_dir.join(rel)).collect()
    }

    pub fn interfering_paths(&self, game_dir: &Path) -> Vec<PathBuf> {
        self.interfering_files.iter().map(|name| game_dir.join(name)).collect()
    }
}
