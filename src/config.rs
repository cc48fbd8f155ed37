//! Launcher configuration (`config.json`) and the launcher-relative resource layout.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::side_file::SIDE_FILE_NAME;
use crate::title::{DeltaLayout, Title, DELTA_EXTENSION};

pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub game_path: String,
    pub custom_args: String,
    /// Keys owned by the launcher (mod data selection), written back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GameConfig {
    pub fn game_path(&self) -> Option<PathBuf> {
        (!self.game_path.is_empty()).then(|| PathBuf::from(&self.game_path))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub game_selected: Title,
    pub gw1: GameConfig,
    pub gw2: GameConfig,
    pub bfn: GameConfig,
    /// External xdelta3 executable; the built-in decoder is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xdelta_program: Option<PathBuf>,
    /// Launcher settings this tool does not interpret (account, server, theme).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LauncherConfig {
    /// Load from `path`. A missing file is not an error and yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source: io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        let text = serde_json::to_string_pretty(self).map_err(|e| io_err(e.into()))?;
        std::fs::write(path, text).map_err(io_err)
    }

    pub fn game(&self, title: Title) -> &GameConfig {
        match title {
            Title::Gw1 => &self.gw1,
            Title::Gw2 => &self.gw2,
            Title::Bfn => &self.bfn,
        }
    }

    pub fn game_mut(&mut self, title: Title) -> &mut GameConfig {
        match title {
            Title::Gw1 => &mut self.gw1,
            Title::Gw2 => &mut self.gw2,
            Title::Bfn => &mut self.bfn,
        }
    }
}

/// Resources shipped beside the launcher: `dinput8.dll` and `patches/<title>/`.
#[derive(Debug, Clone)]
pub struct Resources {
    pub base_dir: PathBuf,
}

impl Resources {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn side_file_source(&self) -> PathBuf {
        self.base_dir.join(SIDE_FILE_NAME)
    }

    pub fn patches_dir(&self, title: Title) -> PathBuf {
        self.base_dir.join("patches").join(title.key())
    }

    /// Default delta location for `title`: the executable's delta file for
    /// single-file titles, the title's patch directory otherwise.
    pub fn delta_location(&self, title: Title) -> Option<PathBuf> {
        let spec = title.spec();
        match spec.delta_layout {
            DeltaLayout::None => None,
            DeltaLayout::SingleFile => Some(
                self.patches_dir(title)
                    .join(format!("{}.{DELTA_EXTENSION}", spec.executable)),
            ),
            DeltaLayout::Directory => Some(self.patches_dir(title)),
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE_NAME)
    }
}
