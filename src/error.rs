use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::title::Title;

/// Outcome of a failed delta application, as reported by xdelta3.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("xdelta3 failed: {message}")]
pub struct Diagnostic {
    /// Result code returned by the tool (non-zero).
    pub code: i32,
    /// The tool's own message stream, or a synthesized one when it was silent.
    pub message: String,
}

impl Diagnostic {
    /// Build a diagnostic from a tool result code and its captured messages.
    pub fn from_tool(code: i32, messages: &str) -> Self {
        let messages = messages.trim();
        let message = if messages.is_empty() {
            format!("Unknown error (code: {code})")
        } else {
            messages.to_string()
        };
        Self { code, message }
    }
}

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("{what} not found: {}", path.display())]
    MissingInput { what: &'static str, path: PathBuf },

    #[error("failed to copy {} to {}: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to move {} to {}: {source}", from.display(), to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Delta(#[from] Diagnostic),

    #[error("backup not found: {}", path.display())]
    NoBackup { path: PathBuf },

    #[error("{title} has no executable delta to apply or restore")]
    NoExecutableDelta { title: Title },

    #[error("no installed or disabled side file at {}", path.display())]
    SideFileMissing { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, PatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_uses_tool_messages() {
        let diag = Diagnostic::from_tool(1, "xdelta3: target window checksum mismatch\n");
        assert_eq!(diag.code, 1);
        assert_eq!(
            diag.to_string(),
            "xdelta3 failed: xdelta3: target window checksum mismatch"
        );
    }

    #[test]
    fn test_diagnostic_synthesizes_message_when_silent() {
        let diag = Diagnostic::from_tool(-17712, "  ");
        assert_eq!(
            diag.to_string(),
            "xdelta3 failed: Unknown error (code: -17712)"
        );
    }

    #[test]
    fn test_missing_input_message_names_path() {
        let err = PatchError::MissingInput {
            what: "Patch file",
            path: PathBuf::from("patches/gw2/x.xdelta"),
        };
        assert_eq!(err.to_string(), "Patch file not found: patches/gw2/x.xdelta");
    }
}
