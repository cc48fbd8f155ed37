//! Patch and restore orchestration for installed game executables.
//!
//! Deltas are decoded by xdelta3. Backups live beside each modified file as
//! `<file>.bak` and are the only record of patched state.

pub mod backup;
pub mod config;
pub mod delta;
pub mod error;
pub mod fileops;
pub mod interference;
pub mod orchestrator;
pub mod side_file;
pub mod title;
pub mod util;

pub use error::{Diagnostic, PatchError};
pub use orchestrator::{ApplySummary, PatchOrchestrator, PatchStatus, RestoreSummary};
pub use title::Title;
