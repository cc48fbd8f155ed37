//! Delta application: the xdelta3 decoder treated as a black box.
//!
//! Every engine takes a `(reference, delta, output)` triple and either leaves the
//! reconstructed bytes in `output` or returns a [`Diagnostic`]. After a failure the
//! content of `output` is unspecified; callers discard it.

use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;

use crate::error::Diagnostic;
use crate::util;

/// Flags passed to xdelta3: decode, force-overwrite output, next argument is the source.
pub const XDELTA_DECODE_ARGS: [&str; 3] = ["-d", "-f", "-s"];

/// Result code reported when no tool result code is available.
const NO_RESULT_CODE: i32 = -1;

// VCDIFF (RFC 3284) header indicator bits.
const VCDIFF_MAGIC: [u8; 4] = [0xD6, 0xC3, 0xC4, 0x00];
const VCD_SECONDARY: u8 = 1 << 0;
const VCD_CODETABLE: u8 = 1 << 1;
const VCD_APPHEADER: u8 = 1 << 2;
const VCD_SOURCE: u8 = 1 << 0;
const VCD_TARGET: u8 = 1 << 1;

/// Longest VCDIFF varint for a 64-bit value.
const MAX_VARINT_LEN: usize = 10;

pub trait DeltaEngine {
    fn apply(&self, reference: &Path, delta: &Path, output: &Path) -> Result<(), Diagnostic>;
}

impl<E: DeltaEngine + ?Sized> DeltaEngine for Box<E> {
    fn apply(&self, reference: &Path, delta: &Path, output: &Path) -> Result<(), Diagnostic> {
        (**self).apply(reference, delta, output)
    }
}

/// In-process decoding through the xdelta3 library.
#[derive(Debug, Default, Clone, Copy)]
pub struct Xdelta3;

impl DeltaEngine for Xdelta3 {
    fn apply(&self, reference: &Path, delta: &Path, output: &Path) -> Result<(), Diagnostic> {
        let io_failure = |what: &str, path: &Path, e: std::io::Error| {
            Diagnostic::from_tool(
                NO_RESULT_CODE,
                &format!("cannot {what} {}: {e}", path.display()),
            )
        };

        let source = util::read_mapped(reference).map_err(|e| io_failure("read", reference, e))?;
        let patch = util::read_mapped(delta).map_err(|e| io_failure("read", delta, e))?;

        let decoded = decode_in_memory(&patch, &source)?;

        std::fs::write(output, &decoded).map_err(|e| io_failure("write", output, e))?;
        debug!(
            "decoded {} bytes from {} into {}",
            decoded.len(),
            delta.display(),
            output.display()
        );
        Ok(())
    }
}

/// Decode with the xdelta3 library, whose output buffer is fixed at
/// `2 * (delta + source)` bytes. When the delta declares a larger target the source
/// is padded with zeros past its end: the buffer grows, and nothing the delta
/// references moves.
fn decode_in_memory(patch: &[u8], source: &[u8]) -> Result<Vec<u8>, Diagnostic> {
    let needed = declared_target_len(patch).unwrap_or(0);
    let patch_len = patch.len() as u64;
    let padded_len = needed
        .div_ceil(2)
        .saturating_sub(patch_len)
        .max(source.len() as u64);

    // The library takes 32-bit lengths.
    if (patch_len + padded_len).saturating_mul(2) > u64::from(u32::MAX) {
        return Err(Diagnostic::from_tool(
            NO_RESULT_CODE,
            "input too large for the built-in decoder; configure an external xdelta3 program",
        ));
    }

    let decoded = if padded_len > source.len() as u64 {
        debug!("padding source to {padded_len} bytes for a {needed} byte target");
        let mut padded = Vec::with_capacity(padded_len as usize);
        padded.extend_from_slice(source);
        padded.resize(padded_len as usize, 0);
        xdelta3::decode(patch, &padded)
    } else {
        xdelta3::decode(patch, source)
    };
    decoded.ok_or_else(|| Diagnostic::from_tool(NO_RESULT_CODE, ""))
}

struct HeaderReader<'a> {
    data: &'a [u8],
}

impl HeaderReader<'_> {
    fn byte(&mut self) -> Option<u8> {
        let (&b, rest) = self.data.split_first()?;
        self.data = rest;
        Some(b)
    }

    fn skip(&mut self, n: u64) -> Option<()> {
        self.data = self.data.get(usize::try_from(n).ok()?..)?;
        Some(())
    }

    fn varint(&mut self) -> Option<u64> {
        let mut value = 0u64;
        for _ in 0..MAX_VARINT_LEN {
            let b = self.byte()?;
            value = value.checked_mul(128)? | u64::from(b & 0x7F);
            if b & 0x80 == 0 {
                return Some(value);
            }
        }
        None
    }
}

/// Sum of the target window lengths declared in a VCDIFF stream.
///
/// `None` when the headers cannot be walked; the decoder reports that stream itself.
fn declared_target_len(delta: &[u8]) -> Option<u64> {
    let rest = delta.strip_prefix(&VCDIFF_MAGIC[..])?;
    let mut r = HeaderReader { data: rest };

    let hdr_ind = r.byte()?;
    if hdr_ind & VCD_CODETABLE != 0 {
        return None;
    }
    if hdr_ind & VCD_SECONDARY != 0 {
        r.byte()?;
    }
    if hdr_ind & VCD_APPHEADER != 0 {
        let len = r.varint()?;
        r.skip(len)?;
    }

    let mut total = 0u64;
    while !r.data.is_empty() {
        let win_ind = r.byte()?;
        if win_ind & (VCD_SOURCE | VCD_TARGET) != 0 {
            r.varint()?; // copy window length
            r.varint()?; // copy window offset
        }
        // The encoding length counts everything after itself, target length first.
        let enc_len = r.varint()?;
        let encoding = r.data;
        total = total.checked_add(r.varint()?)?;
        r.data = encoding;
        r.skip(enc_len)?;
    }
    Some(total)
}

/// Decoding by spawning an external xdelta3 executable.
#[derive(Debug, Clone)]
pub struct XdeltaCommand {
    pub program: PathBuf,
}

impl XdeltaCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl DeltaEngine for XdeltaCommand {
    fn apply(&self, reference: &Path, delta: &Path, output: &Path) -> Result<(), Diagnostic> {
        let result = Command::new(&self.program)
            .args(XDELTA_DECODE_ARGS)
            .arg(reference)
            .arg(delta)
            .arg(output)
            .output()
            .map_err(|e| {
                Diagnostic::from_tool(
                    NO_RESULT_CODE,
                    &format!("cannot run {}: {e}", self.program.display()),
                )
            })?;

        if result.status.success() {
            return Ok(());
        }
        // Killed by a signal: no exit code.
        let code = result.status.code().unwrap_or(NO_RESULT_CODE);
        Err(Diagnostic::from_tool(
            code,
            &String::from_utf8_lossy(&result.stderr),
        ))
    }
}

/// Apply `delta` to `reference`, writing the reconstructed file to `output`.
///
/// Reference and delta must already exist; this does not re-validate them.
/// No retries: a failure is deterministic for identical inputs.
pub fn apply_delta<E: DeltaEngine + ?Sized>(
    engine: &E,
    reference: &Path,
    delta: &Path,
    output: &Path,
) -> Result<(), Diagnostic> {
    debug!(
        "applying {} to {} -> {}",
        delta.display(),
        reference.display(),
        output.display()
    );
    engine.apply(reference, delta, output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pair() -> (Vec<u8>, Vec<u8>) {
        let old: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let mut new = old.clone();
        new[100..164].copy_from_slice(&[0xBB; 64]);
        new.extend_from_slice(b"trailing bytes");
        (old, new)
    }

    #[test]
    fn test_in_process_decode() {
        let dir = tempfile::tempdir().unwrap();
        let (old, new) = sample_pair();
        let delta = xdelta3::encode(&new, &old).unwrap();

        let reference = dir.path().join("game.exe");
        let delta_path = dir.path().join("game.exe.xdelta");
        let output = dir.path().join("game.exe.patched");
        std::fs::write(&reference, &old).unwrap();
        std::fs::write(&delta_path, &delta).unwrap();

        apply_delta(&Xdelta3, &reference, &delta_path, &output).unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), new);
    }

    #[test]
    fn test_in_process_overwrites_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let (old, new) = sample_pair();
        let delta = xdelta3::encode(&new, &old).unwrap();

        let reference = dir.path().join("game.exe");
        let delta_path = dir.path().join("game.exe.xdelta");
        let output = dir.path().join("game.exe.patched");
        std::fs::write(&reference, &old).unwrap();
        std::fs::write(&delta_path, &delta).unwrap();
        std::fs::write(&output, b"stale partial output from an earlier run").unwrap();

        apply_delta(&Xdelta3, &reference, &delta_path, &output).unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), new);
    }

    #[test]
    fn test_in_process_target_larger_than_library_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let old: Vec<u8> = (0..16 * 1024u32).map(|i| (i % 251) as u8).collect();
        let mut new = old.clone();
        new.resize(old.len() + 1024 * 1024, 0);
        let delta = xdelta3::encode(&new, &old).unwrap();
        assert!(new.len() > 2 * (old.len() + delta.len()));
        assert_eq!(declared_target_len(&delta), Some(new.len() as u64));

        let reference = dir.path().join("game.exe");
        let delta_path = dir.path().join("game.exe.xdelta");
        let output = dir.path().join("game.exe.patched");
        std::fs::write(&reference, &old).unwrap();
        std::fs::write(&delta_path, &delta).unwrap();

        apply_delta(&Xdelta3, &reference, &delta_path, &output).unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), new);
    }

    #[test]
    fn test_declared_target_len_rejects_non_vcdiff() {
        assert_eq!(declared_target_len(b"definitely not a VCDIFF stream"), None);
        assert_eq!(declared_target_len(&VCDIFF_MAGIC), None);
        // Header only, no windows.
        assert_eq!(declared_target_len(&[0xD6, 0xC3, 0xC4, 0x00, 0x00]), Some(0));
        // Window claims more encoded bytes than the stream holds.
        assert_eq!(
            declared_target_len(&[0xD6, 0xC3, 0xC4, 0x00, 0x00, 0x00, 0x7F, 0x05]),
            None
        );
    }

    #[test]
    fn test_in_process_garbage_delta_fails() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("game.exe");
        let delta_path = dir.path().join("game.exe.xdelta");
        let output = dir.path().join("game.exe.patched");
        std::fs::write(&reference, b"reference bytes").unwrap();
        std::fs::write(&delta_path, b"definitely not a VCDIFF stream").unwrap();

        let err = apply_delta(&Xdelta3, &reference, &delta_path, &output).unwrap_err();
        assert_eq!(err.code, -1);
        assert!(err.to_string().starts_with("xdelta3 failed: "));
    }

    #[test]
    fn test_command_spawn_failure_is_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let engine = XdeltaCommand::new(dir.path().join("no-such-xdelta3"));
        let err = engine
            .apply(
                &dir.path().join("a"),
                &dir.path().join("b"),
                &dir.path().join("c"),
            )
            .unwrap_err();
        assert!(err.message.contains("cannot run"));
    }

    #[cfg(unix)]
    fn fake_xdelta(dir: &Path, script: &str) -> XdeltaCommand {
        use std::os::unix::fs::PermissionsExt;

        let program = dir.join("xdelta3");
        std::fs::write(&program, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
        XdeltaCommand::new(program)
    }

    #[cfg(unix)]
    #[test]
    fn test_command_reports_stderr_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_xdelta(dir.path(), "echo 'target window checksum mismatch' >&2\nexit 2");
        let err = engine
            .apply(
                &dir.path().join("a"),
                &dir.path().join("b"),
                &dir.path().join("c"),
            )
            .unwrap_err();
        assert_eq!(err.code, 2);
        assert_eq!(
            err.to_string(),
            "xdelta3 failed: target window checksum mismatch"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_command_silent_failure_reports_code() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_xdelta(dir.path(), "exit 2");
        let err = engine
            .apply(
                &dir.path().join("a"),
                &dir.path().join("b"),
                &dir.path().join("c"),
            )
            .unwrap_err();
        assert_eq!(err.code, 2);
        assert_eq!(err.to_string(), "xdelta3 failed: Unknown error (code: 2)");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_passes_decode_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_xdelta(dir.path(), r#"[ "$1 $2 $3" = "-d -f -s" ] && cp "$5" "$6""#);
        let delta = dir.path().join("b");
        let output = dir.path().join("c");
        std::fs::write(&delta, b"decoded").unwrap();

        engine.apply(&dir.path().join("a"), &delta, &output).unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"decoded");
    }
}
