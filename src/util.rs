use memmap2::Mmap;
use std::io;
use std::ops::Deref;
use std::path::Path;

/// Memory-map a file for read-only access.
///
/// # Safety
/// The mapping is read-only. Callers must not concurrently truncate or replace
/// the underlying file while the `Mmap` is live.
pub fn mmap_file(path: &Path) -> io::Result<Mmap> {
    let file = std::fs::File::open(path)?;
    // SAFETY: We only read from this mapping; the orchestrator is the sole writer of these paths.
    unsafe { Mmap::map(&file) }
}

/// Bytes of a file opened through [`read_mapped`].
pub enum FileBytes {
    Empty,
    Mapped(Mmap),
}

impl Deref for FileBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Empty => &[],
            Self::Mapped(map) => &map[..],
        }
    }
}

/// Open a whole file for reading, mapping it when non-empty.
/// Zero-length files cannot be mapped on every platform.
pub fn read_mapped(path: &Path) -> io::Result<FileBytes> {
    if std::fs::metadata(path)?.len() == 0 {
        return Ok(FileBytes::Empty);
    }
    mmap_file(path).map(FileBytes::Mapped)
}

/// Stream-hash a file using BLAKE3.
/// Uses a 256 KB BufReader to reduce syscall overhead vs the default 8 KB.
pub fn hash_file_streaming(path: &Path) -> io::Result<blake3::Hash> {
    let file = std::fs::File::open(path)?;
    let mut reader = io::BufReader::with_capacity(256 * 1024, file);
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hasher.finalize())
}

/// BLAKE3 digest of a file as lowercase hex, or `None` if it cannot be read.
pub fn file_digest(path: &Path) -> Option<String> {
    hash_file_streaming(path)
        .ok()
        .map(|hash| hash.to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_mapped_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, b"").unwrap();
        assert!(read_mapped(&path).unwrap().is_empty());
    }

    #[test]
    fn test_read_mapped_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"Hello, World!").unwrap();
        assert_eq!(&*read_mapped(&path).unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_file_digest_matches_blake3() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, vec![0xAA; 8192]).unwrap();
        let expected = blake3::hash(&vec![0xAA; 8192]).to_hex().to_string();
        assert_eq!(file_digest(&path), Some(expected));
        assert_eq!(file_digest(&dir.path().join("missing.bin")), None);
    }
}
