use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const READ_CHUNK: usize = 64 * 1024;

/// BLAKE3 content hasher producing lower-case hex digests.
///
/// The digest covers the raw bundle bytes only, with no domain tag, so it
/// matches what the publishing side computes over the same file.
pub struct ContentHasher;

impl ContentHasher {
    /// Hex digest of an in-memory buffer.
    pub fn hash_bytes(data: &[u8]) -> String {
        blake3::hash(data).to_hex().to_string()
    }

    /// Hex digest of everything readable from `reader`, streamed in chunks.
    pub fn hash_reader<R: Read>(mut reader: R) -> Result<String, HasherError> {
        let mut hasher = blake3::Hasher::new();
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HasherError::Io(e.to_string())),
            };
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Hex digest of a file on disk.
    pub fn hash_file(path: &Path) -> Result<String, HasherError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => HasherError::NotFound(path.display().to_string()),
            _ => HasherError::Io(e.to_string()),
        })?;
        Self::hash_reader(file)
    }

    /// Case-sensitive comparison of a file's digest with `expected`.
    pub fn verify_file(path: &Path, expected: &str) -> Result<bool, HasherError> {
        Ok(Self::hash_file(path)? == expected)
    }

    /// Raw 32-byte digest (for low-level use).
    pub fn raw_hash(data: &[u8]) -> [u8; 32] {
        *blake3::hash(data).as_bytes()
    }

    /// Encode a raw digest as hex.
    pub fn to_hex(raw: &[u8; 32]) -> String {
        hex::encode(raw)
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(String),
}
