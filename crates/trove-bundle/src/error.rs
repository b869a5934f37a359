use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BundleError {
    #[error("invalid bundle magic: expected TRBN, got {actual}")]
    InvalidMagic { actual: String },

    #[error("unsupported bundle version: {0}")]
    UnsupportedVersion(u32),

    #[error("malformed bundle: {0}")]
    Malformed(String),

    #[error("CRC32 mismatch for entry {name}")]
    CrcMismatch { name: String },

    #[error("bundle has no entries")]
    Empty,

    #[error("asset not found in bundle: {0}")]
    AssetNotFound(String),

    #[error("compression failed: {0}")]
    Compression(String),

    #[error("corrupt bundle {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("bundle cache was reset")]
    Reset,

    #[error("bundle load cancelled")]
    Cancelled,

    #[error("bundle loader closed")]
    LoaderClosed,
}

impl BundleError {
    /// Whether the file on disk is unusable and should be discarded.
    pub fn is_corrupt_file(&self) -> bool {
        matches!(
            self,
            BundleError::InvalidMagic { .. }
                | BundleError::UnsupportedVersion(_)
                | BundleError::Malformed(_)
                | BundleError::CrcMismatch { .. }
                | BundleError::Empty
                | BundleError::Compression(_)
                | BundleError::Io(_)
        )
    }
}

impl From<std::io::Error> for BundleError {
    fn from(e: std::io::Error) -> Self {
        BundleError::Io(e.to_string())
    }
}

pub type BundleResult<T> = Result<T, BundleError>;
