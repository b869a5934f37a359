//! Platform bundles for Trove.
//!
//! # Architecture
//!
//! - **Bundle file**: `TRBN` magic, format version, a bincode manifest, then
//!   the payload region. Entries are optionally zstd-compressed and carry a
//!   CRC32 of their stored bytes.
//! - **BundleWriter**: builds bundle files.
//! - **BundleArchive**: validates a bundle and extracts named entries.
//! - **BundleCache**: loads bundles one at a time, caches the extracted
//!   asset by GUID and releases the container.

pub mod archive;
pub mod error;
pub mod format;
pub mod loader;
pub mod writer;

pub use archive::BundleArchive;
pub use error::{BundleError, BundleResult};
pub use format::ManifestEntry;
pub use loader::{AssetHandle, BundleCache, BundleSnapshot, LoadedAsset};
pub use writer::{BundleSummary, BundleWriter};
