//! High-level SDK for Trove.
//!
//! [`Trove`] is the single entry point for applications: it owns the
//! transfer queue, content cache, hash verifier, bundle cache and dependency
//! resolver, and exposes environment preparation and asset loading.

pub mod config;
pub mod context;
pub mod error;
pub mod publish;

pub use config::TroveConfig;
pub use context::Trove;
pub use error::{SdkError, SdkResult};
pub use publish::{BundleUpload, PublishedBundle};

// Re-export key types
pub use trove_bundle::{AssetHandle, BundleWriter, LoadedAsset};
pub use trove_resolve::ResolveReport;
pub use trove_transfer::{Transport, TransferConfig};
pub use trove_types::{ContentEntry, ContentGuid, EntryKind, Platform};
pub use tokio_util::sync::CancellationToken;
