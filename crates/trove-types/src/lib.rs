//! Foundation types for Trove.
//!
//! This crate provides the content model shared by every other Trove crate:
//! the identifiers, the closed set of content entry variants, and the layout
//! of the local bundle cache.
//!
//! # Key Types
//!
//! - [`ContentGuid`]: Opaque identifier for a content entry or binary payload
//! - [`Platform`]: Target platform a bundle was built for
//! - [`ContentEntry`]: Polymorphic content entry, tagged by [`EntryKind`]
//! - [`TemplateDataEntry`]: Composable template with a derived dependency list
//! - [`BundleLayout`]: Where platform bundles live on disk

pub mod entry;
pub mod error;
pub mod guid;
pub mod layout;
pub mod platform;
pub mod template;

pub use entry::{
    AssetData, ConfiguredItemEntry, ContentEntry, ContentMeta, EntryKind, EnvironmentDataEntry,
    LocationDataEntry, MediaEntry, MediaKind, SceneGraphEntry,
};
pub use error::TypeError;
pub use guid::ContentGuid;
pub use layout::{BundleLayout, DEFAULT_BUNDLE_EXTENSION};
pub use platform::Platform;
pub use template::{ModuleData, TemplateDataEntry};
