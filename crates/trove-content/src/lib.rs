//! Content entry cache.
//!
//! Maps GUIDs to decoded [`trove_types::ContentEntry`] values. Misses are
//! fetched through the small transfer queue; concurrent misses for one GUID
//! share a single request. Entries are never evicted.

pub mod cache;
pub mod error;

pub use cache::ContentCache;
pub use error::{ContentError, ContentResult};
