//! Environment preparation for Trove.
//!
//! Resolution runs in three fan-out/fan-in phases, each joined by a
//! [`trove_join::CountingBarrier`]:
//!
//! 1. **Closure**: walk the environment's location scenes and scene-graph
//!    items, expanding templates, into a set of media entries deduplicated by
//!    payload identity.
//! 2. **Verify**: hash each required local bundle against the server hash for
//!    the running platform.
//! 3. **Download**: fetch only the bundles that are missing or stale.
//!
//! Missing entries, broken template cycles and failed downloads are reported
//! in the [`ResolveReport`] rather than aborting the run.

pub mod closure;
pub mod error;
pub mod report;
pub mod resolver;

pub use closure::DependencySet;
pub use error::{ResolveError, ResolveResult};
pub use report::{CycleEdge, FailedDownload, MissingEntry, ResolveReport};
pub use resolver::DependencyResolver;
