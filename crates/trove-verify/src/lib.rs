//! Hash verification of locally cached bundles.
//!
//! Requests go into one shared queue drained by a background OS thread. At
//! most one drain thread exists at a time; results travel back to the
//! awaiting task over a oneshot channel, never through a callback on the
//! worker thread.

pub mod error;
pub mod verifier;

pub use error::{VerifyError, VerifyResult};
pub use verifier::{HashVerifier, VerifyOutcome};
