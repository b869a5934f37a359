//! Content hashing for Trove.
//!
//! Bundle files are identified on the server by a hex digest of their bytes.
//! This crate computes the same digest locally so a cached bundle can be
//! checked before it is trusted. All hashing wraps BLAKE3; no custom
//! cryptography.

pub mod hasher;

pub use hasher::{ContentHasher, HasherError};
