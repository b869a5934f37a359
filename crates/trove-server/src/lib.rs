//! Development origin server for Trove.
//!
//! Serves content entries, per-platform asset maps and bundle files from a
//! directory store, and accepts bundle uploads from producer tooling.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;
pub mod store;

pub use auth::{Action, AllowAllAuth, AuthProvider, Credentials, Identity, TokenAuth};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use router::AppState;
pub use server::TroveServer;
pub use store::DirStore;
