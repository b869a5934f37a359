//! Transfer queue for Trove.
//!
//! Two independent FIFO queues, each drained by its own persistent worker:
//! the *large* queue moves binary payloads to and from disk, the *small*
//! queue carries JSON request/response bodies. Every transfer is attempted
//! a bounded number of times, and large downloads are deduplicated by URL so
//! concurrent requests for the same payload share one network transfer.

pub mod config;
pub mod decode;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod memory;
pub mod queue;
pub mod retry;
pub mod transport;

pub use config::{TransferConfig, MAX_RETRY_COUNT};
pub use decode::DecodePool;
pub use endpoint::Endpoints;
pub use error::{TransferError, TransferResult};
pub use http::HttpTransport;
pub use memory::{MemoryTransport, SentRequest};
pub use queue::{TransferQueue, TransferSnapshot};
pub use transport::{FileUpload, SendMethod, Transport};
