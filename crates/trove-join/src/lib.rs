//! Join primitives for Trove.
//!
//! Every multi-step fan-out in the pipeline (per-item content fetches, hash
//! checks, downloads) fans back in through these primitives:
//!
//! - [`CountingBarrier`]: counts down N completions, then fires one
//!   continuation exactly once
//! - [`SingleFlight`]: the first caller runs the work, concurrent callers
//!   share its result, later callers get the cached result
//! - [`FlightGroup`]: keyed single-flight for in-flight work only; nothing
//!   is cached once the leader finishes

pub mod barrier;
pub mod error;
pub mod flight;

pub use barrier::{BarrierSignal, BarrierTicket, CountingBarrier};
pub use error::{BarrierError, BarrierResult};
pub use flight::{FlightGroup, SingleFlight};
