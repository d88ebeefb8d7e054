//! tokbuk Core - Token bucket admission control
//!
//! Decides, per client key, whether a unit of work may proceed based on a
//! refillable token budget:
//! - [`TokenBucket`] - refillable token count for one client
//! - [`BucketRegistry`] - lazily created bucket per client key
//! - [`Clock`] - time source capability, real or manual
//!
//! Everything here is synchronous and performs no I/O. Transport adapters
//! live in `tokbuk-http`.

pub mod bucket;
pub mod clock;
pub mod error;
pub mod registry;

pub use bucket::TokenBucket;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{validate_limits, LimiterError};
pub use registry::BucketRegistry;
