//! tokbuk HTTP - Request admission at the HTTP boundary
//!
//! Connects inbound hyper requests to the token buckets of `tokbuk-core`:
//!
//! - [`key`] - client key extraction (peer IP, header, static)
//! - [`policy`] - [`RateLimit`]: one `(capacity, rate)` policy over a shared registry
//! - [`middleware`] - [`RateLimited`]: hyper service wrapper answering `429`
//! - [`server`] - [`AdmissionServer`]: HTTP/1 server for one limited route
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tokbuk_core::BucketRegistry;
//! use tokbuk_http::{AdmissionServer, PeerIp, RateLimit};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let registry = Arc::new(BucketRegistry::new());
//! let policy = Arc::new(RateLimit::new(registry, 10, 5.0, PeerIp)?);
//! let server = AdmissionServer::new(policy, "127.0.0.1:8080", "/test")?;
//! server.run(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod key;
pub mod middleware;
pub mod policy;
pub mod server;

pub use key::{HeaderKey, KeyExtractor, PeerIp, RemoteAddr, RequestHead, StaticKey};
pub use middleware::{too_many_requests, RateLimited, REJECTION_BODY};
pub use policy::{Admission, RateLimit};
pub use server::{AdmissionServer, ADMITTED_BODY};
