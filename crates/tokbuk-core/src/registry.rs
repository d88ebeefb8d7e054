//! Per-client bucket registry
//!
//! Maps opaque client keys (an IP address, an API key, a user id) to their
//! own [`TokenBucket`]. Buckets are created on first sight of a key and live
//! as long as the registry. The first `(capacity, rate)` seen for a key is
//! the one that sticks.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::debug;

use crate::{
    bucket::TokenBucket,
    clock::{Clock, SystemClock},
    error::LimiterError,
};

/// Thread-safe map from client key to token bucket.
///
/// The map lock is held only for the lookup-or-insert; admission checks run
/// on the returned `Arc<TokenBucket>` after it has been released, so clients
/// with different keys never contend on bucket state.
pub struct BucketRegistry {
    buckets: Mutex<HashMap<String, Arc<TokenBucket>>>,
    /// Clock handed to every bucket this registry creates
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for BucketRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketRegistry")
            .field("buckets", &self.len())
            .field("clock", &self.clock)
            .finish()
    }
}

impl BucketRegistry {
    /// Creates an empty registry whose buckets use the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty registry whose buckets read time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Returns the bucket for `key`, creating a full one if the key is new.
    ///
    /// For a key that already has a bucket, `capacity` and `rate` are
    /// ignored and the original bucket is returned unchanged. Limits cannot
    /// be changed at runtime for an existing key.
    ///
    /// # Errors
    /// Returns [`LimiterError::InvalidConfiguration`] when the key is new and
    /// the parameters are invalid. Nothing is inserted in that case.
    pub fn get_or_create(
        &self,
        key: &str,
        capacity: u64,
        rate: f64,
    ) -> Result<Arc<TokenBucket>, LimiterError> {
        self.get_or_create_counted(key, capacity, rate)
            .map(|(bucket, _)| bucket)
    }

    /// Same as [`get_or_create`](Self::get_or_create), but also reports the
    /// registry size when this call inserted the bucket.
    ///
    /// The second element is `None` when the key already had a bucket.
    pub fn get_or_create_counted(
        &self,
        key: &str,
        capacity: u64,
        rate: f64,
    ) -> Result<(Arc<TokenBucket>, Option<usize>), LimiterError> {
        let mut buckets = self.lock();
        if let Some(bucket) = buckets.get(key) {
            return Ok((Arc::clone(bucket), None));
        }

        let bucket = Arc::new(TokenBucket::with_clock_source(
            capacity,
            rate,
            Arc::clone(&self.clock),
        )?);
        buckets.insert(key.to_string(), Arc::clone(&bucket));
        let len = buckets.len();
        debug!(
            key,
            capacity,
            rate,
            buckets = len,
            "Created token bucket for client"
        );
        Ok((bucket, Some(len)))
    }

    /// Returns the bucket for `key` if one has been created.
    pub fn get(&self, key: &str) -> Option<Arc<TokenBucket>> {
        self.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Number of distinct keys seen so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the registered keys, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<TokenBucket>>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for BucketRegistry {
    fn default() -> Self {
        Self::new()
    }
}
