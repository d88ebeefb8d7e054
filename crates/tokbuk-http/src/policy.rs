//! Rate-limit policy: key extraction wired to the bucket registry
//!
//! A [`RateLimit`] carries one `(capacity, rate)` pair, validated when the
//! policy is built.

use std::sync::Arc;

use tokbuk_core::{validate_limits, BucketRegistry, LimiterError};
use tokbuk_telemetry::MetricsRegistry;
use tracing::{debug, error};

use crate::key::{KeyExtractor, RequestHead};

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The request may proceed
    Admitted { key: String },
    /// Too many requests: the client's bucket is empty
    Rejected { key: String },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }

    /// Client key the decision was made for.
    pub fn key(&self) -> &str {
        match self {
            Self::Admitted { key } | Self::Rejected { key } => key,
        }
    }
}

/// One rate-limit policy applied at the request boundary.
///
/// Every request consumes one token from the bucket of its client key.
/// Policies sharing a registry share buckets for equal keys, and the first
/// policy to create a key's bucket fixes its limits.
pub struct RateLimit {
    registry: Arc<BucketRegistry>,
    capacity: u64,
    rate: f64,
    extractor: Arc<dyn KeyExtractor>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl std::fmt::Debug for RateLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimit")
            .field("capacity", &self.capacity)
            .field("rate", &self.rate)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl RateLimit {
    /// Creates a policy admitting bursts of `capacity` requests per client,
    /// refilled at `rate` requests per second.
    ///
    /// # Errors
    /// Returns [`LimiterError::InvalidConfiguration`] for a zero capacity or
    /// a rate that is not a positive finite number.
    pub fn new(
        registry: Arc<BucketRegistry>,
        capacity: u64,
        rate: f64,
        extractor: impl KeyExtractor + 'static,
    ) -> Result<Self, LimiterError> {
        validate_limits(capacity, rate)?;
        Ok(Self {
            registry,
            capacity,
            rate,
            extractor: Arc::new(extractor),
            metrics: None,
        })
    }

    /// Records every decision in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &Arc<BucketRegistry> {
        &self.registry
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Resolves the request's client key and checks it.
    pub fn check(&self, head: &RequestHead<'_>) -> Admission {
        let key = self.extractor.extract(head);
        self.check_key(key)
    }

    /// Consumes one token for `key`, creating its bucket on first sight.
    pub fn check_key(&self, key: impl Into<String>) -> Admission {
        let key = key.into();
        let admitted = match self
            .registry
            .get_or_create_counted(&key, self.capacity, self.rate)
        {
            Ok((bucket, created)) => {
                if let (Some(len), Some(metrics)) = (created, &self.metrics) {
                    metrics.set_buckets(len);
                }
                bucket.allow(1)
            }
            Err(e) => {
                // Limits are validated in `new`. Fail closed.
                error!(key = %key, error = %e, "Could not create token bucket");
                false
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_admission(admitted);
        }

        if admitted {
            Admission::Admitted { key }
        } else {
            debug!(key = %key, "Rate limit exceeded");
            Admission::Rejected { key }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokbuk_core::ManualClock;

    use super::*;
    use crate::key::StaticKey;

    fn manual_policy(capacity: u64, rate: f64) -> (RateLimit, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let registry = Arc::new(BucketRegistry::with_clock(clock.clone()));
        let policy = RateLimit::new(registry, capacity, rate, StaticKey::new("test-user")).unwrap();
        (policy, clock)
    }

    #[test]
    fn test_new_rejects_invalid_limits() {
        let registry = Arc::new(BucketRegistry::new());
        assert!(RateLimit::new(Arc::clone(&registry), 0, 1.0, StaticKey::new("k")).is_err());
        assert!(RateLimit::new(registry, 1, 0.0, StaticKey::new("k")).is_err());
    }

    #[test]
    fn test_check_key_admits_then_rejects() {
        let (policy, clock) = manual_policy(2, 1.0);

        assert!(policy.check_key("a").is_admitted());
        assert!(policy.check_key("a").is_admitted());
        let rejected = policy.check_key("a");
        assert_eq!(rejected, Admission::Rejected { key: "a".into() });
        assert_eq!(rejected.key(), "a");

        clock.advance(Duration::from_secs(1));
        assert!(policy.check_key("a").is_admitted());
    }

    #[test]
    fn test_policies_sharing_registry_keep_first_limits() {
        let registry = Arc::new(BucketRegistry::new());
        let strict = RateLimit::new(Arc::clone(&registry), 1, 1.0, StaticKey::new("k")).unwrap();
        let lenient = RateLimit::new(Arc::clone(&registry), 100, 100.0, StaticKey::new("k")).unwrap();

        assert!(strict.check_key("shared").is_admitted());
        assert!(!lenient.check_key("shared").is_admitted());
        assert_eq!(registry.get("shared").unwrap().capacity(), 1);
    }

    #[test]
    fn test_metrics_record_decisions() {
        let metrics = Arc::new(MetricsRegistry::new().unwrap());
        let (policy, _clock) = manual_policy(1, 1.0);
        let policy = policy.with_metrics(Arc::clone(&metrics));

        policy.check_key("a");
        policy.check_key("a");
        policy.check_key("b");

        assert_eq!(metrics.admissions("admitted"), 2);
        assert_eq!(metrics.admissions("rejected"), 1);
        assert_eq!(metrics.buckets.get(), 2);
    }

    #[test]
    fn test_bucket_gauge_only_moves_on_new_keys() {
        let metrics = Arc::new(MetricsRegistry::new().unwrap());
        let (policy, _clock) = manual_policy(5, 1.0);
        let policy = policy.with_metrics(Arc::clone(&metrics));

        policy.check_key("a");
        assert_eq!(metrics.buckets.get(), 1);

        // A bucket created behind the policy's back is picked up on the
        // next insert, not on lookups of known keys.
        policy.registry().get_or_create("side", 1, 1.0).unwrap();
        policy.check_key("a");
        assert_eq!(metrics.buckets.get(), 1);

        policy.check_key("b");
        assert_eq!(metrics.buckets.get(), 3);
    }
}
