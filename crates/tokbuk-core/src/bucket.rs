//! Token bucket admission algorithm
//!
//! A [`TokenBucket`] holds up to `capacity` tokens and regains `rate` tokens
//! per second. Each admission check first brings the balance up to date for
//! the time elapsed since the last refill, then debits the requested amount
//! if, and only if, the whole amount is available.
//!
//! Refill is computed lazily inside [`TokenBucket::allow`], so no timer or
//! background task is involved and every check costs O(1).
//!
//! ```rust
//! use tokbuk_core::TokenBucket;
//!
//! let bucket = TokenBucket::new(2, 1.0).unwrap();
//! assert!(bucket.allow(1));
//! assert!(bucket.allow(1));
//! assert!(!bucket.allow(1));
//! ```

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use tracing::trace;

use crate::{
    clock::{Clock, SystemClock},
    error::{validate_limits, LimiterError},
};

/// Mutable bucket state, guarded by the bucket's mutex.
#[derive(Debug)]
struct BucketState {
    /// Current balance (fractional for smooth refill)
    tokens: f64,
    /// Instant the balance was last brought up to date
    last_refill: Instant,
    /// Where "now" comes from
    clock: Arc<dyn Clock>,
}

impl BucketState {
    /// Adds the tokens accrued since `last_refill`, capped at `capacity`.
    ///
    /// A clock reading at or before `last_refill` leaves both the balance and
    /// the timestamp untouched.
    fn refill(&mut self, capacity: f64, rate: f64) {
        let now = self.clock.now();
        let elapsed = match now.checked_duration_since(self.last_refill) {
            Some(elapsed) if !elapsed.is_zero() => elapsed.as_secs_f64(),
            _ => return,
        };

        let added = elapsed * rate;
        if added > 0.0 {
            self.tokens = (self.tokens + added).min(capacity);
            self.last_refill = now;
        }
    }

    /// Balance as of `now`, without recording the refill.
    fn projected(&self, capacity: f64, rate: f64) -> f64 {
        match self.clock.now().checked_duration_since(self.last_refill) {
            Some(elapsed) => (self.tokens + elapsed.as_secs_f64() * rate).min(capacity),
            None => self.tokens,
        }
    }
}

/// Refillable token budget for one client.
///
/// Thread safety is provided by an internal `Mutex<BucketState>`; share the
/// bucket between threads with `Arc<TokenBucket>`.
#[derive(Debug)]
pub struct TokenBucket {
    /// Maximum number of tokens the bucket can hold (burst allowance)
    capacity: u64,
    /// Tokens regained per second
    rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket driven by the system clock.
    ///
    /// # Errors
    /// Returns [`LimiterError::InvalidConfiguration`] if `capacity` is zero or
    /// `rate` is not a positive finite number.
    pub fn new(capacity: u64, rate: f64) -> Result<Self, LimiterError> {
        Self::with_clock_source(capacity, rate, Arc::new(SystemClock))
    }

    /// Creates a full bucket that reads time from `clock`.
    pub fn with_clock_source(
        capacity: u64,
        rate: f64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LimiterError> {
        validate_limits(capacity, rate)?;

        let last_refill = clock.now();
        Ok(Self {
            capacity,
            rate,
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill,
                clock,
            }),
        })
    }

    // ========================================================================
    // Admission
    // ========================================================================

    /// Decides whether `n` units may proceed.
    ///
    /// Refills first, then debits `n` tokens and returns `true` if at least
    /// `n` are available. Otherwise the balance is left as refilled and
    /// `false` is returned. A request for zero units is never admitted, and
    /// a request larger than `capacity` can never succeed.
    pub fn allow(&self, n: u64) -> bool {
        if n == 0 {
            return false;
        }

        let mut state = self.lock();
        state.refill(self.capacity as f64, self.rate);

        let requested = n as f64;
        if state.tokens >= requested {
            state.tokens -= requested;
            true
        } else {
            trace!(
                requested = n,
                available = state.tokens,
                capacity = self.capacity,
                "Admission rejected"
            );
            false
        }
    }

    // ========================================================================
    // Clock substitution
    // ========================================================================

    /// Replaces the time source and restarts refill accounting from the new
    /// clock's current reading.
    ///
    /// The token balance is kept as is.
    pub fn with_clock(&self, clock: Arc<dyn Clock>) -> &Self {
        let mut state = self.lock();
        state.last_refill = clock.now();
        state.clock = clock;
        self
    }

    // ========================================================================
    // Observers
    // ========================================================================

    /// Returns the maximum number of tokens.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns the refill rate in tokens per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Returns the balance the next admission check would see right now.
    ///
    /// Does not modify the bucket.
    pub fn available_tokens(&self) -> f64 {
        self.lock().projected(self.capacity as f64, self.rate)
    }

    /// Returns the instant of the last recorded refill.
    pub fn last_refill(&self) -> Instant {
        self.lock().last_refill
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        // Every critical section leaves the state consistent, so a panic
        // elsewhere while holding the lock does not invalidate it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
