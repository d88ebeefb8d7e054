//! Limiter error types
//!
//! The only failure the core can report is a bad bucket configuration.
//! Admission checks never fail: they always produce a definite decision.

use thiserror::Error;

/// Errors raised while constructing token buckets.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LimiterError {
    /// Capacity or refill rate is out of range
    #[error("Invalid configuration: {field} {reason}")]
    InvalidConfiguration {
        /// Name of the offending parameter (`capacity` or `rate`)
        field: &'static str,
        /// Human-readable explanation
        reason: String,
    },
}

impl LimiterError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field,
            reason: reason.into(),
        }
    }
}

/// Checks a `(capacity, rate)` pair without building a bucket.
///
/// Adapters call this at setup time so that a bad policy is reported
/// before the first request arrives.
pub fn validate_limits(capacity: u64, rate: f64) -> Result<(), LimiterError> {
    if capacity == 0 {
        return Err(LimiterError::invalid(
            "capacity",
            "must be greater than 0",
        ));
    }
    if !rate.is_finite() {
        return Err(LimiterError::invalid(
            "rate",
            format!("must be a finite number, got {rate}"),
        ));
    }
    if rate <= 0.0 {
        return Err(LimiterError::invalid(
            "rate",
            format!("must be greater than 0, got {rate}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LimiterError::invalid("capacity", "must be greater than 0");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: capacity must be greater than 0"
        );
    }

    #[test]
    fn test_validate_limits_accepts_positive_values() {
        assert!(validate_limits(1, 0.001).is_ok());
        assert!(validate_limits(10, 5.0).is_ok());
    }

    #[test]
    fn test_validate_limits_rejects_zero_capacity() {
        let err = validate_limits(0, 1.0).unwrap_err();
        assert!(matches!(
            err,
            LimiterError::InvalidConfiguration {
                field: "capacity",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_limits_rejects_bad_rates() {
        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = validate_limits(5, rate).unwrap_err();
            assert!(
                matches!(err, LimiterError::InvalidConfiguration { field: "rate", .. }),
                "rate {rate} should be rejected"
            );
        }
    }
}
