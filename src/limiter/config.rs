//! Rate limiter settings
//!
//! Plain data describing a token bucket: how fast tokens refill and how
//! many can accumulate. Built with the `per_second`/`every` constructors and
//! checked with [`RateLimitConfig::validate`] before a limiter is created.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::BatchError;

/// Token bucket parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RateLimitConfig {
    /// Tokens added per second (`f64::INFINITY` disables limiting)
    pub per_second: f64,

    /// Bucket capacity, i.e. the largest burst allowed at once
    pub burst: usize,
}

impl RateLimitConfig {
    /// `rate` tokens per second with a burst of one.
    pub fn per_second(rate: f64) -> Self {
        Self {
            per_second: rate,
            burst: 1,
        }
    }

    /// One token every `interval` with a burst of one.
    ///
    /// A zero interval means no limit.
    pub fn every(interval: Duration) -> Self {
        let per_second = if interval.is_zero() {
            f64::INFINITY
        } else {
            1.0 / interval.as_secs_f64()
        };
        Self {
            per_second,
            burst: 1,
        }
    }

    /// Set bucket capacity.
    pub fn with_burst(mut self, burst: usize) -> Self {
        self.burst = burst;
        self
    }

    /// Whether this configuration disables limiting.
    pub fn is_unlimited(&self) -> bool {
        self.per_second == f64::INFINITY
    }

    /// Reject settings that could never grant a token.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.per_second.is_nan() || self.per_second < 0.0 {
            return Err(BatchError::InvalidConfig(format!(
                "rate must be a non-negative number, got {}",
                self.per_second
            )));
        }
        if self.burst == 0 && !self.is_unlimited() {
            return Err(BatchError::InvalidConfig(
                "burst must be > 0 for a finite rate".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_second(1.0)
    }
}
