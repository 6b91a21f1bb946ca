//! Per-user token-bucket admission control.
//!
//! Buckets live inside the user store; this module owns the arithmetic
//! and the periodic refill task. Each bucket is only ever touched while
//! its user's store entry is locked, so check, consume and refill for
//! one user never interleave.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::error::BalancerError;
use crate::observability::metrics;
use crate::users::UserStore;

/// Token bucket state for a single user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBucket {
    pub capacity: i64,
    pub current_capacity: i64,
    pub rate_per_sec: i64,
}

impl TokenBucket {
    /// A full bucket.
    pub fn new(capacity: i64, rate_per_sec: i64) -> Self {
        Self {
            capacity,
            current_capacity: capacity,
            rate_per_sec,
        }
    }

    /// Admission test. Does not consume a token.
    pub fn check_can_request(&self) -> Result<(), BalancerError> {
        if self.current_capacity <= 0 {
            return Err(BalancerError::RateLimitExceeded);
        }
        Ok(())
    }

    /// Take one token, never going below zero.
    pub fn consume(&mut self) {
        self.current_capacity = (self.current_capacity - 1).max(0);
    }

    /// Add `rate_per_sec` tokens, clamped to capacity.
    pub fn refill(&mut self) {
        self.current_capacity = self
            .current_capacity
            .saturating_add(self.rate_per_sec)
            .min(self.capacity);
    }

    /// Replace capacity and rate.
    ///
    /// `current_capacity` is left alone; the next refill or consume brings it
    /// back under the new ceiling.
    pub fn change(&mut self, capacity: i64, rate_per_sec: i64) -> Result<(), BalancerError> {
        if capacity <= 0 && rate_per_sec <= 0 {
            return Err(BalancerError::InvalidArgument(
                "capacity and rate_per_sec cannot both be non-positive".into(),
            ));
        }
        if capacity < 0 || rate_per_sec < 0 {
            return Err(BalancerError::InvalidArgument(
                "capacity and rate_per_sec must not be negative".into(),
            ));
        }
        self.capacity = capacity;
        self.rate_per_sec = rate_per_sec;
        Ok(())
    }
}

/// Background task refilling every user's bucket once per `period`.
///
/// The first refill happens one full period after start. Exits when the
/// shutdown channel fires or its sender is dropped.
pub async fn run_refill(
    store: Arc<UserStore>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(interval_ms = period.as_millis() as u64, "Token refill task starting");

    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let users = store.refill_all();
                metrics::record_refill(users);
                tracing::trace!(users, "Tokens refilled");
            }
            _ = shutdown.recv() => {
                tracing::info!("Token refill task received shutdown signal, exiting loop");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bucket_rejects() {
        let mut bucket = TokenBucket::new(5, 1);
        bucket.current_capacity = 0;
        assert!(matches!(
            bucket.check_can_request(),
            Err(BalancerError::RateLimitExceeded)
        ));
    }

    #[test]
    fn consume_floors_at_zero() {
        let mut bucket = TokenBucket::new(3, 1);
        for _ in 0..5 {
            bucket.consume();
        }
        assert_eq!(bucket.current_capacity, 0);
    }

    #[test]
    fn consume_reduces_by_min_of_n_and_balance() {
        for n in 0..8 {
            let mut bucket = TokenBucket::new(5, 1);
            for _ in 0..n {
                bucket.consume();
            }
            assert_eq!(bucket.current_capacity, 5 - n.min(5));
        }
    }

    #[test]
    fn refill_clamps_to_capacity() {
        let mut bucket = TokenBucket::new(5, 3);
        bucket.current_capacity = 4;
        bucket.refill();
        assert_eq!(bucket.current_capacity, 5);
    }

    #[test]
    fn refill_from_empty_then_admits() {
        let mut bucket = TokenBucket {
            capacity: 5,
            current_capacity: 0,
            rate_per_sec: 1,
        };
        bucket.refill();
        assert_eq!(bucket.current_capacity, 1);
        assert!(bucket.check_can_request().is_ok());
    }

    #[test]
    fn change_rejects_both_non_positive() {
        let mut bucket = TokenBucket::new(5, 1);
        assert!(bucket.change(0, 0).is_err());
        assert!(bucket.change(-1, 0).is_err());
        assert_eq!(bucket, TokenBucket::new(5, 1));
    }

    #[test]
    fn change_accepts_zero_rate() {
        let mut bucket = TokenBucket::new(5, 1);
        bucket.change(5, 0).unwrap();
        assert_eq!(bucket.rate_per_sec, 0);
        bucket.consume();
        bucket.refill();
        assert_eq!(bucket.current_capacity, 4);
    }

    #[test]
    fn change_rejects_negative_component() {
        let mut bucket = TokenBucket::new(5, 1);
        assert!(bucket.change(10, -2).is_err());
    }

    #[test]
    fn huge_rate_saturates_at_capacity() {
        let mut bucket = TokenBucket::new(5, 1);
        bucket.change(5, i64::MAX).unwrap();
        bucket.current_capacity = 4;
        bucket.refill();
        assert_eq!(bucket.current_capacity, 5);
        bucket.refill();
        assert_eq!(bucket.current_capacity, 5);

        bucket.change(i64::MAX, i64::MAX).unwrap();
        bucket.refill();
        assert_eq!(bucket.current_capacity, i64::MAX);
    }

    #[test]
    fn shrinking_capacity_settles_on_refill() {
        let mut bucket = TokenBucket::new(10, 1);
        bucket.change(3, 1).unwrap();
        assert_eq!(bucket.current_capacity, 10);
        bucket.refill();
        assert_eq!(bucket.current_capacity, 3);
    }
}
