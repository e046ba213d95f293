//! Shared bandwidth pacer
//!
//! One pacer is shared by every transfer and chunk operation in the
//! process and enforces an aggregate throughput ceiling. Built on the
//! Governor crate's token bucket for smooth pacing; acquisition delays the
//! caller but never fails, and is safe under unbounded concurrent callers.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Process-wide rate limiter gating how fast chunk operations may move bytes
pub struct Pacer {
    limiter: Option<Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
    bytes_per_token: usize,
}

impl Pacer {
    /// Create a pacer with the given aggregate ceiling
    ///
    /// # Arguments
    /// * `bytes_per_second` - Maximum aggregate transfer rate
    pub fn new(bytes_per_second: u64) -> Self {
        // 1KB tokens give smoother pacing than per-byte accounting.
        const BYTES_PER_TOKEN: usize = 1024;

        let tokens_per_second = (bytes_per_second as usize / BYTES_PER_TOKEN).max(1);

        // Cap at u32::MAX to prevent overflow when casting
        let capped_tokens = tokens_per_second.min(u32::MAX as usize) as u32;
        let quota = Quota::per_second(NonZeroU32::new(capped_tokens).unwrap_or(NonZeroU32::MIN));

        Self {
            limiter: Some(Arc::new(RateLimiter::direct(quota))),
            bytes_per_token: BYTES_PER_TOKEN,
        }
    }

    /// Create a pacer that admits everything immediately
    pub fn unlimited() -> Self {
        Self {
            limiter: None,
            bytes_per_token: 1024,
        }
    }

    /// Create from a human-readable rate string (e.g., "100M", "1G", "500K")
    pub fn from_rate_string(rate: &str) -> Option<Self> {
        let rate = rate.trim().to_uppercase();

        let (num_str, multiplier) = if rate.ends_with('G') || rate.ends_with("GB") {
            (rate.trim_end_matches("GB").trim_end_matches('G'), 1024 * 1024 * 1024)
        } else if rate.ends_with('M') || rate.ends_with("MB") {
            (rate.trim_end_matches("MB").trim_end_matches('M'), 1024 * 1024)
        } else if rate.ends_with('K') || rate.ends_with("KB") {
            (rate.trim_end_matches("KB").trim_end_matches('K'), 1024)
        } else {
            (rate.as_str(), 1)
        };

        let num: f64 = num_str.parse().ok()?;
        let bytes_per_second = (num * multiplier as f64) as u64;

        if bytes_per_second > 0 {
            Some(Self::new(bytes_per_second))
        } else {
            None
        }
    }

    /// True if this pacer never delays callers
    pub fn is_unlimited(&self) -> bool {
        self.limiter.is_none()
    }

    /// Wait until the given number of bytes may be transmitted
    pub async fn acquire(&self, bytes: usize) {
        let Some(limiter) = &self.limiter else {
            return;
        };

        let tokens_needed = (bytes / self.bytes_per_token).max(1);
        for _ in 0..tokens_needed {
            limiter.until_ready().await;
        }
    }

    /// Wait (blocking) until the given number of bytes may be transmitted
    pub fn acquire_blocking(&self, bytes: usize) {
        let Some(limiter) = &self.limiter else {
            return;
        };

        let tokens_needed = (bytes / self.bytes_per_token).max(1);
        for _ in 0..tokens_needed {
            while limiter.check().is_err() {
                std::thread::sleep(Duration::from_micros(100));
            }
        }
    }
}

impl Clone for Pacer {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.as_ref().map(Arc::clone),
            bytes_per_token: self.bytes_per_token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_string_parsing() {
        assert!(Pacer::from_rate_string("100M").is_some());
        assert!(Pacer::from_rate_string("1G").is_some());
        assert!(Pacer::from_rate_string("500KB").is_some());
        assert!(Pacer::from_rate_string("50MB").is_some());
        assert!(Pacer::from_rate_string("invalid").is_none());
        assert!(Pacer::from_rate_string("0").is_none());
    }

    #[test]
    fn test_unlimited_never_delays() {
        let pacer = Pacer::unlimited();
        assert!(pacer.is_unlimited());
        // Would block for ~an hour at any finite rate.
        pacer.acquire_blocking(4 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_limited_pacer_admits_initial_burst() {
        let pacer = Pacer::new(100 * 1024 * 1024);
        pacer.acquire_blocking(1024);
    }

    #[test]
    fn test_async_acquire() {
        let pacer = Pacer::new(100 * 1024 * 1024);
        futures::executor::block_on(pacer.acquire(1024));
    }

    #[test]
    fn test_clone_shares_the_bucket() {
        let pacer = Pacer::new(8 * 1024);
        let shared = pacer.clone();
        assert!(!shared.is_unlimited());
    }
}
