//! Fixed-window throttling state: the per-IP submission rate limiter and the
//! per-fingerprint burst tracker. Both serialize read-modify-write access
//! behind a mutex so concurrent reports from one source cannot lose counts.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use zwerfmelder_common::constants::{
    FINGERPRINT_BURST_THRESHOLD, REPORT_RATE_LIMIT_REQUESTS, REPORT_RATE_LIMIT_WINDOW,
};

#[derive(Debug, Clone, Copy)]
struct WindowBucket {
    starts_at: Instant,
    count: u32,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub resets_at: Instant,
}

/// Fixed-window request limiter keyed by submitter identity.
/// The bucket resets once the window has elapsed since its start.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    buckets: Mutex<HashMap<String, WindowBucket>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request for `key` and decide whether it is allowed.
    pub fn check(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut buckets = self.buckets.lock().unwrap();

        let bucket = buckets
            .entry(key.to_string())
            .and_modify(|bucket| {
                if now.duration_since(bucket.starts_at) >= self.window {
                    *bucket = WindowBucket {
                        starts_at: now,
                        count: 0,
                    };
                }
                bucket.count += 1;
            })
            .or_insert(WindowBucket {
                starts_at: now,
                count: 1,
            });

        RateLimitDecision {
            allowed: bucket.count <= self.max_requests,
            remaining: self.max_requests.saturating_sub(bucket.count),
            resets_at: bucket.starts_at + self.window,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(REPORT_RATE_LIMIT_REQUESTS, REPORT_RATE_LIMIT_WINDOW)
    }
}

/// Per-fingerprint burst counter. Reaching the threshold within one window
/// flags the current report for review; it never rejects.
pub struct BurstTracker {
    threshold: u32,
    window: Duration,
    buckets: Mutex<HashMap<String, WindowBucket>>,
}

impl BurstTracker {
    pub fn new(threshold: u32, window: Duration) -> Self {
        Self {
            threshold,
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Record a report from `fingerprint` and return whether the burst
    /// threshold has been reached within the current window.
    pub fn observe(&self, fingerprint: &str, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().unwrap();

        let bucket = buckets
            .entry(fingerprint.to_string())
            .and_modify(|bucket| {
                if now.duration_since(bucket.starts_at) >= self.window {
                    *bucket = WindowBucket {
                        starts_at: now,
                        count: 0,
                    };
                }
                bucket.count += 1;
            })
            .or_insert(WindowBucket {
                starts_at: now,
                count: 1,
            });

        bucket.count >= self.threshold
    }
}

impl Default for BurstTracker {
    fn default() -> Self {
        Self::new(FINGERPRINT_BURST_THRESHOLD, REPORT_RATE_LIMIT_WINDOW)
    }
}
