//! Per-identity admission control over two rolling windows.
//!
//! Each identity carries two independent fixed-window counters (minute,
//! hour). A window resets once its length has elapsed; if either count is
//! at its ceiling the request is rejected with the seconds until that
//! window resets. The identity table is bounded: at capacity, the
//! least-recently-seen identity is evicted, so spoofed identities cannot
//! grow memory without bound.
//!
//! Thread-safe via `std::sync::Mutex` (non-async, held briefly) — every
//! mutation completes within one scheduler turn.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use midwire_config::LimitsConfig;

/// Which window triggered a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitWindow {
    Minute,
    Hour,
}

impl std::fmt::Display for LimitWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minute => write!(f, "minute"),
            Self::Hour => write!(f, "hour"),
        }
    }
}

/// Counter state for one window of one identity.
#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    window_start: Instant,
    count: u32,
}

impl WindowCounter {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
        }
    }

    /// Reset if the window has elapsed.
    fn roll(&mut self, now: Instant, window_len: Duration) {
        if now.duration_since(self.window_start) >= window_len {
            self.window_start = now;
            self.count = 0;
        }
    }

    fn seconds_until_reset(&self, now: Instant, window_len: Duration) -> u64 {
        window_len
            .saturating_sub(now.duration_since(self.window_start))
            .as_secs()
            .max(1)
    }
}

#[derive(Debug)]
struct IdentityRecord {
    minute: WindowCounter,
    hour: WindowCounter,
    last_seen: Instant,
}

/// Counter snapshot for one window, for the `rate-limit-info` event.
#[derive(Debug, Clone, Copy)]
pub struct WindowSnapshot {
    pub remaining: u32,
    pub limit: u32,
    /// Epoch milliseconds at which the window resets.
    pub reset_at_ms: u64,
}

/// Both windows' snapshots after an admission check.
#[derive(Debug, Clone, Copy)]
pub struct RateSnapshot {
    pub minute: WindowSnapshot,
    pub hour: WindowSnapshot,
}

/// The admission decision.
#[derive(Debug, Clone, Copy)]
pub enum Decision {
    Allowed(RateSnapshot),
    Rejected {
        retry_after_secs: u64,
        window: LimitWindow,
        snapshot: RateSnapshot,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }

    pub fn snapshot(&self) -> RateSnapshot {
        match self {
            Self::Allowed(s) => *s,
            Self::Rejected { snapshot, .. } => *snapshot,
        }
    }
}

/// Fixed-window, two-tier, LRU-bounded rate limiter.
pub struct RateLimiter {
    per_minute: u32,
    per_hour: u32,
    capacity: usize,
    minute_len: Duration,
    hour_len: Duration,
    identities: Mutex<HashMap<String, IdentityRecord>>,
}

impl RateLimiter {
    /// Create a limiter with production window lengths.
    pub fn new(limits: &LimitsConfig) -> Self {
        Self::with_windows(
            limits.per_minute,
            limits.per_hour,
            limits.identity_capacity,
            Duration::from_secs(60),
            Duration::from_secs(3600),
        )
    }

    /// Create a limiter with explicit window lengths (used by tests).
    pub fn with_windows(
        per_minute: u32,
        per_hour: u32,
        capacity: usize,
        minute_len: Duration,
        hour_len: Duration,
    ) -> Self {
        Self {
            per_minute,
            per_hour,
            capacity: capacity.max(1),
            minute_len,
            hour_len,
            identities: Mutex::new(HashMap::new()),
        }
    }

    /// Check and count one request for an identity.
    pub fn admit(&self, identity: &str) -> Decision {
        let now = Instant::now();
        let mut identities = self.identities.lock().unwrap_or_else(|e| e.into_inner());

        // Bounded table: evict the least-recently-seen identity before
        // inserting a new one at capacity.
        if !identities.contains_key(identity) && identities.len() >= self.capacity {
            if let Some(oldest) = identities
                .iter()
                .min_by_key(|(_, rec)| rec.last_seen)
                .map(|(k, _)| k.clone())
            {
                identities.remove(&oldest);
            }
        }

        let record = identities
            .entry(identity.to_string())
            .or_insert_with(|| IdentityRecord {
                minute: WindowCounter::new(now),
                hour: WindowCounter::new(now),
                last_seen: now,
            });
        record.last_seen = now;

        record.minute.roll(now, self.minute_len);
        record.hour.roll(now, self.hour_len);

        if record.minute.count >= self.per_minute {
            let retry = record.minute.seconds_until_reset(now, self.minute_len);
            let snapshot = self.snapshot_of(record, now);
            return Decision::Rejected {
                retry_after_secs: retry,
                window: LimitWindow::Minute,
                snapshot,
            };
        }

        if record.hour.count >= self.per_hour {
            let retry = record.hour.seconds_until_reset(now, self.hour_len);
            let snapshot = self.snapshot_of(record, now);
            return Decision::Rejected {
                retry_after_secs: retry,
                window: LimitWindow::Hour,
                snapshot,
            };
        }

        record.minute.count += 1;
        record.hour.count += 1;

        let snapshot = self.snapshot_of(record, now);
        Decision::Allowed(snapshot)
    }

    /// Number of identities currently tracked.
    pub fn tracked_identities(&self) -> usize {
        self.identities
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    fn snapshot_of(&self, record: &IdentityRecord, now: Instant) -> RateSnapshot {
        RateSnapshot {
            minute: WindowSnapshot {
                remaining: self.per_minute.saturating_sub(record.minute.count),
                limit: self.per_minute,
                reset_at_ms: reset_epoch_ms(record.minute.window_start, self.minute_len, now),
            },
            hour: WindowSnapshot {
                remaining: self.per_hour.saturating_sub(record.hour.count),
                limit: self.per_hour,
                reset_at_ms: reset_epoch_ms(record.hour.window_start, self.hour_len, now),
            },
        }
    }
}

/// Project a monotonic window deadline onto the wall clock.
fn reset_epoch_ms(window_start: Instant, window_len: Duration, now: Instant) -> u64 {
    let remaining = window_len.saturating_sub(now.duration_since(window_start));
    let epoch_now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    (epoch_now + remaining).as_millis() as u64
}
