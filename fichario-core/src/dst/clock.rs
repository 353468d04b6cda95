//! SimClock - Simulated Time
//!
//! TigerStyle: Deterministic, controllable time for simulation.
//! Supports async sleep/notify for coordinating time-dependent tasks.

use crate::constants::{DST_TIME_ADVANCE_MS_MAX, TIME_MS_PER_SEC};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A simulated clock for deterministic testing.
///
/// TigerStyle:
/// - Time only moves forward
/// - All time operations are explicit
/// - No reliance on system time
/// - Supports async sleep with notify for coordination
///
/// Thread-safe via Arc<AtomicU64> for current time. Ledger rows stamp
/// their timestamps through this clock in simulation, so event ordering
/// replays under a fixed seed.
#[derive(Debug, Clone)]
pub struct SimClock {
    /// Current time in milliseconds since epoch (thread-safe)
    current_ms: Arc<AtomicU64>,
    /// Notify waiters when time advances
    notify: Arc<Notify>,
}

impl SimClock {
    /// Create a new clock starting at time zero.
    ///
    /// # Example
    /// ```
    /// use fichario_core::dst::SimClock;
    /// let clock = SimClock::new();
    /// assert_eq!(clock.now_ms(), 0);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            current_ms: Arc::new(AtomicU64::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Create a clock starting at the given millisecond timestamp.
    #[must_use]
    pub fn at_ms(start_ms: u64) -> Self {
        Self {
            current_ms: Arc::new(AtomicU64::new(start_ms)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Create a clock starting at the given DateTime.
    #[must_use]
    pub fn at_datetime(dt: DateTime<Utc>) -> Self {
        let ms = dt.timestamp_millis() as u64;
        Self::at_ms(ms)
    }

    /// Get current time in milliseconds.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.current_ms.load(Ordering::SeqCst)
    }

    /// Get current time in seconds (truncated).
    #[must_use]
    pub fn now_secs(&self) -> u64 {
        self.now_ms() / TIME_MS_PER_SEC
    }

    /// Get current time as DateTime<Utc>.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        let ms = self.now_ms() as i64;
        DateTime::from_timestamp_millis(ms).unwrap_or_else(|| {
            // Fallback for invalid timestamps
            DateTime::from_timestamp(0, 0).unwrap()
        })
    }

    /// Get current time as an RFC 3339 string with millisecond precision.
    ///
    /// This is the format ledger rows persist.
    #[must_use]
    pub fn now_rfc3339(&self) -> String {
        self.now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Advance time by the given milliseconds.
    ///
    /// # Panics
    /// Panics if ms exceeds DST_TIME_ADVANCE_MS_MAX.
    ///
    /// # Returns
    /// The new current time.
    pub fn advance_ms(&self, ms: u64) -> u64 {
        // Preconditions
        assert!(
            ms <= DST_TIME_ADVANCE_MS_MAX,
            "advance_ms({}) exceeds max ({})",
            ms,
            DST_TIME_ADVANCE_MS_MAX
        );

        let old_time = self.current_ms.fetch_add(ms, Ordering::SeqCst);
        let new_time = old_time.saturating_add(ms);

        // Notify all waiters that time has advanced
        self.notify.notify_waiters();

        // Postcondition
        assert!(new_time >= old_time, "time must not go backwards");

        new_time
    }

    /// Advance time by a chrono Duration.
    pub fn advance(&self, duration: Duration) {
        debug_assert!(duration >= Duration::zero(), "cannot go back in time");

        let delta_ms = duration.num_milliseconds() as u64;
        self.advance_ms(delta_ms);
    }

    /// Set time to absolute value.
    ///
    /// # Panics
    /// Panics if new time is less than current time.
    pub fn set_ms(&self, ms: u64) {
        let current = self.now_ms();
        // Precondition
        assert!(
            ms >= current,
            "cannot set time backwards: {} < {}",
            ms,
            current
        );

        self.current_ms.store(ms, Ordering::SeqCst);
        self.notify.notify_waiters();

        // Postcondition
        assert_eq!(self.now_ms(), ms, "time must be set correctly");
    }

    /// Get elapsed time since a given timestamp.
    ///
    /// # Panics
    /// Panics if since is in the future.
    #[must_use]
    pub fn elapsed_since(&self, since: u64) -> u64 {
        let current = self.now_ms();
        // Precondition
        assert!(
            since <= current,
            "elapsed_since({}) is in the future (now={})",
            since,
            current
        );

        current - since
    }

    /// Check if a given duration has elapsed since a timestamp.
    #[must_use]
    pub fn has_elapsed(&self, since: u64, duration_ms: u64) -> bool {
        self.elapsed_since(since) >= duration_ms
    }

    /// Check if a deadline (in ms) has passed.
    #[must_use]
    pub fn is_past_ms(&self, deadline_ms: u64) -> bool {
        self.now_ms() >= deadline_ms
    }

    /// Sleep until the specified duration has passed.
    ///
    /// In simulation mode, this yields and waits for time to be advanced.
    /// Returns when current_time >= start_time + duration_ms.
    pub async fn sleep_ms(&self, duration_ms: u64) {
        let target_ms = self.now_ms() + duration_ms;

        while self.now_ms() < target_ms {
            self.notify.notified().await;
        }
    }

    /// Sleep until a specific deadline.
    pub async fn sleep_until_ms(&self, deadline_ms: u64) {
        while self.now_ms() < deadline_ms {
            self.notify.notified().await;
        }
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}
