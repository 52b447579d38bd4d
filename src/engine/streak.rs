//! Ignored-streak accounting and interaction-write throttling.
//!
//! The streak counts consecutive calendar days without a qualifying
//! interaction; it stretches the companion's patience thinner the longer
//! it runs (shorter sulk and sleep delays, clingier sulk lines).

use std::time::{Duration, Instant};

/// A day change only counts as "ignored" when the last recorded
/// interaction is at least this old.
const STALE_INTERACTION_MS: i64 = 6 * 60 * 60 * 1000;

/// Passive pointer movement persists a timestamp at most this often.
pub const PASSIVE_WRITE_INTERVAL: Duration = Duration::from_secs(60);

/// Delay before the companion sulks about being ignored.
pub fn sulk_delay(streak_days: u32) -> Duration {
    let ms = (25_000i64 - 2_000 * streak_days as i64).max(8_000);
    Duration::from_millis(ms as u64)
}

/// Delay from the sulk until the companion fakes falling asleep.
pub fn sleep_delay(streak_days: u32) -> Duration {
    let ms = (12_000i64 - 1_000 * streak_days as i64).max(6_000);
    Duration::from_millis(ms as u64)
}

/// Startup check: does this process start open a new ignored day?
/// True when a day was recorded, it differs from today, and the last
/// timestamp is missing or more than six hours old.
pub fn opens_ignored_day(
    stored_day: Option<&str>,
    last_interaction_ms: Option<i64>,
    today: &str,
    now_ms: i64,
) -> bool {
    match stored_day {
        Some(day) if day != today => match last_interaction_ms {
            Some(ts) => now_ms - ts > STALE_INTERACTION_MS,
            None => true,
        },
        _ => false,
    }
}

/// Decides which interactions are worth a persisted timestamp.
/// Clicks always write; passive movement writes at most once a minute.
#[derive(Debug, Default)]
pub struct InteractionClock {
    last_write: Option<Instant>,
}

impl InteractionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A passive movement event. True when the throttle window is open;
    /// claiming the window closes it.
    pub fn passive_write_due(&mut self, now: Instant) -> bool {
        let due = match self.last_write {
            Some(prev) => now.duration_since(prev) >= PASSIVE_WRITE_INTERVAL,
            None => true,
        };
        if due {
            self.last_write = Some(now);
        }
        due
    }

    /// An explicit click. Always writes and restarts the passive window.
    pub fn explicit_write(&mut self, now: Instant) {
        self.last_write = Some(now);
    }
}
