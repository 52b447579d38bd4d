//! Inside-joke selection.
//!
//! Least-recently-used and least-frequently-used jokes surface first so the
//! persona keeps rotating through old material instead of repeating the
//! same two lines. Selection is pure; the usage bump happens after a
//! generation call actually consumed the jokes.

use crate::memory::profile::{JokeUsage, JokeUsageMap};

pub const DEFAULT_MAX_JOKES: usize = 2;

/// Pick at most `max` jokes, ordered ascending by `(last_used, count)`.
/// Never-used jokes rank as `(0, 0)`. Inputs are left untouched.
pub fn select_inside_jokes(jokes: &[String], usage: &JokeUsageMap, max: usize) -> Vec<String> {
    let mut ranked: Vec<&String> = jokes.iter().collect();
    ranked.sort_by_key(|joke| {
        let u = usage.get(*joke).cloned().unwrap_or_default();
        (u.last_used, u.count)
    });
    ranked.into_iter().take(max).cloned().collect()
}

/// Bump the usage record for every joke that was actually sent: count +1,
/// `last_used` stamped with the call time. Entries are never removed.
pub fn record_joke_use(usage: &mut JokeUsageMap, used: &[String], now_ms: i64) {
    for joke in used {
        let entry = usage.entry(joke.clone()).or_insert_with(JokeUsage::default);
        entry.count += 1;
        entry.last_used = now_ms;
    }
}
