//! Persisted profile fields and their JSON views.
//!
//! The store is schemaless; this module is the single place that knows the
//! field names and how to read them leniently (a missing or mistyped value
//! falls back to its default rather than erroring).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub mod keys {
    pub const NICKNAME: &str = "nickname";
    pub const INSIDE_JOKES: &str = "insideJokes";
    pub const INSIDE_JOKES_USAGE: &str = "insideJokesUsage";
    pub const ALLOW_TEASING: &str = "allowTeasing";
    pub const ALLOW_SHOWOFF: &str = "allowShowoff";
    pub const ALLOW_CLINGY: &str = "allowClingy";
    pub const SEEN_ONBOARDING: &str = "seenOnboarding";
    pub const LAST_INTERACTION_AT: &str = "lastInteractionAt";
    pub const LAST_INTERACTION_DAY: &str = "lastInteractionDay";
    pub const IGNORED_STREAK_DAYS: &str = "ignoredStreakDays";
}

pub const DEFAULT_NICKNAME: &str = "friend";

/// Usage record for one inside joke. Counts only ever grow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JokeUsage {
    pub count: u64,
    /// Epoch milliseconds of the last generation call that sent this joke.
    pub last_used: i64,
}

/// Joke text → usage record. BTreeMap keeps the persisted form stable.
pub type JokeUsageMap = BTreeMap<String, JokeUsage>;

pub fn nickname_from(value: Option<Value>) -> String {
    value
        .and_then(|v| v.as_str().map(str::to_string))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_NICKNAME.to_string())
}

pub fn jokes_from(value: Option<Value>) -> Vec<String> {
    value
        .and_then(|v| serde_json::from_value::<Vec<String>>(v).ok())
        .unwrap_or_default()
}

pub fn usage_from(value: Option<Value>) -> JokeUsageMap {
    value
        .and_then(|v| serde_json::from_value::<JokeUsageMap>(v).ok())
        .unwrap_or_default()
}

pub fn flag_from(value: Option<Value>, default: bool) -> bool {
    value.and_then(|v| v.as_bool()).unwrap_or(default)
}

pub fn day_from(value: Option<Value>) -> Option<String> {
    value.and_then(|v| v.as_str().map(str::to_string))
}

pub fn timestamp_from(value: Option<Value>) -> Option<i64> {
    value.and_then(|v| v.as_i64())
}

pub fn streak_from(value: Option<Value>) -> u32 {
    value.and_then(|v| v.as_u64()).unwrap_or(0) as u32
}
