//! Mood dimension of the companion state.
//!
//! Exactly one mood is active at a time; the user cycles through the fixed
//! order, and prolonged inactivity forces `Sleepy`. Mood is process-local
//! and starts over at `Happy` on restart.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Happy,
    Curious,
    Bored,
    Annoyed,
    Excited,
    Sleepy,
}

impl Mood {
    pub const CYCLE: [Mood; 6] = [
        Mood::Happy,
        Mood::Curious,
        Mood::Bored,
        Mood::Annoyed,
        Mood::Excited,
        Mood::Sleepy,
    ];

    /// Next mood in the fixed cyclic order.
    pub fn next(self) -> Mood {
        let idx = Self::CYCLE.iter().position(|m| *m == self).unwrap_or(0);
        Self::CYCLE[(idx + 1) % Self::CYCLE.len()]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mood::Happy => "happy",
            Mood::Curious => "curious",
            Mood::Bored => "bored",
            Mood::Annoyed => "annoyed",
            Mood::Excited => "excited",
            Mood::Sleepy => "sleepy",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
