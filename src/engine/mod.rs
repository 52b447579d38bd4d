pub mod engagement;
pub mod jokes;
pub mod mood;
pub mod prefetch;
pub mod streak;

pub use engagement::{EngagementEngine, EngagementState, EngineEvent, Gesture};
pub use mood::Mood;

#[cfg(test)]
mod tests;
