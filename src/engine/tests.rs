//! Behavioral tests for the engagement engine.
//!
//! The transport is replaced with a scripted in-memory implementation so
//! every network-visible effect (generation calls, memory writes) can be
//! counted, and tokio's paused clock drives the ignore/sleep timing.

use super::engagement::{EngagementEngine, EngineEvent, Gesture, PLAY_DEAD_RECOVERY};
use super::mood::Mood;
use crate::llm::provider::GenerateRequest;
use crate::memory::profile::{self, keys};
use crate::transport::{ApiError, CompanionApi};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ── Scripted transport ─────────────────────────────────────

#[derive(Default)]
struct MockApi {
    memory: Mutex<HashMap<String, Value>>,
    generate_calls: AtomicUsize,
    fail_generation: AtomicBool,
    last_request: Mutex<Option<GenerateRequest>>,
}

impl MockApi {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn seed(&self, key: &str, value: Value) {
        self.memory.lock().unwrap().insert(key.to_string(), value);
    }

    fn stored(&self, key: &str) -> Option<Value> {
        self.memory.lock().unwrap().get(key).cloned()
    }

    fn calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    fn fail_generation(&self) {
        self.fail_generation.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CompanionApi for MockApi {
    async fn generate(&self, request: GenerateRequest) -> Result<String, ApiError> {
        let n = self.generate_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_request.lock().unwrap() = Some(request);
        if self.fail_generation.load(Ordering::SeqCst) {
            return Err(ApiError::Generation(
                "API error: 500 Internal Server Error".to_string(),
            ));
        }
        Ok(format!("fresh line #{}", n))
    }

    async fn get_memory(&self, key: &str) -> Result<Option<Value>, ApiError> {
        Ok(self.memory.lock().unwrap().get(key).cloned())
    }

    async fn set_memory(&self, key: &str, value: Value) -> Result<(), ApiError> {
        self.memory.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn goodbye(&self) -> Result<String, ApiError> {
        Ok("Farewell, gooey overlord.".to_string())
    }

    async fn quit(&self) -> Result<(), ApiError> {
        Ok(())
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn say_texts(events: &[EngineEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Say { text } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

fn gestures(events: &[EngineEvent]) -> Vec<Gesture> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Gesture { gesture } => Some(*gesture),
            _ => None,
        })
        .collect()
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

// ── Timer discipline ───────────────────────────────────────

#[tokio::test]
async fn rapid_interactions_leave_one_pending_timer_and_no_sulk() {
    let api = MockApi::new();
    let (engine, mut rx) = EngagementEngine::new(api.clone());

    for _ in 0..100 {
        engine.pointer_moved().await;
    }

    assert!(engine.pending_idle_timer().await);
    assert!(!engine.pending_sleep_timer().await);

    let events = drain(&mut rx);
    assert!(say_texts(&events).is_empty(), "no sulk line may appear");
    assert_eq!(api.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn ignored_long_enough_sulks_then_fakes_sleep() {
    let api = MockApi::new();
    let (engine, mut rx) = EngagementEngine::new(api.clone());

    engine.pointer_moved().await;
    drain(&mut rx);

    // Past the 25s sulk point, before the nap.
    tokio::time::sleep(Duration::from_secs(26)).await;
    let events = drain(&mut rx);
    assert_eq!(gestures(&events), vec![Gesture::TurnAway]);
    assert_eq!(say_texts(&events), vec!["fresh line #1"]);
    assert!(engine.pending_sleep_timer().await);

    // 12 more seconds without interaction: fake sleep, no generation.
    tokio::time::sleep(Duration::from_secs(13)).await;
    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::MoodChanged { mood: Mood::Sleepy })));
    assert_eq!(say_texts(&events), vec!["zZz…"]);
    assert_eq!(api.calls(), 1, "the sleeping line is static");

    let state = engine.state().await;
    assert!(state.faking_sleep);
    assert_eq!(state.mood, Mood::Sleepy);
}

#[tokio::test(start_paused = true)]
async fn interaction_after_sulk_cancels_the_pending_nap() {
    let api = MockApi::new();
    let (engine, mut rx) = EngagementEngine::new(api.clone());

    engine.pointer_moved().await;
    tokio::time::sleep(Duration::from_secs(26)).await;
    drain(&mut rx);
    assert!(engine.pending_sleep_timer().await);

    engine.pointer_moved().await;
    assert!(!engine.pending_sleep_timer().await);

    // Well past where the cancelled nap would have fired.
    tokio::time::sleep(Duration::from_secs(15)).await;
    let events = drain(&mut rx);
    assert!(!say_texts(&events).contains(&"zZz…".to_string()));
    assert!(!engine.state().await.faking_sleep);
}

#[tokio::test(start_paused = true)]
async fn click_wakes_from_fake_sleep_before_anything_else() {
    let api = MockApi::new();
    let (engine, mut rx) = EngagementEngine::new(api.clone());

    engine.pointer_moved().await;
    tokio::time::sleep(Duration::from_secs(40)).await;
    drain(&mut rx);
    assert!(engine.state().await.faking_sleep);

    engine.clicked().await;
    let events = drain(&mut rx);

    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::MoodChanged { mood: Mood::Happy })));
    assert_eq!(say_texts(&events), vec!["I was totally awake. Obviously."]);
    assert!(
        !gestures(&events).contains(&Gesture::Pop),
        "waking replaces the usual click pop"
    );

    let state = engine.state().await;
    assert!(!state.faking_sleep);
    assert_eq!(state.mood, Mood::Happy);
}

#[tokio::test(start_paused = true)]
async fn play_dead_blocks_reentry_and_recovers_after_the_delay() {
    let api = MockApi::new();
    // Disable tricks so the recovery flourish cannot add noise.
    api.seed(keys::ALLOW_SHOWOFF, json!(false));
    let (engine, mut rx) = EngagementEngine::new(api.clone());

    engine.play_dead().await;
    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::AnimationSuspended { suspended: true })));
    assert_eq!(say_texts(&events), vec!["x_x"]);
    assert!(engine.state().await.playing_dead);

    // A second activation while flattened does nothing.
    engine.play_dead().await;
    assert!(drain(&mut rx).is_empty());

    tokio::time::sleep(PLAY_DEAD_RECOVERY + Duration::from_millis(100)).await;
    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::AnimationSuspended { suspended: false })));
    assert_eq!(say_texts(&events), vec!["Gotcha."]);
    assert!(!engine.state().await.playing_dead);
}

// ── Prefetch ───────────────────────────────────────────────

#[tokio::test]
async fn prefetched_lines_answer_without_a_generation_call() {
    let api = MockApi::new();
    let (engine, mut rx) = EngagementEngine::new(api.clone());

    for i in 0..4 {
        engine.push_prefetched(&format!("canned #{}", i)).await;
    }

    engine.say_something().await;
    let events = drain(&mut rx);
    assert_eq!(say_texts(&events), vec!["canned #0"]);
    assert_eq!(api.calls(), 0, "a stocked queue must not hit the network");
}

#[tokio::test(start_paused = true)]
async fn empty_queue_generates_once_then_refills_to_the_floor() {
    let api = MockApi::new();
    let (engine, mut rx) = EngagementEngine::new(api.clone());

    engine.say_something().await;
    let events = drain(&mut rx);
    assert_eq!(say_texts(&events), vec!["fresh line #1"]);
    assert_eq!(api.calls(), 1, "exactly one synchronous call for the reply");

    // Let the background batch land.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.prefetch_len().await, 2);
    assert_eq!(api.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn failed_prefetch_enqueues_nothing_and_unblocks_the_next_batch() {
    let api = MockApi::new();
    api.fail_generation();
    let (engine, mut rx) = EngagementEngine::new(api.clone());

    engine.say_something().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.prefetch_len().await, 0);

    // The in-flight flag was released: another say triggers a new batch.
    let calls_before = api.calls();
    engine.say_something().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(api.calls() > calls_before);
    drain(&mut rx);
}

// ── Failure handling ───────────────────────────────────────

#[tokio::test]
async fn generation_failure_becomes_an_apology_without_a_retry() {
    let api = MockApi::new();
    api.fail_generation();
    let (engine, mut rx) = EngagementEngine::new(api.clone());

    engine.say_something().await;
    let events = drain(&mut rx);
    let texts = say_texts(&events);
    assert_eq!(texts.len(), 1);
    assert!(
        texts[0].contains("I failed to think:"),
        "got: {}",
        texts[0]
    );
    assert_eq!(api.calls(), 1, "no retry within the same call");
}

#[tokio::test]
async fn transport_failure_shows_the_static_line() {
    struct DeadApi;
    #[async_trait]
    impl CompanionApi for DeadApi {
        async fn generate(&self, _request: GenerateRequest) -> Result<String, ApiError> {
            Err(ApiError::Transport("connection refused".to_string()))
        }
        async fn get_memory(&self, _key: &str) -> Result<Option<Value>, ApiError> {
            Ok(None)
        }
        async fn set_memory(&self, _key: &str, _value: Value) -> Result<(), ApiError> {
            Ok(())
        }
        async fn goodbye(&self) -> Result<String, ApiError> {
            Err(ApiError::Transport("connection refused".to_string()))
        }
        async fn quit(&self) -> Result<(), ApiError> {
            Ok(())
        }
    }

    let (engine, mut rx) = EngagementEngine::new(Arc::new(DeadApi));
    engine.say_something().await;
    let texts = say_texts(&drain(&mut rx));
    assert_eq!(texts, vec!["(static) connection refused"]);
}

// ── Streak accounting ──────────────────────────────────────

const HOUR_MS: i64 = 60 * 60 * 1000;

#[tokio::test]
async fn stale_timestamp_on_a_new_day_grows_the_streak() {
    let api = MockApi::new();
    let now_ms = chrono::Utc::now().timestamp_millis();
    api.seed(keys::LAST_INTERACTION_DAY, json!("2024-01-01"));
    api.seed(keys::LAST_INTERACTION_AT, json!(now_ms - 7 * HOUR_MS));
    api.seed(keys::SEEN_ONBOARDING, json!(true));

    let (engine, mut rx) = EngagementEngine::new(api.clone());
    engine.start().await;
    drain(&mut rx);

    assert_eq!(engine.streak_days().await, 1);
    assert_eq!(api.stored(keys::IGNORED_STREAK_DAYS), Some(json!(1)));
}

#[tokio::test]
async fn recent_timestamp_on_a_new_day_does_not_grow_the_streak() {
    let api = MockApi::new();
    let now_ms = chrono::Utc::now().timestamp_millis();
    api.seed(keys::LAST_INTERACTION_DAY, json!("2024-01-01"));
    api.seed(keys::LAST_INTERACTION_AT, json!(now_ms - HOUR_MS));
    api.seed(keys::SEEN_ONBOARDING, json!(true));

    let (engine, mut rx) = EngagementEngine::new(api.clone());
    engine.start().await;
    drain(&mut rx);

    assert_eq!(engine.streak_days().await, 0);
    assert_eq!(api.stored(keys::IGNORED_STREAK_DAYS), None);
}

#[tokio::test]
async fn explicit_click_closes_out_a_running_streak() {
    let api = MockApi::new();
    api.seed(keys::IGNORED_STREAK_DAYS, json!(3));
    api.seed(keys::LAST_INTERACTION_DAY, json!(today()));
    api.seed(keys::SEEN_ONBOARDING, json!(true));

    let (engine, mut rx) = EngagementEngine::new(api.clone());
    engine.start().await;
    assert_eq!(engine.streak_days().await, 3);

    engine.clicked().await;
    drain(&mut rx);

    assert_eq!(engine.streak_days().await, 0);
    assert_eq!(api.stored(keys::IGNORED_STREAK_DAYS), Some(json!(0)));
    assert!(api.stored(keys::LAST_INTERACTION_AT).is_some());
}

#[tokio::test(start_paused = true)]
async fn long_streak_sulks_sooner_and_clingier() {
    let api = MockApi::new();
    api.seed(keys::IGNORED_STREAK_DAYS, json!(5));
    api.seed(keys::LAST_INTERACTION_DAY, json!(today()));
    api.seed(keys::SEEN_ONBOARDING, json!(true));

    let (engine, mut rx) = EngagementEngine::new(api.clone());
    engine.start().await;
    drain(&mut rx);
    let calls_after_start = api.calls();

    engine.pointer_moved().await;
    // Streak 5 → sulk after max(8s, 25s − 10s) = 15s.
    tokio::time::sleep(Duration::from_secs(16)).await;

    assert!(api.calls() > calls_after_start);
    let request = api.last_request.lock().unwrap().clone().unwrap();
    assert!(
        request.prompt.contains("clingy and dramatic but sweet"),
        "got: {}",
        request.prompt
    );
}

// ── Jokes and persona context ──────────────────────────────

#[tokio::test]
async fn generation_bumps_usage_for_exactly_the_jokes_sent() {
    let api = MockApi::new();
    api.seed(keys::INSIDE_JOKES, json!(["alpha", "beta", "gamma"]));
    let (engine, mut rx) = EngagementEngine::new(api.clone());

    let start_ms = chrono::Utc::now().timestamp_millis();
    engine.say_something().await;
    drain(&mut rx);

    let request = api.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(request.inside_jokes, vec!["alpha", "beta"]);

    let usage = profile::usage_from(api.stored(keys::INSIDE_JOKES_USAGE));
    assert_eq!(usage["alpha"].count, 1);
    assert_eq!(usage["beta"].count, 1);
    assert!(usage["alpha"].last_used >= start_ms);
    assert!(usage["beta"].last_used >= start_ms);
    assert!(!usage.contains_key("gamma"));
}

#[tokio::test]
async fn failed_generation_leaves_usage_untouched() {
    let api = MockApi::new();
    api.seed(keys::INSIDE_JOKES, json!(["alpha", "beta"]));
    api.fail_generation();
    let (engine, mut rx) = EngagementEngine::new(api.clone());

    engine.say_something().await;
    drain(&mut rx);

    assert_eq!(api.stored(keys::INSIDE_JOKES_USAGE), None);
}

#[tokio::test(start_paused = true)]
async fn selection_rotates_toward_the_least_recently_used_joke() {
    let api = MockApi::new();
    api.seed(keys::INSIDE_JOKES, json!(["alpha", "beta", "gamma"]));
    let (engine, mut rx) = EngagementEngine::new(api.clone());

    // First call consumes alpha and beta; the background refill that
    // follows must now prefer the untouched gamma.
    engine.say_something().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    drain(&mut rx);

    let request = api.last_request.lock().unwrap().clone().unwrap();
    assert!(
        request.inside_jokes.contains(&"gamma".to_string()),
        "got: {:?}",
        request.inside_jokes
    );
}

// ── Mood and onboarding ────────────────────────────────────

#[tokio::test]
async fn mood_cycles_in_the_fixed_order() {
    let api = MockApi::new();
    api.seed(keys::ALLOW_SHOWOFF, json!(false));
    let (engine, mut rx) = EngagementEngine::new(api.clone());

    let mut seen = Vec::new();
    for _ in 0..6 {
        engine.cycle_mood().await;
    }
    for event in drain(&mut rx) {
        if let EngineEvent::MoodChanged { mood } = event {
            seen.push(mood);
        }
    }
    assert_eq!(
        seen,
        vec![
            Mood::Curious,
            Mood::Bored,
            Mood::Annoyed,
            Mood::Excited,
            Mood::Sleepy,
            Mood::Happy
        ]
    );
}

#[tokio::test]
async fn first_run_seeds_the_handshake_joke_and_greets() {
    let api = MockApi::new();
    let (engine, mut rx) = EngagementEngine::new(api.clone());
    engine.start().await;
    drain(&mut rx);

    assert_eq!(
        api.stored(keys::INSIDE_JOKES),
        Some(json!(["secret bounce"]))
    );
    assert_eq!(api.stored(keys::SEEN_ONBOARDING), Some(json!(true)));

    let request = api.last_request.lock().unwrap().clone().unwrap();
    assert!(request.prompt.contains("secret bounce"));
    assert!(request.prompt.contains("Jelly Commander"));
}

#[tokio::test]
async fn returning_user_gets_a_check_in_instead_of_onboarding() {
    let api = MockApi::new();
    api.seed(keys::SEEN_ONBOARDING, json!(true));
    api.seed(keys::NICKNAME, json!("Captain"));
    let (engine, mut rx) = EngagementEngine::new(api.clone());
    engine.start().await;
    drain(&mut rx);

    let request = api.last_request.lock().unwrap().clone().unwrap();
    assert!(request.prompt.contains("quick check-in"));
    assert_eq!(request.nickname, "Captain");
}

#[tokio::test(start_paused = true)]
async fn teasing_toggle_silences_the_sulk_line_but_not_the_gesture() {
    let api = MockApi::new();
    api.seed(keys::ALLOW_TEASING, json!(false));
    let (engine, mut rx) = EngagementEngine::new(api.clone());

    engine.pointer_moved().await;
    tokio::time::sleep(Duration::from_secs(26)).await;

    let events = drain(&mut rx);
    assert_eq!(gestures(&events), vec![Gesture::TurnAway]);
    assert!(say_texts(&events).is_empty());
    assert!(engine.pending_sleep_timer().await, "the nap is still armed");
}

#[tokio::test(start_paused = true)]
async fn clingy_toggle_disables_the_fake_sleep() {
    let api = MockApi::new();
    api.seed(keys::ALLOW_CLINGY, json!(false));
    let (engine, mut rx) = EngagementEngine::new(api.clone());

    engine.pointer_moved().await;
    tokio::time::sleep(Duration::from_secs(40)).await;
    drain(&mut rx);

    assert!(!engine.state().await.faking_sleep);
    assert_eq!(engine.state().await.mood, Mood::Happy);
}

// ── Goodbye ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn goodbye_says_the_farewell_then_quits() {
    let api = MockApi::new();
    let (engine, mut rx) = EngagementEngine::new(api.clone());

    engine.request_goodbye().await;
    let events = drain(&mut rx);
    assert_eq!(say_texts(&events), vec!["Farewell, gooey overlord."]);
    assert!(!events.iter().any(|e| matches!(e, EngineEvent::Quit)));

    tokio::time::sleep(Duration::from_secs(1)).await;
    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, EngineEvent::Quit)));
}
