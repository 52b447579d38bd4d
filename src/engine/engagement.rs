//! The engagement engine — mood, attention timers, prefetch and streak.
//!
//! Owns every piece of companion state the presentation shell reacts to.
//! Input gestures come in as method calls; everything the shell should
//! render leaves as an `EngineEvent` on the channel handed out at
//! construction. All timing lives here: the ignore watch, the fake-sleep
//! follow-up and the play-dead recovery are plain tokio tasks whose
//! handles are replaced (old one aborted) on every reschedule.

use crate::engine::jokes::{self, DEFAULT_MAX_JOKES};
use crate::engine::mood::Mood;
use crate::engine::prefetch::PrefetchQueue;
use crate::engine::streak::{self, InteractionClock};
use crate::llm::provider::GenerateRequest;
use crate::memory::profile::{self, keys};
use crate::transport::{ApiError, CompanionApi};
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// How long the companion stays flattened after playing dead.
pub const PLAY_DEAD_RECOVERY: Duration = Duration::from_millis(1600);
/// Pause between the farewell line and the actual quit.
const QUIT_LINGER: Duration = Duration::from_millis(900);

const WAKE_LINE: &str = "I was totally awake. Obviously.";
const SLEEP_LINE: &str = "zZz…";
const PLAY_DEAD_LINE: &str = "x_x";
const RECOVER_LINE: &str = "Gotcha.";
const FALLBACK_GOODBYE: &str = "Bye!";

const SAY_PROMPTS: [&str; 3] = [
    "Share a tiny mood comment right now.",
    "Blurt a curious random fact in 1 sentence.",
    "Light teasing: a playful, harmless quip about the user's cursor. Keep it friendly.",
];

const SULK_PROMPT: &str = "Say a short sulky one-liner about being ignored, playful not mean.";
const SULK_PROMPT_CLINGY: &str =
    "Say a short sulky one-liner about being ignored for days, clingy and dramatic but sweet.";
const GREETING_PROMPT: &str = "Greet the user warmly and mention our new \"secret bounce\" \
     handshake. Keep it short. Also ask: Should I call you Captain, Boss, or Jelly Commander?";
const CHECK_IN_PROMPT: &str = "Say a tiny hello suited for a quick check-in.";

/// Streak length at which the sulk tone turns clingy.
const CLINGY_STREAK_DAYS: u32 = 3;

// ── Events ─────────────────────────────────────────────────

/// Animation cue for the shell. The engine only names the move; curves and
/// rendering stay on the presentation side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gesture {
    TurnAway,
    Pop,
    HoverWave,
    BounceTrick,
    Wave,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Say { text: String },
    MoodChanged { mood: Mood },
    Gesture { gesture: Gesture },
    AnimationSuspended { suspended: bool },
    Quit,
}

// ── State ──────────────────────────────────────────────────

/// The mood label plus the two orthogonal flags that gate interaction
/// handling without changing the shown mood.
#[derive(Debug, Clone, Copy)]
pub struct EngagementState {
    pub mood: Mood,
    pub faking_sleep: bool,
    pub playing_dead: bool,
}

impl Default for EngagementState {
    fn default() -> Self {
        Self {
            mood: Mood::Happy,
            faking_sleep: false,
            playing_dead: false,
        }
    }
}

// ── Engine ─────────────────────────────────────────────────

pub struct EngagementEngine {
    weak: Weak<Self>,
    api: Arc<dyn CompanionApi>,
    events: mpsc::UnboundedSender<EngineEvent>,
    state: Mutex<EngagementState>,
    prefetch: Mutex<PrefetchQueue>,
    idle_timer: Mutex<Option<JoinHandle<()>>>,
    sleep_timer: Mutex<Option<JoinHandle<()>>>,
    interaction_clock: Mutex<InteractionClock>,
    streak_days: Mutex<u32>,
    /// Serializes read-modify-write of the persisted joke usage map so
    /// overlapping generation calls cannot lose each other's bumps.
    usage_guard: Mutex<()>,
}

impl EngagementEngine {
    /// Build an engine over the given transport. The receiver carries
    /// everything the presentation shell should render.
    pub fn new(
        api: Arc<dyn CompanionApi>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            api,
            events: tx,
            state: Mutex::new(EngagementState::default()),
            prefetch: Mutex::new(PrefetchQueue::new()),
            idle_timer: Mutex::new(None),
            sleep_timer: Mutex::new(None),
            interaction_clock: Mutex::new(InteractionClock::new()),
            streak_days: Mutex::new(0),
            usage_guard: Mutex::new(()),
        });
        (engine, rx)
    }

    /// Startup sequence: settle the streak, greet, arm the ignore watch
    /// and warm the prefetch queue.
    pub async fn start(&self) {
        self.refresh_streak().await;
        self.first_run_init().await;
        self.schedule_idle_watch().await;
        self.top_up_prefetch().await;
    }

    pub async fn state(&self) -> EngagementState {
        *self.state.lock().await
    }

    pub async fn streak_days(&self) -> u32 {
        *self.streak_days.lock().await
    }

    // ── Inputs from the shell ──────────────────────────────

    /// Pointer moved anywhere over the companion's window.
    pub async fn pointer_moved(&self) {
        self.schedule_idle_watch().await;
        self.record_interaction(false).await;
    }

    /// Direct click. Waking from a fake sleep takes precedence over
    /// everything else a click could mean.
    pub async fn clicked(&self) {
        let woke = {
            let mut state = self.state.lock().await;
            if state.faking_sleep {
                state.faking_sleep = false;
                state.mood = Mood::Happy;
                true
            } else {
                false
            }
        };

        if woke {
            self.emit(EngineEvent::MoodChanged { mood: Mood::Happy });
            self.say(WAKE_LINE);
        } else if !self.state.lock().await.playing_dead {
            self.emit(EngineEvent::Gesture {
                gesture: Gesture::Pop,
            });
        }

        self.schedule_idle_watch().await;
        self.record_interaction(true).await;
    }

    /// Pointer entered the companion itself.
    pub async fn hovered(&self) {
        self.emit(EngineEvent::Gesture {
            gesture: Gesture::HoverWave,
        });
    }

    /// Advance the mood one step in the fixed cycle.
    pub async fn cycle_mood(&self) {
        let mood = {
            let mut state = self.state.lock().await;
            state.mood = state.mood.next();
            state.mood
        };
        self.emit(EngineEvent::MoodChanged { mood });
        self.flourish().await;
    }

    /// Double activation: flatten, wait, pop back.
    pub async fn play_dead(&self) {
        {
            let mut state = self.state.lock().await;
            if state.playing_dead {
                return;
            }
            state.playing_dead = true;
        }
        self.emit(EngineEvent::AnimationSuspended { suspended: true });
        self.say(PLAY_DEAD_LINE);

        let Some(engine) = self.weak.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            tokio::time::sleep(PLAY_DEAD_RECOVERY).await;
            engine.state.lock().await.playing_dead = false;
            engine.emit(EngineEvent::AnimationSuspended { suspended: false });
            engine.say(RECOVER_LINE);
            engine.flourish().await;
        });
    }

    /// Blurt something. Prefetched lines answer instantly; only an empty
    /// queue costs a round trip.
    pub async fn say_something(&self) {
        let ready = self.prefetch.lock().await.pop();
        match ready {
            Some(text) => self.emit(EngineEvent::Say { text }),
            None => self.speak(pick_say_prompt()).await,
        }
        self.top_up_prefetch().await;
    }

    /// Farewell: show the goodbye line, then quit after a short linger so
    /// the user can read it.
    pub async fn request_goodbye(&self) {
        let text = match self.api.goodbye().await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("[Engine] goodbye line failed: {}", e);
                FALLBACK_GOODBYE.to_string()
            }
        };
        self.emit(EngineEvent::Say { text });

        let Some(engine) = self.weak.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            tokio::time::sleep(QUIT_LINGER).await;
            if let Err(e) = engine.api.quit().await {
                tracing::warn!("[Engine] quit failed: {}", e);
            }
            engine.emit(EngineEvent::Quit);
        });
    }

    // ── Ignore watch ───────────────────────────────────────

    /// Arm (or re-arm) the ignore watch. The previous timer — and any
    /// armed nap — is cancelled; exactly one of each is ever pending.
    async fn schedule_idle_watch(&self) {
        let Some(engine) = self.weak.upgrade() else {
            return;
        };
        let delay = streak::sulk_delay(self.streak_days().await);

        if let Some(handle) = self.sleep_timer.lock().await.take() {
            handle.abort();
        }
        let mut slot = self.idle_timer.lock().await;
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.on_ignored().await;
        }));
    }

    /// The ignore watch fired: sulk, and arm the nap timer.
    async fn on_ignored(&self) {
        self.emit(EngineEvent::Gesture {
            gesture: Gesture::TurnAway,
        });

        let streak = self.streak_days().await;
        if self.flag_default_true(keys::ALLOW_TEASING).await {
            let prompt = if streak >= CLINGY_STREAK_DAYS {
                SULK_PROMPT_CLINGY
            } else {
                SULK_PROMPT
            };
            self.speak(prompt).await;
        }

        let Some(engine) = self.weak.upgrade() else {
            return;
        };
        let delay = streak::sleep_delay(streak);
        let mut slot = self.sleep_timer.lock().await;
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.on_still_ignored().await;
        }));
    }

    /// The nap timer fired: pretend to fall asleep. Static line on
    /// purpose — no generation call from here.
    async fn on_still_ignored(&self) {
        if !self.flag_default_true(keys::ALLOW_CLINGY).await {
            return;
        }
        {
            let mut state = self.state.lock().await;
            if state.playing_dead {
                return;
            }
            state.faking_sleep = true;
            state.mood = Mood::Sleepy;
        }
        self.emit(EngineEvent::MoodChanged { mood: Mood::Sleepy });
        self.say(SLEEP_LINE);
    }

    // ── Generation ─────────────────────────────────────────

    /// Generate and display, absorbing failure into a local line.
    async fn speak(&self, prompt: &str) {
        match self.generate_line(prompt).await {
            Ok(text) => self.emit(EngineEvent::Say { text }),
            Err(ApiError::Transport(msg)) => self.say(&format!("(static) {}", msg)),
            Err(e) => self.say(&format!("(whispers) I failed to think: {}", e)),
        }
    }

    /// One generation round trip with the current persona context.
    /// Selected jokes get their usage bumped only when the call succeeds.
    async fn generate_line(&self, prompt: &str) -> Result<String, ApiError> {
        let nickname = profile::nickname_from(self.read_memory(keys::NICKNAME).await);
        let all_jokes = profile::jokes_from(self.read_memory(keys::INSIDE_JOKES).await);
        let usage = profile::usage_from(self.read_memory(keys::INSIDE_JOKES_USAGE).await);
        let selected = jokes::select_inside_jokes(&all_jokes, &usage, DEFAULT_MAX_JOKES);
        let mood = self.state.lock().await.mood;

        let text = self
            .api
            .generate(GenerateRequest {
                prompt: prompt.to_string(),
                mood: mood.as_str().to_string(),
                nickname,
                inside_jokes: selected.clone(),
            })
            .await?;

        if !selected.is_empty() {
            self.bump_joke_usage(&selected).await;
        }
        Ok(text)
    }

    async fn bump_joke_usage(&self, used: &[String]) {
        let _guard = self.usage_guard.lock().await;
        let mut usage = profile::usage_from(self.read_memory(keys::INSIDE_JOKES_USAGE).await);
        jokes::record_joke_use(&mut usage, used, chrono::Utc::now().timestamp_millis());
        match serde_json::to_value(&usage) {
            Ok(value) => self.write_memory(keys::INSIDE_JOKES_USAGE, value).await,
            Err(e) => tracing::warn!("[Engine] could not serialize joke usage: {}", e),
        }
    }

    // ── Prefetch ───────────────────────────────────────────

    /// Refill the queue toward its floor in the background. The queue's
    /// own bookkeeping guarantees one batch at a time; a failed call
    /// simply contributes nothing.
    async fn top_up_prefetch(&self) {
        let Some(engine) = self.weak.upgrade() else {
            return;
        };
        let Some(calls) = self.prefetch.lock().await.begin_refill() else {
            return;
        };

        tokio::spawn(async move {
            let lines = futures::future::join_all((0..calls).map(|_| {
                let engine = engine.clone();
                async move { engine.generate_line(pick_say_prompt()).await }
            }))
            .await;

            let mut queue = engine.prefetch.lock().await;
            for line in lines {
                match line {
                    Ok(text) => queue.push(text),
                    Err(e) => tracing::debug!("[Engine] prefetch skipped: {}", e),
                }
            }
            queue.finish_refill();
        });
    }

    // ── Streak + interaction bookkeeping ───────────────────

    /// Compare the persisted interaction record against today; a day
    /// spent away (with a stale or missing timestamp) grows the streak.
    async fn refresh_streak(&self) {
        let stored_day = profile::day_from(self.read_memory(keys::LAST_INTERACTION_DAY).await);
        let last_at = profile::timestamp_from(self.read_memory(keys::LAST_INTERACTION_AT).await);
        let mut streak = profile::streak_from(self.read_memory(keys::IGNORED_STREAK_DAYS).await);

        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        let now_ms = chrono::Utc::now().timestamp_millis();
        if streak::opens_ignored_day(stored_day.as_deref(), last_at, &today, now_ms) {
            streak += 1;
            self.write_memory(keys::IGNORED_STREAK_DAYS, json!(streak)).await;
            tracing::info!("[Engine] ignored for another day — streak now {}", streak);
        }
        *self.streak_days.lock().await = streak;
    }

    /// Persist the interaction timestamp, throttled for passive movement.
    /// An explicit click is authoritative: it always writes and closes
    /// out any running ignored streak.
    async fn record_interaction(&self, explicit: bool) {
        let now = Instant::now();
        let due = {
            let mut clock = self.interaction_clock.lock().await;
            if explicit {
                clock.explicit_write(now);
                true
            } else {
                clock.passive_write_due(now)
            }
        };
        if !due {
            return;
        }

        self.write_memory(
            keys::LAST_INTERACTION_AT,
            json!(chrono::Utc::now().timestamp_millis()),
        )
        .await;
        self.write_memory(
            keys::LAST_INTERACTION_DAY,
            json!(chrono::Local::now().format("%Y-%m-%d").to_string()),
        )
        .await;

        if explicit {
            let cleared = {
                let mut streak = self.streak_days.lock().await;
                if *streak != 0 {
                    *streak = 0;
                    true
                } else {
                    false
                }
            };
            if cleared {
                self.write_memory(keys::IGNORED_STREAK_DAYS, json!(0)).await;
            }
        }
    }

    // ── Onboarding ─────────────────────────────────────────

    async fn first_run_init(&self) {
        let seen = profile::flag_from(self.read_memory(keys::SEEN_ONBOARDING).await, false);
        if !seen {
            self.write_memory(keys::INSIDE_JOKES, json!(["secret bounce"])).await;
            self.write_memory(keys::SEEN_ONBOARDING, json!(true)).await;
            self.speak(GREETING_PROMPT).await;
        } else {
            self.speak(CHECK_IN_PROMPT).await;
        }
    }

    // ── Helpers ────────────────────────────────────────────

    /// Chance-based trick, gated by the show-off toggle.
    async fn flourish(&self) {
        if !self.flag_default_true(keys::ALLOW_SHOWOFF).await {
            return;
        }
        let roll: f32 = rand::thread_rng().gen();
        if roll < 0.15 {
            self.emit(EngineEvent::Gesture {
                gesture: Gesture::BounceTrick,
            });
        } else if roll < 0.3 {
            self.emit(EngineEvent::Gesture {
                gesture: Gesture::Wave,
            });
        }
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    fn say(&self, text: &str) {
        self.emit(EngineEvent::Say {
            text: text.to_string(),
        });
    }

    /// Read one profile field; a failed read degrades to "never set".
    async fn read_memory(&self, key: &str) -> Option<Value> {
        match self.api.get_memory(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("[Engine] memory read '{}' failed: {}", key, e);
                None
            }
        }
    }

    /// Write one profile field; a failure is logged and dropped.
    async fn write_memory(&self, key: &str, value: Value) {
        if let Err(e) = self.api.set_memory(key, value).await {
            tracing::warn!("[Engine] memory write '{}' failed: {}", key, e);
        }
    }

    async fn flag_default_true(&self, key: &str) -> bool {
        profile::flag_from(self.read_memory(key).await, true)
    }

    // ── Test support ───────────────────────────────────────

    #[cfg(test)]
    pub(crate) async fn pending_idle_timer(&self) -> bool {
        self.idle_timer
            .lock()
            .await
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    #[cfg(test)]
    pub(crate) async fn pending_sleep_timer(&self) -> bool {
        self.sleep_timer
            .lock()
            .await
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    #[cfg(test)]
    pub(crate) async fn prefetch_len(&self) -> usize {
        self.prefetch.lock().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn push_prefetched(&self, line: &str) {
        self.prefetch.lock().await.push(line.to_string());
    }
}

fn pick_say_prompt() -> &'static str {
    SAY_PROMPTS[rand::thread_rng().gen_range(0..SAY_PROMPTS.len())]
}
