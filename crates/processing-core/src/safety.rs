//! Safety gate: click rate limiting, per-class cooldowns, confirmation of
//! sensitive actions, no-face auto-pause, and emergency stop.
//!
//! The safety manager has the last word on every outgoing action. While
//! paused it rejects everything, including pointer moves.

use std::collections::{HashMap, VecDeque};

use gazectl_common::{ActionCooldowns, SafetyConfig, SafetyViolation};
use gazectl_frame_model::{ActionKind, TimestampMs};
use serde::Serialize;

/// Length of the sliding click window.
const CLICK_WINDOW_MS: u64 = 1000;

/// Why the pipeline is paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    NoFace,
    EmergencyStop,
}

impl std::fmt::Display for PauseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoFace => f.write_str("no face"),
            Self::EmergencyStop => f.write_str("emergency stop"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SafetyState {
    Active,
    Paused(PauseReason),
}

impl SafetyState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Point-in-time view for telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SafetyStatus {
    pub state: SafetyState,
    /// Click-class actions accepted in the last second.
    pub clicks_in_window: usize,
    /// Time since the last valid frame, if one has been seen.
    pub ms_since_face: Option<u64>,
    /// Actions armed and waiting for their confirming repeat.
    pub pending_confirmations: usize,
}

/// Actions sharing a cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CooldownClass {
    Click,
    Scroll,
    Key,
}

impl CooldownClass {
    fn of(kind: ActionKind) -> Option<Self> {
        match kind {
            ActionKind::LeftClick | ActionKind::RightClick | ActionKind::DoubleClick => {
                Some(Self::Click)
            }
            ActionKind::ScrollUp | ActionKind::ScrollDown => Some(Self::Scroll),
            ActionKind::KeyPress => Some(Self::Key),
            ActionKind::PointerMove | ActionKind::ToggleMode => None,
        }
    }

    fn cooldown_ms(&self, cooldowns: &ActionCooldowns) -> u64 {
        match self {
            Self::Click => cooldowns.click_ms,
            Self::Scroll => cooldowns.scroll_ms,
            Self::Key => cooldowns.key_ms,
        }
    }
}

/// Rate limiter and pause controller.
#[derive(Debug, Clone)]
pub struct SafetyManager {
    max_clicks_per_second: u32,
    auto_pause_no_face_ms: u64,
    resume_stable_frames: u32,
    cooldowns: ActionCooldowns,
    require_confirmation: Vec<ActionKind>,
    confirmation_timeout_ms: u64,
    state: SafetyState,
    clicks: VecDeque<TimestampMs>,
    last_action: HashMap<CooldownClass, TimestampMs>,
    /// Armed action kinds and when their confirmation window closes.
    pending: HashMap<ActionKind, TimestampMs>,
    last_valid_ms: Option<TimestampMs>,
    /// Start of the current no-face timing window when no valid frame has
    /// been seen yet.
    watch_since_ms: Option<TimestampMs>,
    valid_streak: u32,
}

impl SafetyManager {
    pub fn new(config: &SafetyConfig) -> Self {
        Self {
            max_clicks_per_second: config.max_clicks_per_second,
            auto_pause_no_face_ms: config.auto_pause_no_face_ms,
            resume_stable_frames: config.resume_stable_frames.max(1),
            cooldowns: config.action_cooldowns,
            require_confirmation: config.require_confirmation.clone(),
            confirmation_timeout_ms: config.confirmation_timeout_ms,
            state: SafetyState::Active,
            clicks: VecDeque::new(),
            last_action: HashMap::new(),
            pending: HashMap::new(),
            last_valid_ms: None,
            watch_since_ms: None,
            valid_streak: 0,
        }
    }

    pub fn state(&self) -> SafetyState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    fn transition(&mut self, next: SafetyState) -> Option<SafetyState> {
        if self.state == next {
            return None;
        }
        tracing::info!(from = ?self.state, to = ?next, "Safety state changed");
        self.state = next;
        Some(next)
    }

    /// Record whether a frame was valid (face present, confident).
    ///
    /// A valid frame arriving after a gap longer than the auto-pause
    /// timeout pauses first and then counts as the first stabilization
    /// frame. Returns the new state when this frame caused a transition.
    pub fn observe_frame(&mut self, valid: bool, now_ms: TimestampMs) -> Option<SafetyState> {
        let paused = self.check_timeout(now_ms);
        if !valid {
            self.valid_streak = 0;
            return paused;
        }

        self.last_valid_ms = Some(now_ms);
        if self.state != SafetyState::Paused(PauseReason::NoFace) {
            return paused;
        }
        self.valid_streak += 1;
        if self.valid_streak >= self.resume_stable_frames {
            self.valid_streak = 0;
            return self.transition(SafetyState::Active);
        }
        paused
    }

    /// Pause if no valid frame arrived for longer than the auto-pause
    /// timeout. Call this even when no frames arrive.
    pub fn check_timeout(&mut self, now_ms: TimestampMs) -> Option<SafetyState> {
        if self.auto_pause_no_face_ms == 0 || !self.is_active() {
            return None;
        }
        let since = match self.last_valid_ms {
            Some(t) => t,
            None => *self.watch_since_ms.get_or_insert(now_ms),
        };
        if now_ms.saturating_sub(since) > self.auto_pause_no_face_ms {
            self.valid_streak = 0;
            return self.transition(SafetyState::Paused(PauseReason::NoFace));
        }
        None
    }

    /// Decide whether an action may go out at `now_ms`.
    ///
    /// Checks run in order: pause, class cooldown, click rate, confirmation.
    /// Only an accepted action starts its class cooldown and enters the
    /// click window.
    pub fn authorize(&mut self, kind: ActionKind, now_ms: TimestampMs) -> Result<(), SafetyViolation> {
        if let SafetyState::Paused(reason) = self.state {
            return Err(SafetyViolation::Paused {
                reason: reason.to_string(),
            });
        }

        let class = CooldownClass::of(kind);
        if let Some(class) = class {
            let cooldown = class.cooldown_ms(&self.cooldowns);
            if let Some(&last) = self.last_action.get(&class) {
                let elapsed = now_ms.saturating_sub(last);
                if elapsed < cooldown {
                    return Err(SafetyViolation::Cooldown {
                        action: kind.as_str().to_string(),
                        remaining_ms: cooldown - elapsed,
                    });
                }
            }
        }

        if kind.is_click() {
            self.evict(now_ms);
            if self.clicks.len() >= self.max_clicks_per_second as usize {
                tracing::warn!(
                    action = kind.as_str(),
                    limit = self.max_clicks_per_second,
                    "Click rate limit reached"
                );
                return Err(SafetyViolation::RateExceeded {
                    limit: self.max_clicks_per_second,
                });
            }
        }

        if self.require_confirmation.contains(&kind) {
            match self.pending.remove(&kind) {
                Some(deadline) if now_ms <= deadline => {
                    tracing::debug!(action = kind.as_str(), "Action confirmed");
                }
                _ => {
                    self.pending
                        .insert(kind, now_ms + self.confirmation_timeout_ms);
                    tracing::info!(action = kind.as_str(), "Action awaiting confirmation");
                    return Err(SafetyViolation::ConfirmationRequired {
                        action: kind.as_str().to_string(),
                        timeout_ms: self.confirmation_timeout_ms,
                    });
                }
            }
        }

        if let Some(class) = class {
            self.last_action.insert(class, now_ms);
        }
        if kind.is_click() {
            self.clicks.push_back(now_ms);
        }
        Ok(())
    }

    fn evict(&mut self, now_ms: TimestampMs) {
        while let Some(&t) = self.clicks.front() {
            if now_ms.saturating_sub(t) >= CLICK_WINDOW_MS {
                self.clicks.pop_front();
            } else {
                break;
            }
        }
    }

    /// Force an immediate pause that only [`resume`](Self::resume) lifts.
    pub fn emergency_stop(&mut self) -> Option<SafetyState> {
        tracing::warn!("Emergency stop engaged");
        self.transition(SafetyState::Paused(PauseReason::EmergencyStop))
    }

    /// Leave any pause and clear the click window, cooldowns and pending
    /// confirmations. The no-face timer restarts from the next observation.
    pub fn resume(&mut self) -> Option<SafetyState> {
        self.clicks.clear();
        self.last_action.clear();
        self.pending.clear();
        self.valid_streak = 0;
        self.last_valid_ms = None;
        self.watch_since_ms = None;
        self.transition(SafetyState::Active)
    }

    pub fn status(&mut self, now_ms: TimestampMs) -> SafetyStatus {
        self.evict(now_ms);
        self.pending.retain(|_, deadline| *deadline >= now_ms);
        SafetyStatus {
            state: self.state,
            clicks_in_window: self.clicks.len(),
            ms_since_face: self.last_valid_ms.map(|t| now_ms.saturating_sub(t)),
            pending_confirmations: self.pending.len(),
        }
    }
}
