//! Temporal debouncing of raw gesture events.
//!
//! A raw event only becomes a confirmed gesture once its channel has been
//! present for `debounce_frames` consecutive frames. Each held episode is
//! confirmed at most once, and every channel has its own cooldown starting
//! at confirmation.

use std::collections::BTreeMap;

use gazectl_common::ExpressionConfig;
use gazectl_frame_model::{GestureChannel, GestureEvent, TimestampMs};

#[derive(Debug, Clone, Copy, Default)]
struct ChannelState {
    /// Consecutive frames the channel has been present.
    streak: u32,
    /// Confirmed during the current episode; cleared when the channel drops.
    latched: bool,
    last_confirmed_ms: Option<TimestampMs>,
}

/// Per-channel debounce and cooldown filter.
#[derive(Debug, Clone)]
pub struct DebounceGate {
    required_frames: u32,
    blink_cooldown_ms: u64,
    gesture_cooldown_ms: u64,
    channels: BTreeMap<GestureChannel, ChannelState>,
}

impl DebounceGate {
    pub fn new(required_frames: u32, blink_cooldown_ms: u64, gesture_cooldown_ms: u64) -> Self {
        Self {
            required_frames: required_frames.max(1),
            blink_cooldown_ms,
            gesture_cooldown_ms,
            channels: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &ExpressionConfig) -> Self {
        Self::new(
            config.debounce_frames,
            config.blink_cooldown_ms,
            config.gesture_cooldown_ms,
        )
    }

    pub fn cooldown_ms(&self, channel: GestureChannel) -> u64 {
        if channel.is_blink() {
            self.blink_cooldown_ms
        } else {
            self.gesture_cooldown_ms
        }
    }

    /// Whether `channel` is still cooling down at `now_ms`.
    pub fn in_cooldown(&self, channel: GestureChannel, now_ms: TimestampMs) -> bool {
        self.channels
            .get(&channel)
            .and_then(|s| s.last_confirmed_ms)
            .is_some_and(|t| now_ms.saturating_sub(t) < self.cooldown_ms(channel))
    }

    /// Process one frame's raw events and return those confirmed on this
    /// frame, in arrival order.
    ///
    /// Must be called once per classified frame, including frames with no
    /// events, so absent channels re-arm.
    pub fn process(&mut self, events: &[GestureEvent], now_ms: TimestampMs) -> Vec<GestureEvent> {
        let mut confirmed = Vec::new();

        for (channel, state) in self.channels.iter_mut() {
            if !events.iter().any(|e| e.channel == *channel) {
                state.streak = 0;
                state.latched = false;
            }
        }

        for event in events {
            let channel = event.channel;
            let cooling = self.in_cooldown(channel, now_ms);
            let required = self.required_frames;
            let state = self.channels.entry(channel).or_default();

            if state.latched {
                continue;
            }
            if cooling {
                state.streak = 0;
                tracing::trace!(channel = %channel, "Gesture dropped during cooldown");
                continue;
            }

            state.streak = if channel.is_blink() {
                event.span_frames
            } else {
                state.streak + 1
            };

            if state.streak >= required {
                state.latched = true;
                state.last_confirmed_ms = Some(now_ms);
                state.streak = 0;
                let mut event = event.clone();
                event.confirmed = true;
                confirmed.push(event);
            }
        }

        confirmed
    }

    /// Clear streaks, latches and cooldowns.
    pub fn reset(&mut self) {
        self.channels.clear();
    }
}
