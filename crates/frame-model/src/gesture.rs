//! Discrete facial gesture classifications.

use serde::{Deserialize, Serialize};

use crate::geometry::Point2D;
use crate::landmark::TimestampMs;

/// Independent gesture channels. Each channel has its own cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureChannel {
    BlinkLeft,
    BlinkRight,
    BlinkBoth,
    BlinkBothLong,
    EyebrowRaise,
    EyebrowLower,
    Smile,
    JawOpen,
}

impl GestureChannel {
    pub const ALL: [GestureChannel; 8] = [
        GestureChannel::BlinkLeft,
        GestureChannel::BlinkRight,
        GestureChannel::BlinkBoth,
        GestureChannel::BlinkBothLong,
        GestureChannel::EyebrowRaise,
        GestureChannel::EyebrowLower,
        GestureChannel::Smile,
        GestureChannel::JawOpen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlinkLeft => "blink_left",
            Self::BlinkRight => "blink_right",
            Self::BlinkBoth => "blink_both",
            Self::BlinkBothLong => "blink_both_long",
            Self::EyebrowRaise => "eyebrow_raise",
            Self::EyebrowLower => "eyebrow_lower",
            Self::Smile => "smile",
            Self::JawOpen => "jaw_open",
        }
    }

    /// Blink channels share the blink cooldown.
    pub fn is_blink(&self) -> bool {
        matches!(
            self,
            Self::BlinkLeft | Self::BlinkRight | Self::BlinkBoth | Self::BlinkBothLong
        )
    }
}

impl std::fmt::Display for GestureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Blink duration class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlinkLength {
    Short,
    Long,
}

impl BlinkLength {
    /// `Short` strictly below `long_blink_ms`; the boundary itself is `Long`.
    pub fn classify(duration_ms: u64, long_blink_ms: u64) -> Self {
        if duration_ms < long_blink_ms {
            Self::Short
        } else {
            Self::Long
        }
    }
}

/// A raw or confirmed gesture classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureEvent {
    pub channel: GestureChannel,

    /// Normalized strength of the gesture (how far past threshold).
    pub intensity: f64,

    /// Timestamp of the frame that produced the event.
    pub timestamp_ms: TimestampMs,

    /// Source frame id.
    pub frame_id: u64,

    /// Set by the debounce gate on promotion.
    #[serde(default)]
    pub confirmed: bool,

    /// Consecutive frames backing this classification.
    #[serde(default = "default_span")]
    pub span_frames: u32,

    /// Closure duration for blink channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Cursor position captured when the event was confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Point2D>,
}

fn default_span() -> u32 {
    1
}

impl GestureEvent {
    /// A raw, single-frame classification.
    pub fn raw(
        channel: GestureChannel,
        intensity: f64,
        timestamp_ms: TimestampMs,
        frame_id: u64,
    ) -> Self {
        Self {
            channel,
            intensity,
            timestamp_ms,
            frame_id,
            confirmed: false,
            span_frames: 1,
            duration_ms: None,
            cursor: None,
        }
    }

    /// A completed blink episode.
    pub fn blink(
        channel: GestureChannel,
        intensity: f64,
        timestamp_ms: TimestampMs,
        frame_id: u64,
        duration_ms: u64,
        span_frames: u32,
    ) -> Self {
        Self {
            duration_ms: Some(duration_ms),
            span_frames,
            ..Self::raw(channel, intensity, timestamp_ms, frame_id)
        }
    }

    pub fn with_span(mut self, span_frames: u32) -> Self {
        self.span_frames = span_frames;
        self
    }

    /// Duration class for blink events, if this is one.
    pub fn blink_length(&self, long_blink_ms: u64) -> Option<BlinkLength> {
        self.duration_ms
            .map(|d| BlinkLength::classify(d, long_blink_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blink_boundary_is_long() {
        assert_eq!(BlinkLength::classify(499, 500), BlinkLength::Short);
        assert_eq!(BlinkLength::classify(500, 500), BlinkLength::Long);
        assert_eq!(BlinkLength::classify(501, 500), BlinkLength::Long);
    }

    #[test]
    fn test_channel_serializes_snake_case() {
        let json = serde_json::to_string(&GestureChannel::BlinkBothLong).unwrap();
        assert_eq!(json, "\"blink_both_long\"");
        assert_eq!(GestureChannel::EyebrowRaise.to_string(), "eyebrow_raise");
    }

    #[test]
    fn test_blink_channels() {
        let blinks: Vec<_> = GestureChannel::ALL
            .iter()
            .filter(|c| c.is_blink())
            .collect();
        assert_eq!(blinks.len(), 4);
        assert!(!GestureChannel::Smile.is_blink());
    }

    #[test]
    fn test_blink_event_carries_duration() {
        let event = GestureEvent::blink(GestureChannel::BlinkBoth, 0.8, 1000, 30, 520, 16);
        assert_eq!(event.blink_length(500), Some(BlinkLength::Long));
        assert_eq!(event.span_frames, 16);
        assert!(!event.confirmed);
        assert_eq!(
            GestureEvent::raw(GestureChannel::Smile, 0.2, 0, 0).blink_length(500),
            None
        );
    }
}
