//! Outgoing control commands and the configuration bindings that produce them.

use serde::{Deserialize, Serialize};

use crate::geometry::Point2D;
use crate::gesture::GestureChannel;
use crate::landmark::TimestampMs;

/// What the system-control collaborator should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    PointerMove,
    LeftClick,
    RightClick,
    DoubleClick,
    ScrollUp,
    ScrollDown,
    KeyPress,
    ToggleMode,
}

impl ActionKind {
    /// Click-class actions count against the click rate limit.
    pub fn is_click(&self) -> bool {
        matches!(self, Self::LeftClick | Self::RightClick | Self::DoubleClick)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PointerMove => "pointer_move",
            Self::LeftClick => "left_click",
            Self::RightClick => "right_click",
            Self::DoubleClick => "double_click",
            Self::ScrollUp => "scroll_up",
            Self::ScrollDown => "scroll_down",
            Self::KeyPress => "key_press",
            Self::ToggleMode => "toggle_mode",
        }
    }
}

/// Command payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "payload", rename_all = "snake_case")]
pub enum ActionPayload {
    /// Screen position in pixels.
    Position { x: f64, y: f64 },
    /// Key code, e.g. `"enter"` or `"media_play_pause"`.
    Key { code: String },
    /// Scroll distance in lines (positive = up).
    Scroll { lines: i32 },
    /// Act at the current OS pointer position.
    None,
}

/// An outgoing control instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCommand {
    pub kind: ActionKind,

    #[serde(flatten)]
    pub payload: ActionPayload,

    #[serde(rename = "t")]
    pub timestamp_ms: TimestampMs,

    /// Gesture that triggered the command; `None` for pointer moves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<GestureChannel>,
}

impl ActionCommand {
    pub fn pointer_move(position: Point2D, timestamp_ms: TimestampMs) -> Self {
        Self {
            kind: ActionKind::PointerMove,
            payload: ActionPayload::Position {
                x: position.x,
                y: position.y,
            },
            timestamp_ms,
            channel: None,
        }
    }

    /// Target position if the payload carries one.
    pub fn position(&self) -> Option<Point2D> {
        match self.payload {
            ActionPayload::Position { x, y } => Some(Point2D::new(x, y)),
            _ => None,
        }
    }
}

/// Configured action for a gesture channel.
///
/// Serialized as a bare string for unit bindings (`"left_click"`) and as
/// `{"key": "enter"}` for key presses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionBinding {
    None,
    LeftClick,
    RightClick,
    DoubleClick,
    ScrollUp,
    ScrollDown,
    ToggleMode,
    Key(String),
}

impl ActionBinding {
    /// Action kind this binding produces, or `None` for unbound channels.
    pub fn kind(&self) -> Option<ActionKind> {
        match self {
            Self::None => None,
            Self::LeftClick => Some(ActionKind::LeftClick),
            Self::RightClick => Some(ActionKind::RightClick),
            Self::DoubleClick => Some(ActionKind::DoubleClick),
            Self::ScrollUp => Some(ActionKind::ScrollUp),
            Self::ScrollDown => Some(ActionKind::ScrollDown),
            Self::ToggleMode => Some(ActionKind::ToggleMode),
            Self::Key(_) => Some(ActionKind::KeyPress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_accepts_string_and_key_forms() {
        let click: ActionBinding = serde_json::from_str("\"left_click\"").unwrap();
        assert_eq!(click, ActionBinding::LeftClick);

        let key: ActionBinding = serde_json::from_str("{\"key\":\"enter\"}").unwrap();
        assert_eq!(key, ActionBinding::Key("enter".to_string()));
        assert_eq!(key.kind(), Some(ActionKind::KeyPress));

        let none: ActionBinding = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(none.kind(), None);
    }

    #[test]
    fn test_unknown_binding_is_rejected() {
        assert!(serde_json::from_str::<ActionBinding>("\"launch_rockets\"").is_err());
    }

    #[test]
    fn test_command_json_layout() {
        let cmd = ActionCommand::pointer_move(Point2D::new(10.0, 20.0), 500);
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"kind\":\"pointer_move\""));
        assert!(json.contains("\"payload\":\"position\""));
        assert!(json.contains("\"x\":10.0"));
        assert!(json.contains("\"t\":500"));
        assert!(!json.contains("channel"));
        assert_eq!(cmd.position(), Some(Point2D::new(10.0, 20.0)));
    }

    #[test]
    fn test_click_class() {
        assert!(ActionKind::DoubleClick.is_click());
        assert!(!ActionKind::ScrollUp.is_click());
        assert!(!ActionKind::PointerMove.is_click());
    }
}
