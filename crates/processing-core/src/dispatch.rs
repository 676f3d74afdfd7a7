//! Gesture → action translation.

use std::collections::BTreeMap;

use gazectl_frame_model::{
    ActionBinding, ActionCommand, ActionPayload, GestureChannel, GestureEvent,
};

use crate::cursor_smooth::CursorState;

/// Immutable channel → binding table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionTable {
    bindings: BTreeMap<GestureChannel, ActionBinding>,
}

impl ActionTable {
    /// Build the table from the `actions` configuration map. `none`
    /// bindings are dropped so lookups only see real actions.
    pub fn from_config(actions: &BTreeMap<GestureChannel, ActionBinding>) -> Self {
        let bindings = actions
            .iter()
            .filter(|(_, binding)| binding.kind().is_some())
            .map(|(channel, binding)| (*channel, binding.clone()))
            .collect();
        Self { bindings }
    }

    pub fn get(&self, channel: GestureChannel) -> Option<&ActionBinding> {
        self.bindings.get(&channel)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Builds action commands from confirmed gestures and cursor updates.
#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    table: ActionTable,
    scroll_lines: i32,
}

impl ActionDispatcher {
    pub fn new(table: ActionTable, scroll_lines: i32) -> Self {
        Self {
            table,
            scroll_lines,
        }
    }

    pub fn table(&self) -> &ActionTable {
        &self.table
    }

    /// Command for a confirmed gesture, or `None` if the channel is unbound.
    pub fn dispatch(&self, event: &GestureEvent) -> Option<ActionCommand> {
        let binding = self.table.get(event.channel)?;
        let kind = binding.kind()?;

        let payload = match binding {
            ActionBinding::Key(code) => ActionPayload::Key { code: code.clone() },
            ActionBinding::ScrollUp => ActionPayload::Scroll {
                lines: self.scroll_lines,
            },
            ActionBinding::ScrollDown => ActionPayload::Scroll {
                lines: -self.scroll_lines,
            },
            _ if kind.is_click() => match event.cursor {
                Some(p) => ActionPayload::Position { x: p.x, y: p.y },
                None => ActionPayload::None,
            },
            _ => ActionPayload::None,
        };

        Some(ActionCommand {
            kind,
            payload,
            timestamp_ms: event.timestamp_ms,
            channel: Some(event.channel),
        })
    }

    /// Pointer move for a new cursor state.
    pub fn pointer_move(&self, cursor: &CursorState) -> ActionCommand {
        ActionCommand::pointer_move(cursor.position, cursor.timestamp_ms)
    }
}
