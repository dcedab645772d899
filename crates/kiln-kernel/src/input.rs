//! Frame-polled key input.
//!
//! The host translates its platform input events into [`InputState::press`]
//! calls and clears the state at the end of every frame. Queries are
//! edge-triggered: a key held across frames reports pressed only on the
//! frame its press event arrived.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Keys the host exposes for binding. Function keys plus a small set of
/// modifiers/controls, enough for tool bindings like the reload trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Key {
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    Escape,
    Tab,
    Space,
    Enter,
    Backspace,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Per-frame key press state.
#[derive(Debug, Default)]
pub struct InputState {
    pressed_this_frame: HashSet<Key>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a press event for the current frame.
    pub fn press(&mut self, key: Key) {
        self.pressed_this_frame.insert(key);
    }

    /// Whether `key` went down during the current frame.
    pub fn was_pressed_this_frame(&self, key: Key) -> bool {
        self.pressed_this_frame.contains(&key)
    }

    /// Clears the frame's press events. Called by the host at frame end.
    pub fn clear(&mut self) {
        self.pressed_this_frame.clear();
    }
}
