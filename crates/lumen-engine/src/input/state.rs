use std::collections::HashSet;

use super::types::{InputEvent, Key, KeyState, Modifiers};

/// Raw key state for one window.
///
/// `keys_down` is level state; `pressed` holds the keys that went down since
/// the last [`end_frame`](Self::end_frame).
#[derive(Debug, Default, Clone)]
pub struct InputState {
    pub modifiers: Modifiers,
    pub focused: bool,
    keys_down: HashSet<Key>,
    pressed: HashSet<Key>,
}

impl InputState {
    pub fn apply(&mut self, event: InputEvent) {
        match event {
            InputEvent::ModifiersChanged(m) => self.modifiers = m,

            InputEvent::Focused(focused) => {
                self.focused = focused;
                // Releases are not delivered to an unfocused window.
                if !focused {
                    self.keys_down.clear();
                    self.pressed.clear();
                }
            }

            InputEvent::Key { key, state, repeat } => match state {
                KeyState::Pressed => {
                    if self.keys_down.insert(key) && !repeat {
                        self.pressed.insert(key);
                    }
                }
                KeyState::Released => {
                    self.keys_down.remove(&key);
                }
            },
        }
    }

    pub fn key_down(&self, key: Key) -> bool {
        self.keys_down.contains(&key)
    }

    /// True if `key` went down during the current frame.
    pub fn pressed(&self, key: Key) -> bool {
        self.pressed.contains(&key)
    }

    /// `-1`, `0` or `1` from a pair of opposing keys.
    pub fn axis(&self, negative: Key, positive: Key) -> f32 {
        let mut v = 0.0;
        if self.key_down(negative) {
            v -= 1.0;
        }
        if self.key_down(positive) {
            v += 1.0;
        }
        v
    }

    /// Forgets per-frame edges. Held keys stay down.
    pub fn end_frame(&mut self) {
        self.pressed.clear();
    }
}
