//! Keyboard input.
//!
//! The public types carry no winit types; the window runtime translates
//! platform events through [`translate_window_event`].

mod platform;
mod state;
mod types;

pub use platform::translate_window_event;
pub use state::InputState;
pub use types::{InputEvent, Key, KeyState, Modifiers};
