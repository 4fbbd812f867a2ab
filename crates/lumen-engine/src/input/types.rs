/// Keys the engine and its controllers care about.
///
/// Everything else maps to `Unknown` with the platform key code.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Key {
    Escape,
    Space,
    Enter,

    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    BracketLeft,
    BracketRight,
    Minus,
    Equal,

    Shift,
    Control,

    W,
    A,
    S,
    D,
    Q,
    E,
    R,

    Unknown(u32),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum KeyState {
    Pressed,
    Released,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

/// Platform-independent input events, translated by the window runtime.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum InputEvent {
    Key {
        key: Key,
        state: KeyState,
        repeat: bool,
    },
    ModifiersChanged(Modifiers),
    Focused(bool),
}
