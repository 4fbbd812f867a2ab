use crate::frame::DEFAULT_SLOT_COUNT;

/// Frame loop configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Frames in flight. Must be at least 1; 1 fully serializes CPU and GPU.
    pub slots: usize,

    /// Colour the overlay target is cleared to before the overlay draws.
    pub clear_color: [f32; 4],

    /// Whether the overlay collaborator records each frame.
    pub overlay: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            slots: DEFAULT_SLOT_COUNT,
            clear_color: [0.0, 0.0, 0.0, 0.0],
            overlay: true,
        }
    }
}

impl EngineConfig {
    pub fn with_slots(mut self, slots: usize) -> Self {
        self.slots = slots;
        self
    }
}
