//! Per-knob connection state

use crate::config::ViewConfig;
use crate::drivers::{KnobDriver, KnobState};
use std::sync::Arc;

/// One connected knob
///
/// Owned by the knob manager loop; nothing else reads or writes it.
pub struct KnobConnection {
    pub driver: Arc<dyn KnobDriver>,
    pub prev_position: i32,
    /// Generation of the last config pushed to the hardware
    pub position_nonce: u32,
    pub press_nonce: u32,
    /// Replaced on every view change, never mutated in place
    pub current_view: Option<Arc<ViewConfig>>,
}

impl KnobConnection {
    /// Connection initialized from the first status the hardware reported
    pub fn new(driver: Arc<dyn KnobDriver>, first_state: &KnobState) -> Self {
        Self {
            driver,
            prev_position: first_state.position,
            position_nonce: first_state.config.position_nonce,
            press_nonce: first_state.press_nonce,
            current_view: None,
        }
    }

    pub fn view_name(&self) -> Option<&str> {
        self.current_view.as_deref().map(|v| v.name.as_str())
    }

    pub fn knob_action(&self) -> Option<&str> {
        self.current_view.as_deref()?.knob_action.as_deref()
    }

    pub fn press_action(&self) -> Option<&str> {
        self.current_view.as_deref()?.press_action.as_deref()
    }

    /// Advance to the next config generation
    pub fn next_nonce(&mut self) -> u32 {
        self.position_nonce = self.position_nonce.wrapping_add(1);
        self.position_nonce
    }
}
