//! Hardware report de-noising
//!
//! The knob reports its state on every sensor tick, most of them identical.
//! Only reports that differ from the last forwarded one reach the knob-queue.

use crate::drivers::KnobState;
use parking_lot::Mutex;

/// Remembers the last forwarded report of one knob
///
/// Called from the driver's own I/O context, hence the lock.
#[derive(Default)]
pub struct Denoiser {
    last: Mutex<Option<KnobState>>,
}

impl Denoiser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the state the knob reported on connect
    pub fn prime(&self, state: &KnobState) {
        *self.last.lock() = Some(state.clone());
    }

    /// Returns true if `state` should be forwarded
    ///
    /// `KnobState` equality covers position, press nonce and the config echo
    /// (generation, range, text, hue). No floating point field takes part.
    pub fn accept(&self, state: &KnobState) -> bool {
        let mut last = self.last.lock();
        if last.as_ref() == Some(state) {
            return false;
        }
        *last = Some(state.clone());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::ConfigEcho;

    fn state(position: i32, press_nonce: u32, text: &str) -> KnobState {
        KnobState {
            position,
            press_nonce,
            config: ConfigEcho {
                position_nonce: 1,
                min_position: 0,
                max_position: 10,
                text: text.to_string(),
                led_hue: 0,
            },
        }
    }

    #[test]
    fn test_identical_samples_forwarded_once() {
        let denoiser = Denoiser::new();

        assert!(denoiser.accept(&state(3, 0, "Volume")));
        assert!(!denoiser.accept(&state(3, 0, "Volume")));
        assert!(!denoiser.accept(&state(3, 0, "Volume")));
    }

    #[test]
    fn test_any_tracked_change_is_forwarded() {
        let denoiser = Denoiser::new();
        denoiser.prime(&state(3, 0, "Volume"));

        assert!(!denoiser.accept(&state(3, 0, "Volume")));
        assert!(denoiser.accept(&state(4, 0, "Volume")));
        assert!(denoiser.accept(&state(4, 1, "Volume")));
        assert!(denoiser.accept(&state(4, 1, "Brightness")));

        let mut regenerated = state(4, 1, "Brightness");
        regenerated.config.position_nonce = 2;
        assert!(denoiser.accept(&regenerated));
    }

    #[test]
    fn test_back_to_previous_value_is_forwarded() {
        let denoiser = Denoiser::new();

        assert!(denoiser.accept(&state(3, 0, "Volume")));
        assert!(denoiser.accept(&state(4, 0, "Volume")));
        assert!(denoiser.accept(&state(3, 0, "Volume")));
    }
}
