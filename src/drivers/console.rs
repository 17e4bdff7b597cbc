//! Console driver - a virtual knob that logs every configuration it receives
//!
//! This is useful for:
//! - Running the router without hardware
//! - Driving the knob from the REPL (turn/press)
//! - Tests of the knob manager and the full worker pipeline

use crate::config::InterfaceConfig;
use crate::drivers::{
    Connection, KnobConfig, KnobConnector, KnobDriver, KnobState, StateCallback,
};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Virtual knob behaving like the hardware: it adopts a pushed position only
/// when the config nonce changes, and reports its state after every change.
pub struct ConsoleKnob {
    name: String,
    inner: Mutex<ConsoleKnobState>,
    on_state: Mutex<Option<StateCallback>>,
}

struct ConsoleKnobState {
    position: i32,
    press_nonce: u32,
    config: Option<KnobConfig>,
    applied_count: u64,
    shut_down: bool,
}

impl ConsoleKnob {
    /// Create a new ConsoleKnob with a given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(ConsoleKnobState {
                position: 0,
                press_nonce: 0,
                config: None,
                applied_count: 0,
                shut_down: false,
            }),
            on_state: Mutex::new(None),
        }
    }

    /// Current state as the hardware would report it
    pub fn state(&self) -> KnobState {
        let inner = self.inner.lock();
        KnobState {
            position: inner.position,
            press_nonce: inner.press_nonce,
            config: inner
                .config
                .as_ref()
                .map(KnobConfig::echo)
                .unwrap_or_default(),
        }
    }

    /// Last configuration pushed to this knob
    pub fn current_config(&self) -> Option<KnobConfig> {
        self.inner.lock().config.clone()
    }

    /// Number of configurations applied so far
    pub fn applied_count(&self) -> u64 {
        self.inner.lock().applied_count
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.lock().shut_down
    }

    /// Rotate by `steps` detents, bounded by the running config's range
    pub fn turn(&self, steps: i32) {
        {
            let mut inner = self.inner.lock();
            let (lo, hi) = inner
                .config
                .as_ref()
                .map(|c| (c.min_position, c.max_position))
                .unwrap_or((i32::MIN, i32::MAX));
            inner.position = inner.position.saturating_add(steps).clamp(lo, hi);
        }
        self.report();
    }

    /// Press the button once
    pub fn press(&self) {
        {
            let mut inner = self.inner.lock();
            inner.press_nonce = inner.press_nonce.wrapping_add(1);
        }
        self.report();
    }

    /// Emit the current state, as the hardware does on every sensor tick
    pub fn report(&self) {
        let callback = self.on_state.lock().clone();
        if let Some(callback) = callback {
            callback(self.state());
        }
    }

    fn set_callback(&self, callback: StateCallback) {
        *self.on_state.lock() = Some(callback);
    }
}

#[async_trait]
impl KnobDriver for ConsoleKnob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply_config(&self, config: &KnobConfig) -> Result<()> {
        let exec_num = {
            let mut inner = self.inner.lock();
            if inner.shut_down {
                warn!("⚠️  Console knob '{}' is shut down, ignoring config", self.name);
                return Ok(());
            }

            let nonce_changed = inner
                .config
                .as_ref()
                .map_or(true, |c| c.position_nonce != config.position_nonce);
            if nonce_changed {
                inner.position = config.position;
            }
            inner.position = inner
                .position
                .clamp(config.min_position, config.max_position);
            inner.config = Some(config.clone());
            inner.applied_count += 1;
            inner.applied_count
        };

        info!(
            "🎛️  [{}] Knob '{}' → \"{}\" position {} in [{}, {}] hue {} [apply #{}]",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            self.name,
            config.text,
            config.position,
            config.min_position,
            config.max_position,
            config.led_hue,
            exec_num
        );

        debug!(
            knob = self.name,
            nonce = config.position_nonce,
            detents = ?config.detent_positions,
            "ConsoleKnob config applied"
        );

        self.report();
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.shut_down {
            info!(
                "🛑 Console knob '{}' shutting down (applied {} configs)",
                self.name, inner.applied_count
            );
        }
        inner.shut_down = true;
        drop(inner);

        *self.on_state.lock() = None;
        Ok(())
    }
}

/// Connector creating one [`ConsoleKnob`] per `console` interface
#[derive(Default)]
pub struct ConsoleConnector {
    knobs: Mutex<Vec<(String, Arc<ConsoleKnob>)>>,
}

impl ConsoleConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Knobs created so far, with the knob id of their interface
    pub fn knobs(&self) -> Vec<(String, Arc<ConsoleKnob>)> {
        self.knobs.lock().clone()
    }

    /// Knob created for the interface with the given knob id
    pub fn knob(&self, knob_id: &str) -> Option<Arc<ConsoleKnob>> {
        self.knobs
            .lock()
            .iter()
            .find(|(id, _)| id == knob_id)
            .map(|(_, knob)| knob.clone())
    }
}

#[async_trait]
impl KnobConnector for ConsoleConnector {
    async fn connect(
        &self,
        knob_id: &str,
        interface: &InterfaceConfig,
        on_state: StateCallback,
    ) -> Result<Connection> {
        if let Some(device) = &interface.device {
            debug!("Console knob '{}' ignores device '{}'", knob_id, device);
        }

        let knob = Arc::new(ConsoleKnob::new(knob_id));
        let initial_state = knob.state();
        knob.set_callback(on_state);
        self.knobs.lock().push((knob_id.to_string(), knob.clone()));

        info!("🔌 Console knob '{}' connected", knob_id);

        Ok(Connection {
            driver: knob,
            initial_state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterfaceKind;

    fn test_config(position: i32, nonce: u32) -> KnobConfig {
        KnobConfig {
            position,
            position_nonce: nonce,
            min_position: 0,
            max_position: 10,
            position_width_radians: 0.2,
            detent_strength_unit: 1.0,
            snap_point: 1.1,
            text: "Test".to_string(),
            detent_positions: vec![],
            snap_point_bias: 0.0,
            led_hue: 42,
        }
    }

    fn recording_callback() -> (StateCallback, Arc<Mutex<Vec<KnobState>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: StateCallback = Arc::new(move |state| sink.lock().push(state));
        (callback, seen)
    }

    #[tokio::test]
    async fn test_console_knob_lifecycle() {
        let knob = ConsoleKnob::new("test");
        let (callback, seen) = recording_callback();
        knob.set_callback(callback);

        assert_eq!(knob.name(), "test");

        knob.apply_config(&test_config(5, 1)).await.unwrap();
        assert_eq!(knob.state().position, 5);
        assert_eq!(knob.state().config.text, "Test");
        assert_eq!(knob.applied_count(), 1);

        knob.turn(3);
        knob.turn(10);
        assert_eq!(knob.state().position, 10);

        knob.press();
        assert_eq!(knob.state().press_nonce, 1);

        // apply + two turns + press
        assert_eq!(seen.lock().len(), 4);

        knob.shutdown().await.unwrap();
        assert!(knob.is_shut_down());

        knob.press();
        assert_eq!(seen.lock().len(), 4);
    }

    #[tokio::test]
    async fn test_console_knob_keeps_position_for_same_nonce() {
        let knob = ConsoleKnob::new("nonce");

        knob.apply_config(&test_config(5, 1)).await.unwrap();
        knob.turn(2);
        knob.apply_config(&test_config(0, 1)).await.unwrap();
        assert_eq!(knob.state().position, 7);

        knob.apply_config(&test_config(0, 2)).await.unwrap();
        assert_eq!(knob.state().position, 0);
    }

    #[tokio::test]
    async fn test_console_connector_tracks_knobs() {
        let connector = ConsoleConnector::new();
        let (callback, _seen) = recording_callback();
        let interface = InterfaceConfig {
            kind: InterfaceKind::Console,
            id: Some("desk".to_string()),
            device: None,
        };

        let connection = connector
            .connect(&interface.knob_id(0), &interface, callback)
            .await
            .unwrap();
        assert_eq!(connection.driver.name(), "desk");
        assert_eq!(connection.initial_state.position, 0);

        assert!(connector.knob("desk").is_some());
        assert!(connector.knob("other").is_none());
        assert_eq!(connector.knobs().len(), 1);
    }
}
