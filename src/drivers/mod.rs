//! Knob hardware drivers
//!
//! The wire protocol to the physical knob lives behind two traits:
//! [`KnobConnector`] opens an interface and [`KnobDriver`] is the connected
//! handle. Connectors are registered per [`InterfaceKind`]; an interface kind
//! with no registered connector is reported as unavailable at startup.

use crate::config::{InterfaceConfig, InterfaceKind, KnobDisplayConfig};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub mod console;

pub use console::{ConsoleConnector, ConsoleKnob};

/// Callback type for hardware state reports
///
/// Drivers call this from their own I/O context for every state report the
/// hardware emits. It must not block.
pub type StateCallback = Arc<dyn Fn(KnobState) + Send + Sync>;

/// State report from a knob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnobState {
    pub position: i32,
    /// Incremented by the hardware on every button press
    pub press_nonce: u32,
    /// Echo of the configuration the hardware is currently running
    pub config: ConfigEcho,
}

/// The view-relevant part of the configuration echoed by the hardware
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigEcho {
    /// Generation of the applied configuration
    pub position_nonce: u32,
    pub min_position: i32,
    pub max_position: i32,
    pub text: String,
    pub led_hue: i32,
}

/// Configuration pushed to a knob when a view is applied
#[derive(Debug, Clone, PartialEq)]
pub struct KnobConfig {
    pub position: i32,
    /// Must differ from the running config's nonce for `position` to be adopted
    pub position_nonce: u32,
    pub min_position: i32,
    pub max_position: i32,
    pub position_width_radians: f32,
    pub detent_strength_unit: f32,
    pub snap_point: f32,
    pub text: String,
    pub detent_positions: Vec<i32>,
    pub snap_point_bias: f32,
    pub led_hue: i32,
}

impl KnobConfig {
    /// Build the hardware config for a view's display parameters
    pub fn from_display(display: &KnobDisplayConfig, position: i32, position_nonce: u32) -> Self {
        Self {
            position,
            position_nonce,
            min_position: display.min_position,
            max_position: display.max_position,
            position_width_radians: display.position_width_radians,
            detent_strength_unit: display.detent_strength_unit,
            snap_point: display.snap_point,
            text: display.text.clone(),
            detent_positions: display.detent_positions.clone(),
            snap_point_bias: display.snap_point_bias,
            led_hue: display.led_hue,
        }
    }

    /// What the hardware will echo back once this config is running
    pub fn echo(&self) -> ConfigEcho {
        ConfigEcho {
            position_nonce: self.position_nonce,
            min_position: self.min_position,
            max_position: self.max_position,
            text: self.text.clone(),
            led_hue: self.led_hue,
        }
    }
}

/// A connected knob
///
/// Note: All methods take &self to support Arc<dyn KnobDriver>.
#[async_trait]
pub trait KnobDriver: Send + Sync {
    /// Driver name for diagnostics
    fn name(&self) -> &str;

    /// Push a configuration to the hardware
    async fn apply_config(&self, config: &KnobConfig) -> Result<()>;

    /// Release the hardware
    async fn shutdown(&self) -> Result<()>;
}

/// A successfully opened interface
pub struct Connection {
    pub driver: Arc<dyn KnobDriver>,
    /// First status reported by the hardware
    pub initial_state: KnobState,
}

/// Opens knob interfaces of one kind
#[async_trait]
pub trait KnobConnector: Send + Sync {
    /// Connect to the interface; state reports after the initial one go to `on_state`
    async fn connect(
        &self,
        knob_id: &str,
        interface: &InterfaceConfig,
        on_state: StateCallback,
    ) -> Result<Connection>;
}

/// Connectors by interface kind
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<InterfaceKind, Arc<dyn KnobConnector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the connector for an interface kind, replacing any previous one
    pub fn register(&mut self, kind: InterfaceKind, connector: Arc<dyn KnobConnector>) {
        self.connectors.insert(kind, connector);
    }

    pub fn get(&self, kind: InterfaceKind) -> Option<Arc<dyn KnobConnector>> {
        self.connectors.get(&kind).cloned()
    }
}
