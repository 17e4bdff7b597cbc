//! Message types carried by the router queues
//!
//! Each queue has its own closed message enum so every consumer loop has a
//! single exhaustive `match`. `Terminate` is the drain-then-stop sentinel.

use crate::drivers::KnobState;

/// Stable identifier of a physical knob
pub type KnobId = String;

/// Messages consumed by the knob connection manager
#[derive(Debug, Clone, PartialEq)]
pub enum KnobMessage {
    /// Apply a view to one knob, or to every connected knob
    ViewChange {
        view_name: String,
        knob_id: Option<KnobId>,
    },
    /// A de-noised state report from knob hardware
    Hardware {
        knob_id: KnobId,
        event: HardwareEvent,
    },
    Terminate,
}

/// Hardware report kinds
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareEvent {
    State(KnobState),
}

/// Messages consumed by the action executor
#[derive(Debug, Clone, PartialEq)]
pub enum ActionMessage {
    Invoke(ActionInvoke),
    Terminate,
}

/// Request to run a named action with the knob reading that caused it
#[derive(Debug, Clone, PartialEq)]
pub struct ActionInvoke {
    pub knob_id: KnobId,
    pub action_name: String,
    pub delta: i32,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

/// Messages consumed by the trigger matcher
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerMessage {
    /// Focus moved to a window; both fields empty when nothing is focused
    WindowFocused { title: String, appname: String },
    Terminate,
}

/// Messages consumed by the state cache updater
#[derive(Debug, Clone, PartialEq)]
pub enum StateMessage {
    ValueSample { action_name: String, value: f64 },
    Terminate,
}
