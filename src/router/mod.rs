//! Router module - the fixed set of worker queues
//!
//! Four unbounded FIFO queues connect the workers:
//! - knob-queue: view changes and hardware events for the knob manager
//! - action-queue: action invocations for the action executor
//! - trigger-queue: window focus events for the trigger matcher
//! - state-queue: value samples for the state cache
//!
//! Each queue has exactly one consumer. [`RouterHandle`] is the cloneable
//! sending side shared by everyone else. Sending `Terminate` on a queue stops
//! its consumer only after everything queued ahead of it has been processed.

mod messages;


pub use messages::{
    ActionInvoke, ActionMessage, HardwareEvent, KnobId, KnobMessage, StateMessage,
    TriggerMessage,
};

use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Sending side of all four queues
///
/// All methods are fire-and-forget: a queue whose consumer has already
/// exited silently drops the message.
#[derive(Clone)]
pub struct RouterHandle {
    knob_tx: mpsc::UnboundedSender<KnobMessage>,
    action_tx: mpsc::UnboundedSender<ActionMessage>,
    trigger_tx: mpsc::UnboundedSender<TriggerMessage>,
    state_tx: mpsc::UnboundedSender<StateMessage>,
}

/// Receiving side of all four queues, split up between the workers at startup
pub struct RouterReceivers {
    pub knob_rx: mpsc::UnboundedReceiver<KnobMessage>,
    pub action_rx: mpsc::UnboundedReceiver<ActionMessage>,
    pub trigger_rx: mpsc::UnboundedReceiver<TriggerMessage>,
    pub state_rx: mpsc::UnboundedReceiver<StateMessage>,
}

/// Create the four queues
pub fn channels() -> (RouterHandle, RouterReceivers) {
    let (knob_tx, knob_rx) = mpsc::unbounded_channel();
    let (action_tx, action_rx) = mpsc::unbounded_channel();
    let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = mpsc::unbounded_channel();

    (
        RouterHandle {
            knob_tx,
            action_tx,
            trigger_tx,
            state_tx,
        },
        RouterReceivers {
            knob_rx,
            action_rx,
            trigger_rx,
            state_rx,
        },
    )
}

impl RouterHandle {
    // =========================================================================
    // knob-queue
    // =========================================================================

    /// Request a view change; `None` targets every connected knob
    pub fn set_view(&self, view_name: impl Into<String>, knob_id: Option<KnobId>) {
        self.send_knob(KnobMessage::ViewChange {
            view_name: view_name.into(),
            knob_id,
        });
    }

    /// Forward a hardware report to the knob manager
    pub fn hardware_event(&self, knob_id: KnobId, event: HardwareEvent) {
        self.send_knob(KnobMessage::Hardware { knob_id, event });
    }

    pub fn send_knob(&self, msg: KnobMessage) {
        if self.knob_tx.send(msg).is_err() {
            trace!("knob-queue closed, message dropped");
        }
    }

    // =========================================================================
    // action-queue
    // =========================================================================

    /// Perform a configured action with the knob reading that caused it
    ///
    /// Returns false when the action executor has already stopped.
    pub fn do_action(&self, invoke: ActionInvoke) -> bool {
        let action_name = invoke.action_name.clone();
        let delivered = self.send_action(ActionMessage::Invoke(invoke));
        if !delivered {
            debug!(action = %action_name, "Action executor stopped, invocation dropped");
        }
        delivered
    }

    pub fn send_action(&self, msg: ActionMessage) -> bool {
        if self.action_tx.send(msg).is_err() {
            trace!("action-queue closed, message dropped");
            return false;
        }
        true
    }

    // =========================================================================
    // trigger-queue
    // =========================================================================

    /// Report a focused window (empty strings when nothing is focused)
    pub fn window_focused(&self, title: impl Into<String>, appname: impl Into<String>) {
        self.send_trigger(TriggerMessage::WindowFocused {
            title: title.into(),
            appname: appname.into(),
        });
    }

    pub fn send_trigger(&self, msg: TriggerMessage) {
        if self.trigger_tx.send(msg).is_err() {
            trace!("trigger-queue closed, message dropped");
        }
    }

    // =========================================================================
    // state-queue
    // =========================================================================

    /// Publish a raw sample from a value-source worker
    pub fn push_sample(&self, action_name: impl Into<String>, value: f64) {
        self.send_state(StateMessage::ValueSample {
            action_name: action_name.into(),
            value,
        });
    }

    pub fn send_state(&self, msg: StateMessage) {
        if self.state_tx.send(msg).is_err() {
            trace!("state-queue closed, message dropped");
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    pub fn terminate_knob(&self) {
        self.send_knob(KnobMessage::Terminate);
    }

    pub fn terminate_action(&self) {
        let _ = self.send_action(ActionMessage::Terminate);
    }

    pub fn terminate_trigger(&self) {
        self.send_trigger(TriggerMessage::Terminate);
    }

    pub fn terminate_state(&self) {
        self.send_state(StateMessage::Terminate);
    }

    /// Send the sentinel to every queue, upstream workers first
    pub fn terminate_all(&self) {
        self.terminate_trigger();
        self.terminate_action();
        self.terminate_knob();
        self.terminate_state();
    }
}
