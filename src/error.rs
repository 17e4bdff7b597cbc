//! Per-message faults raised inside the worker loops
//!
//! None of these stop a loop: they are logged at the loop boundary and the
//! offending message is dropped.

use crate::config::InterfaceKind;
use crate::scaling::ScalingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("unknown view '{0}'")]
    UnknownView(String),

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("unknown knob '{0}'")]
    UnknownKnob(String),

    #[error("no connector registered for {0} interfaces")]
    NoConnector(InterfaceKind),

    #[error(transparent)]
    Scaling(#[from] ScalingError),
}
