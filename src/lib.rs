//! nobbler - configuration-driven event router for SmartKnob-style rotary knobs
//!
//! Four workers connected by queues: the knob manager, the action executor,
//! the state cache and the trigger matcher. See [`app::App`] for the wiring.

pub mod action;
pub mod app;
pub mod cli;
pub mod config;
pub mod drivers;
pub mod error;
pub mod knob;
pub mod paths;
pub mod router;
pub mod scaling;
pub mod shell;
pub mod state;
pub mod trigger;

pub use app::App;
pub use config::AppConfig;
pub use error::RouterError;
