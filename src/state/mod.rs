//! State cache - latest values reported by the value-source commands
//!
//! Value-source workers push raw samples onto the state-queue; the
//! [`StateCache`] consumer stores them in the [`RawValueCache`]; readers go
//! through [`StateCacheHandle::get_value_for_action`], which maps the raw
//! sample into the caller's range.

mod actor;
mod cache;
pub mod sources;

pub use actor::StateCache;
pub use cache::{RawValueCache, StateCacheHandle, STARTUP_RETRY_COUNT, STARTUP_RETRY_DELAY};
pub use sources::{parse_value, SourceWorkers};
