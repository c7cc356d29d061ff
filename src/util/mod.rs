//! Shared utilities.

pub mod clock;
pub mod telemetry;

pub use clock::{Clock, FixedClock, SystemClock};
pub use telemetry::init_tracing;
