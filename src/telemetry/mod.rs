//! Telemetry module for logging, metrics and capture events.
//!
//! Provides:
//! - Logging configuration and initialization
//! - Counters fed by capture events
//! - The observer seam the capture and decode paths report through

mod logging;
mod metrics;
mod observer;

pub(crate) use logging::is_known_level;
pub use logging::{init_logging, LogConfig};
pub use metrics::{Counter, MetricsRegistry};
pub use observer::{CaptureEvent, CaptureObserver, NullObserver, TracingObserver};
