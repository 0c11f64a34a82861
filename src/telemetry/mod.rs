//! Error telemetry.
//!
//! The store keeps every recorded [`ErrorEvent`] in memory until it ages
//! past the retention period, alongside per-second request counts used as
//! the denominator for error ratios.

mod event;
mod filter;
mod store;
mod traffic;

pub use event::{ErrorDetails, ErrorEvent};
pub use filter::EventFilter;
pub use store::{ErrorTelemetryStore, RateSample};
pub use traffic::TrafficLog;
