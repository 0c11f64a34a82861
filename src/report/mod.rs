//! Periodic error reports.
//!
//! A report summarizes the error events of a period, ranks the most
//! frequent error kinds and snapshots every circuit breaker.

mod generator;
mod sink;
mod types;

pub use generator::ReportGenerator;
pub use sink::{LogReportSink, MemoryReportSink, ReportSink};
pub use types::{ErrorReport, ReportPeriod, ReportSummary, TopError};
