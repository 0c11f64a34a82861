//! Destinations for periodic reports.

use crate::core::EngineResult;
use crate::report::types::ErrorReport;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Receives reports produced by the scheduler.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use resilience_engine::report::{ErrorReport, ReportSink};
///
/// struct Webhook { url: String }
///
/// #[async_trait]
/// impl ReportSink for Webhook {
///     fn name(&self) -> &str { "webhook" }
///
///     async fn publish(&self, report: &ErrorReport) -> EngineResult<()> {
///         // POST the report to self.url
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Returns the sink name used in logs.
    fn name(&self) -> &str;

    /// Delivers a report.
    async fn publish(&self, report: &ErrorReport) -> EngineResult<()>;
}

/// Logs the report summary through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReportSink;

#[async_trait]
impl ReportSink for LogReportSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn publish(&self, report: &ErrorReport) -> EngineResult<()> {
        let top = report.top_errors.first().map(|t| t.kind.as_str());
        tracing::info!(
            report_id = %report.id,
            period_start = %report.period.start,
            period_end = %report.period.end,
            total_errors = report.summary.total_errors,
            error_rate = report.summary.error_rate,
            critical_errors = report.summary.critical_errors,
            resolved_errors = report.summary.resolved_errors,
            top_error = ?top,
            open_breakers = report.open_breakers().count(),
            "Error report"
        );
        Ok(())
    }
}

/// Keeps the most recent reports in memory.
#[derive(Debug)]
pub struct MemoryReportSink {
    capacity: usize,
    reports: Mutex<VecDeque<ErrorReport>>,
}

impl MemoryReportSink {
    /// Creates a sink retaining at most `capacity` reports.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            reports: Mutex::new(VecDeque::new()),
        }
    }

    /// Returns the retained reports, oldest first.
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports.lock().iter().cloned().collect()
    }

    /// Returns the most recent report.
    pub fn latest(&self) -> Option<ErrorReport> {
        self.reports.lock().back().cloned()
    }

    /// Returns the number of retained reports.
    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    /// Returns `true` if nothing has been published yet.
    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl Default for MemoryReportSink {
    fn default() -> Self {
        Self::new(24)
    }
}

#[async_trait]
impl ReportSink for MemoryReportSink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn publish(&self, report: &ErrorReport) -> EngineResult<()> {
        let mut reports = self.reports.lock();
        if reports.len() == self.capacity {
            reports.pop_front();
        }
        reports.push_back(report.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ReportPeriod, ReportSummary};
    use chrono::Utc;
    use std::time::Duration;
    use uuid::Uuid;

    fn report() -> ErrorReport {
        let now = Utc::now();
        ErrorReport {
            id: Uuid::new_v4(),
            period: ReportPeriod::new(now, now),
            summary: ReportSummary {
                total_errors: 0,
                error_rate: 0.0,
                critical_errors: 0,
                resolved_errors: 0,
                average_resolution_time: Duration::ZERO,
            },
            top_errors: Vec::new(),
            circuit_breakers: Vec::new(),
            generated_at: now,
        }
    }

    #[tokio::test]
    async fn test_memory_sink_keeps_most_recent() {
        let sink = MemoryReportSink::new(2);
        let reports: Vec<_> = (0..3).map(|_| report()).collect();
        for r in &reports {
            sink.publish(r).await.unwrap();
        }

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.reports()[0].id, reports[1].id);
        assert_eq!(sink.latest().unwrap().id, reports[2].id);
    }

    #[tokio::test]
    async fn test_log_sink_accepts_report() {
        assert!(LogReportSink.publish(&report()).await.is_ok());
    }
}
