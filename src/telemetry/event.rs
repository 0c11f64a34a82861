//! Recorded error events.

use crate::core::{ErrorKind, RequestContext, ServiceError, Severity};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Description of the failure carried by an [`ErrorEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Classification of the failure.
    pub kind: ErrorKind,

    /// Label used for aggregation; equals the kind name unless the error
    /// carried its own label.
    pub kind_name: String,

    /// Human-readable message.
    pub message: String,

    /// Optional backtrace or call chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    /// Optional application-specific code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorDetails {
    /// Attaches a backtrace or call chain.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl From<&ServiceError> for ErrorDetails {
    fn from(error: &ServiceError) -> Self {
        Self {
            kind: error.kind(),
            kind_name: error.kind_name().to_string(),
            message: error.to_string(),
            stack: None,
            code: error.code().map(str::to_string),
        }
    }
}

/// A single observed failure.
///
/// Events are created once by the telemetry store and only change when
/// they are marked as handled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// Unique event ID.
    pub id: Uuid,

    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,

    /// Service the failing call belonged to.
    pub service: String,

    /// Operation within the service.
    pub operation: String,

    /// What went wrong.
    pub error: ErrorDetails,

    /// Who or what triggered the call.
    pub context: RequestContext,

    /// How bad it is.
    pub severity: Severity,

    /// Whether an operator has dealt with it.
    pub handled: bool,

    /// Operator notes on how it was resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,

    /// When it was marked as handled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handled_at: Option<DateTime<Utc>>,
}

impl ErrorEvent {
    /// Creates an unhandled event with a fresh ID.
    pub fn new(
        timestamp: DateTime<Utc>,
        service: impl Into<String>,
        operation: impl Into<String>,
        error: ErrorDetails,
        context: RequestContext,
        severity: Severity,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            service: service.into(),
            operation: operation.into(),
            error,
            context,
            severity,
            handled: false,
            resolution: None,
            handled_at: None,
        }
    }

    /// Returns how long the event took to be handled.
    pub fn time_to_resolution(&self) -> Option<chrono::Duration> {
        self.handled_at.map(|at| at - self.timestamp)
    }

    pub(crate) fn mark_handled(&mut self, at: DateTime<Utc>, resolution: Option<String>) {
        self.handled = true;
        self.resolution = resolution;
        self.handled_at = Some(at);
    }
}
