//! Core types used throughout the resilience engine.
//!
//! This module defines error classification, severity levels and the
//! request context attached to recorded errors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a failure.
///
/// Every [`ServiceError`](crate::core::ServiceError) variant maps onto exactly
/// one kind, so retry policies and severity defaults are checked by the
/// compiler rather than by matching on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Transport failure.
    #[serde(rename = "NetworkError")]
    Network,
    /// The call exceeded its deadline.
    #[serde(rename = "TimeoutError")]
    Timeout,
    /// The downstream service is temporarily unavailable.
    #[serde(rename = "ServiceUnavailable")]
    ServiceUnavailable,
    /// The request was rejected as invalid.
    #[serde(rename = "ValidationError")]
    Validation,
    /// The input could not be processed.
    #[serde(rename = "MalformedInput")]
    MalformedInput,
    /// A circuit breaker denied the call.
    #[serde(rename = "CircuitOpen")]
    CircuitOpen,
    /// Internal failure in the collaborator.
    #[serde(rename = "InternalError")]
    Internal,
    /// Anything else.
    #[serde(rename = "Other")]
    Other,
}

impl ErrorKind {
    /// All kinds, in declaration order.
    pub const ALL: [ErrorKind; 8] = [
        Self::Network,
        Self::Timeout,
        Self::ServiceUnavailable,
        Self::Validation,
        Self::MalformedInput,
        Self::CircuitOpen,
        Self::Internal,
        Self::Other,
    ];

    /// Returns the canonical name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "NetworkError",
            Self::Timeout => "TimeoutError",
            Self::ServiceUnavailable => "ServiceUnavailable",
            Self::Validation => "ValidationError",
            Self::MalformedInput => "MalformedInput",
            Self::CircuitOpen => "CircuitOpen",
            Self::Internal => "InternalError",
            Self::Other => "Other",
        }
    }

    /// Returns `true` for failures that may succeed when repeated.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::ServiceUnavailable
        )
    }

    /// Severity used when an error of this kind is recorded without an
    /// explicit severity.
    pub fn default_severity(&self) -> Severity {
        match self {
            Self::Validation | Self::MalformedInput => Severity::Low,
            Self::Network | Self::Timeout | Self::Other => Severity::Medium,
            Self::ServiceUnavailable | Self::CircuitOpen => Severity::High,
            Self::Internal => Severity::Critical,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a recorded error.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Cosmetic or caller-induced failures.
    Low,
    /// Ordinary operational failures.
    #[default]
    Medium,
    /// Failures that degrade a feature.
    High,
    /// Failures that need immediate attention.
    Critical,
}

impl Severity {
    /// Returns the severity as a numeric score (0-100).
    pub fn score(&self) -> u8 {
        match self {
            Self::Low => 25,
            Self::Medium => 50,
            Self::High => 75,
            Self::Critical => 100,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Context about the request during which an error occurred.
///
/// This carries metadata about who triggered the failing call, useful for
/// triage and audit logging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// User identifier, if authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Request or correlation ID for tracing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Client IP address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// Client user agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Creates a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the user ID.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the request ID.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Sets the client IP.
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Sets the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::default(), Severity::Medium);
    }

    #[test]
    fn test_kind_serde_names() {
        let json = serde_json::to_string(&ErrorKind::Network).unwrap();
        assert_eq!(json, "\"NetworkError\"");
        let kind: ErrorKind = serde_json::from_str("\"ServiceUnavailable\"").unwrap();
        assert_eq!(kind, ErrorKind::ServiceUnavailable);

        for kind in ErrorKind::ALL {
            let round: ErrorKind =
                serde_json::from_str(&format!("\"{}\"", kind.as_str())).unwrap();
            assert_eq!(round, kind);
        }
    }

    #[test]
    fn test_transient_kinds() {
        let transient: Vec<_> = ErrorKind::ALL.iter().filter(|k| k.is_transient()).collect();
        assert_eq!(transient.len(), 3);
        assert!(!ErrorKind::CircuitOpen.is_transient());
    }

    #[test]
    fn test_request_context_builder() {
        let ctx = RequestContext::new()
            .with_user_id("user-42")
            .with_request_id("req-1")
            .with_ip("10.0.0.1");

        assert_eq!(ctx.user_id.as_deref(), Some("user-42"));
        assert_eq!(ctx.request_id.as_deref(), Some("req-1"));
        assert_eq!(ctx.ip.as_deref(), Some("10.0.0.1"));
        assert!(ctx.user_agent.is_none());
    }
}
