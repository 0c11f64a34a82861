//! Error types for the resilience engine.
//!
//! Wrapped operations report failures as [`ServiceError`]; every variant maps
//! onto exactly one [`ErrorKind`], which drives retryability, severity and
//! report aggregation. Engine-level failures use [`EngineError`], and
//! degradation actions report through [`ActionError`].

use crate::core::types::{ErrorKind, Severity};

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// The error type returned by operations protected by the engine.
///
/// Operations wrapped by the circuit breaker or the retry executor must map
/// their own failures into one of these variants so that the engine can
/// classify them without inspecting message strings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    /// A transport-level failure talking to the downstream service.
    #[error("network error calling '{service}': {message}")]
    Network {
        /// Name of the downstream service.
        service: String,
        /// Description of the failure.
        message: String,
    },

    /// The downstream call did not complete in time.
    #[error("call to '{service}' timed out after {elapsed:?}")]
    Timeout {
        /// Name of the downstream service.
        service: String,
        /// How long the call ran before giving up.
        elapsed: Duration,
    },

    /// The downstream service reported itself unavailable.
    #[error("service '{service}' is unavailable: {reason}")]
    ServiceUnavailable {
        /// Name of the downstream service.
        service: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The request was rejected as invalid.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the violation.
        message: String,
    },

    /// The input could not be processed at all.
    #[error("malformed input: {reason}")]
    MalformedInput {
        /// What is wrong with the input.
        reason: String,
    },

    /// The circuit breaker denied the call without invoking the operation.
    #[error("circuit breaker '{name}' is open; retry after {retry_after}")]
    CircuitOpen {
        /// Name of the breaker.
        name: String,
        /// Earliest time a probe call will be admitted.
        retry_after: DateTime<Utc>,
    },

    /// An internal failure inside the downstream collaborator.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },

    /// Any failure that does not fit the variants above.
    #[error("{kind_name}: {message}")]
    Other {
        /// Free-form kind label used in reports.
        kind_name: String,
        /// Description of the failure.
        message: String,
        /// Optional application-specific error code.
        code: Option<String>,
    },
}

impl ServiceError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::MalformedInput { .. } => ErrorKind::MalformedInput,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::Internal { .. } => ErrorKind::Internal,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Returns the label used when aggregating this error in reports.
    ///
    /// This is the kind name, except for [`ServiceError::Other`], which
    /// carries its own label.
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Other { kind_name, .. } => kind_name,
            other => other.kind().as_str(),
        }
    }

    /// Returns the application-specific error code, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Other { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Returns `true` if the error is transient by nature.
    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }

    /// Returns the severity assigned to this error when recorded without
    /// an explicit override.
    pub fn default_severity(&self) -> Severity {
        self.kind().default_severity()
    }

    /// Returns the retry-after time for circuit-open errors.
    pub fn retry_after(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::CircuitOpen { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Creates a `Network` error.
    pub fn network(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Creates a `Timeout` error.
    pub fn timeout(service: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            service: service.into(),
            elapsed,
        }
    }

    /// Creates a `ServiceUnavailable` error.
    pub fn unavailable(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Validation` error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an `Other` error with a custom kind label.
    pub fn other(kind_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Other {
            kind_name: kind_name.into(),
            message: message.into(),
            code: None,
        }
    }
}

/// Errors raised by the engine's own management operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No degradation strategy has the given id.
    #[error("degradation strategy not found: {id}")]
    StrategyNotFound {
        /// The id that was looked up.
        id: String,
    },

    /// No error event has the given id.
    #[error("error event not found: {id}")]
    EventNotFound {
        /// The id that was looked up.
        id: String,
    },

    /// A report sink could not deliver a report.
    #[error("report sink '{sink}' failed: {message}")]
    ReportDelivery {
        /// Name of the sink.
        sink: String,
        /// Description of the failure.
        message: String,
    },

    /// The engine configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for the schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// One or more values are out of range.
    #[error("invalid configuration: {}", .0.join(", "))]
    Validation(Vec<String>),
}

/// Errors raised by degradation action handlers.
///
/// These never reach the caller that recorded the triggering error; the
/// degradation engine logs them and moves on to the next action.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    /// No handler is registered for a custom action target.
    #[error("no handler registered for action target '{target}'")]
    NoHandler {
        /// The action target.
        target: String,
    },

    /// An action parameter is missing or has the wrong type.
    #[error("invalid parameter '{name}' for action target '{target}': {reason}")]
    InvalidParameter {
        /// The action target.
        target: String,
        /// Parameter name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The handler ran and failed.
    #[error("action on '{target}' failed: {message}")]
    Failed {
        /// The action target.
        target: String,
        /// Description of the failure.
        message: String,
    },
}

/// A specialized `Result` type for protected operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// A specialized `Result` type for engine management operations.
pub type EngineResult<T> = Result<T, EngineError>;
