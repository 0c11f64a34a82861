//! Core types and errors shared by every subsystem.
//!
//! - [`types`] - Error classification, severity and request context
//! - [`error`] - Structured error types

pub mod error;
pub mod types;

pub use error::{
    ActionError, ConfigError, EngineError, EngineResult, ServiceError, ServiceResult,
};
pub use types::{ErrorKind, RequestContext, Severity};
