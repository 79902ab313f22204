// Re-export dependencies used in public interfaces of common types

use serde::{Deserialize, Serialize};
use thiserror::Error;
pub use uuid;

mod context;
mod handler;

pub use context::{function_arn, ContextFactory, InvocationContext, LogBuffer};
pub use handler::{handler_fn, json_handler, FnHandler, Handler, JsonHandler};

/// Host-side failures surfaced to embedding code (registration, startup).
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Function already exists: {0}")]
    DuplicateFunction(String),

    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal Error: {0}")]
    Internal(String),
}

// Define the primary Result type for host operations
pub type Result<T> = std::result::Result<T, HostError>;

/// How a handler failure is reported on the wire: the handler's own declared
/// error path vs. an uncaught fault during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    Handled,
    Unhandled,
}

impl FaultKind {
    /// Wire value for the `X-Amz-Function-Error` header.
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::Handled => "Handled",
            FaultKind::Unhandled => "Unhandled",
        }
    }
}

/// A failure raised by (or on behalf of) handler code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFault {
    pub kind: FaultKind,
    pub error_type: String,
    pub message: String,
    pub stack_trace: Option<Vec<String>>,
}

impl HandlerFault {
    pub fn handled(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Handled,
            error_type: error_type.into(),
            message: message.into(),
            stack_trace: None,
        }
    }

    pub fn unhandled(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Unhandled,
            error_type: error_type.into(),
            message: message.into(),
            stack_trace: None,
        }
    }

    pub fn with_stack_trace(mut self, trace: Vec<String>) -> Self {
        self.stack_trace = Some(trace);
        self
    }
}

impl std::fmt::Display for HandlerFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

/// Host-side failure of a single invocation, before or around handler code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostFault {
    /// The function name resolved to no registration.
    NotFound(String),
    /// The account-wide concurrency limit was exhausted.
    Throttled,
    /// The deadline passed while the handler was running.
    Timeout {
        request_id: String,
        timeout: std::time::Duration,
    },
    /// A defect in the host itself.
    Internal(String),
}

/// The single channel through which dispatch communicates completion:
/// a payload, a handler failure, or a host failure — never more than one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    Success(Vec<u8>),
    HandlerError(HandlerFault),
    HostError(HostFault),
}

/// The JSON body returned for a failed invocation, mirroring the managed
/// runtimes' error shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(rename = "errorMessage")]
    pub error_message: String,
    #[serde(rename = "errorType")]
    pub error_type: String,
    #[serde(rename = "stackTrace", skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<Vec<String>>,
}

impl From<&HandlerFault> for ErrorPayload {
    fn from(fault: &HandlerFault) -> Self {
        Self {
            error_message: fault.message.clone(),
            error_type: fault.error_type.clone(),
            stack_trace: fault.stack_trace.clone(),
        }
    }
}
