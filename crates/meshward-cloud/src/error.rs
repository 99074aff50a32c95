// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Error type for remote control-plane calls
#[derive(Error, Debug, Diagnostic)]
pub enum CloudError {
    /// The remote resource does not exist
    #[error("{kind} not found: {name}")]
    #[diagnostic(
        code(meshward::cloud::not_found),
        help("The resource will be created on the next reconcile if it is still desired")
    )]
    NotFound {
        #[allow(unused)]
        kind: String,
        #[allow(unused)]
        name: String,
    },

    /// The remote resource already exists
    #[error("{kind} already exists: {name}")]
    #[diagnostic(
        code(meshward::cloud::already_exists),
        help("Describe the existing resource instead of creating it again")
    )]
    AlreadyExists {
        #[allow(unused)]
        kind: String,
        #[allow(unused)]
        name: String,
    },

    /// An identical request is still being processed
    #[error("Duplicate request: {message}")]
    #[diagnostic(
        code(meshward::cloud::duplicate_request),
        help("The earlier request is still in flight; retry after it completes")
    )]
    DuplicateRequest {
        #[allow(unused)]
        message: String,
    },

    /// The remote service rejected the call for exceeding its rate
    #[error("Throttled: {operation}")]
    #[diagnostic(
        code(meshward::cloud::throttled),
        help("Lower the request rate with --aws-api-throttle or wait for the next resync")
    )]
    Throttled {
        #[allow(unused)]
        operation: String,
    },

    /// The call did not complete before its deadline
    #[error("{operation} timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(meshward::cloud::timeout),
        help("The remote API is slow or unreachable; the call will be retried on the next resync")
    )]
    Timeout {
        #[allow(unused)]
        operation: String,
        #[allow(unused)]
        timeout_ms: u64,
    },

    /// Throttle configuration could not be parsed
    #[error("Invalid throttle configuration: {message}")]
    #[diagnostic(
        code(meshward::cloud::invalid_throttle_config),
        help("Use the form service:operationRegex=rate:burst, for example appmesh:^Describe=20:10")
    )]
    InvalidThrottleConfig {
        #[allow(unused)]
        message: String,
    },

    /// Any other failure reported by the remote API
    #[error("{operation} failed: {message}")]
    #[diagnostic(
        code(meshward::cloud::api_error),
        help("Check the remote API's health and the controller's credentials")
    )]
    ApiError {
        #[allow(unused)]
        operation: String,
        #[allow(unused)]
        message: String,
    },
}

/// Result type alias for remote calls
pub type Result<T> = std::result::Result<T, CloudError>;

impl CloudError {
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn already_exists(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn duplicate_request(message: impl Into<String>) -> Self {
        Self::DuplicateRequest {
            message: message.into(),
        }
    }

    pub fn throttled(operation: impl Into<String>) -> Self {
        Self::Throttled {
            operation: operation.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn invalid_throttle_config(message: impl Into<String>) -> Self {
        Self::InvalidThrottleConfig {
            message: message.into(),
        }
    }

    pub fn api_error(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ApiError {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// The typed "does not exist" signal that drives create-vs-update
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_duplicate_request(&self) -> bool {
        matches!(self, Self::DuplicateRequest { .. })
    }
}
