// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for the meshward resource model
#[derive(Error, Debug, Diagnostic)]
pub enum CoreError {
    /// Object not found in the declarative store
    #[error("{kind} not found: {key}")]
    #[diagnostic(
        code(meshward::object_not_found),
        help("Verify the object name and namespace, it may have been deleted")
    )]
    ObjectNotFound {
        #[allow(unused)]
        kind: String,
        #[allow(unused)]
        key: String,
    },

    /// Invalid resource
    #[error("Invalid resource: {reason}")]
    #[diagnostic(code(meshward::invalid_resource), help("{suggestion}"))]
    InvalidResource {
        #[allow(unused)]
        reason: String,
        #[allow(unused)]
        suggestion: String,
    },

    /// Label selector that cannot be evaluated
    #[error("Invalid label selector: {reason}")]
    #[diagnostic(
        code(meshward::invalid_selector),
        help("Supported operators are In, NotIn, Exists and DoesNotExist; In and NotIn need at least one value")
    )]
    InvalidSelector {
        #[allow(unused)]
        reason: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(meshward::serialization_error),
        help("Ensure the resource format is valid JSON or YAML")
    )]
    SerializationError {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(meshward::internal_error),
        help("This is likely a bug. Please report it with the full error details")
    )]
    InternalError {
        #[allow(unused)]
        message: String,
    },
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create an ObjectNotFound error
    pub fn object_not_found(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self::ObjectNotFound {
            kind: kind.into(),
            key: key.into(),
        }
    }

    /// Create an InvalidResource error
    pub fn invalid_resource(reason: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidResource {
            reason: reason.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an InvalidSelector error
    pub fn invalid_selector(reason: impl Into<String>) -> Self {
        Self::InvalidSelector {
            reason: reason.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }

    /// Create an InternalError
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Whether this error means the object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CoreError::object_not_found("Mesh", "global");
        assert!(matches!(err, CoreError::ObjectNotFound { .. }));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Mesh not found: global");

        let err = CoreError::invalid_selector("unknown operator Near");
        assert!(matches!(err, CoreError::InvalidSelector { .. }));
        assert!(!err.is_not_found());
    }
}
