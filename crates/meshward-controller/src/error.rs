// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use meshward_cloud::CloudError;
use meshward_core::CoreError;
use miette::Diagnostic;
use thiserror::Error;

/// Controller error type for reconciliation of mesh resources
#[derive(Error, Debug, Diagnostic)]
pub enum ControllerError {
    /// Error from the resource model
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] CoreError),

    /// Error from a remote control-plane call
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cloud(#[from] CloudError),

    /// A referenced object does not exist in the cluster
    #[error("{kind} not found: {key}")]
    #[diagnostic(
        code(meshward::controller::reference_not_found),
        help("Create the referenced object, or fix the reference")
    )]
    ReferenceNotFound {
        #[allow(unused)]
        kind: String,
        #[allow(unused)]
        key: String,
    },

    /// A reference points at an object that was deleted and recreated
    #[error("{kind} UID mismatch: {name}")]
    #[diagnostic(
        code(meshward::controller::identity_mismatch),
        help("The referenced object was recreated under the same name. Recreate the referring object so it picks up the new identity")
    )]
    IdentityMismatch {
        #[allow(unused)]
        kind: String,
        #[allow(unused)]
        name: String,
    },

    /// No parent selects the object's namespace
    #[error("{message}")]
    #[diagnostic(
        code(meshward::controller::no_membership),
        help("Label the namespace so exactly one parent's namespaceSelector matches it")
    )]
    NoMembership {
        #[allow(unused)]
        message: String,
    },

    /// More than one parent selects the object's namespace
    #[error("{message}")]
    #[diagnostic(
        code(meshward::controller::ambiguous_membership),
        help("Narrow the namespaceSelectors so exactly one parent matches")
    )]
    AmbiguousMembership {
        #[allow(unused)]
        message: String,
    },

    /// The designated parent is being deleted
    #[error("{message}")]
    #[diagnostic(
        code(meshward::controller::parent_terminating),
        help("Wait for the parent to be deleted and recreate it, or move the object to another parent")
    )]
    ParentTerminating {
        #[allow(unused)]
        message: String,
    },

    /// A required reference field is empty
    #[error("{field} shouldn't be nil, please check webhook setup: {object}")]
    #[diagnostic(
        code(meshward::controller::missing_reference),
        help("The field is normally filled in at admission; set it explicitly or check the membership of the object's namespace")
    )]
    MissingReference {
        #[allow(unused)]
        field: String,
        #[allow(unused)]
        object: String,
    },

    /// A dependency belongs to another mesh
    #[error("{message}")]
    #[diagnostic(
        code(meshward::controller::dependency_mismatch),
        help("Objects may only reference objects within the same mesh")
    )]
    DependencyMismatch {
        #[allow(unused)]
        message: String,
    },

    /// A cross-reference could not be turned into a remote name
    #[error("Unresolved reference: {message}")]
    #[diagnostic(
        code(meshward::controller::unresolved_reference),
        help("Every reference must point at an object known to the controller")
    )]
    UnresolvedReference {
        #[allow(unused)]
        message: String,
    },

    /// Service-discovery namespace of an unsupported type
    #[error("unsupported namespace type: {namespace_type}, use namespace with types {supported} instead")]
    #[diagnostic(
        code(meshward::controller::unsupported_namespace_type),
        help("Point serviceDiscovery.awsCloudMap.namespaceName at a DNS_PRIVATE or HTTP namespace")
    )]
    UnsupportedNamespaceType {
        #[allow(unused)]
        namespace_type: String,
        #[allow(unused)]
        supported: String,
    },

    /// Cluster API request failed
    #[error("Cluster API error: {message}")]
    #[diagnostic(
        code(meshward::controller::cluster_api),
        help("Check that the API server is reachable and serves the appmesh.k8s.aws/v1beta2 resources")
    )]
    ClusterApi {
        #[allow(unused)]
        message: String,
    },

    /// Invalid controller configuration
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(meshward::controller::invalid_config), help("{suggestion}"))]
    InvalidConfig {
        #[allow(unused)]
        message: String,
        #[allow(unused)]
        suggestion: String,
    },
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, ControllerError>;

impl ControllerError {
    /// Create a ReferenceNotFound error
    pub fn reference_not_found(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self::ReferenceNotFound {
            kind: kind.into(),
            key: key.into(),
        }
    }

    /// Create an IdentityMismatch error
    pub fn identity_mismatch(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::IdentityMismatch {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a NoMembership error
    pub fn no_membership(message: impl Into<String>) -> Self {
        Self::NoMembership {
            message: message.into(),
        }
    }

    /// Create an AmbiguousMembership error
    pub fn ambiguous_membership(message: impl Into<String>) -> Self {
        Self::AmbiguousMembership {
            message: message.into(),
        }
    }

    /// Create a ParentTerminating error
    pub fn parent_terminating(message: impl Into<String>) -> Self {
        Self::ParentTerminating {
            message: message.into(),
        }
    }

    /// Create a MissingReference error
    pub fn missing_reference(field: impl Into<String>, object: impl Into<String>) -> Self {
        Self::MissingReference {
            field: field.into(),
            object: object.into(),
        }
    }

    /// Create a DependencyMismatch error
    pub fn dependency_mismatch(message: impl Into<String>) -> Self {
        Self::DependencyMismatch {
            message: message.into(),
        }
    }

    /// Create an UnresolvedReference error
    pub fn unresolved_reference(message: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            message: message.into(),
        }
    }

    /// Create an UnsupportedNamespaceType error
    pub fn unsupported_namespace_type(
        namespace_type: impl Into<String>,
        supported: impl Into<String>,
    ) -> Self {
        Self::UnsupportedNamespaceType {
            namespace_type: namespace_type.into(),
            supported: supported.into(),
        }
    }

    /// Create a ClusterApi error
    pub fn cluster_api(message: impl Into<String>) -> Self {
        Self::ClusterApi {
            message: message.into(),
        }
    }

    /// Create an InvalidConfig error
    pub fn invalid_config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Whether the error means an object, local or remote, does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Core(e) => e.is_not_found(),
            Self::Cloud(e) => e.is_not_found(),
            Self::ReferenceNotFound { .. } => true,
            _ => false,
        }
    }

    /// Whether the error needs a spec fix rather than a retry
    ///
    /// A missing referenced object is not permanent: it may simply not have
    /// been created yet.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::IdentityMismatch { .. }
            | Self::NoMembership { .. }
            | Self::AmbiguousMembership { .. }
            | Self::ParentTerminating { .. }
            | Self::MissingReference { .. }
            | Self::DependencyMismatch { .. }
            | Self::UnresolvedReference { .. }
            | Self::UnsupportedNamespaceType { .. }
            | Self::InvalidConfig { .. } => true,
            Self::Core(e) => matches!(
                e,
                CoreError::InvalidResource { .. } | CoreError::InvalidSelector { .. }
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = ControllerError::identity_mismatch("mesh", "global");
        assert_eq!(err.to_string(), "mesh UID mismatch: global");
        assert!(err.is_permanent());
        assert!(!err.is_not_found());

        let err = ControllerError::reference_not_found("VirtualService", "shop/frontend");
        assert!(err.is_not_found());
        assert!(!err.is_permanent());

        let err: ControllerError = CloudError::throttled("DescribeMesh").into();
        assert!(!err.is_permanent());
        assert!(!err.is_not_found());

        let err: ControllerError = CloudError::not_found("Mesh", "global").into();
        assert!(err.is_not_found());

        let err: ControllerError = CoreError::invalid_selector("unknown operator Near").into();
        assert!(err.is_permanent());
    }

    #[test]
    fn test_unsupported_namespace_type_message() {
        let err = ControllerError::unsupported_namespace_type("DNS_PUBLIC", "[DNS_PRIVATE HTTP]");
        assert_eq!(
            err.to_string(),
            "unsupported namespace type: DNS_PUBLIC, use namespace with types [DNS_PRIVATE HTTP] instead"
        );
        assert!(matches!(err, ControllerError::UnsupportedNamespaceType { .. }));
    }
}
