use serde::{Deserialize, Serialize};
use std::fmt;

/// API group served for all mesh resources
pub const APPMESH_GROUP: &str = "appmesh.k8s.aws";

/// API version served for all mesh resources
pub const APPMESH_VERSION: &str = "v1beta2";

/// The mesh-like resource kinds managed by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Mesh,
    VirtualNode,
    VirtualService,
    VirtualRouter,
    VirtualGateway,
    GatewayRoute,
}

impl ResourceKind {
    /// All kinds in dependency order (parents before children)
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Mesh,
        ResourceKind::VirtualGateway,
        ResourceKind::VirtualNode,
        ResourceKind::VirtualRouter,
        ResourceKind::VirtualService,
        ResourceKind::GatewayRoute,
    ];

    /// Kind name as it appears in `kind:`
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Mesh => "Mesh",
            ResourceKind::VirtualNode => "VirtualNode",
            ResourceKind::VirtualService => "VirtualService",
            ResourceKind::VirtualRouter => "VirtualRouter",
            ResourceKind::VirtualGateway => "VirtualGateway",
            ResourceKind::GatewayRoute => "GatewayRoute",
        }
    }

    /// Get the apiVersion string
    pub fn api_version(&self) -> String {
        format!("{}/{}", APPMESH_GROUP, APPMESH_VERSION)
    }

    /// Get the resource name (lowercase, plural)
    pub fn resource_name(&self) -> &'static str {
        match self {
            ResourceKind::Mesh => "meshes",
            ResourceKind::VirtualNode => "virtualnodes",
            ResourceKind::VirtualService => "virtualservices",
            ResourceKind::VirtualRouter => "virtualrouters",
            ResourceKind::VirtualGateway => "virtualgateways",
            ResourceKind::GatewayRoute => "gatewayroutes",
        }
    }

    /// Meshes are cluster-scoped, everything else lives in a namespace
    pub fn is_namespaced(&self) -> bool {
        !matches!(self, ResourceKind::Mesh)
    }

    /// Get the API path for the collection, optionally restricted to a namespace
    pub fn collection_path(&self, namespace: Option<&str>) -> String {
        match namespace {
            Some(ns) if self.is_namespaced() => format!(
                "/apis/{}/{}/namespaces/{}/{}",
                APPMESH_GROUP,
                APPMESH_VERSION,
                ns,
                self.resource_name()
            ),
            _ => format!(
                "/apis/{}/{}/{}",
                APPMESH_GROUP,
                APPMESH_VERSION,
                self.resource_name()
            ),
        }
    }

    /// Lower camel-case name used in human readable messages
    pub fn display_name(&self) -> &'static str {
        match self {
            ResourceKind::Mesh => "mesh",
            ResourceKind::VirtualNode => "virtualNode",
            ResourceKind::VirtualService => "virtualService",
            ResourceKind::VirtualRouter => "virtualRouter",
            ResourceKind::VirtualGateway => "virtualGateway",
            ResourceKind::GatewayRoute => "gatewayRoute",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Namespaced name of an object (namespace is `None` for cluster-scoped objects)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    /// Create a namespaced key
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Create a cluster-scoped key
    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Get the API path of this object for the given kind
    pub fn api_path(&self, kind: ResourceKind) -> String {
        format!(
            "{}/{}",
            kind.collection_path(self.namespace.as_deref()),
            self.name
        )
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_api_version() {
        assert_eq!(
            ResourceKind::VirtualNode.api_version(),
            "appmesh.k8s.aws/v1beta2"
        );
        assert_eq!(ResourceKind::Mesh.to_string(), "Mesh");
    }

    #[test]
    fn test_object_key_api_path() {
        let key = ObjectKey::new("default", "frontend");
        assert_eq!(
            key.api_path(ResourceKind::VirtualNode),
            "/apis/appmesh.k8s.aws/v1beta2/namespaces/default/virtualnodes/frontend"
        );

        let key = ObjectKey::cluster_scoped("global");
        assert_eq!(
            key.api_path(ResourceKind::Mesh),
            "/apis/appmesh.k8s.aws/v1beta2/meshes/global"
        );
    }

    #[test]
    fn test_collection_path_ignores_namespace_for_meshes() {
        assert_eq!(
            ResourceKind::Mesh.collection_path(Some("default")),
            "/apis/appmesh.k8s.aws/v1beta2/meshes"
        );
        assert_eq!(
            ResourceKind::GatewayRoute.collection_path(None),
            "/apis/appmesh.k8s.aws/v1beta2/gatewayroutes"
        );
    }

    #[test]
    fn test_object_key_display() {
        assert_eq!(ObjectKey::new("prod", "vs").to_string(), "prod/vs");
        assert_eq!(ObjectKey::cluster_scoped("global").to_string(), "global");
    }
}
