/// Implements the status accessors shared by every kind
macro_rules! impl_mesh_resource_status {
    ($arn:ident) => {
        fn conditions(&self) -> &[Condition] {
            &self.status.conditions
        }

        fn conditions_mut(&mut self) -> &mut Vec<Condition> {
            &mut self.status.conditions
        }

        fn remote_arn(&self) -> Option<&str> {
            self.status.$arn.as_deref()
        }

        fn set_remote_arn(&mut self, arn: Option<String>) {
            self.status.$arn = arn;
        }

        fn observed_generation(&self) -> Option<i64> {
            self.status.observed_generation
        }

        fn set_observed_generation(&mut self, generation: Option<i64>) {
            self.status.observed_generation = generation;
        }
    };
}

pub(crate) use impl_mesh_resource_status;

pub mod common;
pub mod gateway_route;
pub mod mesh;
pub mod virtual_gateway;
pub mod virtual_node;
pub mod virtual_router;
pub mod virtual_service;

pub use common::*;
pub use gateway_route::*;
pub use mesh::*;
pub use virtual_gateway::*;
pub use virtual_node::*;
pub use virtual_router::*;
pub use virtual_service::*;

use crate::conditions::get_condition;
use crate::error::{CoreError, Result};
use crate::types::{ObjectKey, ResourceKind};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Base validation for all resources
pub fn validate_base(kind: ResourceKind, metadata: &ObjectMeta) -> Result<()> {
    if metadata.name.as_deref().map_or(true, str::is_empty) {
        return Err(CoreError::invalid_resource(
            format!("{} is missing metadata.name", kind),
            "Every object must carry a name",
        ));
    }
    if kind.is_namespaced() && metadata.namespace.is_none() {
        return Err(CoreError::invalid_resource(
            format!(
                "{} {} is missing metadata.namespace",
                kind,
                metadata.name.as_deref().unwrap_or_default()
            ),
            "Namespaced objects must carry their namespace",
        ));
    }
    Ok(())
}

/// Trait shared by the six mesh-like declarative resources
///
/// Every kind has the same outer shape: metadata, a kind-specific desired spec
/// and an observed status with the remote ARN, typed conditions and the
/// generation last applied to the remote control plane.
pub trait MeshResource: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    /// Kind of this resource
    const KIND: ResourceKind;

    /// Condition type that mirrors the remote resource's status
    const ACTIVE_CONDITION: ConditionType;

    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    /// Explicit remote name from the spec, if any
    fn spec_aws_name(&self) -> Option<&str>;

    /// Mesh this object belongs to (always `None` for meshes)
    fn mesh_ref(&self) -> Option<&MeshReference>;

    /// Record mesh membership (ignored for meshes)
    fn set_mesh_ref(&mut self, mesh_ref: MeshReference);

    fn conditions(&self) -> &[Condition];

    fn conditions_mut(&mut self) -> &mut Vec<Condition>;

    /// ARN of the remote counterpart, as recorded in status
    fn remote_arn(&self) -> Option<&str>;

    fn set_remote_arn(&mut self, arn: Option<String>);

    fn observed_generation(&self) -> Option<i64>;

    fn set_observed_generation(&mut self, generation: Option<i64>);

    fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }

    fn uid(&self) -> Option<&str> {
        self.metadata().uid.as_deref()
    }

    fn generation(&self) -> Option<i64> {
        self.metadata().generation
    }

    fn labels(&self) -> BTreeMap<String, String> {
        self.metadata().labels.clone().unwrap_or_default()
    }

    fn finalizers(&self) -> &[String] {
        self.metadata().finalizers.as_deref().unwrap_or_default()
    }

    fn object_key(&self) -> ObjectKey {
        match self.namespace() {
            Some(ns) if Self::KIND.is_namespaced() => ObjectKey::new(ns, self.name()),
            _ => ObjectKey::cluster_scoped(self.name()),
        }
    }

    /// Remote name: the explicit `awsName`, or `name` for meshes and
    /// `name_namespace` for namespaced kinds
    fn aws_name(&self) -> String {
        match self.spec_aws_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => match self.namespace() {
                Some(ns) if Self::KIND.is_namespaced() => format!("{}_{}", self.name(), ns),
                _ => self.name().to_string(),
            },
        }
    }

    /// Whether a deletion timestamp has been set
    fn is_terminating(&self) -> bool {
        self.metadata().deletion_timestamp.is_some()
    }

    /// Whether the active condition reports True
    fn is_active(&self) -> bool {
        get_condition(self, Self::ACTIVE_CONDITION)
            .map(|c| c.status == ConditionStatus::True)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_base_requires_name_and_namespace() {
        let meta = ObjectMeta::default();
        assert!(validate_base(ResourceKind::Mesh, &meta).is_err());

        let meta = ObjectMeta {
            name: Some("frontend".to_string()),
            ..Default::default()
        };
        assert!(validate_base(ResourceKind::Mesh, &meta).is_ok());
        assert!(validate_base(ResourceKind::VirtualNode, &meta).is_err());
    }

    #[test]
    fn test_default_aws_names() {
        let mut vn = VirtualNode::default();
        vn.metadata.name = Some("frontend".to_string());
        vn.metadata.namespace = Some("shop".to_string());
        assert_eq!(vn.aws_name(), "frontend_shop");
        assert_eq!(vn.object_key(), ObjectKey::new("shop", "frontend"));

        vn.spec.aws_name = Some(String::new());
        assert_eq!(vn.aws_name(), "frontend_shop");

        vn.spec.aws_name = Some("frontend-v2".to_string());
        assert_eq!(vn.aws_name(), "frontend-v2");

        let mut mesh = Mesh::default();
        mesh.metadata.name = Some("global".to_string());
        assert_eq!(mesh.aws_name(), "global");
        assert_eq!(mesh.object_key(), ObjectKey::cluster_scoped("global"));
    }

    #[test]
    fn test_is_active_follows_condition() {
        let mut mesh = Mesh::default();
        assert!(!mesh.is_active());

        mesh.status.conditions.push(Condition {
            type_: ConditionType::MeshActive,
            status: ConditionStatus::True,
            last_transition_time: None,
            reason: None,
            message: None,
        });
        assert!(mesh.is_active());
    }
}
