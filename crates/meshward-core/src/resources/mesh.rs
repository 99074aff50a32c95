use super::{impl_mesh_resource_status, Condition, ConditionType, MeshReference, MeshResource};
use crate::types::ResourceKind;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EgressFilterType {
    #[serde(rename = "ALLOW_ALL")]
    AllowAll,
    #[serde(rename = "DROP_ALL")]
    DropAll,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgressFilter {
    #[serde(rename = "type")]
    pub type_: EgressFilterType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshSpec {
    /// Remote mesh name, defaults to the object name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_name: Option<String>,
    /// Namespaces whose objects belong to this mesh. `None` selects nothing,
    /// an empty selector selects every namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LabelSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub egress_filter: Option<EgressFilter>,
    /// Account that owns the mesh when it is shared with this account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_owner: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: MeshSpec,
    #[serde(default)]
    pub status: MeshStatus,
}

impl MeshResource for Mesh {
    const KIND: ResourceKind = ResourceKind::Mesh;
    const ACTIVE_CONDITION: ConditionType = ConditionType::MeshActive;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn spec_aws_name(&self) -> Option<&str> {
        self.spec.aws_name.as_deref()
    }

    fn mesh_ref(&self) -> Option<&MeshReference> {
        None
    }

    fn set_mesh_ref(&mut self, _mesh_ref: MeshReference) {}

    impl_mesh_resource_status!(mesh_arn);
}

impl Mesh {
    /// Whether `reference` points at this exact incarnation of the mesh
    pub fn is_referenced_by(&self, reference: &MeshReference) -> bool {
        self.metadata.name.as_deref() == Some(reference.name.as_str())
            && self.metadata.uid.as_deref() == Some(reference.uid.as_str())
    }

    /// Build a reference to this mesh
    pub fn reference(&self) -> MeshReference {
        MeshReference {
            name: self.name().to_string(),
            uid: self.uid().unwrap_or_default().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_from_yaml() {
        let mesh: Mesh = serde_yaml::from_str(
            r#"
metadata:
  name: global
  uid: 1111-aaaa
spec:
  egressFilter:
    type: DROP_ALL
  namespaceSelector:
    matchLabels:
      mesh: global
"#,
        )
        .unwrap();

        assert_eq!(mesh.aws_name(), "global");
        assert_eq!(
            mesh.spec.egress_filter.as_ref().map(|f| f.type_),
            Some(EgressFilterType::DropAll)
        );
        assert!(mesh.spec.namespace_selector.is_some());
        assert!(mesh.status.conditions.is_empty());
    }

    #[test]
    fn test_is_referenced_by_checks_uid() {
        let mut mesh = Mesh::default();
        mesh.metadata.name = Some("global".to_string());
        mesh.metadata.uid = Some("uid-1".to_string());

        assert!(mesh.is_referenced_by(&MeshReference {
            name: "global".to_string(),
            uid: "uid-1".to_string(),
        }));
        assert!(!mesh.is_referenced_by(&MeshReference {
            name: "global".to_string(),
            uid: "uid-2".to_string(),
        }));
        assert_eq!(mesh.reference().uid, "uid-1");
    }
}
