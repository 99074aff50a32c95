use super::{
    impl_mesh_resource_status, Condition, ConditionType, Listener, Logging, MeshReference,
    MeshResource, VirtualGatewayReference,
};
use crate::types::ResourceKind;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualGatewaySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_name: Option<String>,
    /// Namespaces whose gateway routes may attach. `None` selects nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LabelSelector>,
    /// Gateway routes that may attach by label. `None` selects every route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_route_selector: Option<LabelSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_selector: Option<LabelSelector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listeners: Vec<Listener>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<Logging>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_ref: Option<MeshReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualGatewayStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_gateway_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualGateway {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: VirtualGatewaySpec,
    #[serde(default)]
    pub status: VirtualGatewayStatus,
}

impl MeshResource for VirtualGateway {
    const KIND: ResourceKind = ResourceKind::VirtualGateway;
    const ACTIVE_CONDITION: ConditionType = ConditionType::VirtualGatewayActive;

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
        self.spec.mesh_ref.as_ref()
    }

    fn set_mesh_ref(&mut self, mesh_ref: MeshReference) {
        self.spec.mesh_ref = Some(mesh_ref);
    }

    impl_mesh_resource_status!(virtual_gateway_arn);
}

impl VirtualGateway {
    /// Whether `reference` points at this exact incarnation of the gateway
    pub fn is_referenced_by(&self, reference: &VirtualGatewayReference) -> bool {
        let ns_matches = match reference.namespace.as_deref() {
            Some(ns) => self.namespace() == Some(ns),
            None => true,
        };
        ns_matches
            && self.metadata.name.as_deref() == Some(reference.name.as_str())
            && self.metadata.uid.as_deref() == Some(reference.uid.as_str())
    }

    /// Build a fully-qualified reference to this gateway
    pub fn reference(&self) -> VirtualGatewayReference {
        VirtualGatewayReference {
            namespace: self.namespace().map(str::to_string),
            name: self.name().to_string(),
            uid: self.uid().unwrap_or_default().to_string(),
        }
    }
}
