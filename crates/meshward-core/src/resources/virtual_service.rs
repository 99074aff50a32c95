use super::{
    impl_mesh_resource_status, Condition, ConditionType, MeshReference, MeshResource,
    VirtualNodeReference, VirtualRouterReference,
};
use crate::types::ResourceKind;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNodeServiceProvider {
    pub virtual_node_ref: VirtualNodeReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualRouterServiceProvider {
    pub virtual_router_ref: VirtualRouterReference,
}

/// Where traffic for the service goes; at most one side is set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceProvider {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_node: Option<VirtualNodeServiceProvider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_router: Option<VirtualRouterServiceProvider>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<VirtualServiceProvider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_ref: Option<MeshReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_service_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualService {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: VirtualServiceSpec,
    #[serde(default)]
    pub status: VirtualServiceStatus,
}

impl MeshResource for VirtualService {
    const KIND: ResourceKind = ResourceKind::VirtualService;
    const ACTIVE_CONDITION: ConditionType = ConditionType::VirtualServiceActive;

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

    impl_mesh_resource_status!(virtual_service_arn);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_service_router_provider() {
        let vs: VirtualService = serde_yaml::from_str(
            r#"
metadata:
  name: colorteller.shop.svc.cluster.local
  namespace: shop
spec:
  awsName: colorteller.shop.svc.cluster.local
  provider:
    virtualRouter:
      virtualRouterRef:
        name: colorteller-router
"#,
        )
        .unwrap();

        assert_eq!(vs.aws_name(), "colorteller.shop.svc.cluster.local");
        let provider = vs.spec.provider.unwrap();
        assert!(provider.virtual_node.is_none());
        assert_eq!(
            provider.virtual_router.unwrap().virtual_router_ref.name,
            "colorteller-router"
        );
    }
}
