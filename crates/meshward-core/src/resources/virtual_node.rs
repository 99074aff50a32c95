use super::{
    impl_mesh_resource_status, Condition, ConditionType, Listener, Logging, MeshReference,
    MeshResource, VirtualServiceReference,
};
use crate::types::ResourceKind;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudMapInstanceAttribute {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsCloudMapServiceDiscovery {
    pub namespace_name: String,
    pub service_name: String,
    /// Extra attributes stamped on every registered instance
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<CloudMapInstanceAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsServiceDiscovery {
    pub hostname: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDiscovery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_cloud_map: Option<AwsCloudMapServiceDiscovery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsServiceDiscovery>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceBackend {
    pub virtual_service_ref: VirtualServiceReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    pub virtual_service: VirtualServiceBackend,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNodeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_selector: Option<LabelSelector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listeners: Vec<Listener>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_discovery: Option<ServiceDiscovery>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backends: Vec<Backend>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<Logging>,
    /// Filled in by the controller when left empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_ref: Option<MeshReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsCloudMapServiceStatus {
    #[serde(default, rename = "namespaceID", skip_serializing_if = "Option::is_none")]
    pub namespace_id: Option<String>,
    #[serde(default, rename = "serviceID", skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNodeStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_node_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_cloud_map_service_status: Option<AwsCloudMapServiceStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualNode {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: VirtualNodeSpec,
    #[serde(default)]
    pub status: VirtualNodeStatus,
}

impl MeshResource for VirtualNode {
    const KIND: ResourceKind = ResourceKind::VirtualNode;
    const ACTIVE_CONDITION: ConditionType = ConditionType::VirtualNodeActive;

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

    impl_mesh_resource_status!(virtual_node_arn);
}

impl VirtualNode {
    /// Cloud Map discovery settings, if this node registers its pods there
    pub fn cloud_map(&self) -> Option<&AwsCloudMapServiceDiscovery> {
        self.spec
            .service_discovery
            .as_ref()
            .and_then(|sd| sd.aws_cloud_map.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_node_from_yaml() {
        let vn: VirtualNode = serde_yaml::from_str(
            r#"
metadata:
  name: colorteller
  namespace: shop
spec:
  listeners:
    - portMapping:
        port: 9080
        protocol: http
      healthCheck:
        path: /ping
        protocol: http
  serviceDiscovery:
    awsCloudMap:
      namespaceName: shop.local
      serviceName: colorteller
      attributes:
        - key: version
          value: blue
  backends:
    - virtualService:
        virtualServiceRef:
          name: colorgateway
  meshRef:
    name: global
    uid: 1111-aaaa
status:
  awsCloudMapServiceStatus:
    namespaceID: ns-1
    serviceID: srv-1
"#,
        )
        .unwrap();

        assert_eq!(vn.aws_name(), "colorteller_shop");
        assert_eq!(vn.spec.listeners[0].port_mapping.port, 9080);
        let cm = vn.cloud_map().unwrap();
        assert_eq!(cm.namespace_name, "shop.local");
        assert_eq!(cm.attributes[0].value, "blue");
        assert_eq!(vn.mesh_ref().unwrap().name, "global");
        assert_eq!(
            vn.status
                .aws_cloud_map_service_status
                .as_ref()
                .and_then(|s| s.service_id.as_deref()),
            Some("srv-1")
        );
    }

    #[test]
    fn test_dns_discovery_has_no_cloud_map() {
        let mut vn = VirtualNode::default();
        vn.spec.service_discovery = Some(ServiceDiscovery {
            aws_cloud_map: None,
            dns: Some(DnsServiceDiscovery {
                hostname: "colorteller.shop.svc.cluster.local".to_string(),
            }),
        });
        assert!(vn.cloud_map().is_none());
    }
}
