use super::{
    impl_mesh_resource_status, Condition, ConditionType, MeshReference, MeshResource,
    VirtualGatewayReference, VirtualServiceReference,
};
use crate::types::ResourceKind;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRouteVirtualService {
    pub virtual_service_ref: VirtualServiceReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRouteTarget {
    pub virtual_service: GatewayRouteVirtualService,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRouteAction {
    pub target: GatewayRouteTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpGatewayRouteMatch {
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpGatewayRoute {
    #[serde(rename = "match")]
    pub match_: HttpGatewayRouteMatch,
    pub action: GatewayRouteAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrpcGatewayRouteMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrpcGatewayRoute {
    #[serde(rename = "match")]
    pub match_: GrpcGatewayRouteMatch,
    pub action: GatewayRouteAction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRouteSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_route: Option<HttpGatewayRoute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http2_route: Option<HttpGatewayRoute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_route: Option<GrpcGatewayRoute>,
    /// Filled in by the controller when left empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_gateway_ref: Option<VirtualGatewayReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_ref: Option<MeshReference>,
}

impl GatewayRouteSpec {
    /// Every routing action configured on the route
    pub fn actions(&self) -> impl Iterator<Item = &GatewayRouteAction> {
        let http = self.http_route.iter().map(|r| &r.action);
        let http2 = self.http2_route.iter().map(|r| &r.action);
        let grpc = self.grpc_route.iter().map(|r| &r.action);
        http.chain(http2).chain(grpc)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRouteStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_route_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayRoute {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: GatewayRouteSpec,
    #[serde(default)]
    pub status: GatewayRouteStatus,
}

impl MeshResource for GatewayRoute {
    const KIND: ResourceKind = ResourceKind::GatewayRoute;
    const ACTIVE_CONDITION: ConditionType = ConditionType::GatewayRouteActive;

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

    impl_mesh_resource_status!(gateway_route_arn);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_route_actions() {
        let gr: GatewayRoute = serde_yaml::from_str(
            r#"
metadata:
  name: color-route
  namespace: shop
  labels:
    gateway: ingress-gw
spec:
  httpRoute:
    match:
      prefix: /color
    action:
      target:
        virtualService:
          virtualServiceRef:
            name: colorteller
  grpcRoute:
    match:
      serviceName: color.Teller
    action:
      target:
        virtualService:
          virtualServiceRef:
            name: colorteller-grpc
            namespace: grpc
"#,
        )
        .unwrap();

        let targets: Vec<_> = gr
            .spec
            .actions()
            .map(|a| a.target.virtual_service.virtual_service_ref.name.as_str())
            .collect();
        assert_eq!(targets, vec!["colorteller", "colorteller-grpc"]);
        assert!(gr.spec.virtual_gateway_ref.is_none());
        assert_eq!(gr.labels().get("gateway").map(String::as_str), Some("ingress-gw"));
    }
}
