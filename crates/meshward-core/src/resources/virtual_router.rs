use super::{
    impl_mesh_resource_status, Condition, ConditionType, MeshReference, MeshResource, PortMapping,
    VirtualNodeReference,
};
use crate::types::ResourceKind;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualRouterListener {
    pub port_mapping: PortMapping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedTarget {
    pub virtual_node_ref: VirtualNodeReference,
    pub weight: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteAction {
    #[serde(default)]
    pub weighted_targets: Vec<WeightedTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRouteMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRoute {
    #[serde(rename = "match", default)]
    pub match_: HttpRouteMatch,
    #[serde(default)]
    pub action: RouteAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpRoute {
    #[serde(default)]
    pub action: RouteAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_route: Option<HttpRoute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http2_route: Option<HttpRoute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_route: Option<TcpRoute>,
}

impl Route {
    /// Every weighted target across the route's protocol variants
    pub fn weighted_targets(&self) -> impl Iterator<Item = &WeightedTarget> {
        let http = self.http_route.iter().map(|r| &r.action);
        let http2 = self.http2_route.iter().map(|r| &r.action);
        let tcp = self.tcp_route.iter().map(|r| &r.action);
        http.chain(http2)
            .chain(tcp)
            .flat_map(|action| action.weighted_targets.iter())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualRouterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listeners: Vec<VirtualRouterListener>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_ref: Option<MeshReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualRouterStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_router_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualRouter {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: VirtualRouterSpec,
    #[serde(default)]
    pub status: VirtualRouterStatus,
}

impl MeshResource for VirtualRouter {
    const KIND: ResourceKind = ResourceKind::VirtualRouter;
    const ACTIVE_CONDITION: ConditionType = ConditionType::VirtualRouterActive;

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

    impl_mesh_resource_status!(virtual_router_arn);
}
