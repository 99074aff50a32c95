use meshward_core::resources::{EgressFilterType, Listener, PortMapping};
use meshward_core::ResourceKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Debug};

/// Identity of a remote mesh resource
///
/// Remote resources are addressed by name within their mesh, and gateway
/// routes additionally within their virtual gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteId {
    pub mesh_name: String,
    /// Account owning a shared mesh, `None` for meshes in our own account
    pub mesh_owner: Option<String>,
    /// Virtual gateway name for gateway routes
    pub parent_name: Option<String>,
    pub name: String,
}

impl RemoteId {
    /// Identity of a mesh
    pub fn mesh(name: impl Into<String>, mesh_owner: Option<String>) -> Self {
        let name = name.into();
        Self {
            mesh_name: name.clone(),
            mesh_owner,
            parent_name: None,
            name,
        }
    }

    /// Identity of a resource living directly in a mesh
    pub fn in_mesh(
        mesh_name: impl Into<String>,
        mesh_owner: Option<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            mesh_name: mesh_name.into(),
            mesh_owner,
            parent_name: None,
            name: name.into(),
        }
    }

    /// Identity of a gateway route under its virtual gateway
    pub fn in_gateway(
        mesh_name: impl Into<String>,
        mesh_owner: Option<String>,
        gateway_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            mesh_name: mesh_name.into(),
            mesh_owner,
            parent_name: Some(gateway_name.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent_name {
            Some(parent) => write!(f, "{}/{}/{}", self.mesh_name, parent, self.name),
            None if self.mesh_name == self.name => write!(f, "{}", self.name),
            None => write!(f, "{}/{}", self.mesh_name, self.name),
        }
    }
}

/// Remote-side lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Active,
    Inactive,
    Deleted,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Active => "ACTIVE",
            StatusCode::Inactive => "INACTIVE",
            StatusCode::Deleted => "DELETED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    pub arn: String,
    /// Account that created the resource
    pub resource_owner: String,
    /// Account that owns the enclosing mesh
    pub mesh_owner: String,
    pub version: i64,
    pub uid: String,
}

/// A remote mesh resource as returned by Describe, Create and Update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteResource<S> {
    pub id: RemoteId,
    pub spec: S,
    pub metadata: ResourceMetadata,
    pub status: StatusCode,
}

/// Remote spec shape of one resource kind
///
/// Lists are plain `Vec`s so an absent list and an empty one compare equal.
pub trait RemoteSpec:
    Clone + Debug + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: ResourceKind;
}

// --- Mesh ---

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshSpecData {
    pub egress_filter: Option<EgressFilterType>,
}

impl RemoteSpec for MeshSpecData {
    const KIND: ResourceKind = ResourceKind::Mesh;
}

// --- VirtualNode ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceDiscoveryData {
    AwsCloudMap {
        namespace_name: String,
        service_name: String,
        attributes: BTreeMap<String, String>,
    },
    Dns {
        hostname: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNodeSpecData {
    pub listeners: Vec<Listener>,
    pub service_discovery: Option<ServiceDiscoveryData>,
    /// Remote names of the virtual services this node calls
    pub backends: Vec<String>,
    pub access_log_path: Option<String>,
}

impl RemoteSpec for VirtualNodeSpecData {
    const KIND: ResourceKind = ResourceKind::VirtualNode;
}

// --- VirtualService ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VirtualServiceProviderData {
    VirtualNode { virtual_node_name: String },
    VirtualRouter { virtual_router_name: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceSpecData {
    pub provider: Option<VirtualServiceProviderData>,
}

impl RemoteSpec for VirtualServiceSpecData {
    const KIND: ResourceKind = ResourceKind::VirtualService;
}

// --- VirtualRouter ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteProtocol {
    Http,
    Http2,
    Tcp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedTargetData {
    pub virtual_node_name: String,
    pub weight: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteData {
    pub name: String,
    pub priority: Option<i64>,
    pub protocol: RouteProtocol,
    /// Path prefix for HTTP routes
    pub prefix: Option<String>,
    pub weighted_targets: Vec<WeightedTargetData>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualRouterSpecData {
    pub listeners: Vec<PortMapping>,
    pub routes: Vec<RouteData>,
}

impl RemoteSpec for VirtualRouterSpecData {
    const KIND: ResourceKind = ResourceKind::VirtualRouter;
}

// --- VirtualGateway ---

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualGatewaySpecData {
    pub listeners: Vec<Listener>,
    pub access_log_path: Option<String>,
}

impl RemoteSpec for VirtualGatewaySpecData {
    const KIND: ResourceKind = ResourceKind::VirtualGateway;
}

// --- GatewayRoute ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GatewayRouteMatchData {
    Http { prefix: String },
    Http2 { prefix: String },
    Grpc { service_name: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRouteRuleData {
    #[serde(rename = "match")]
    pub match_: GatewayRouteMatchData,
    pub target_virtual_service_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRouteSpecData {
    pub rules: Vec<GatewayRouteRuleData>,
}

impl RemoteSpec for GatewayRouteSpecData {
    const KIND: ResourceKind = ResourceKind::GatewayRoute;
}

// --- Service discovery ---

/// Type of a service-discovery namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NamespaceType {
    DnsPrivate,
    DnsPublic,
    Http,
}

impl NamespaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamespaceType::DnsPrivate => "DNS_PRIVATE",
            NamespaceType::DnsPublic => "DNS_PUBLIC",
            NamespaceType::Http => "HTTP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: NamespaceType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingPolicy {
    Multivalue,
    Weighted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DnsRecordType {
    A,
    #[serde(rename = "AAAA")]
    Aaaa,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecord {
    #[serde(rename = "type")]
    pub type_: DnsRecordType,
    pub ttl: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsConfig {
    pub routing_policy: RoutingPolicy,
    pub dns_records: Vec<DnsRecord>,
}

impl DnsConfig {
    /// A single A record with MULTIVALUE routing
    pub fn a_record(ttl: i64) -> Self {
        Self {
            routing_policy: RoutingPolicy::Multivalue,
            dns_records: vec![DnsRecord {
                type_: DnsRecordType::A,
                ttl,
            }],
        }
    }

    /// TTL of the first record, if any
    pub fn ttl(&self) -> Option<i64> {
        self.dns_records.first().map(|r| r.ttl)
    }
}

/// Present on services whose instance health is reported by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckCustomConfig {
    pub failure_threshold: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustomHealthStatus {
    Healthy,
    Unhealthy,
}

impl CustomHealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomHealthStatus::Healthy => "HEALTHY",
            CustomHealthStatus::Unhealthy => "UNHEALTHY",
        }
    }
}

impl std::fmt::Display for CustomHealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSummary {
    pub id: String,
    pub arn: String,
    pub name: String,
    pub namespace_id: String,
    /// Idempotency token supplied at creation, used to recognise our own services
    pub creator_request_id: Option<String>,
    pub dns_config: Option<DnsConfig>,
    pub health_check_custom_config: Option<HealthCheckCustomConfig>,
}

impl ServiceSummary {
    pub fn has_custom_health_check(&self) -> bool {
        self.health_check_custom_config.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub id: String,
    pub attributes: BTreeMap<String, String>,
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateServiceInput {
    pub name: String,
    pub namespace_id: String,
    pub creator_request_id: String,
    pub dns_config: Option<DnsConfig>,
    pub health_check_custom_config: Option<HealthCheckCustomConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterInstanceInput {
    pub service_id: String,
    pub instance_id: String,
    pub attributes: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_id_display() {
        assert_eq!(RemoteId::mesh("global", None).to_string(), "global");
        assert_eq!(
            RemoteId::in_mesh("global", None, "frontend_shop").to_string(),
            "global/frontend_shop"
        );
        assert_eq!(
            RemoteId::in_gateway("global", None, "ingress_edge", "color_shop").to_string(),
            "global/ingress_edge/color_shop"
        );
    }

    #[test]
    fn test_empty_lists_compare_equal() {
        let desired = VirtualNodeSpecData::default();
        let actual: VirtualNodeSpecData = serde_json::from_value(serde_json::json!({
            "listeners": [],
            "serviceDiscovery": null,
            "backends": [],
            "accessLogPath": null
        }))
        .unwrap();
        assert_eq!(desired, actual);
    }

    #[test]
    fn test_dns_config_a_record() {
        let cfg = DnsConfig::a_record(300);
        assert_eq!(cfg.routing_policy, RoutingPolicy::Multivalue);
        assert_eq!(cfg.ttl(), Some(300));
    }
}
