//! How pods map onto virtual nodes and discovery instances

use k8s_openapi::api::core::v1::{Node, Pod};
use meshward_cloud::CustomHealthStatus;
use std::collections::BTreeMap;
use tracing::warn;

/// Injected by the sidecar webhook as `mesh/<mesh>/virtualNode/<virtualNode>`
pub const ENV_VIRTUAL_NODE_NAME: &str = "APPMESH_VIRTUAL_NODE_NAME";
pub const ANNOTATION_MESH: &str = "appmesh.k8s.aws/mesh";
pub const ANNOTATION_VIRTUAL_NODE: &str = "appmesh.k8s.aws/virtualNode";

pub const ATTR_INSTANCE_IPV4: &str = "AWS_INSTANCE_IPV4";
pub const ATTR_INIT_HEALTH_STATUS: &str = "AWS_INIT_HEALTH_STATUS";
pub const ATTR_K8S_POD: &str = "k8s.io/pod";
pub const ATTR_K8S_NAMESPACE: &str = "k8s.io/namespace";
pub const ATTR_APPMESH_MESH: &str = "appmesh.k8s.aws/mesh";
pub const ATTR_APPMESH_VIRTUAL_NODE: &str = "appmesh.k8s.aws/virtualNode";
pub const ATTR_REGION: &str = "REGION";
pub const ATTR_AVAILABILITY_ZONE: &str = "AVAILABILITY_ZONE";

const NODE_REGION_LABELS: [&str; 2] = [
    "topology.kubernetes.io/region",
    "failure-domain.beta.kubernetes.io/region",
];
const NODE_ZONE_LABELS: [&str; 2] = [
    "topology.kubernetes.io/zone",
    "failure-domain.beta.kubernetes.io/zone",
];

/// Remote names of the mesh and virtual node a pod runs as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodMembership {
    pub mesh_name: String,
    pub virtual_node_name: String,
}

/// Parse `mesh/<mesh>/virtualNode/<virtualNode>`
fn parse_virtual_node_token(value: &str) -> Option<(String, String)> {
    let tokens: Vec<&str> = value.split('/').collect();
    match tokens.as_slice() {
        ["mesh", mesh, "virtualNode", vn] => Some((mesh.to_string(), vn.to_string())),
        _ => {
            warn!("Ignoring malformed {} value: {}", ENV_VIRTUAL_NODE_NAME, value);
            None
        }
    }
}

fn env_membership(pod: &Pod) -> Option<(String, String)> {
    let containers = pod.spec.as_ref().map(|s| s.containers.as_slice())?;
    containers
        .iter()
        .flat_map(|c| c.env.iter().flatten())
        .find(|env| env.name == ENV_VIRTUAL_NODE_NAME)
        .and_then(|env| env.value.as_deref())
        .and_then(parse_virtual_node_token)
}

/// Mesh and virtual node of a pod, or `None` if the pod is not in a mesh
///
/// The injected environment wins; annotations only fill values it left empty.
pub fn pod_membership(pod: &Pod) -> Option<PodMembership> {
    let (mut mesh_name, mut virtual_node_name) = env_membership(pod).unwrap_or_default();

    if let Some(annotations) = &pod.metadata.annotations {
        if mesh_name.is_empty() {
            mesh_name = annotations.get(ANNOTATION_MESH).cloned().unwrap_or_default();
        }
        if virtual_node_name.is_empty() {
            virtual_node_name = annotations
                .get(ANNOTATION_VIRTUAL_NODE)
                .cloned()
                .unwrap_or_default();
        }
    }

    if mesh_name.is_empty() || virtual_node_name.is_empty() {
        return None;
    }
    Some(PodMembership {
        mesh_name,
        virtual_node_name,
    })
}

/// The pod's IP, which doubles as its instance ID
pub fn pod_ip(pod: &Pod) -> Option<&str> {
    pod.status
        .as_ref()
        .and_then(|s| s.pod_ip.as_deref())
        .filter(|ip| !ip.is_empty())
}

pub fn is_running(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        == Some("Running")
}

pub fn is_terminating(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_some()
}

/// Whether the pod reports the `ContainersReady` condition as true
pub fn containers_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "ContainersReady" && c.status == "True")
        })
}

/// Instance health a pod's readiness maps to
pub fn instance_health(pod: &Pod) -> CustomHealthStatus {
    if containers_ready(pod) {
        CustomHealthStatus::Healthy
    } else {
        CustomHealthStatus::Unhealthy
    }
}

/// Region and zone of the node a pod runs on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeLocality {
    pub region: Option<String>,
    pub availability_zone: Option<String>,
}

impl NodeLocality {
    pub fn from_node(node: &Node) -> Self {
        let labels = node.metadata.labels.clone().unwrap_or_default();
        let first = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| labels.get(*k))
                .filter(|v| !v.is_empty())
                .cloned()
        };
        Self {
            region: first(&NODE_REGION_LABELS[..]),
            availability_zone: first(&NODE_ZONE_LABELS[..]),
        }
    }
}

/// Whether an instance was registered for the given mesh and virtual node
///
/// Several virtual nodes may share one discovery service; each only owns the
/// instances stamped with its own names.
pub fn registered_for(
    attributes: &BTreeMap<String, String>,
    mesh_name: &str,
    virtual_node_name: &str,
) -> bool {
    attributes.get(ATTR_APPMESH_MESH).map(String::as_str) == Some(mesh_name)
        && attributes.get(ATTR_APPMESH_VIRTUAL_NODE).map(String::as_str) == Some(virtual_node_name)
}

/// Registration attributes of a pod's instance
///
/// Pod labels come first, then node-configured attributes, so the fixed ones
/// always describe the pod itself.
pub fn instance_attributes(
    pod: &Pod,
    ip: &str,
    membership: &PodMembership,
    node_attributes: &BTreeMap<String, String>,
    locality: &NodeLocality,
    health: CustomHealthStatus,
) -> BTreeMap<String, String> {
    let mut attributes = pod.metadata.labels.clone().unwrap_or_default();
    attributes.extend(
        node_attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    attributes.insert(ATTR_INSTANCE_IPV4.to_string(), ip.to_string());
    attributes.insert(
        ATTR_INIT_HEALTH_STATUS.to_string(),
        health.as_str().to_string(),
    );
    attributes.insert(
        ATTR_K8S_POD.to_string(),
        pod.metadata.name.clone().unwrap_or_default(),
    );
    attributes.insert(
        ATTR_K8S_NAMESPACE.to_string(),
        pod.metadata.namespace.clone().unwrap_or_default(),
    );
    attributes.insert(ATTR_APPMESH_MESH.to_string(), membership.mesh_name.clone());
    attributes.insert(
        ATTR_APPMESH_VIRTUAL_NODE.to_string(),
        membership.virtual_node_name.clone(),
    );
    if let Some(region) = &locality.region {
        attributes.insert(ATTR_REGION.to_string(), region.clone());
    }
    if let Some(zone) = &locality.availability_zone {
        attributes.insert(ATTR_AVAILABILITY_ZONE.to_string(), zone.clone());
    }
    attributes
}
