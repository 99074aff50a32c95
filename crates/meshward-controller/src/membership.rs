//! Membership designation: which parent a namespaced object belongs to
//!
//! A parent claims namespaces through its `namespaceSelector`. An absent
//! selector claims nothing while an empty one claims every namespace.
//! Exactly one parent must claim the object's namespace.

use crate::cluster::{list_resources, ClusterClient};
use crate::error::{ControllerError, Result};
use meshward_core::{
    selector_matches, selector_matches_or_all, GatewayRoute, Mesh, MeshResource, VirtualGateway,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

fn namespace_labels(ns: &k8s_openapi::api::core::v1::Namespace) -> BTreeMap<String, String> {
    ns.metadata.labels.clone().unwrap_or_default()
}

/// Candidate keys, `namespace/name` for namespaced kinds
fn sorted_names<R: MeshResource>(candidates: &[R]) -> String {
    let mut names: Vec<String> = candidates
        .iter()
        .map(|c| c.object_key().to_string())
        .collect();
    names.sort_unstable();
    names.join(",")
}

fn format_labels(labels: &BTreeMap<String, String>) -> String {
    let pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("[{}]", pairs.join(","))
}

/// Designates the mesh of namespaced objects
pub struct MeshMembershipDesignator {
    client: Arc<dyn ClusterClient>,
}

impl MeshMembershipDesignator {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    /// The unique mesh whose namespaceSelector matches `namespace`
    pub async fn designate(&self, namespace: &str) -> Result<Mesh> {
        let ns = self.client.get_namespace(namespace).await?;
        let labels = namespace_labels(&ns);
        let meshes: Vec<Mesh> = list_resources(self.client.as_ref(), None).await?;

        let mut candidates = Vec::new();
        for mesh in meshes {
            if selector_matches(mesh.spec.namespace_selector.as_ref(), &labels)? {
                candidates.push(mesh);
            }
        }

        match candidates.len() {
            0 => Err(ControllerError::no_membership(format!(
                "failed to find matching mesh for namespace: {}, expecting 1 but found 0",
                namespace
            ))),
            1 => {
                let mesh = candidates.remove(0);
                if mesh.is_terminating() {
                    return Err(ControllerError::parent_terminating(format!(
                        "unable to create new content in mesh {} because it is being terminated",
                        mesh.name()
                    )));
                }
                debug!("Namespace {} designated to mesh {}", namespace, mesh.name());
                Ok(mesh)
            }
            n => Err(ControllerError::ambiguous_membership(format!(
                "found multiple matching meshes for namespace: {}, expecting 1 but found {}: {}",
                namespace,
                n,
                sorted_names(&candidates)
            ))),
        }
    }
}

/// Designates the virtual gateway of gateway routes
pub struct VirtualGatewayMembershipDesignator {
    client: Arc<dyn ClusterClient>,
}

impl VirtualGatewayMembershipDesignator {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    /// The unique virtual gateway that claims both the route's namespace and,
    /// through its gatewayRouteSelector, the route itself
    ///
    /// An absent gatewayRouteSelector claims every route.
    pub async fn designate_for_gateway_route(&self, gr: &GatewayRoute) -> Result<VirtualGateway> {
        let namespace = gr.namespace().unwrap_or_default();
        let ns = self.client.get_namespace(namespace).await?;
        let ns_labels = namespace_labels(&ns);
        let gateways: Vec<VirtualGateway> = list_resources(self.client.as_ref(), None).await?;

        let mut ns_candidates = Vec::new();
        for vg in gateways {
            if selector_matches(vg.spec.namespace_selector.as_ref(), &ns_labels)? {
                ns_candidates.push(vg);
            }
        }
        if ns_candidates.is_empty() {
            return Err(ControllerError::no_membership(format!(
                "failed to find matching virtualGateway for namespace: {}, expecting 1 but found 0",
                namespace
            )));
        }

        let gr_labels = gr.labels();
        let mut candidates = Vec::new();
        for vg in ns_candidates {
            if selector_matches_or_all(vg.spec.gateway_route_selector.as_ref(), &gr_labels)? {
                candidates.push(vg);
            }
        }

        match candidates.len() {
            0 => Err(ControllerError::no_membership(format!(
                "failed to find matching virtualGateway with matching gatewayroute selector: {}, expecting 1 but found 0",
                format_labels(&gr_labels)
            ))),
            1 => {
                let vg = candidates.remove(0);
                if vg.is_terminating() {
                    return Err(ControllerError::parent_terminating(format!(
                        "unable to create new content in virtualGateway {} because it is being terminated",
                        vg.name()
                    )));
                }
                Ok(vg)
            }
            n => Err(ControllerError::ambiguous_membership(format!(
                "found multiple matching virtualGateways for same gatewayroute selector: {}, expecting 1 but found {}: {}",
                format_labels(&gr_labels),
                n,
                sorted_names(&candidates)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCluster;
    use meshward_core::{LabelSelector, ObjectKey, ResourceKind};

    fn selector(labels: &[(&str, &str)]) -> LabelSelector {
        LabelSelector {
            match_labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            match_expressions: None,
        }
    }

    fn make_mesh(name: &str, ns_selector: Option<LabelSelector>) -> Mesh {
        let mut mesh = Mesh::default();
        mesh.metadata.name = Some(name.to_string());
        mesh.spec.namespace_selector = ns_selector;
        mesh
    }

    fn make_vg(
        name: &str,
        ns_selector: Option<LabelSelector>,
        gr_selector: Option<LabelSelector>,
    ) -> VirtualGateway {
        let mut vg = VirtualGateway::default();
        vg.metadata.name = Some(name.to_string());
        vg.metadata.namespace = Some("edge".to_string());
        vg.spec.namespace_selector = ns_selector;
        vg.spec.gateway_route_selector = gr_selector;
        vg
    }

    fn make_gr(labels: &[(&str, &str)]) -> GatewayRoute {
        let mut gr = GatewayRoute::default();
        gr.metadata.name = Some("checkout".to_string());
        gr.metadata.namespace = Some("shop".to_string());
        gr.metadata.labels = Some(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        gr
    }

    #[tokio::test]
    async fn test_nil_selector_never_matches_empty_matches_all() {
        let cluster = Arc::new(MockCluster::new());
        cluster.add_namespace("shop", &[]).await;
        cluster.insert(make_mesh("nil-selector", None)).await;
        cluster
            .insert(make_mesh("everything", Some(LabelSelector::default())))
            .await;

        let designator = MeshMembershipDesignator::new(cluster.clone());
        let mesh = designator.designate("shop").await.unwrap();
        assert_eq!(mesh.name(), "everything");

        // same answer on repeated invocation
        let again = designator.designate("shop").await.unwrap();
        assert_eq!(again.uid(), mesh.uid());
    }

    #[tokio::test]
    async fn test_no_matching_mesh() {
        let cluster = Arc::new(MockCluster::new());
        cluster.add_namespace("shop", &[("mesh", "blue")]).await;
        cluster
            .insert(make_mesh("green", Some(selector(&[("mesh", "green")]))))
            .await;

        let designator = MeshMembershipDesignator::new(cluster);
        let err = designator.designate("shop").await.unwrap_err();
        assert!(matches!(err, ControllerError::NoMembership { .. }));
        assert_eq!(
            err.to_string(),
            "failed to find matching mesh for namespace: shop, expecting 1 but found 0"
        );
    }

    #[tokio::test]
    async fn test_ambiguous_meshes_sorted() {
        let cluster = Arc::new(MockCluster::new());
        cluster.add_namespace("shop", &[("mesh", "blue")]).await;
        cluster
            .insert(make_mesh("zeta", Some(selector(&[("mesh", "blue")]))))
            .await;
        cluster
            .insert(make_mesh("alpha", Some(LabelSelector::default())))
            .await;

        let designator = MeshMembershipDesignator::new(cluster);
        let err = designator.designate("shop").await.unwrap_err();
        assert!(matches!(err, ControllerError::AmbiguousMembership { .. }));
        assert_eq!(
            err.to_string(),
            "found multiple matching meshes for namespace: shop, expecting 1 but found 2: alpha,zeta"
        );
    }

    #[tokio::test]
    async fn test_terminating_mesh_rejected() {
        let cluster = Arc::new(MockCluster::new());
        cluster.add_namespace("shop", &[]).await;
        let mut mesh = make_mesh("global", Some(LabelSelector::default()));
        mesh.metadata.finalizers = Some(vec!["hold".to_string()]);
        cluster.insert(mesh).await;
        cluster
            .mark_deleted(ResourceKind::Mesh, &ObjectKey::cluster_scoped("global"))
            .await;

        let designator = MeshMembershipDesignator::new(cluster);
        let err = designator.designate("shop").await.unwrap_err();
        assert!(matches!(err, ControllerError::ParentTerminating { .. }));
    }

    #[tokio::test]
    async fn test_missing_namespace_propagates() {
        let cluster = Arc::new(MockCluster::new());
        let designator = MeshMembershipDesignator::new(cluster);
        let err = designator.designate("shop").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_gateway_route_selector_narrows_candidates() {
        let cluster = Arc::new(MockCluster::new());
        cluster.add_namespace("shop", &[("gateway", "public")]).await;
        cluster
            .insert(make_vg(
                "public",
                Some(selector(&[("gateway", "public")])),
                Some(selector(&[("exposure", "public")])),
            ))
            .await;
        cluster
            .insert(make_vg(
                "internal",
                Some(LabelSelector::default()),
                Some(selector(&[("exposure", "internal")])),
            ))
            .await;
        cluster.insert(make_vg("unclaimed", None, None)).await;

        let designator = VirtualGatewayMembershipDesignator::new(cluster);
        let vg = designator
            .designate_for_gateway_route(&make_gr(&[("exposure", "public")]))
            .await
            .unwrap();
        assert_eq!(vg.name(), "public");

        let err = designator
            .designate_for_gateway_route(&make_gr(&[("exposure", "partner")]))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to find matching virtualGateway with matching gatewayroute selector: [exposure=partner], expecting 1 but found 0"
        );
    }

    #[tokio::test]
    async fn test_nil_gateway_route_selector_matches_all() {
        let cluster = Arc::new(MockCluster::new());
        cluster.add_namespace("shop", &[]).await;
        cluster
            .insert(make_vg("b-gw", Some(LabelSelector::default()), None))
            .await;
        cluster
            .insert(make_vg("a-gw", Some(LabelSelector::default()), None))
            .await;

        let designator = VirtualGatewayMembershipDesignator::new(cluster);
        let err = designator
            .designate_for_gateway_route(&make_gr(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::AmbiguousMembership { .. }));
        assert!(err
            .to_string()
            .ends_with("expecting 1 but found 2: edge/a-gw,edge/b-gw"));
    }

    #[tokio::test]
    async fn test_ambiguous_gateways_named_by_namespace() {
        let cluster = Arc::new(MockCluster::new());
        cluster.add_namespace("shop", &[]).await;
        cluster
            .insert(make_vg("ingress", Some(LabelSelector::default()), None))
            .await;
        let mut other = make_vg("ingress", Some(LabelSelector::default()), None);
        other.metadata.namespace = Some("dmz".to_string());
        cluster.insert(other).await;

        let designator = VirtualGatewayMembershipDesignator::new(cluster);
        let err = designator
            .designate_for_gateway_route(&make_gr(&[]))
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .ends_with("expecting 1 but found 2: dmz/ingress,edge/ingress"));
    }

    #[tokio::test]
    async fn test_no_gateway_for_namespace() {
        let cluster = Arc::new(MockCluster::new());
        cluster.add_namespace("shop", &[]).await;
        cluster.insert(make_vg("ingress", None, None)).await;

        let designator = VirtualGatewayMembershipDesignator::new(cluster);
        let err = designator
            .designate_for_gateway_route(&make_gr(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::NoMembership { .. }));
    }
}
