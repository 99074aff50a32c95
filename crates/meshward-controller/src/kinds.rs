//! Per-kind dependency resolution for the generic resource manager
//!
//! Children must reference their mesh, and every dependency they name must
//! belong to that same mesh. Dependencies that other resources route traffic
//! to must also be active before the dependent is pushed remotely.

use crate::convert::{
    gateway_route_spec, mesh_spec, virtual_gateway_spec, virtual_node_spec, virtual_router_spec,
    virtual_service_spec,
};
use crate::error::{ControllerError, Result};
use crate::references::{virtual_node_key, virtual_service_key, ReferenceResolver};
use crate::resource_manager::{Desired, ManagedKind};
use async_trait::async_trait;
use meshward_cloud::types::{
    GatewayRouteSpecData, MeshSpecData, VirtualGatewaySpecData, VirtualNodeSpecData,
    VirtualRouterSpecData, VirtualServiceSpecData,
};
use meshward_cloud::RemoteId;
use meshward_core::{
    GatewayRoute, Mesh, MeshResource, VirtualGateway, VirtualNode, VirtualRouter, VirtualService,
};
use std::collections::HashMap;
use std::sync::Arc;

const MESH_NOT_ACTIVE: &str = "mesh is not active yet";
const VIRTUAL_NODE_NOT_ACTIVE: &str = "virtualNode is not active yet";
const VIRTUAL_ROUTER_NOT_ACTIVE: &str = "virtualRouter is not active yet";
const VIRTUAL_SERVICE_NOT_ACTIVE: &str = "virtualService is not active yet";
const VIRTUAL_GATEWAY_NOT_ACTIVE: &str = "virtualGateway is not active yet";

fn blocked<S>(reason: &str) -> Desired<S> {
    Desired::Blocked {
        reason: reason.to_string(),
    }
}

fn describe<R: MeshResource>(obj: &R) -> String {
    format!("{} {}", R::KIND.display_name(), obj.object_key())
}

/// The mesh `obj` belongs to, pinned by UID
async fn owning_mesh<R: MeshResource>(resolver: &ReferenceResolver, obj: &R) -> Result<Mesh> {
    let mesh_ref = obj
        .mesh_ref()
        .ok_or_else(|| ControllerError::missing_reference("meshRef", describe(obj)))?;
    resolver.resolve_mesh(mesh_ref).await
}

/// Reject dependencies that live in a different mesh
fn ensure_member<D: MeshResource>(mesh: &Mesh, dependency: &D) -> Result<()> {
    if dependency
        .mesh_ref()
        .is_some_and(|r| mesh.is_referenced_by(r))
    {
        return Ok(());
    }
    Err(ControllerError::dependency_mismatch(format!(
        "{} {} didn't belong to mesh {}",
        D::KIND.display_name(),
        dependency.object_key(),
        mesh.name()
    )))
}

fn in_mesh(mesh: &Mesh, name: String) -> RemoteId {
    RemoteId::in_mesh(mesh.aws_name(), mesh.spec.mesh_owner.clone(), name)
}

// --- Mesh ---

pub struct MeshKind;

#[async_trait]
impl ManagedKind for MeshKind {
    type Object = Mesh;
    type Spec = MeshSpecData;

    async fn desired(&self, mesh: &Mesh) -> Result<Desired<MeshSpecData>> {
        Ok(Desired::Ready {
            id: self.remote_id(mesh).await?,
            spec: mesh_spec(mesh),
        })
    }

    async fn remote_id(&self, mesh: &Mesh) -> Result<RemoteId> {
        Ok(RemoteId::mesh(mesh.aws_name(), mesh.spec.mesh_owner.clone()))
    }
}

// --- VirtualNode ---

pub struct VirtualNodeKind {
    resolver: Arc<ReferenceResolver>,
}

impl VirtualNodeKind {
    pub fn new(resolver: Arc<ReferenceResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl ManagedKind for VirtualNodeKind {
    type Object = VirtualNode;
    type Spec = VirtualNodeSpecData;

    async fn desired(&self, vn: &VirtualNode) -> Result<Desired<VirtualNodeSpecData>> {
        let mesh = owning_mesh(&self.resolver, vn).await?;
        if !mesh.is_active() {
            return Ok(blocked(MESH_NOT_ACTIVE));
        }

        // backends only need to exist; they may still be waiting on this node
        let mut vs_by_key = HashMap::new();
        for backend in &vn.spec.backends {
            let reference = &backend.virtual_service.virtual_service_ref;
            let key = virtual_service_key(vn, reference);
            if vs_by_key.contains_key(&key) {
                continue;
            }
            let vs = self.resolver.resolve_virtual_service(vn, reference).await?;
            ensure_member(&mesh, &vs)?;
            vs_by_key.insert(key, vs);
        }

        Ok(Desired::Ready {
            id: in_mesh(&mesh, vn.aws_name()),
            spec: virtual_node_spec(vn, &vs_by_key)?,
        })
    }

    async fn remote_id(&self, vn: &VirtualNode) -> Result<RemoteId> {
        let mesh = owning_mesh(&self.resolver, vn).await?;
        Ok(in_mesh(&mesh, vn.aws_name()))
    }
}

// --- VirtualService ---

pub struct VirtualServiceKind {
    resolver: Arc<ReferenceResolver>,
}

impl VirtualServiceKind {
    pub fn new(resolver: Arc<ReferenceResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl ManagedKind for VirtualServiceKind {
    type Object = VirtualService;
    type Spec = VirtualServiceSpecData;

    async fn desired(&self, vs: &VirtualService) -> Result<Desired<VirtualServiceSpecData>> {
        let mesh = owning_mesh(&self.resolver, vs).await?;
        if !mesh.is_active() {
            return Ok(blocked(MESH_NOT_ACTIVE));
        }

        let mut vn_by_key = HashMap::new();
        let mut vr_by_key = HashMap::new();
        if let Some(provider) = &vs.spec.provider {
            if let Some(node) = &provider.virtual_node {
                let vn = self
                    .resolver
                    .resolve_virtual_node(vs, &node.virtual_node_ref)
                    .await?;
                ensure_member(&mesh, &vn)?;
                if !vn.is_active() {
                    return Ok(blocked(VIRTUAL_NODE_NOT_ACTIVE));
                }
                vn_by_key.insert(vn.object_key(), vn);
            } else if let Some(router) = &provider.virtual_router {
                let vr = self
                    .resolver
                    .resolve_virtual_router(vs, &router.virtual_router_ref)
                    .await?;
                ensure_member(&mesh, &vr)?;
                if !vr.is_active() {
                    return Ok(blocked(VIRTUAL_ROUTER_NOT_ACTIVE));
                }
                vr_by_key.insert(vr.object_key(), vr);
            }
        }

        Ok(Desired::Ready {
            id: in_mesh(&mesh, vs.aws_name()),
            spec: virtual_service_spec(vs, &vn_by_key, &vr_by_key)?,
        })
    }

    async fn remote_id(&self, vs: &VirtualService) -> Result<RemoteId> {
        let mesh = owning_mesh(&self.resolver, vs).await?;
        Ok(in_mesh(&mesh, vs.aws_name()))
    }
}

// --- VirtualRouter ---

pub struct VirtualRouterKind {
    resolver: Arc<ReferenceResolver>,
}

impl VirtualRouterKind {
    pub fn new(resolver: Arc<ReferenceResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl ManagedKind for VirtualRouterKind {
    type Object = VirtualRouter;
    type Spec = VirtualRouterSpecData;

    async fn desired(&self, vr: &VirtualRouter) -> Result<Desired<VirtualRouterSpecData>> {
        let mesh = owning_mesh(&self.resolver, vr).await?;
        if !mesh.is_active() {
            return Ok(blocked(MESH_NOT_ACTIVE));
        }

        let mut vn_by_key = HashMap::new();
        for target in vr.spec.routes.iter().flat_map(|r| r.weighted_targets()) {
            let key = virtual_node_key(vr, &target.virtual_node_ref);
            if vn_by_key.contains_key(&key) {
                continue;
            }
            let vn = self
                .resolver
                .resolve_virtual_node(vr, &target.virtual_node_ref)
                .await?;
            ensure_member(&mesh, &vn)?;
            if !vn.is_active() {
                return Ok(blocked(VIRTUAL_NODE_NOT_ACTIVE));
            }
            vn_by_key.insert(key, vn);
        }

        Ok(Desired::Ready {
            id: in_mesh(&mesh, vr.aws_name()),
            spec: virtual_router_spec(vr, &vn_by_key)?,
        })
    }

    async fn remote_id(&self, vr: &VirtualRouter) -> Result<RemoteId> {
        let mesh = owning_mesh(&self.resolver, vr).await?;
        Ok(in_mesh(&mesh, vr.aws_name()))
    }
}

// --- VirtualGateway ---

pub struct VirtualGatewayKind {
    resolver: Arc<ReferenceResolver>,
}

impl VirtualGatewayKind {
    pub fn new(resolver: Arc<ReferenceResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl ManagedKind for VirtualGatewayKind {
    type Object = VirtualGateway;
    type Spec = VirtualGatewaySpecData;

    async fn desired(&self, vg: &VirtualGateway) -> Result<Desired<VirtualGatewaySpecData>> {
        let mesh = owning_mesh(&self.resolver, vg).await?;
        if !mesh.is_active() {
            return Ok(blocked(MESH_NOT_ACTIVE));
        }
        Ok(Desired::Ready {
            id: in_mesh(&mesh, vg.aws_name()),
            spec: virtual_gateway_spec(vg),
        })
    }

    async fn remote_id(&self, vg: &VirtualGateway) -> Result<RemoteId> {
        let mesh = owning_mesh(&self.resolver, vg).await?;
        Ok(in_mesh(&mesh, vg.aws_name()))
    }
}

// --- GatewayRoute ---

pub struct GatewayRouteKind {
    resolver: Arc<ReferenceResolver>,
}

impl GatewayRouteKind {
    pub fn new(resolver: Arc<ReferenceResolver>) -> Self {
        Self { resolver }
    }

    async fn owning_gateway(&self, gr: &GatewayRoute) -> Result<VirtualGateway> {
        let vg_ref = gr
            .spec
            .virtual_gateway_ref
            .as_ref()
            .ok_or_else(|| ControllerError::missing_reference("virtualGatewayRef", describe(gr)))?;
        self.resolver.resolve_virtual_gateway(gr, vg_ref).await
    }

    fn remote_id_for(mesh: &Mesh, vg: &VirtualGateway, gr: &GatewayRoute) -> RemoteId {
        RemoteId::in_gateway(
            mesh.aws_name(),
            mesh.spec.mesh_owner.clone(),
            vg.aws_name(),
            gr.aws_name(),
        )
    }
}

#[async_trait]
impl ManagedKind for GatewayRouteKind {
    type Object = GatewayRoute;
    type Spec = GatewayRouteSpecData;

    async fn desired(&self, gr: &GatewayRoute) -> Result<Desired<GatewayRouteSpecData>> {
        let mesh = owning_mesh(&self.resolver, gr).await?;
        if !mesh.is_active() {
            return Ok(blocked(MESH_NOT_ACTIVE));
        }

        let vg = self.owning_gateway(gr).await?;
        ensure_member(&mesh, &vg)?;
        if !vg.is_active() {
            return Ok(blocked(VIRTUAL_GATEWAY_NOT_ACTIVE));
        }

        let mut vs_by_key = HashMap::new();
        for action in gr.spec.actions() {
            let reference = &action.target.virtual_service.virtual_service_ref;
            let key = virtual_service_key(gr, reference);
            if vs_by_key.contains_key(&key) {
                continue;
            }
            let vs = self.resolver.resolve_virtual_service(gr, reference).await?;
            ensure_member(&mesh, &vs)?;
            if !vs.is_active() {
                return Ok(blocked(VIRTUAL_SERVICE_NOT_ACTIVE));
            }
            vs_by_key.insert(key, vs);
        }

        Ok(Desired::Ready {
            id: Self::remote_id_for(&mesh, &vg, gr),
            spec: gateway_route_spec(gr, &vs_by_key)?,
        })
    }

    async fn remote_id(&self, gr: &GatewayRoute) -> Result<RemoteId> {
        let mesh = owning_mesh(&self.resolver, gr).await?;
        let vg = self.owning_gateway(gr).await?;
        Ok(Self::remote_id_for(&mesh, &vg, gr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCluster;
    use crate::outcome::ReconcileOutcome;
    use crate::resource_manager::AppMeshResourceManager;
    use meshward_cloud::types::{ServiceDiscoveryData, VirtualServiceProviderData};
    use meshward_cloud::InMemoryResourceApi;
    use meshward_core::resources::{
        Backend, GatewayRouteAction, GatewayRouteTarget, GatewayRouteVirtualService,
        HttpGatewayRoute, HttpGatewayRouteMatch, HttpRoute, Route, RouteAction,
        VirtualNodeReference, VirtualNodeServiceProvider, VirtualServiceBackend,
        VirtualServiceProvider, VirtualServiceReference, WeightedTarget,
    };
    use meshward_core::{update_condition, ConditionStatus, MeshReference};

    const ACCOUNT: &str = "111122223333";

    fn activate<R: MeshResource>(mut obj: R) -> R {
        update_condition(&mut obj, R::ACTIVE_CONDITION, ConditionStatus::True, None, None);
        obj
    }

    async fn make_mesh(cluster: &MockCluster, name: &str, active: bool) -> Mesh {
        let mut mesh = Mesh::default();
        mesh.metadata.name = Some(name.to_string());
        let mesh = if active { activate(mesh) } else { mesh };
        cluster.insert(mesh).await
    }

    fn make_vn(name: &str, mesh: &Mesh) -> VirtualNode {
        let mut vn = VirtualNode::default();
        vn.metadata.name = Some(name.to_string());
        vn.metadata.namespace = Some("shop".to_string());
        vn.spec.mesh_ref = Some(mesh.reference());
        vn
    }

    fn make_vs(name: &str, mesh: &Mesh) -> VirtualService {
        let mut vs = VirtualService::default();
        vs.metadata.name = Some(name.to_string());
        vs.metadata.namespace = Some("shop".to_string());
        vs.spec.mesh_ref = Some(mesh.reference());
        vs
    }

    fn vs_ref(name: &str) -> VirtualServiceReference {
        VirtualServiceReference {
            namespace: None,
            name: name.to_string(),
        }
    }

    fn vn_ref(name: &str) -> VirtualNodeReference {
        VirtualNodeReference {
            namespace: None,
            name: name.to_string(),
        }
    }

    fn make_manager<K: ManagedKind>(
        kind: K,
        cluster: &Arc<MockCluster>,
    ) -> (AppMeshResourceManager<K>, Arc<InMemoryResourceApi<K::Spec>>) {
        let api = Arc::new(InMemoryResourceApi::new(ACCOUNT, "us-west-2"));
        let manager = AppMeshResourceManager::new(kind, api.clone(), cluster.clone(), ACCOUNT);
        (manager, api)
    }

    fn resolver(cluster: &Arc<MockCluster>) -> Arc<ReferenceResolver> {
        Arc::new(ReferenceResolver::new(cluster.clone()))
    }

    #[tokio::test]
    async fn test_virtual_node_waits_for_mesh() {
        let cluster = Arc::new(MockCluster::new());
        let mesh = make_mesh(&cluster, "global", false).await;
        let mut vn = cluster.insert(make_vn("frontend", &mesh)).await;
        let (manager, api) = make_manager(VirtualNodeKind::new(resolver(&cluster)), &cluster);

        let outcome = manager.reconcile(&mut vn).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Requeue);
        assert_eq!(api.describe_calls(), 0);
        assert_eq!(cluster.status_patches(), 0);
    }

    #[tokio::test]
    async fn test_virtual_node_drops_stale_remote_backend() {
        let cluster = Arc::new(MockCluster::new());
        let mesh = make_mesh(&cluster, "global", true).await;
        let mut vn = cluster.insert(make_vn("frontend", &mesh)).await;
        let (manager, api) = make_manager(VirtualNodeKind::new(resolver(&cluster)), &cluster);

        let id = RemoteId::in_mesh("global", None, "frontend_shop");
        api.seed(
            &id,
            VirtualNodeSpecData {
                backends: vec!["backend_shop".to_string()],
                ..Default::default()
            },
            ACCOUNT,
        )
        .await;

        manager.reconcile(&mut vn).await.unwrap();
        assert_eq!(api.update_calls(), 1);
        assert!(api.get(&id).await.unwrap().spec.backends.is_empty());
        assert_eq!(
            vn.status.virtual_node_arn.as_deref(),
            Some("arn:aws:appmesh:us-west-2:111122223333:mesh/global/virtualNode/frontend_shop")
        );
    }

    #[tokio::test]
    async fn test_virtual_node_backend_need_not_be_active() {
        let cluster = Arc::new(MockCluster::new());
        let mesh = make_mesh(&cluster, "global", true).await;
        cluster.insert(make_vs("backend", &mesh)).await;

        let mut vn = make_vn("frontend", &mesh);
        vn.spec.service_discovery = Some(meshward_core::resources::ServiceDiscovery {
            dns: Some(meshward_core::resources::DnsServiceDiscovery {
                hostname: "frontend.shop.svc.cluster.local".to_string(),
            }),
            aws_cloud_map: None,
        });
        vn.spec.backends = vec![
            Backend {
                virtual_service: VirtualServiceBackend {
                    virtual_service_ref: vs_ref("backend"),
                },
            },
            Backend {
                virtual_service: VirtualServiceBackend {
                    virtual_service_ref: vs_ref("backend"),
                },
            },
        ];
        let mut vn = cluster.insert(vn).await;
        let (manager, api) = make_manager(VirtualNodeKind::new(resolver(&cluster)), &cluster);

        manager.reconcile(&mut vn).await.unwrap();
        let remote = api
            .get(&RemoteId::in_mesh("global", None, "frontend_shop"))
            .await
            .unwrap();
        assert_eq!(remote.spec.backends, vec!["backend_shop"]);
        assert!(matches!(
            remote.spec.service_discovery,
            Some(ServiceDiscoveryData::Dns { .. })
        ));
    }

    #[tokio::test]
    async fn test_backend_in_other_mesh_rejected() {
        let cluster = Arc::new(MockCluster::new());
        let mesh = make_mesh(&cluster, "global", true).await;
        let other = make_mesh(&cluster, "other", true).await;
        cluster.insert(make_vs("backend", &other)).await;

        let mut vn = make_vn("frontend", &mesh);
        vn.spec.backends = vec![Backend {
            virtual_service: VirtualServiceBackend {
                virtual_service_ref: vs_ref("backend"),
            },
        }];
        let mut vn = cluster.insert(vn).await;
        let (manager, api) = make_manager(VirtualNodeKind::new(resolver(&cluster)), &cluster);

        let err = manager.reconcile(&mut vn).await.unwrap_err();
        assert!(matches!(err, ControllerError::DependencyMismatch { .. }));
        assert_eq!(
            err.to_string(),
            "virtualService shop/backend didn't belong to mesh global"
        );
        assert!(err.is_permanent());
        assert_eq!(api.mutation_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_mesh_ref_is_permanent() {
        let cluster = Arc::new(MockCluster::new());
        let mut vn = VirtualNode::default();
        vn.metadata.name = Some("frontend".to_string());
        vn.metadata.namespace = Some("shop".to_string());
        let mut vn = cluster.insert(vn).await;
        let (manager, _api) = make_manager(VirtualNodeKind::new(resolver(&cluster)), &cluster);

        let err = manager.reconcile(&mut vn).await.unwrap_err();
        assert!(matches!(err, ControllerError::MissingReference { .. }));
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_recreated_mesh_is_identity_mismatch() {
        let cluster = Arc::new(MockCluster::new());
        make_mesh(&cluster, "global", true).await;
        let mut vs = VirtualService::default();
        vs.metadata.name = Some("backend".to_string());
        vs.metadata.namespace = Some("shop".to_string());
        vs.spec.mesh_ref = Some(MeshReference {
            name: "global".to_string(),
            uid: "uid-stale".to_string(),
        });
        let mut vs = cluster.insert(vs).await;
        let (manager, _api) = make_manager(VirtualServiceKind::new(resolver(&cluster)), &cluster);

        let err = manager.reconcile(&mut vs).await.unwrap_err();
        assert!(matches!(err, ControllerError::IdentityMismatch { .. }));
    }

    #[tokio::test]
    async fn test_virtual_service_waits_for_provider() {
        let cluster = Arc::new(MockCluster::new());
        let mesh = make_mesh(&cluster, "global", true).await;
        let vn = cluster.insert(make_vn("backend-v1", &mesh)).await;

        let mut vs = make_vs("backend", &mesh);
        vs.spec.provider = Some(VirtualServiceProvider {
            virtual_node: Some(VirtualNodeServiceProvider {
                virtual_node_ref: vn_ref("backend-v1"),
            }),
            virtual_router: None,
        });
        let mut vs = cluster.insert(vs).await;
        let (manager, api) = make_manager(VirtualServiceKind::new(resolver(&cluster)), &cluster);

        assert_eq!(
            manager.reconcile(&mut vs).await.unwrap(),
            ReconcileOutcome::Requeue
        );

        let vn = activate(vn);
        crate::cluster::patch_resource_status(cluster.as_ref(), &vn)
            .await
            .unwrap();

        manager.reconcile(&mut vs).await.unwrap();
        let remote = api
            .get(&RemoteId::in_mesh("global", None, "backend_shop"))
            .await
            .unwrap();
        assert_eq!(
            remote.spec.provider,
            Some(VirtualServiceProviderData::VirtualNode {
                virtual_node_name: "backend-v1_shop".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_virtual_router_waits_for_weighted_targets() {
        let cluster = Arc::new(MockCluster::new());
        let mesh = make_mesh(&cluster, "global", true).await;
        cluster.insert(activate(make_vn("v1", &mesh))).await;
        cluster.insert(make_vn("v2", &mesh)).await;

        let mut vr = VirtualRouter::default();
        vr.metadata.name = Some("backend".to_string());
        vr.metadata.namespace = Some("shop".to_string());
        vr.spec.mesh_ref = Some(mesh.reference());
        vr.spec.routes = vec![Route {
            name: "split".to_string(),
            priority: None,
            http_route: Some(HttpRoute {
                match_: Default::default(),
                action: RouteAction {
                    weighted_targets: vec![
                        WeightedTarget {
                            virtual_node_ref: vn_ref("v1"),
                            weight: 90,
                        },
                        WeightedTarget {
                            virtual_node_ref: vn_ref("v2"),
                            weight: 10,
                        },
                    ],
                },
            }),
            http2_route: None,
            tcp_route: None,
        }];
        let mut vr = cluster.insert(vr).await;
        let (manager, api) = make_manager(VirtualRouterKind::new(resolver(&cluster)), &cluster);

        assert_eq!(
            manager.reconcile(&mut vr).await.unwrap(),
            ReconcileOutcome::Requeue
        );
        assert_eq!(api.create_calls(), 0);
    }

    fn make_gateway_route(mesh: &Mesh, vg: &VirtualGateway) -> GatewayRoute {
        let mut gr = GatewayRoute::default();
        gr.metadata.name = Some("checkout".to_string());
        gr.metadata.namespace = Some("shop".to_string());
        gr.spec.mesh_ref = Some(mesh.reference());
        gr.spec.virtual_gateway_ref = Some(vg.reference());
        gr.spec.http_route = Some(HttpGatewayRoute {
            match_: HttpGatewayRouteMatch {
                prefix: "/checkout".to_string(),
            },
            action: GatewayRouteAction {
                target: GatewayRouteTarget {
                    virtual_service: GatewayRouteVirtualService {
                        virtual_service_ref: vs_ref("checkout"),
                    },
                },
            },
        });
        gr
    }

    #[tokio::test]
    async fn test_gateway_route_lives_under_gateway() {
        let cluster = Arc::new(MockCluster::new());
        let mesh = make_mesh(&cluster, "global", true).await;
        let mut vg = VirtualGateway::default();
        vg.metadata.name = Some("ingress".to_string());
        vg.metadata.namespace = Some("edge".to_string());
        vg.spec.mesh_ref = Some(mesh.reference());
        let vg = cluster.insert(activate(vg)).await;
        cluster.insert(activate(make_vs("checkout", &mesh))).await;

        let mut gr = cluster.insert(make_gateway_route(&mesh, &vg)).await;
        let (manager, api) = make_manager(GatewayRouteKind::new(resolver(&cluster)), &cluster);

        manager.reconcile(&mut gr).await.unwrap();
        let id = RemoteId::in_gateway("global", None, "ingress_edge", "checkout_shop");
        let remote = api.get(&id).await.unwrap();
        assert_eq!(remote.spec.rules.len(), 1);
        assert_eq!(remote.spec.rules[0].target_virtual_service_name, "checkout_shop");
        assert_eq!(
            gr.status.gateway_route_arn.as_deref(),
            Some("arn:aws:appmesh:us-west-2:111122223333:mesh/global/virtualGateway/ingress_edge/gatewayRoute/checkout_shop")
        );
    }

    #[tokio::test]
    async fn test_gateway_route_waits_for_gateway() {
        let cluster = Arc::new(MockCluster::new());
        let mesh = make_mesh(&cluster, "global", true).await;
        let mut vg = VirtualGateway::default();
        vg.metadata.name = Some("ingress".to_string());
        vg.metadata.namespace = Some("edge".to_string());
        vg.spec.mesh_ref = Some(mesh.reference());
        let vg = cluster.insert(vg).await;

        let mut gr = cluster.insert(make_gateway_route(&mesh, &vg)).await;
        let (manager, _api) = make_manager(GatewayRouteKind::new(resolver(&cluster)), &cluster);
        assert_eq!(
            manager.reconcile(&mut gr).await.unwrap(),
            ReconcileOutcome::Requeue
        );

        gr.spec.virtual_gateway_ref = None;
        let err = manager.reconcile(&mut gr).await.unwrap_err();
        assert!(matches!(err, ControllerError::MissingReference { .. }));
    }
}
