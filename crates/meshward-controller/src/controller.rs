//! Periodic driver for every managed kind
//!
//! Each pass lists the objects of one kind at a time, parents before
//! children, and runs them through a bounded pool. A pass finishes before
//! the next one starts, so an object never has two reconciles in flight.

use crate::cloudmap::{CloudMapInstanceReconciler, CloudMapResourceManager, ServiceLocator};
use crate::cluster::{list_resources, patch_resource_spec, ClusterClient};
use crate::config::ControllerConfig;
use crate::error::{ControllerError, Result};
use crate::finalizers::{
    FinalizerManager, FINALIZER_APPMESH_RESOURCES, FINALIZER_CLOUDMAP_RESOURCES,
    FINALIZER_MESH_MEMBERS,
};
use crate::kinds::{
    GatewayRouteKind, MeshKind, VirtualGatewayKind, VirtualNodeKind, VirtualRouterKind,
    VirtualServiceKind,
};
use crate::members_finalizer::{MeshMembersFinalizer, VirtualGatewayMembersFinalizer};
use crate::membership::{MeshMembershipDesignator, VirtualGatewayMembershipDesignator};
use crate::outcome::ReconcileOutcome;
use crate::references::ReferenceResolver;
use crate::resource_manager::AppMeshResourceManager;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use meshward_cloud::types::{
    GatewayRouteSpecData, MeshSpecData, VirtualGatewaySpecData, VirtualNodeSpecData,
    VirtualRouterSpecData, VirtualServiceSpecData,
};
use meshward_cloud::{
    CallTimeouts, CloudMapApi, InMemoryCloudMap, InMemoryResourceApi, RemoteSpec, ResourceApi,
    ThrottledCloudMap, ThrottledResourceApi, Throttler,
};
use meshward_core::events::{REASON_CONFIGURATION_ERROR, REASON_RECONCILE_ERROR};
use meshward_core::{
    to_value, EventRecord, GatewayRoute, Mesh, MeshResource, ObjectKey, ResourceKind,
    VirtualGateway, VirtualNode, VirtualRouter, VirtualService,
};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Every finalizer this controller may hold
const CONTROLLER_FINALIZERS: [&str; 3] = [
    FINALIZER_MESH_MEMBERS,
    FINALIZER_APPMESH_RESOURCES,
    FINALIZER_CLOUDMAP_RESOURCES,
];

/// Remote control-plane clients, one per kind plus service discovery
pub struct RemoteBackends {
    pub meshes: Arc<dyn ResourceApi<MeshSpecData>>,
    pub virtual_nodes: Arc<dyn ResourceApi<VirtualNodeSpecData>>,
    pub virtual_services: Arc<dyn ResourceApi<VirtualServiceSpecData>>,
    pub virtual_routers: Arc<dyn ResourceApi<VirtualRouterSpecData>>,
    pub virtual_gateways: Arc<dyn ResourceApi<VirtualGatewaySpecData>>,
    pub gateway_routes: Arc<dyn ResourceApi<GatewayRouteSpecData>>,
    pub cloudmap: Arc<dyn CloudMapApi>,
}

fn throttled<S: RemoteSpec>(
    inner: Arc<dyn ResourceApi<S>>,
    throttler: &Throttler,
    timeouts: CallTimeouts,
) -> Arc<dyn ResourceApi<S>> {
    Arc::new(ThrottledResourceApi::new(inner, throttler.clone(), timeouts))
}

impl RemoteBackends {
    /// In-memory stand-ins for the managed services
    pub fn in_memory(account_id: &str, region: &str) -> Self {
        Self {
            meshes: Arc::new(InMemoryResourceApi::new(account_id, region)),
            virtual_nodes: Arc::new(InMemoryResourceApi::new(account_id, region)),
            virtual_services: Arc::new(InMemoryResourceApi::new(account_id, region)),
            virtual_routers: Arc::new(InMemoryResourceApi::new(account_id, region)),
            virtual_gateways: Arc::new(InMemoryResourceApi::new(account_id, region)),
            gateway_routes: Arc::new(InMemoryResourceApi::new(account_id, region)),
            cloudmap: Arc::new(InMemoryCloudMap::new(account_id, region)),
        }
    }

    /// Put every client behind one shared throttler and the call deadlines
    pub fn throttled(self, throttler: &Throttler, timeouts: CallTimeouts) -> Self {
        Self {
            meshes: throttled(self.meshes, throttler, timeouts),
            virtual_nodes: throttled(self.virtual_nodes, throttler, timeouts),
            virtual_services: throttled(self.virtual_services, throttler, timeouts),
            virtual_routers: throttled(self.virtual_routers, throttler, timeouts),
            virtual_gateways: throttled(self.virtual_gateways, throttler, timeouts),
            gateway_routes: throttled(self.gateway_routes, throttler, timeouts),
            cloudmap: Arc::new(ThrottledCloudMap::new(
                self.cloudmap,
                throttler.clone(),
                timeouts,
            )),
        }
    }
}

/// Per-kind steps of the driver
#[async_trait]
trait Lifecycle<R: MeshResource>: Send + Sync {
    /// Finalizers a live object must carry
    fn finalizer_names(&self, obj: &R) -> Vec<&'static str>;

    /// Fill in designated references the object was admitted without
    async fn backfill(&self, obj: &mut R) -> Result<()>;

    async fn reconcile_remote(&self, obj: &mut R) -> Result<ReconcileOutcome>;

    async fn cleanup_remote(&self, obj: &R) -> Result<ReconcileOutcome>;
}

/// Drives reconcile and cleanup of all six kinds
pub struct MeshController {
    config: ControllerConfig,
    client: Arc<dyn ClusterClient>,
    finalizers: FinalizerManager,
    mesh_designator: MeshMembershipDesignator,
    gateway_designator: VirtualGatewayMembershipDesignator,
    mesh_members: MeshMembersFinalizer,
    gateway_members: VirtualGatewayMembersFinalizer,
    meshes: AppMeshResourceManager<MeshKind>,
    virtual_gateways: AppMeshResourceManager<VirtualGatewayKind>,
    virtual_nodes: AppMeshResourceManager<VirtualNodeKind>,
    virtual_routers: AppMeshResourceManager<VirtualRouterKind>,
    virtual_services: AppMeshResourceManager<VirtualServiceKind>,
    gateway_routes: AppMeshResourceManager<GatewayRouteKind>,
    cloudmap: CloudMapResourceManager,
    locator: Arc<ServiceLocator>,
    virtual_node_api: Arc<dyn ResourceApi<VirtualNodeSpecData>>,
    /// Objects that asked to be left alone until the deadline
    deferred: Mutex<HashMap<(ResourceKind, ObjectKey), Instant>>,
}

impl MeshController {
    pub fn new(
        config: ControllerConfig,
        client: Arc<dyn ClusterClient>,
        backends: RemoteBackends,
    ) -> Self {
        let resolver = Arc::new(ReferenceResolver::new(client.clone()));
        let locator = Arc::new(ServiceLocator::new(
            backends.cloudmap.clone(),
            config.cloudmap.cache_ttl,
        ));
        let account_id = config.account_id.clone();

        Self {
            finalizers: FinalizerManager::new(client.clone()),
            mesh_designator: MeshMembershipDesignator::new(client.clone()),
            gateway_designator: VirtualGatewayMembershipDesignator::new(client.clone()),
            mesh_members: MeshMembersFinalizer::new(client.clone()),
            gateway_members: VirtualGatewayMembersFinalizer::new(client.clone()),
            meshes: AppMeshResourceManager::new(
                MeshKind,
                backends.meshes,
                client.clone(),
                account_id.clone(),
            ),
            virtual_gateways: AppMeshResourceManager::new(
                VirtualGatewayKind::new(resolver.clone()),
                backends.virtual_gateways,
                client.clone(),
                account_id.clone(),
            ),
            virtual_nodes: AppMeshResourceManager::new(
                VirtualNodeKind::new(resolver.clone()),
                backends.virtual_nodes.clone(),
                client.clone(),
                account_id.clone(),
            ),
            virtual_routers: AppMeshResourceManager::new(
                VirtualRouterKind::new(resolver.clone()),
                backends.virtual_routers,
                client.clone(),
                account_id.clone(),
            ),
            virtual_services: AppMeshResourceManager::new(
                VirtualServiceKind::new(resolver.clone()),
                backends.virtual_services,
                client.clone(),
                account_id.clone(),
            ),
            gateway_routes: AppMeshResourceManager::new(
                GatewayRouteKind::new(resolver.clone()),
                backends.gateway_routes,
                client.clone(),
                account_id,
            ),
            cloudmap: CloudMapResourceManager::new(
                locator.clone(),
                client.clone(),
                resolver,
                &config.cloudmap,
            ),
            locator,
            virtual_node_api: backends.virtual_nodes,
            client,
            config,
            deferred: Mutex::new(HashMap::new()),
        }
    }

    /// Instance reconciler sharing this controller's clients and lookup cache
    pub fn instance_reconciler(&self) -> CloudMapInstanceReconciler {
        CloudMapInstanceReconciler::new(
            self.client.clone(),
            self.virtual_node_api.clone(),
            self.locator.clone(),
            &self.config.cloudmap,
        )
    }

    /// Run resync passes until cancelled, starting with one right away
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        info!(
            "Starting mesh controller (interval: {:?}, workers: {})",
            self.config.resync_interval, self.config.max_concurrent_reconciles
        );

        let mut interval = tokio::time::interval(self.config.resync_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Mesh controller shutting down");
                    return Ok(());
                }
                _ = interval.tick() => {
                    if let Err(e) = self.sync().await {
                        error!("Resync failed: {}", e);
                    }
                }
            }
        }
    }

    /// One pass over every kind in dependency order
    ///
    /// A kind that cannot be listed does not stop the kinds after it; the
    /// first listing error is returned once the pass is over.
    pub async fn sync(&self) -> Result<()> {
        let results = [
            self.sync_kind::<Mesh>().await,
            self.sync_kind::<VirtualGateway>().await,
            self.sync_kind::<VirtualNode>().await,
            self.sync_kind::<VirtualRouter>().await,
            self.sync_kind::<VirtualService>().await,
            self.sync_kind::<GatewayRoute>().await,
        ];
        results.into_iter().collect()
    }

    async fn sync_kind<R>(&self) -> Result<()>
    where
        R: MeshResource,
        Self: Lifecycle<R>,
    {
        let objects: Vec<R> = list_resources(self.client.as_ref(), None).await?;
        debug!("Resyncing {} {} objects", objects.len(), R::KIND.display_name());
        stream::iter(objects)
            .for_each_concurrent(self.config.max_concurrent_reconciles, |obj| {
                self.process(obj)
            })
            .await;
        Ok(())
    }

    fn is_deferred(&self, key: &(ResourceKind, ObjectKey)) -> bool {
        let mut deferred = self.deferred.lock();
        match deferred.get(key) {
            Some(deadline) if Instant::now() < *deadline => true,
            Some(_) => {
                deferred.remove(key);
                false
            }
            None => false,
        }
    }

    async fn process<R>(&self, mut obj: R)
    where
        R: MeshResource,
        Self: Lifecycle<R>,
    {
        let key = (R::KIND, obj.object_key());
        if self.is_deferred(&key) {
            debug!("{} {} is deferred, skipping", R::KIND.display_name(), key.1);
            return;
        }

        let result = if obj.is_terminating() {
            self.finalize_object(&mut obj).await
        } else {
            self.reconcile_object(&mut obj).await
        };

        match result {
            Ok(ReconcileOutcome::Done) => {}
            Ok(ReconcileOutcome::Requeue) => {
                debug!(
                    "{} {} waiting on a dependency",
                    R::KIND.display_name(),
                    key.1
                );
            }
            Ok(ReconcileOutcome::RetryAfter(delay)) => {
                debug!(
                    "{} {} deferred for {:?}",
                    R::KIND.display_name(),
                    key.1,
                    delay
                );
                self.deferred.lock().insert(key, Instant::now() + delay);
            }
            Err(e) => self.report_failure(&obj, &e).await,
        }
    }

    async fn reconcile_object<R>(&self, obj: &mut R) -> Result<ReconcileOutcome>
    where
        R: MeshResource,
        Self: Lifecycle<R>,
    {
        let names = <Self as Lifecycle<R>>::finalizer_names(self, obj);
        self.finalizers.add_finalizers(obj, &names).await?;
        <Self as Lifecycle<R>>::backfill(self, obj).await?;
        <Self as Lifecycle<R>>::reconcile_remote(self, obj).await
    }

    async fn finalize_object<R>(&self, obj: &mut R) -> Result<ReconcileOutcome>
    where
        R: MeshResource,
        Self: Lifecycle<R>,
    {
        let held = obj
            .finalizers()
            .iter()
            .any(|f| CONTROLLER_FINALIZERS.contains(&f.as_str()));
        if !held {
            return Ok(ReconcileOutcome::Done);
        }

        let outcome = <Self as Lifecycle<R>>::cleanup_remote(self, obj).await?;
        if !outcome.is_done() {
            return Ok(outcome);
        }
        self.finalizers
            .remove_finalizers(obj, &CONTROLLER_FINALIZERS)
            .await?;
        info!("Finalized {} {}", R::KIND.display_name(), obj.object_key());
        Ok(ReconcileOutcome::Done)
    }

    async fn report_failure<R: MeshResource>(&self, obj: &R, err: &ControllerError) {
        let reason = if err.is_permanent() {
            warn!(
                "Configuration error on {} {}: {}",
                R::KIND.display_name(),
                obj.object_key(),
                err
            );
            REASON_CONFIGURATION_ERROR
        } else {
            error!(
                "Failed to reconcile {} {}: {}",
                R::KIND.display_name(),
                obj.object_key(),
                err
            );
            REASON_RECONCILE_ERROR
        };

        let event = EventRecord::warning(
            R::KIND,
            obj.object_key(),
            obj.uid().map(str::to_string),
            reason,
            err.to_string(),
        );
        if let Err(e) = self.client.record_event(&event).await {
            warn!("Failed to record event on {} {}: {}", R::KIND, obj.object_key(), e);
        }
    }

    /// Designate and record the mesh of an object admitted without meshRef
    async fn backfill_mesh_ref<R: MeshResource>(&self, obj: &mut R) -> Result<()> {
        if obj.mesh_ref().is_some() {
            return Ok(());
        }
        let mesh = self
            .mesh_designator
            .designate(obj.namespace().unwrap_or_default())
            .await?;
        let reference = mesh.reference();
        patch_resource_spec(
            self.client.as_ref(),
            obj,
            json!({ "meshRef": to_value(&reference)? }),
        )
        .await?;
        info!(
            "Designated {} {} to mesh {}",
            R::KIND.display_name(),
            obj.object_key(),
            mesh.name()
        );
        obj.set_mesh_ref(reference);
        Ok(())
    }
}

// --- Lifecycles ---

#[async_trait]
impl Lifecycle<Mesh> for MeshController {
    fn finalizer_names(&self, _mesh: &Mesh) -> Vec<&'static str> {
        vec![FINALIZER_MESH_MEMBERS, FINALIZER_APPMESH_RESOURCES]
    }

    async fn backfill(&self, _mesh: &mut Mesh) -> Result<()> {
        Ok(())
    }

    async fn reconcile_remote(&self, mesh: &mut Mesh) -> Result<ReconcileOutcome> {
        self.meshes.reconcile(mesh).await
    }

    async fn cleanup_remote(&self, mesh: &Mesh) -> Result<ReconcileOutcome> {
        let outcome = self.mesh_members.finalize(mesh).await?;
        if !outcome.is_done() {
            return Ok(outcome);
        }
        self.meshes.cleanup(mesh).await
    }
}

#[async_trait]
impl Lifecycle<VirtualGateway> for MeshController {
    fn finalizer_names(&self, _vg: &VirtualGateway) -> Vec<&'static str> {
        vec![FINALIZER_MESH_MEMBERS, FINALIZER_APPMESH_RESOURCES]
    }

    async fn backfill(&self, vg: &mut VirtualGateway) -> Result<()> {
        self.backfill_mesh_ref(vg).await
    }

    async fn reconcile_remote(&self, vg: &mut VirtualGateway) -> Result<ReconcileOutcome> {
        self.virtual_gateways.reconcile(vg).await
    }

    async fn cleanup_remote(&self, vg: &VirtualGateway) -> Result<ReconcileOutcome> {
        let outcome = self.gateway_members.finalize(vg).await?;
        if !outcome.is_done() {
            return Ok(outcome);
        }
        self.virtual_gateways.cleanup(vg).await
    }
}

#[async_trait]
impl Lifecycle<VirtualNode> for MeshController {
    fn finalizer_names(&self, vn: &VirtualNode) -> Vec<&'static str> {
        if vn.cloud_map().is_some() {
            vec![FINALIZER_APPMESH_RESOURCES, FINALIZER_CLOUDMAP_RESOURCES]
        } else {
            vec![FINALIZER_APPMESH_RESOURCES]
        }
    }

    async fn backfill(&self, vn: &mut VirtualNode) -> Result<()> {
        self.backfill_mesh_ref(vn).await
    }

    async fn reconcile_remote(&self, vn: &mut VirtualNode) -> Result<ReconcileOutcome> {
        let outcome = self.virtual_nodes.reconcile(vn).await?;
        Ok(outcome.and(self.cloudmap.reconcile(vn).await?))
    }

    /// Discovery registrations go first so no instance outlives its node
    async fn cleanup_remote(&self, vn: &VirtualNode) -> Result<ReconcileOutcome> {
        let outcome = self.cloudmap.cleanup(vn).await?;
        if !outcome.is_done() {
            return Ok(outcome);
        }
        self.virtual_nodes.cleanup(vn).await
    }
}

#[async_trait]
impl Lifecycle<VirtualRouter> for MeshController {
    fn finalizer_names(&self, _vr: &VirtualRouter) -> Vec<&'static str> {
        vec![FINALIZER_APPMESH_RESOURCES]
    }

    async fn backfill(&self, vr: &mut VirtualRouter) -> Result<()> {
        self.backfill_mesh_ref(vr).await
    }

    async fn reconcile_remote(&self, vr: &mut VirtualRouter) -> Result<ReconcileOutcome> {
        self.virtual_routers.reconcile(vr).await
    }

    async fn cleanup_remote(&self, vr: &VirtualRouter) -> Result<ReconcileOutcome> {
        self.virtual_routers.cleanup(vr).await
    }
}

#[async_trait]
impl Lifecycle<VirtualService> for MeshController {
    fn finalizer_names(&self, _vs: &VirtualService) -> Vec<&'static str> {
        vec![FINALIZER_APPMESH_RESOURCES]
    }

    async fn backfill(&self, vs: &mut VirtualService) -> Result<()> {
        self.backfill_mesh_ref(vs).await
    }

    async fn reconcile_remote(&self, vs: &mut VirtualService) -> Result<ReconcileOutcome> {
        self.virtual_services.reconcile(vs).await
    }

    async fn cleanup_remote(&self, vs: &VirtualService) -> Result<ReconcileOutcome> {
        self.virtual_services.cleanup(vs).await
    }
}

#[async_trait]
impl Lifecycle<GatewayRoute> for MeshController {
    fn finalizer_names(&self, _gr: &GatewayRoute) -> Vec<&'static str> {
        vec![FINALIZER_APPMESH_RESOURCES]
    }

    async fn backfill(&self, gr: &mut GatewayRoute) -> Result<()> {
        self.backfill_mesh_ref(gr).await?;
        if gr.spec.virtual_gateway_ref.is_some() {
            return Ok(());
        }

        let vg = self
            .gateway_designator
            .designate_for_gateway_route(gr)
            .await?;
        let reference = vg.reference();
        let mut patch = Map::new();
        patch.insert("virtualGatewayRef".to_string(), to_value(&reference)?);
        patch_resource_spec(self.client.as_ref(), gr, Value::Object(patch)).await?;
        info!(
            "Designated gatewayRoute {} to virtualGateway {}",
            gr.object_key(),
            vg.object_key()
        );
        gr.spec.virtual_gateway_ref = Some(reference);
        Ok(())
    }

    async fn reconcile_remote(&self, gr: &mut GatewayRoute) -> Result<ReconcileOutcome> {
        self.gateway_routes.reconcile(gr).await
    }

    async fn cleanup_remote(&self, gr: &GatewayRoute) -> Result<ReconcileOutcome> {
        self.gateway_routes.cleanup(gr).await
    }
}
