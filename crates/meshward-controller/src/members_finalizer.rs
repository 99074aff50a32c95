//! Pending-members finalizers for parent objects
//!
//! A parent may only be cleaned up once nothing references it any more.
//! While members remain, finalize reports `RetryAfter` and leaves a warning
//! event on the parent naming what is left. A failure to list any member
//! kind aborts the attempt so deletion never proceeds unverified.

use crate::cluster::{list_resources, ClusterClient};
use crate::error::Result;
use crate::outcome::ReconcileOutcome;
use futures_util::try_join;
use meshward_core::events::REASON_PENDING_MEMBERS_DELETION;
use meshward_core::{
    EventRecord, GatewayRoute, Mesh, MeshResource, VirtualGateway, VirtualNode, VirtualRouter,
    VirtualService,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Delay before a blocked parent is evaluated again
pub const PENDING_MEMBERS_EVALUATE_INTERVAL: Duration = Duration::from_secs(60);

fn count_mesh_members<R: MeshResource>(items: &[R], mesh: &Mesh) -> usize {
    items
        .iter()
        .filter(|item| item.mesh_ref().is_some_and(|r| mesh.is_referenced_by(r)))
        .count()
}

/// "virtualService: 2, virtualNode: 1", skipping kinds with no members
fn describe_members(counts: &[(&str, usize)]) -> String {
    counts
        .iter()
        .filter(|(_, n)| *n > 0)
        .map(|(kind, n)| format!("{}: {}", kind, n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Record an event, logging rather than failing when the write is rejected
async fn record_pending(client: &dyn ClusterClient, event: EventRecord) {
    if let Err(e) = client.record_event(&event).await {
        warn!(
            "Failed to record {} event on {} {}: {}",
            event.reason, event.kind, event.object, e
        );
    }
}

/// Blocks mesh cleanup while virtual services, routers, nodes or gateways
/// still belong to the mesh
pub struct MeshMembersFinalizer {
    client: Arc<dyn ClusterClient>,
    evaluate_interval: Duration,
}

impl MeshMembersFinalizer {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self {
            client,
            evaluate_interval: PENDING_MEMBERS_EVALUATE_INTERVAL,
        }
    }

    pub async fn finalize(&self, mesh: &Mesh) -> Result<ReconcileOutcome> {
        let client = self.client.as_ref();
        let (services, routers, nodes, gateways) = try_join!(
            list_resources::<VirtualService>(client, None),
            list_resources::<VirtualRouter>(client, None),
            list_resources::<VirtualNode>(client, None),
            list_resources::<VirtualGateway>(client, None),
        )?;

        let counts = [
            ("virtualService", count_mesh_members(&services, mesh)),
            ("virtualRouter", count_mesh_members(&routers, mesh)),
            ("virtualNode", count_mesh_members(&nodes, mesh)),
            ("virtualGateway", count_mesh_members(&gateways, mesh)),
        ];
        if counts.iter().all(|(_, n)| *n == 0) {
            return Ok(ReconcileOutcome::Done);
        }

        let message = format!(
            "objects belong to this mesh exists, please delete them to proceed. {}",
            describe_members(&counts)
        );
        info!("Mesh {} waiting on members: {}", mesh.name(), message);
        record_pending(
            self.client.as_ref(),
            EventRecord::warning(
                Mesh::KIND,
                mesh.object_key(),
                mesh.uid().map(str::to_string),
                REASON_PENDING_MEMBERS_DELETION,
                message,
            ),
        )
        .await;
        Ok(ReconcileOutcome::RetryAfter(self.evaluate_interval))
    }
}

/// Blocks virtual-gateway cleanup while gateway routes still reference it
pub struct VirtualGatewayMembersFinalizer {
    client: Arc<dyn ClusterClient>,
    evaluate_interval: Duration,
}

impl VirtualGatewayMembersFinalizer {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self {
            client,
            evaluate_interval: PENDING_MEMBERS_EVALUATE_INTERVAL,
        }
    }

    pub async fn finalize(&self, vg: &VirtualGateway) -> Result<ReconcileOutcome> {
        let routes: Vec<GatewayRoute> = list_resources(self.client.as_ref(), None).await?;
        let members = routes
            .iter()
            .filter(|gr| {
                gr.spec
                    .virtual_gateway_ref
                    .as_ref()
                    .is_some_and(|r| vg.is_referenced_by(r))
            })
            .count();
        if members == 0 {
            return Ok(ReconcileOutcome::Done);
        }

        let message = format!(
            "objects belonging to this virtualGateway exist, please delete them to proceed. {}",
            describe_members(&[("gatewayRoute", members)])
        );
        info!("VirtualGateway {} waiting on members: {}", vg.object_key(), message);
        record_pending(
            self.client.as_ref(),
            EventRecord::warning(
                VirtualGateway::KIND,
                vg.object_key(),
                vg.uid().map(str::to_string),
                REASON_PENDING_MEMBERS_DELETION,
                message,
            ),
        )
        .await;
        Ok(ReconcileOutcome::RetryAfter(self.evaluate_interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ControllerError;
    use crate::mock::MockCluster;
    use meshward_core::events::EventType;
    use meshward_core::{MeshReference, VirtualGatewayReference};

    async fn make_mesh(cluster: &MockCluster, name: &str) -> Mesh {
        let mut mesh = Mesh::default();
        mesh.metadata.name = Some(name.to_string());
        cluster.insert(mesh).await
    }

    fn make_vs(name: &str, mesh_ref: MeshReference) -> VirtualService {
        let mut vs = VirtualService::default();
        vs.metadata.name = Some(name.to_string());
        vs.metadata.namespace = Some("shop".to_string());
        vs.spec.mesh_ref = Some(mesh_ref);
        vs
    }

    fn make_vn(name: &str, mesh_ref: MeshReference) -> VirtualNode {
        let mut vn = VirtualNode::default();
        vn.metadata.name = Some(name.to_string());
        vn.metadata.namespace = Some("shop".to_string());
        vn.spec.mesh_ref = Some(mesh_ref);
        vn
    }

    #[tokio::test]
    async fn test_no_members_allows_deletion() {
        let cluster = Arc::new(MockCluster::new());
        let mesh = make_mesh(&cluster, "global").await;
        let finalizer = MeshMembersFinalizer::new(cluster.clone());

        let outcome = finalizer.finalize(&mesh).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Done);
        assert!(cluster.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_members_block_with_retry_after() {
        let cluster = Arc::new(MockCluster::new());
        let mesh = make_mesh(&cluster, "global").await;
        cluster.insert(make_vs("a", mesh.reference())).await;
        cluster.insert(make_vs("b", mesh.reference())).await;
        cluster.insert(make_vn("c", mesh.reference())).await;

        let finalizer = MeshMembersFinalizer::new(cluster.clone());
        let outcome = finalizer.finalize(&mesh).await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::RetryAfter(Duration::from_secs(60))
        );

        let events = cluster.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Warning);
        assert_eq!(events[0].reason, "PendingMembersDeletion");
        assert_eq!(
            events[0].message,
            "objects belong to this mesh exists, please delete them to proceed. virtualService: 2, virtualNode: 1"
        );
    }

    #[tokio::test]
    async fn test_event_write_failure_still_retries_after() {
        let cluster = Arc::new(MockCluster::new());
        let mesh = make_mesh(&cluster, "global").await;
        cluster.insert(make_vs("a", mesh.reference())).await;
        cluster
            .fail_next("record_event", ControllerError::cluster_api("events: 503"))
            .await;

        let finalizer = MeshMembersFinalizer::new(cluster.clone());
        let outcome = finalizer.finalize(&mesh).await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::RetryAfter(Duration::from_secs(60))
        );
        assert!(cluster.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_members_of_recreated_mesh_do_not_block() {
        let cluster = Arc::new(MockCluster::new());
        let mesh = make_mesh(&cluster, "global").await;
        let stale = MeshReference {
            name: "global".to_string(),
            uid: "uid-old".to_string(),
        };
        cluster.insert(make_vs("a", stale)).await;

        let finalizer = MeshMembersFinalizer::new(cluster);
        assert!(finalizer.finalize(&mesh).await.unwrap().is_done());
    }

    #[tokio::test]
    async fn test_listing_failure_fails_closed() {
        let cluster = Arc::new(MockCluster::new());
        let mesh = make_mesh(&cluster, "global").await;
        cluster
            .fail_next(
                "list:VirtualRouter",
                ControllerError::cluster_api("connection reset"),
            )
            .await;

        let finalizer = MeshMembersFinalizer::new(cluster);
        let result = finalizer.finalize(&mesh).await;
        assert!(matches!(result, Err(ControllerError::ClusterApi { .. })));
    }

    #[tokio::test]
    async fn test_gateway_routes_block_gateway() {
        let cluster = Arc::new(MockCluster::new());
        let mut vg = VirtualGateway::default();
        vg.metadata.name = Some("ingress".to_string());
        vg.metadata.namespace = Some("edge".to_string());
        let vg = cluster.insert(vg).await;

        let finalizer = VirtualGatewayMembersFinalizer::new(cluster.clone());
        assert!(finalizer.finalize(&vg).await.unwrap().is_done());

        let mut gr = GatewayRoute::default();
        gr.metadata.name = Some("checkout".to_string());
        gr.metadata.namespace = Some("shop".to_string());
        gr.spec.virtual_gateway_ref = Some(VirtualGatewayReference {
            namespace: Some("edge".to_string()),
            name: "ingress".to_string(),
            uid: vg.uid().unwrap_or_default().to_string(),
        });
        cluster.insert(gr).await;

        let outcome = finalizer.finalize(&vg).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::RetryAfter(_)));
        let events = cluster.events().await;
        assert_eq!(
            events[0].message,
            "objects belonging to this virtualGateway exist, please delete them to proceed. gatewayRoute: 1"
        );
    }
}
