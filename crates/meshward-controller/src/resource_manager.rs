//! Generic reconciliation of one mesh-like object against its remote
//! counterpart
//!
//! Reconcile runs: resolve dependencies, describe, create or update, then
//! write status. Cleanup runs: describe, then delete if owned. The manager
//! holds no per-object state, so one instance serves every object of its
//! kind concurrently.

use crate::cluster::{patch_resource_status, ClusterClient};
use crate::error::Result;
use crate::outcome::ReconcileOutcome;
use async_trait::async_trait;
use meshward_cloud::{RemoteId, RemoteResource, RemoteSpec, ResourceApi, StatusCode};
use meshward_core::{update_condition, validate_base, ConditionStatus, MeshResource};
use std::sync::Arc;
use tracing::{debug, info};

/// What a reconcile should converge to
#[derive(Debug, Clone, PartialEq)]
pub enum Desired<S> {
    /// Dependencies resolved; the remote resource should look like `spec`
    Ready { id: RemoteId, spec: S },
    /// A dependency exists but is not active yet
    Blocked { reason: String },
}

/// Kind-specific half of a resource manager
///
/// Implementations resolve cross-references and build the remote spec; the
/// generic manager does everything else.
#[async_trait]
pub trait ManagedKind: Send + Sync + 'static {
    type Object: MeshResource;
    type Spec: RemoteSpec;

    /// Resolve dependencies and build the desired remote state
    async fn desired(&self, obj: &Self::Object) -> Result<Desired<Self::Spec>>;

    /// Identity of the remote counterpart, for cleanup
    async fn remote_id(&self, obj: &Self::Object) -> Result<RemoteId>;
}

/// Reconciles objects of one kind with the mesh API
pub struct AppMeshResourceManager<K: ManagedKind> {
    kind: K,
    api: Arc<dyn ResourceApi<K::Spec>>,
    client: Arc<dyn ClusterClient>,
    account_id: String,
}

impl<K: ManagedKind> AppMeshResourceManager<K> {
    pub fn new(
        kind: K,
        api: Arc<dyn ResourceApi<K::Spec>>,
        client: Arc<dyn ClusterClient>,
        account_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            api,
            client,
            account_id: account_id.into(),
        }
    }

    /// Whether we may update the remote resource
    pub fn is_controlled(&self, remote: &RemoteResource<K::Spec>) -> bool {
        remote.metadata.resource_owner == self.account_id
    }

    /// Whether we may delete the remote resource
    ///
    /// Ownership is currently the same test as control; the two are kept
    /// apart so callers state which decision they are making.
    pub fn is_owned(&self, remote: &RemoteResource<K::Spec>) -> bool {
        self.is_controlled(remote)
    }

    async fn find_remote(&self, id: &RemoteId) -> Result<Option<RemoteResource<K::Spec>>> {
        match self.api.describe(id).await {
            Ok(remote) => Ok(Some(remote)),
            Err(e) if e.is_not_found() => {
                debug!("{} {} not found remotely", K::Object::KIND, id);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Converge the remote resource and the object's status
    ///
    /// Status is patched through the cluster only when something changed.
    pub async fn reconcile(&self, obj: &mut K::Object) -> Result<ReconcileOutcome> {
        validate_base(K::Object::KIND, obj.metadata())?;

        let (id, desired) = match self.kind.desired(obj).await? {
            Desired::Ready { id, spec } => (id, spec),
            Desired::Blocked { reason } => {
                info!(
                    "{} {} waiting on dependencies: {}",
                    K::Object::KIND,
                    obj.object_key(),
                    reason
                );
                return Ok(ReconcileOutcome::Requeue);
            }
        };

        let remote = match self.find_remote(&id).await? {
            None => {
                let created = self.api.create(&id, &desired).await?;
                info!(
                    "Created {} {} as {}",
                    K::Object::KIND,
                    obj.object_key(),
                    created.metadata.arn
                );
                created
            }
            Some(actual) if actual.spec == desired => actual,
            Some(actual) if !self.is_controlled(&actual) => {
                debug!(
                    "Skipping update of {} {}: {} is owned by account {}",
                    K::Object::KIND,
                    obj.object_key(),
                    actual.metadata.arn,
                    actual.metadata.resource_owner
                );
                actual
            }
            Some(actual) => {
                debug!(
                    "{} {} spec changed: actual {:?}, desired {:?}",
                    K::Object::KIND,
                    obj.object_key(),
                    actual.spec,
                    desired
                );
                let updated = self.api.update(&id, &desired).await?;
                info!("Updated {} {}", K::Object::KIND, obj.object_key());
                updated
            }
        };

        self.update_status(obj, &remote).await?;
        Ok(ReconcileOutcome::Done)
    }

    async fn update_status(&self, obj: &mut K::Object, remote: &RemoteResource<K::Spec>) -> Result<()> {
        let mut changed = false;

        if obj.remote_arn() != Some(remote.metadata.arn.as_str()) {
            obj.set_remote_arn(Some(remote.metadata.arn.clone()));
            changed = true;
        }

        let active = match remote.status {
            StatusCode::Active => ConditionStatus::True,
            StatusCode::Inactive | StatusCode::Deleted => ConditionStatus::False,
        };
        if update_condition(obj, K::Object::ACTIVE_CONDITION, active, None, None) {
            changed = true;
        }

        if obj.observed_generation() != obj.generation() {
            let generation = obj.generation();
            obj.set_observed_generation(generation);
            changed = true;
        }

        if changed {
            patch_resource_status(self.client.as_ref(), obj).await?;
        }
        Ok(())
    }

    /// Delete the remote resource if we own it
    ///
    /// When the object never recorded a remote ARN, failures to locate the
    /// remote resource are ignored: nothing was created.
    pub async fn cleanup(&self, obj: &K::Object) -> Result<ReconcileOutcome> {
        let never_created = obj.remote_arn().is_none();

        let id = match self.kind.remote_id(obj).await {
            Ok(id) => id,
            Err(e) if never_created => {
                debug!(
                    "Ignoring {} {} cleanup lookup failure, nothing was created: {}",
                    K::Object::KIND,
                    obj.object_key(),
                    e
                );
                return Ok(ReconcileOutcome::Done);
            }
            Err(e) => return Err(e),
        };

        let remote = match self.find_remote(&id).await {
            Ok(Some(remote)) => remote,
            Ok(None) => return Ok(ReconcileOutcome::Done),
            Err(_) if never_created => return Ok(ReconcileOutcome::Done),
            Err(e) => return Err(e),
        };

        if !self.is_owned(&remote) {
            debug!(
                "Skipping deletion of {} {}: {} is owned by account {}",
                K::Object::KIND,
                obj.object_key(),
                remote.metadata.arn,
                remote.metadata.resource_owner
            );
            return Ok(ReconcileOutcome::Done);
        }

        match self.api.delete(&id).await {
            Ok(()) => {
                info!("Deleted {} {}", K::Object::KIND, remote.metadata.arn);
                Ok(ReconcileOutcome::Done)
            }
            Err(e) if e.is_not_found() => Ok(ReconcileOutcome::Done),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ControllerError;
    use crate::kinds::MeshKind;
    use crate::mock::MockCluster;
    use meshward_cloud::types::MeshSpecData;
    use meshward_cloud::{CloudError, InMemoryResourceApi};
    use meshward_core::resources::{EgressFilter, EgressFilterType};
    use meshward_core::{get_condition, ConditionType, Mesh};

    const ACCOUNT: &str = "111122223333";
    const OTHER_ACCOUNT: &str = "444455556666";

    struct Fixture {
        cluster: Arc<MockCluster>,
        api: Arc<InMemoryResourceApi<MeshSpecData>>,
        manager: AppMeshResourceManager<MeshKind>,
    }

    fn make_fixture() -> Fixture {
        let cluster = Arc::new(MockCluster::new());
        let api = Arc::new(InMemoryResourceApi::new(ACCOUNT, "us-west-2"));
        let manager = AppMeshResourceManager::new(MeshKind, api.clone(), cluster.clone(), ACCOUNT);
        Fixture {
            cluster,
            api,
            manager,
        }
    }

    fn make_mesh(name: &str, egress: Option<EgressFilterType>) -> Mesh {
        let mut mesh = Mesh::default();
        mesh.metadata.name = Some(name.to_string());
        mesh.spec.egress_filter = egress.map(|type_| EgressFilter { type_ });
        mesh
    }

    #[tokio::test]
    async fn test_create_then_idempotent() {
        let f = make_fixture();
        let mut mesh = f.cluster.insert(make_mesh("m1", None)).await;

        let outcome = f.manager.reconcile(&mut mesh).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Done);
        assert_eq!(f.api.create_calls(), 1);
        assert_eq!(f.cluster.status_patches(), 1);
        assert_eq!(
            mesh.status.mesh_arn.as_deref(),
            Some("arn:aws:appmesh:us-west-2:111122223333:mesh/m1")
        );
        assert_eq!(mesh.status.observed_generation, Some(1));
        assert!(mesh.is_active());

        // second pass against the stored object: nothing to do
        let mut stored: Mesh = f.cluster.get(&mesh.object_key()).await.unwrap();
        f.manager.reconcile(&mut stored).await.unwrap();
        assert_eq!(f.api.mutation_calls(), 1);
        assert_eq!(f.cluster.status_patches(), 1);
    }

    #[tokio::test]
    async fn test_drift_triggers_exactly_one_update() {
        let f = make_fixture();
        let id = RemoteId::mesh("m1", None);
        f.api
            .seed(
                &id,
                MeshSpecData {
                    egress_filter: Some(EgressFilterType::DropAll),
                },
                ACCOUNT,
            )
            .await;
        let mut mesh = f
            .cluster
            .insert(make_mesh("m1", Some(EgressFilterType::AllowAll)))
            .await;

        f.manager.reconcile(&mut mesh).await.unwrap();
        assert_eq!(f.api.update_calls(), 1);
        assert_eq!(
            f.api.get(&id).await.map(|r| r.spec.egress_filter),
            Some(Some(EgressFilterType::AllowAll))
        );

        f.manager.reconcile(&mut mesh).await.unwrap();
        assert_eq!(f.api.update_calls(), 1);
        assert_eq!(f.api.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_foreign_resource_never_updated_or_deleted() {
        let f = make_fixture();
        let id = RemoteId::mesh("shared", None);
        f.api
            .seed(
                &id,
                MeshSpecData {
                    egress_filter: Some(EgressFilterType::DropAll),
                },
                OTHER_ACCOUNT,
            )
            .await;
        let mut mesh = f
            .cluster
            .insert(make_mesh("shared", Some(EgressFilterType::AllowAll)))
            .await;

        let outcome = f.manager.reconcile(&mut mesh).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Done);
        assert!(mesh.status.mesh_arn.is_some());

        let outcome = f.manager.cleanup(&mesh).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Done);
        assert_eq!(f.api.mutation_calls(), 0);
        assert!(f.api.get(&id).await.is_some());
    }

    #[tokio::test]
    async fn test_inactive_remote_sets_condition_false() {
        let f = make_fixture();
        let id = RemoteId::mesh("m1", None);
        f.api.seed(&id, MeshSpecData::default(), ACCOUNT).await;
        f.api.set_status(&id, StatusCode::Inactive).await;
        let mut mesh = f.cluster.insert(make_mesh("m1", None)).await;

        f.manager.reconcile(&mut mesh).await.unwrap();
        let condition = get_condition(&mesh, ConditionType::MeshActive).unwrap();
        assert_eq!(condition.status, ConditionStatus::False);
        assert!(!mesh.is_active());
    }

    #[tokio::test]
    async fn test_describe_failure_propagates() {
        let f = make_fixture();
        let mut mesh = f.cluster.insert(make_mesh("m1", None)).await;
        f.api
            .fail_next("describe", CloudError::throttled("DescribeMesh"))
            .await;

        let err = f.manager.reconcile(&mut mesh).await.unwrap_err();
        assert!(matches!(err, ControllerError::Cloud(CloudError::Throttled { .. })));
        assert_eq!(f.api.create_calls(), 0);
        assert_eq!(f.cluster.status_patches(), 0);
    }

    #[tokio::test]
    async fn test_status_patch_failure_is_returned() {
        let f = make_fixture();
        let mut mesh = f.cluster.insert(make_mesh("m1", None)).await;
        f.cluster
            .fail_next("patch_status", ControllerError::cluster_api("conflict"))
            .await;

        assert!(f.manager.reconcile(&mut mesh).await.is_err());
        assert_eq!(f.api.create_calls(), 1);

        // the retry re-observes the remote mesh and only writes status
        let mut stored: Mesh = f.cluster.get(&mesh.object_key()).await.unwrap();
        f.manager.reconcile(&mut stored).await.unwrap();
        assert_eq!(f.api.mutation_calls(), 1);
        assert!(stored.status.mesh_arn.is_some());
    }

    #[tokio::test]
    async fn test_cleanup_deletes_owned() {
        let f = make_fixture();
        let mut mesh = f.cluster.insert(make_mesh("m1", None)).await;
        f.manager.reconcile(&mut mesh).await.unwrap();

        f.manager.cleanup(&mesh).await.unwrap();
        assert_eq!(f.api.delete_calls(), 1);
        assert_eq!(f.api.resource_count().await, 0);

        // already gone: trivially consistent
        f.manager.cleanup(&mesh).await.unwrap();
        assert_eq!(f.api.delete_calls(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_tolerates_describe_failure_when_never_created() {
        let f = make_fixture();
        let mesh = f.cluster.insert(make_mesh("m1", None)).await;
        f.api
            .fail_next("describe", CloudError::api_error("DescribeMesh", "boom"))
            .await;
        assert!(f.manager.cleanup(&mesh).await.unwrap().is_done());

        let mut mesh = mesh;
        f.manager.reconcile(&mut mesh).await.unwrap();
        f.api
            .fail_next("describe", CloudError::api_error("DescribeMesh", "boom"))
            .await;
        assert!(f.manager.cleanup(&mesh).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_object_rejected() {
        let f = make_fixture();
        let mut mesh = Mesh::default();
        let err = f.manager.reconcile(&mut mesh).await.unwrap_err();
        assert!(err.is_permanent());
        assert_eq!(f.api.describe_calls(), 0);
    }
}
