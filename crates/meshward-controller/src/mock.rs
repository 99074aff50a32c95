use crate::cluster::ClusterClient;
use crate::error::{ControllerError, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};
use meshward_core::{
    from_value, to_value, CoreError, EventRecord, MeshResource, ObjectKey, ResourceKind,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

type StoreKey = (ResourceKind, ObjectKey);

/// In-memory cluster for tests and local runs
///
/// Applies merge patches the way the API server does, bumps
/// `metadata.generation` on spec changes and removes an object once it has
/// a deletion timestamp and no finalizers left.
pub struct MockCluster {
    objects: Arc<RwLock<HashMap<StoreKey, Value>>>,
    namespaces: Arc<RwLock<HashMap<String, Namespace>>>,
    pods: Arc<RwLock<HashMap<ObjectKey, Pod>>>,
    nodes: Arc<RwLock<HashMap<String, Node>>>,
    events: Arc<RwLock<Vec<EventRecord>>>,
    failures: Arc<RwLock<HashMap<String, ControllerError>>>,
    next_uid: AtomicUsize,
    object_patches: AtomicUsize,
    status_patches: AtomicUsize,
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCluster {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            namespaces: Arc::new(RwLock::new(HashMap::new())),
            pods: Arc::new(RwLock::new(HashMap::new())),
            nodes: Arc::new(RwLock::new(HashMap::new())),
            events: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            next_uid: AtomicUsize::new(1),
            object_patches: AtomicUsize::new(0),
            status_patches: AtomicUsize::new(0),
        }
    }

    /// Store an object, assigning a UID and generation when missing
    pub async fn insert<R: MeshResource>(&self, mut obj: R) -> R {
        let meta = obj.metadata_mut();
        if meta.uid.is_none() {
            let n = self.next_uid.fetch_add(1, Ordering::SeqCst);
            meta.uid = Some(format!("uid-{}", n));
        }
        if meta.generation.is_none() {
            meta.generation = Some(1);
        }
        if let Ok(value) = to_value(&obj) {
            self.objects
                .write()
                .await
                .insert((R::KIND, obj.object_key()), value);
        }
        obj
    }

    /// Read back an object in its current state
    pub async fn get<R: MeshResource>(&self, key: &ObjectKey) -> Option<R> {
        let value = self.objects.read().await.get(&(R::KIND, key.clone())).cloned()?;
        from_value(value).ok()
    }

    /// Set a deletion timestamp, removing the object at once if nothing holds it
    pub async fn mark_deleted(&self, kind: ResourceKind, key: &ObjectKey) {
        let mut objects = self.objects.write().await;
        let store_key = (kind, key.clone());
        if let Some(value) = objects.get_mut(&store_key) {
            value["metadata"]["deletionTimestamp"] =
                Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
            if !has_finalizers(value) {
                objects.remove(&store_key);
                debug!("Mock: {} {} removed", kind, key);
            }
        }
    }

    pub async fn add_namespace(&self, name: &str, labels: &[(&str, &str)]) {
        let mut ns = Namespace::default();
        ns.metadata.name = Some(name.to_string());
        ns.metadata.labels = Some(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        );
        self.namespaces.write().await.insert(name.to_string(), ns);
    }

    pub async fn add_pod(&self, pod: Pod) {
        let key = ObjectKey::new(
            pod.metadata.namespace.clone().unwrap_or_default(),
            pod.metadata.name.clone().unwrap_or_default(),
        );
        self.pods.write().await.insert(key, pod);
    }

    pub async fn add_node(&self, node: Node) {
        let name = node.metadata.name.clone().unwrap_or_default();
        self.nodes.write().await.insert(name, node);
    }

    pub async fn remove_pod(&self, namespace: &str, name: &str) {
        self.pods
            .write()
            .await
            .remove(&ObjectKey::new(namespace, name));
    }

    /// Fail the next call of an operation
    ///
    /// Operations are `list:<Kind>`, `get_pod`, `get_node`, `list_pods`,
    /// `patch_status`, `patch_object` and `record_event`.
    pub async fn fail_next(&self, operation: &str, error: ControllerError) {
        self.failures
            .write()
            .await
            .insert(operation.to_string(), error);
    }

    async fn take_failure(&self, operation: &str) -> Result<()> {
        match self.failures.write().await.remove(operation) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub async fn events(&self) -> Vec<EventRecord> {
        self.events.read().await.clone()
    }

    pub fn object_patches(&self) -> usize {
        self.object_patches.load(Ordering::SeqCst)
    }

    pub fn status_patches(&self) -> usize {
        self.status_patches.load(Ordering::SeqCst)
    }
}

fn has_finalizers(value: &Value) -> bool {
    value["metadata"]["finalizers"]
        .as_array()
        .is_some_and(|f| !f.is_empty())
}

fn is_terminating(value: &Value) -> bool {
    !value["metadata"]["deletionTimestamp"].is_null()
}

fn not_found(kind: ResourceKind, key: &ObjectKey) -> ControllerError {
    CoreError::object_not_found(kind.as_str(), key.to_string()).into()
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn list_objects(&self, kind: ResourceKind, namespace: Option<&str>) -> Result<Vec<Value>> {
        self.take_failure(&format!("list:{}", kind)).await?;
        let objects = self.objects.read().await;
        let mut matched: Vec<_> = objects
            .iter()
            .filter(|((k, key), _)| {
                *k == kind && namespace.map_or(true, |ns| key.namespace.as_deref() == Some(ns))
            })
            .collect();
        matched.sort_by(|(a, _), (b, _)| a.1.cmp(&b.1));
        Ok(matched.into_iter().map(|(_, v)| v.clone()).collect())
    }

    async fn get_object(&self, kind: ResourceKind, key: &ObjectKey) -> Result<Value> {
        self.objects
            .read()
            .await
            .get(&(kind, key.clone()))
            .cloned()
            .ok_or_else(|| not_found(kind, key))
    }

    async fn patch_object(&self, kind: ResourceKind, key: &ObjectKey, patch: &Value) -> Result<()> {
        self.object_patches.fetch_add(1, Ordering::SeqCst);
        self.take_failure("patch_object").await?;
        let mut objects = self.objects.write().await;
        let store_key = (kind, key.clone());
        let value = objects
            .get_mut(&store_key)
            .ok_or_else(|| not_found(kind, key))?;

        let spec_before = value["spec"].clone();
        json_patch::merge(value, patch);
        if value["spec"] != spec_before {
            let generation = value["metadata"]["generation"].as_i64().unwrap_or(0);
            value["metadata"]["generation"] = Value::from(generation + 1);
        }

        if is_terminating(value) && !has_finalizers(value) {
            objects.remove(&store_key);
            debug!("Mock: {} {} removed", kind, key);
        } else {
            debug!("Mock: {} {} patched", kind, key);
        }
        Ok(())
    }

    async fn patch_status(&self, kind: ResourceKind, key: &ObjectKey, patch: &Value) -> Result<()> {
        self.status_patches.fetch_add(1, Ordering::SeqCst);
        self.take_failure("patch_status").await?;
        let mut objects = self.objects.write().await;
        let value = objects
            .get_mut(&(kind, key.clone()))
            .ok_or_else(|| not_found(kind, key))?;
        if let Some(status) = patch.get("status") {
            json_patch::merge(&mut value["status"], status);
        }
        debug!("Mock: {} {} status patched", kind, key);
        Ok(())
    }

    async fn get_namespace(&self, name: &str) -> Result<Namespace> {
        self.namespaces
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::object_not_found("Namespace", name).into())
    }

    async fn list_pods(&self) -> Result<Vec<Pod>> {
        self.take_failure("list_pods").await?;
        let pods = self.pods.read().await;
        let mut keys: Vec<_> = pods.keys().cloned().collect();
        keys.sort();
        Ok(keys.iter().filter_map(|k| pods.get(k).cloned()).collect())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        self.take_failure("get_pod").await?;
        self.pods
            .read()
            .await
            .get(&ObjectKey::new(namespace, name))
            .cloned()
            .ok_or_else(|| CoreError::object_not_found("Pod", format!("{}/{}", namespace, name)).into())
    }

    async fn get_node(&self, name: &str) -> Result<Node> {
        self.take_failure("get_node").await?;
        self.nodes
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::object_not_found("Node", name).into())
    }

    async fn record_event(&self, event: &EventRecord) -> Result<()> {
        self.take_failure("record_event").await?;
        debug!(
            "Mock: event {} on {} {}: {}",
            event.reason, event.kind, event.object, event.message
        );
        self.events.write().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{get_resource, list_resources, patch_resource_status};
    use meshward_core::{Mesh, VirtualNode};
    use serde_json::json;

    fn make_mesh(name: &str) -> Mesh {
        let mut mesh = Mesh::default();
        mesh.metadata.name = Some(name.to_string());
        mesh
    }

    #[tokio::test]
    async fn test_insert_assigns_identity() {
        let cluster = MockCluster::new();
        let mesh = cluster.insert(make_mesh("global")).await;
        assert!(mesh.uid().is_some());
        assert_eq!(mesh.generation(), Some(1));

        let stored: Mesh = get_resource(&cluster, &ObjectKey::cluster_scoped("global"))
            .await
            .unwrap();
        assert_eq!(stored, mesh);
    }

    #[tokio::test]
    async fn test_list_filters_by_namespace() {
        let cluster = MockCluster::new();
        for (ns, name) in [("shop", "a"), ("shop", "b"), ("billing", "c")] {
            let mut vn = VirtualNode::default();
            vn.metadata.name = Some(name.to_string());
            vn.metadata.namespace = Some(ns.to_string());
            cluster.insert(vn).await;
        }

        let shop: Vec<VirtualNode> = list_resources(&cluster, Some("shop")).await.unwrap();
        assert_eq!(shop.len(), 2);
        let all: Vec<VirtualNode> = list_resources(&cluster, None).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_spec_patch_bumps_generation() {
        let cluster = MockCluster::new();
        cluster.insert(make_mesh("global")).await;
        let key = ObjectKey::cluster_scoped("global");

        cluster
            .patch_object(
                ResourceKind::Mesh,
                &key,
                &json!({"spec": {"egressFilter": {"type": "DROP_ALL"}}}),
            )
            .await
            .unwrap();
        cluster
            .patch_object(
                ResourceKind::Mesh,
                &key,
                &json!({"metadata": {"finalizers": ["x"]}}),
            )
            .await
            .unwrap();

        let mesh: Mesh = cluster.get(&key).await.unwrap();
        assert_eq!(mesh.generation(), Some(2));
        assert_eq!(mesh.finalizers(), ["x".to_string()]);
        assert_eq!(cluster.object_patches(), 2);
    }

    #[tokio::test]
    async fn test_removed_when_last_finalizer_dropped() {
        let cluster = MockCluster::new();
        let mut mesh = make_mesh("global");
        mesh.metadata.finalizers = Some(vec!["x".to_string()]);
        cluster.insert(mesh).await;
        let key = ObjectKey::cluster_scoped("global");

        cluster.mark_deleted(ResourceKind::Mesh, &key).await;
        let mesh: Mesh = cluster.get(&key).await.unwrap();
        assert!(mesh.is_terminating());

        cluster
            .patch_object(
                ResourceKind::Mesh,
                &key,
                &json!({"metadata": {"finalizers": null}}),
            )
            .await
            .unwrap();
        assert!(cluster.get::<Mesh>(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_status_patch_and_failure_injection() {
        let cluster = MockCluster::new();
        let mut mesh = cluster.insert(make_mesh("global")).await;
        mesh.status.mesh_arn = Some("arn:aws:appmesh:us-west-2:111122223333:mesh/global".to_string());

        patch_resource_status(&cluster, &mesh).await.unwrap();
        let stored: Mesh = cluster.get(&mesh.object_key()).await.unwrap();
        assert_eq!(stored.status.mesh_arn, mesh.status.mesh_arn);
        assert_eq!(cluster.status_patches(), 1);

        cluster
            .fail_next("list:Mesh", ControllerError::cluster_api("connection refused"))
            .await;
        assert!(list_resources::<Mesh>(&cluster, None).await.is_err());
        assert!(list_resources::<Mesh>(&cluster, None).await.is_ok());
    }
}
