use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};
use meshward_core::{from_value, to_value, EventRecord, MeshResource, ObjectKey, ResourceKind};
use serde_json::{json, Value};

/// Access to the cluster's declarative API
///
/// Mesh resources travel as JSON values; the typed helpers below decode
/// them into the resource model. Patches are JSON merge patches.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    // --- Mesh resources ---

    /// List objects of a kind, in one namespace or across all of them
    async fn list_objects(&self, kind: ResourceKind, namespace: Option<&str>) -> Result<Vec<Value>>;

    async fn get_object(&self, kind: ResourceKind, key: &ObjectKey) -> Result<Value>;

    /// Merge-patch an object (metadata and spec)
    async fn patch_object(&self, kind: ResourceKind, key: &ObjectKey, patch: &Value) -> Result<()>;

    /// Merge-patch the status subresource of an object
    async fn patch_status(&self, kind: ResourceKind, key: &ObjectKey, patch: &Value) -> Result<()>;

    // --- Core resources ---

    async fn get_namespace(&self, name: &str) -> Result<Namespace>;

    async fn list_pods(&self) -> Result<Vec<Pod>>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;

    async fn get_node(&self, name: &str) -> Result<Node>;

    // --- Events ---

    async fn record_event(&self, event: &EventRecord) -> Result<()>;
}

/// List every object of `R`'s kind, optionally within one namespace
pub async fn list_resources<R: MeshResource>(
    client: &dyn ClusterClient,
    namespace: Option<&str>,
) -> Result<Vec<R>> {
    let values = client.list_objects(R::KIND, namespace).await?;
    let mut items = Vec::with_capacity(values.len());
    for value in values {
        items.push(from_value(value)?);
    }
    Ok(items)
}

/// Get one object of `R`'s kind
pub async fn get_resource<R: MeshResource>(client: &dyn ClusterClient, key: &ObjectKey) -> Result<R> {
    let value = client.get_object(R::KIND, key).await?;
    Ok(from_value(value)?)
}

/// Write the whole status of `obj`
pub async fn patch_resource_status<R: MeshResource>(client: &dyn ClusterClient, obj: &R) -> Result<()> {
    let value = to_value(obj)?;
    let status = value.get("status").cloned().unwrap_or_else(|| json!({}));
    client
        .patch_status(R::KIND, &obj.object_key(), &json!({ "status": status }))
        .await
}

/// Record the spec references of `obj`, such as a backfilled `meshRef`
pub async fn patch_resource_spec<R: MeshResource>(
    client: &dyn ClusterClient,
    obj: &R,
    spec_patch: Value,
) -> Result<()> {
    client
        .patch_object(R::KIND, &obj.object_key(), &json!({ "spec": spec_patch }))
        .await
}
