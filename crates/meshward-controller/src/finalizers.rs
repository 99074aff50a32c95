use crate::cluster::ClusterClient;
use crate::error::Result;
use meshward_core::MeshResource;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Held by parents until their members are gone
pub const FINALIZER_MESH_MEMBERS: &str = "finalizers.appmesh.k8s.aws/mesh-members";

/// Held until the remote mesh resource has been cleaned up
pub const FINALIZER_APPMESH_RESOURCES: &str = "finalizers.appmesh.k8s.aws/aws-appmesh-resources";

/// Held until service-discovery registrations have been cleaned up
pub const FINALIZER_CLOUDMAP_RESOURCES: &str = "finalizers.appmesh.k8s.aws/aws-cloudmap-resources";

/// Adds and removes finalizers, patching only when the set changes
pub struct FinalizerManager {
    client: Arc<dyn ClusterClient>,
}

impl FinalizerManager {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    /// Ensure every name in `names` is present on `obj`
    pub async fn add_finalizers<R: MeshResource>(&self, obj: &mut R, names: &[&str]) -> Result<()> {
        let mut finalizers = obj.finalizers().to_vec();
        let before = finalizers.len();
        for name in names {
            if !finalizers.iter().any(|f| f == name) {
                finalizers.push(name.to_string());
            }
        }
        if finalizers.len() == before {
            return Ok(());
        }
        self.patch(obj, finalizers).await
    }

    /// Ensure no name in `names` is present on `obj`
    pub async fn remove_finalizers<R: MeshResource>(
        &self,
        obj: &mut R,
        names: &[&str],
    ) -> Result<()> {
        let mut finalizers = obj.finalizers().to_vec();
        let before = finalizers.len();
        finalizers.retain(|f| !names.contains(&f.as_str()));
        if finalizers.len() == before {
            return Ok(());
        }
        self.patch(obj, finalizers).await
    }

    async fn patch<R: MeshResource>(&self, obj: &mut R, finalizers: Vec<String>) -> Result<()> {
        debug!("Setting finalizers of {} {}: {:?}", R::KIND, obj.object_key(), finalizers);
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        self.client
            .patch_object(R::KIND, &obj.object_key(), &patch)
            .await?;
        obj.metadata_mut().finalizers = Some(finalizers);
        Ok(())
    }
}
