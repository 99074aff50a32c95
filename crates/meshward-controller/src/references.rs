//! Resolution of typed cross-references to live objects
//!
//! Mesh and virtual-gateway references carry the UID of the object they
//! were taken from. A live object with the same name but another UID is a
//! recreation, and resolving to it would silently attach the referrer to a
//! different parent, so that case fails with `IdentityMismatch`.

use crate::cluster::{get_resource, ClusterClient};
use crate::error::{ControllerError, Result};
use meshward_core::resources::{
    VirtualNodeReference, VirtualRouterReference, VirtualServiceReference,
};
use meshward_core::{
    Mesh, MeshReference, MeshResource, ObjectKey, VirtualGateway, VirtualGatewayReference,
    VirtualNode, VirtualRouter, VirtualService,
};
use std::sync::Arc;
use tracing::error;

/// Key of a namespaced reference; an unset namespace means the referrer's own
pub fn reference_key(referrer_namespace: Option<&str>, namespace: Option<&str>, name: &str) -> ObjectKey {
    ObjectKey::new(
        namespace.or(referrer_namespace).unwrap_or_default(),
        name,
    )
}

pub fn virtual_node_key<R: MeshResource>(referrer: &R, reference: &VirtualNodeReference) -> ObjectKey {
    reference_key(referrer.namespace(), reference.namespace.as_deref(), &reference.name)
}

pub fn virtual_service_key<R: MeshResource>(
    referrer: &R,
    reference: &VirtualServiceReference,
) -> ObjectKey {
    reference_key(referrer.namespace(), reference.namespace.as_deref(), &reference.name)
}

pub fn virtual_router_key<R: MeshResource>(
    referrer: &R,
    reference: &VirtualRouterReference,
) -> ObjectKey {
    reference_key(referrer.namespace(), reference.namespace.as_deref(), &reference.name)
}

pub fn virtual_gateway_key<R: MeshResource>(
    referrer: &R,
    reference: &VirtualGatewayReference,
) -> ObjectKey {
    reference_key(referrer.namespace(), reference.namespace.as_deref(), &reference.name)
}

/// Resolves references against the cluster
pub struct ReferenceResolver {
    client: Arc<dyn ClusterClient>,
}

impl ReferenceResolver {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    async fn fetch<T: MeshResource>(&self, key: &ObjectKey) -> Result<T> {
        get_resource::<T>(self.client.as_ref(), key)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    ControllerError::reference_not_found(T::KIND.display_name(), key.to_string())
                } else {
                    e
                }
            })
    }

    pub async fn resolve_mesh(&self, reference: &MeshReference) -> Result<Mesh> {
        let mesh: Mesh = self
            .fetch(&ObjectKey::cluster_scoped(&reference.name))
            .await?;
        if mesh.uid() != Some(reference.uid.as_str()) {
            error!(
                "mesh UID mismatch for {}: expected {}, found {}",
                reference.name,
                reference.uid,
                mesh.uid().unwrap_or_default()
            );
            return Err(ControllerError::identity_mismatch("mesh", &reference.name));
        }
        Ok(mesh)
    }

    pub async fn resolve_virtual_gateway<R: MeshResource>(
        &self,
        referrer: &R,
        reference: &VirtualGatewayReference,
    ) -> Result<VirtualGateway> {
        let key = virtual_gateway_key(referrer, reference);
        let vg: VirtualGateway = self.fetch(&key).await?;
        if vg.uid() != Some(reference.uid.as_str()) {
            error!(
                "virtualGateway UID mismatch for {}: expected {}, found {}",
                key,
                reference.uid,
                vg.uid().unwrap_or_default()
            );
            return Err(ControllerError::identity_mismatch(
                "virtualGateway",
                &reference.name,
            ));
        }
        Ok(vg)
    }

    pub async fn resolve_virtual_node<R: MeshResource>(
        &self,
        referrer: &R,
        reference: &VirtualNodeReference,
    ) -> Result<VirtualNode> {
        self.fetch(&virtual_node_key(referrer, reference)).await
    }

    pub async fn resolve_virtual_service<R: MeshResource>(
        &self,
        referrer: &R,
        reference: &VirtualServiceReference,
    ) -> Result<VirtualService> {
        self.fetch(&virtual_service_key(referrer, reference)).await
    }

    pub async fn resolve_virtual_router<R: MeshResource>(
        &self,
        referrer: &R,
        reference: &VirtualRouterReference,
    ) -> Result<VirtualRouter> {
        self.fetch(&virtual_router_key(referrer, reference)).await
    }
}
