use super::pod::registered_for;
use super::ServiceLocator;
use crate::cluster::{patch_resource_status, ClusterClient};
use crate::config::CloudMapConfig;
use crate::error::{ControllerError, Result};
use crate::outcome::ReconcileOutcome;
use crate::references::ReferenceResolver;
use meshward_cloud::cloudmap::list_all_instances;
use meshward_cloud::types::{
    CreateServiceInput, DnsConfig, HealthCheckCustomConfig, NamespaceSummary, NamespaceType,
    ServiceSummary,
};
use meshward_cloud::CloudError;
use meshward_core::resources::AwsCloudMapServiceStatus;
use meshward_core::{MeshResource, VirtualNode};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SUPPORTED_NAMESPACE_TYPES: &str = "[DNS_PRIVATE HTTP]";

/// Manages the discovery service of virtual nodes using awsCloudMap
pub struct CloudMapResourceManager {
    locator: Arc<ServiceLocator>,
    client: Arc<dyn ClusterClient>,
    resolver: Arc<ReferenceResolver>,
    dns_ttl: i64,
    custom_health_check: bool,
}

impl CloudMapResourceManager {
    pub fn new(
        locator: Arc<ServiceLocator>,
        client: Arc<dyn ClusterClient>,
        resolver: Arc<ReferenceResolver>,
        config: &CloudMapConfig,
    ) -> Self {
        Self {
            locator,
            client,
            resolver,
            dns_ttl: config.dns_ttl,
            custom_health_check: config.enable_custom_health_check,
        }
    }

    async fn ensure_mesh(&self, vn: &VirtualNode) -> Result<()> {
        let mesh_ref = vn.spec.mesh_ref.as_ref().ok_or_else(|| {
            ControllerError::missing_reference("meshRef", format!("virtualNode {}", vn.object_key()))
        })?;
        self.resolver.resolve_mesh(mesh_ref).await?;
        Ok(())
    }

    /// Ensure the node's discovery service exists and record it in status
    pub async fn reconcile(&self, vn: &mut VirtualNode) -> Result<ReconcileOutcome> {
        let Some(cloud_map) = vn.cloud_map().cloned() else {
            return Ok(ReconcileOutcome::Done);
        };
        self.ensure_mesh(vn).await?;

        let namespace = self
            .locator
            .namespace(&cloud_map.namespace_name)
            .await?
            .ok_or_else(|| CloudError::not_found("Namespace", &cloud_map.namespace_name))?;

        let service = match self.locator.service(&namespace, &cloud_map.service_name).await? {
            Some(svc) => self.update_service(&namespace, svc).await?,
            None => {
                self.create_service(vn, &namespace, &cloud_map.service_name)
                    .await?
            }
        };

        let desired = AwsCloudMapServiceStatus {
            namespace_id: Some(namespace.id.clone()),
            service_id: Some(service.id.clone()),
        };
        if vn.status.aws_cloud_map_service_status.as_ref() != Some(&desired) {
            vn.status.aws_cloud_map_service_status = Some(desired);
            patch_resource_status(self.client.as_ref(), vn).await?;
        }
        Ok(ReconcileOutcome::Done)
    }

    async fn create_service(
        &self,
        vn: &VirtualNode,
        namespace: &NamespaceSummary,
        name: &str,
    ) -> Result<ServiceSummary> {
        let dns_config = match namespace.type_ {
            NamespaceType::DnsPrivate => Some(DnsConfig::a_record(self.dns_ttl)),
            NamespaceType::Http => None,
            other => {
                return Err(ControllerError::unsupported_namespace_type(
                    other.as_str(),
                    SUPPORTED_NAMESPACE_TYPES,
                ))
            }
        };

        let input = CreateServiceInput {
            name: name.to_string(),
            namespace_id: namespace.id.clone(),
            creator_request_id: vn.uid().unwrap_or_default().to_string(),
            dns_config,
            health_check_custom_config: self
                .custom_health_check
                .then_some(HealthCheckCustomConfig {
                    failure_threshold: 1,
                }),
        };
        match self.locator.api().create_service(&input).await {
            Ok(svc) => {
                info!(
                    "Created discovery service {} in {} for virtualNode {}",
                    svc.name,
                    namespace.name,
                    vn.object_key()
                );
                self.locator.remember_service(&svc).await;
                Ok(svc)
            }
            Err(e) if e.is_already_exists() => {
                debug!("Discovery service {} appeared concurrently, looking it up", name);
                self.locator.forget_service(&namespace.id, name).await;
                self.locator
                    .service(namespace, name)
                    .await?
                    .ok_or_else(|| e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_service(
        &self,
        namespace: &NamespaceSummary,
        mut svc: ServiceSummary,
    ) -> Result<ServiceSummary> {
        if namespace.type_ != NamespaceType::DnsPrivate {
            return Ok(svc);
        }
        let actual_ttl = svc.dns_config.as_ref().and_then(DnsConfig::ttl);
        if actual_ttl == Some(self.dns_ttl) {
            return Ok(svc);
        }

        debug!(
            "Discovery service {} DNS TTL changed: actual {:?}, desired {}",
            svc.name, actual_ttl, self.dns_ttl
        );
        let dns_config = DnsConfig::a_record(self.dns_ttl);
        self.locator
            .api()
            .update_service(&svc.id, &dns_config)
            .await?;
        svc.dns_config = Some(dns_config);
        self.locator.remember_service(&svc).await;
        Ok(svc)
    }

    /// Remote name of the node's mesh, falling back to the referenced name
    /// once the mesh object is gone
    async fn remote_mesh_name(&self, vn: &VirtualNode) -> Result<Option<String>> {
        let Some(mesh_ref) = vn.spec.mesh_ref.as_ref() else {
            return Ok(None);
        };
        match self.resolver.resolve_mesh(mesh_ref).await {
            Ok(mesh) => Ok(Some(mesh.aws_name())),
            Err(e) if e.is_not_found() => Ok(Some(mesh_ref.name.clone())),
            Err(e) => Err(e),
        }
    }

    /// Deregister the node's own instances, then delete the service if this
    /// node created it and nothing else is registered in it
    pub async fn cleanup(&self, vn: &VirtualNode) -> Result<ReconcileOutcome> {
        let Some(cloud_map) = vn.cloud_map() else {
            return Ok(ReconcileOutcome::Done);
        };
        // never bound to a mesh, so nothing was registered for it
        let Some(mesh_name) = self.remote_mesh_name(vn).await? else {
            return Ok(ReconcileOutcome::Done);
        };
        let vn_name = vn.aws_name();
        let recorded = vn
            .status
            .aws_cloud_map_service_status
            .as_ref()
            .is_some_and(|s| s.service_id.is_some());

        let namespace = match self.locator.namespace(&cloud_map.namespace_name).await {
            Ok(Some(ns)) => ns,
            Ok(None) => return Ok(ReconcileOutcome::Done),
            Err(e) if !recorded => {
                debug!(
                    "Ignoring namespace lookup failure for virtualNode {}, no service recorded: {}",
                    vn.object_key(),
                    e
                );
                return Ok(ReconcileOutcome::Done);
            }
            Err(e) => return Err(e.into()),
        };
        let Some(svc) = self
            .locator
            .service(&namespace, &cloud_map.service_name)
            .await?
        else {
            return Ok(ReconcileOutcome::Done);
        };

        let api = self.locator.api();
        let mut remaining = 0;
        for instance in list_all_instances(api, &svc.id).await? {
            if !registered_for(&instance.attributes, &mesh_name, &vn_name) {
                remaining += 1;
                continue;
            }
            match api.deregister_instance(&svc.id, &instance.id).await {
                Ok(()) => debug!("Deregistered instance {} from {}", instance.id, svc.name),
                Err(e) if e.is_not_found() || e.is_duplicate_request() => {}
                Err(e) => return Err(e.into()),
            }
        }

        if svc.creator_request_id.as_deref() != vn.uid() {
            debug!(
                "Skipping deletion of discovery service {}: not created by virtualNode {}",
                svc.name,
                vn.object_key()
            );
            return Ok(ReconcileOutcome::Done);
        }
        if remaining > 0 {
            info!(
                "Keeping discovery service {}: {} instances of other virtualNodes remain",
                svc.name, remaining
            );
            return Ok(ReconcileOutcome::Done);
        }

        match api.delete_service(&svc.id).await {
            Ok(()) => info!("Deleted discovery service {} ({})", svc.name, svc.id),
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                warn!("Failed to delete discovery service {}: {}", svc.name, e);
                return Err(e.into());
            }
        }
        self.locator.forget_service(&namespace.id, &svc.name).await;
        Ok(ReconcileOutcome::Done)
    }
}
