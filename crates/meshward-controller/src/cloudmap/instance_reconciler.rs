//! Periodic registration of pods as discovery instances
//!
//! Each pass runs syncPods, which registers running pods and deregisters
//! terminating ones, then syncInstances, which sweeps instances whose pod no
//! longer exists. The sweep heals registrations left behind when a pod
//! deletion was never observed.
//!
//! Pod readiness decides instance health. Services created with a custom
//! health check keep not-ready pods registered as UNHEALTHY; other services
//! only carry ready pods.

use super::pod::{
    instance_attributes, instance_health, is_running, is_terminating, pod_ip, pod_membership,
    NodeLocality, PodMembership, ATTR_K8S_NAMESPACE, ATTR_K8S_POD,
};
use super::{ServiceLocator, CACHE_CAPACITY};
use crate::cluster::{list_resources, ClusterClient};
use crate::config::CloudMapConfig;
use crate::error::Result;
use k8s_openapi::api::core::v1::Pod;
use meshward_cloud::cloudmap::list_all_instances;
use meshward_cloud::types::{
    RegisterInstanceInput, ServiceDiscoveryData, ServiceSummary, VirtualNodeSpecData,
};
use meshward_cloud::{CustomHealthStatus, RemoteId, ResourceApi};
use meshward_core::{Mesh, MeshResource, VirtualNode};
use moka::future::Cache;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Keeps discovery instances in step with pod liveness
pub struct CloudMapInstanceReconciler {
    client: Arc<dyn ClusterClient>,
    virtual_nodes: Arc<dyn ResourceApi<VirtualNodeSpecData>>,
    locator: Arc<ServiceLocator>,
    sync_interval: Duration,
    /// Health last reported for `instanceID@service@namespace`
    registered: Cache<String, CustomHealthStatus>,
}

fn registration_key(instance_id: &str, service_name: &str, namespace_name: &str) -> String {
    format!("{}@{}@{}", instance_id, service_name, namespace_name)
}

fn pod_name(pod: &Pod) -> String {
    format!(
        "{}/{}",
        pod.metadata.namespace.as_deref().unwrap_or_default(),
        pod.metadata.name.as_deref().unwrap_or_default()
    )
}

/// Whether an instance in this health state belongs in the service at all
fn keeps_instance(svc: &ServiceSummary, health: CustomHealthStatus) -> bool {
    health == CustomHealthStatus::Healthy || svc.has_custom_health_check()
}

impl CloudMapInstanceReconciler {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        virtual_nodes: Arc<dyn ResourceApi<VirtualNodeSpecData>>,
        locator: Arc<ServiceLocator>,
        config: &CloudMapConfig,
    ) -> Self {
        Self {
            client,
            virtual_nodes,
            locator,
            sync_interval: config.sync_interval,
            registered: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(config.cache_ttl)
                .build(),
        }
    }

    /// Run the reconcile loop until cancelled
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        info!(
            "Starting cloud map instance reconciler (interval: {:?})",
            self.sync_interval
        );

        let mut interval = tokio::time::interval(self.sync_interval);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Cloud map instance reconciler shutting down");
                    return Ok(());
                }
                _ = interval.tick() => {
                    if let Err(e) = self.sync().await {
                        error!("Cloud map instance sync failed: {}", e);
                    }
                }
            }
        }
    }

    /// One full pass: syncPods, then syncInstances
    pub async fn sync(&self) -> Result<()> {
        let pods = self.sync_pods().await;
        let instances = self.sync_instances().await;
        pods.and(instances)
    }

    /// Owner account of each shared mesh, keyed by remote mesh name
    async fn mesh_owners(&self) -> Result<HashMap<String, String>> {
        let meshes: Vec<Mesh> = list_resources(self.client.as_ref(), None).await?;
        Ok(meshes
            .iter()
            .filter_map(|mesh| {
                mesh.spec
                    .mesh_owner
                    .clone()
                    .map(|owner| (mesh.aws_name(), owner))
            })
            .collect())
    }

    pub async fn sync_pods(&self) -> Result<()> {
        let pods = self.client.list_pods().await?;
        let owners = self.mesh_owners().await?;
        debug!("Syncing {} pods", pods.len());
        for pod in &pods {
            if let Err(e) = self.sync_pod(pod, &owners).await {
                warn!("Failed to sync pod {}: {}", pod_name(pod), e);
            }
        }
        Ok(())
    }

    async fn sync_pod(&self, pod: &Pod, owners: &HashMap<String, String>) -> Result<()> {
        let Some(membership) = pod_membership(pod) else {
            return Ok(());
        };
        let Some(ip) = pod_ip(pod) else {
            debug!("Pod {} has no IP yet, skipping", pod_name(pod));
            return Ok(());
        };
        let terminating = is_terminating(pod);
        if !terminating && !is_running(pod) {
            return Ok(());
        }

        let id = RemoteId::in_mesh(
            &membership.mesh_name,
            owners.get(&membership.mesh_name).cloned(),
            &membership.virtual_node_name,
        );
        let vn = match self.virtual_nodes.describe(&id).await {
            Ok(vn) => vn,
            Err(e) if e.is_not_found() => {
                debug!("Pod {} names unknown virtualNode {}", pod_name(pod), id);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let Some(ServiceDiscoveryData::AwsCloudMap {
            namespace_name,
            service_name,
            attributes,
        }) = &vn.spec.service_discovery
        else {
            return Ok(());
        };

        let Some((_, svc)) = self.locator.lookup(namespace_name, service_name).await? else {
            debug!(
                "Discovery service {} in {} not found, skipping pod {}",
                service_name,
                namespace_name,
                pod_name(pod)
            );
            return Ok(());
        };

        let key = registration_key(ip, service_name, namespace_name);
        if terminating {
            self.deregister(&svc.id, ip).await?;
            self.registered.invalidate(&key).await;
            return Ok(());
        }

        let health = instance_health(pod);
        if !keeps_instance(&svc, health) {
            if self.registered.contains_key(&key) {
                debug!("Pod {} is not ready, withdrawing {}", pod_name(pod), ip);
                self.deregister(&svc.id, ip).await?;
                self.registered.invalidate(&key).await;
            }
            return Ok(());
        }

        if let Some(reported) = self.registered.get(&key).await {
            if reported == health {
                return Ok(());
            }
            match self
                .locator
                .api()
                .update_instance_custom_health_status(&svc.id, ip, health)
                .await
            {
                Ok(()) => {
                    info!("Instance {} of pod {} is now {}", ip, pod_name(pod), health);
                    self.registered.insert(key, health).await;
                    return Ok(());
                }
                Err(e) if e.is_not_found() => {
                    debug!("Instance {} vanished from {}, registering again", ip, svc.name);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let locality = self.node_locality(pod).await;
        let input = RegisterInstanceInput {
            service_id: svc.id.clone(),
            instance_id: ip.to_string(),
            attributes: instance_attributes(pod, ip, &membership, attributes, &locality, health),
        };
        self.register(&input, pod, &membership).await?;
        self.registered.insert(key, health).await;
        Ok(())
    }

    async fn register(
        &self,
        input: &RegisterInstanceInput,
        pod: &Pod,
        membership: &PodMembership,
    ) -> Result<()> {
        match self.locator.api().register_instance(input).await {
            Ok(()) => {
                info!(
                    "Registered pod {} of virtualNode {} as {} in {}",
                    pod_name(pod),
                    membership.virtual_node_name,
                    input.instance_id,
                    input.service_id
                );
                Ok(())
            }
            Err(e) if e.is_duplicate_request() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Region and zone of the pod's node; unknown when the node can't be read
    async fn node_locality(&self, pod: &Pod) -> NodeLocality {
        let Some(node_name) = pod.spec.as_ref().and_then(|s| s.node_name.as_deref()) else {
            return NodeLocality::default();
        };
        match self.client.get_node(node_name).await {
            Ok(node) => NodeLocality::from_node(&node),
            Err(e) => {
                debug!("Failed to read node {} of pod {}: {}", node_name, pod_name(pod), e);
                NodeLocality::default()
            }
        }
    }

    async fn deregister(&self, service_id: &str, instance_id: &str) -> Result<()> {
        match self
            .locator
            .api()
            .deregister_instance(service_id, instance_id)
            .await
        {
            Ok(()) => {
                info!("Deregistered instance {} from {}", instance_id, service_id);
                Ok(())
            }
            Err(e) if e.is_duplicate_request() || e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn sync_instances(&self) -> Result<()> {
        let nodes: Vec<VirtualNode> = list_resources(self.client.as_ref(), None).await?;
        let mut seen = HashSet::new();
        for vn in &nodes {
            let Some(cloud_map) = vn.cloud_map() else {
                continue;
            };
            if !seen.insert(format!(
                "{}@{}",
                cloud_map.service_name, cloud_map.namespace_name
            )) {
                continue;
            }
            if let Err(e) = self
                .sweep_service(&cloud_map.namespace_name, &cloud_map.service_name)
                .await
            {
                warn!(
                    "Failed to sweep discovery service {} in {}: {}",
                    cloud_map.service_name, cloud_map.namespace_name, e
                );
            }
        }
        Ok(())
    }

    /// Deregister instances of one service whose pod is gone, or no longer
    /// ready when the service takes no custom health
    async fn sweep_service(&self, namespace_name: &str, service_name: &str) -> Result<()> {
        let Some((_, svc)) = self.locator.lookup(namespace_name, service_name).await? else {
            return Ok(());
        };

        for instance in list_all_instances(self.locator.api(), &svc.id).await? {
            let (Some(pod), Some(namespace)) = (
                instance.attributes.get(ATTR_K8S_POD),
                instance.attributes.get(ATTR_K8S_NAMESPACE),
            ) else {
                continue;
            };

            match self.client.get_pod(namespace, pod).await {
                Ok(live) => {
                    if is_terminating(&live) || keeps_instance(&svc, instance_health(&live)) {
                        continue;
                    }
                    debug!("Pod {}/{} of instance {} is not ready", namespace, pod, instance.id);
                }
                Err(e) if e.is_not_found() => {
                    debug!("Pod {}/{} of instance {} is gone", namespace, pod, instance.id);
                }
                Err(e) => {
                    warn!(
                        "Failed to look up pod {}/{} of instance {}, deregistering: {}",
                        namespace, pod, instance.id, e
                    );
                }
            }

            self.deregister(&svc.id, &instance.id).await?;
            self.registered
                .invalidate(&registration_key(&instance.id, service_name, namespace_name))
                .await;
        }
        Ok(())
    }
}
