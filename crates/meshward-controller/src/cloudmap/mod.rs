//! Service-discovery integration for virtual nodes
//!
//! The service manager keeps one discovery service per virtual node that
//! uses awsCloudMap. The instance reconciler keeps that service's instances
//! in step with the pods backing the node.

pub mod instance_reconciler;
pub mod pod;
pub mod resource_manager;

pub use instance_reconciler::CloudMapInstanceReconciler;
pub use resource_manager::CloudMapResourceManager;

use meshward_cloud::cloudmap::{find_namespace, find_service};
use meshward_cloud::types::{NamespaceSummary, ServiceSummary};
use meshward_cloud::{CloudMapApi, Result};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Upper bound on entries of each discovery cache
pub const CACHE_CAPACITY: u64 = 2048;

/// Cached name lookups of discovery namespaces and services
///
/// Only hits are cached, so a namespace or service created after a miss is
/// found on the next lookup.
pub struct ServiceLocator {
    api: Arc<dyn CloudMapApi>,
    namespaces: Cache<String, NamespaceSummary>,
    services: Cache<(String, String), ServiceSummary>,
}

impl ServiceLocator {
    pub fn new(api: Arc<dyn CloudMapApi>, cache_ttl: Duration) -> Self {
        Self {
            api,
            namespaces: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(cache_ttl)
                .build(),
            services: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(cache_ttl)
                .build(),
        }
    }

    pub fn api(&self) -> &dyn CloudMapApi {
        self.api.as_ref()
    }

    pub async fn namespace(&self, name: &str) -> Result<Option<NamespaceSummary>> {
        if let Some(ns) = self.namespaces.get(name).await {
            return Ok(Some(ns));
        }
        let found = find_namespace(self.api(), name).await?;
        if let Some(ns) = &found {
            debug!("Found discovery namespace {} ({})", name, ns.id);
            self.namespaces.insert(name.to_string(), ns.clone()).await;
        }
        Ok(found)
    }

    pub async fn service(
        &self,
        namespace: &NamespaceSummary,
        name: &str,
    ) -> Result<Option<ServiceSummary>> {
        let key = (namespace.id.clone(), name.to_string());
        if let Some(svc) = self.services.get(&key).await {
            return Ok(Some(svc));
        }
        let found = find_service(self.api(), &namespace.id, name).await?;
        if let Some(svc) = &found {
            self.services.insert(key, svc.clone()).await;
        }
        Ok(found)
    }

    /// Namespace and service by name, `None` if either is missing
    pub async fn lookup(
        &self,
        namespace_name: &str,
        service_name: &str,
    ) -> Result<Option<(NamespaceSummary, ServiceSummary)>> {
        let Some(namespace) = self.namespace(namespace_name).await? else {
            return Ok(None);
        };
        Ok(self
            .service(&namespace, service_name)
            .await?
            .map(|svc| (namespace, svc)))
    }

    pub async fn remember_service(&self, svc: &ServiceSummary) {
        self.services
            .insert((svc.namespace_id.clone(), svc.name.clone()), svc.clone())
            .await;
    }

    pub async fn forget_service(&self, namespace_id: &str, name: &str) {
        self.services
            .invalidate(&(namespace_id.to_string(), name.to_string()))
            .await;
    }
}
