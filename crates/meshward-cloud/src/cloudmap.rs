use crate::error::Result;
use crate::throttle::{throttled_call, CallTimeouts, Throttler, SERVICE_SERVICEDISCOVERY};
use crate::types::{
    CreateServiceInput, CustomHealthStatus, DnsConfig, InstanceSummary, NamespaceSummary, Page,
    RegisterInstanceInput, ServiceSummary,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Service-discovery API surface
///
/// Listings are paginated; callers must drain every page before concluding
/// that something does not exist.
#[async_trait]
pub trait CloudMapApi: Send + Sync {
    // --- Namespaces and services ---

    async fn list_namespaces(&self, next_token: Option<String>) -> Result<Page<NamespaceSummary>>;

    /// List services within one namespace
    async fn list_services(
        &self,
        namespace_id: &str,
        next_token: Option<String>,
    ) -> Result<Page<ServiceSummary>>;

    async fn create_service(&self, input: &CreateServiceInput) -> Result<ServiceSummary>;

    /// Replace the DNS configuration of a service
    async fn update_service(&self, service_id: &str, dns_config: &DnsConfig) -> Result<()>;

    async fn delete_service(&self, service_id: &str) -> Result<()>;

    // --- Instances ---

    async fn register_instance(&self, input: &RegisterInstanceInput) -> Result<()>;

    async fn deregister_instance(&self, service_id: &str, instance_id: &str) -> Result<()>;

    async fn list_instances(
        &self,
        service_id: &str,
        next_token: Option<String>,
    ) -> Result<Page<InstanceSummary>>;

    /// Report the health of an instance; the service must use custom health checks
    async fn update_instance_custom_health_status(
        &self,
        service_id: &str,
        instance_id: &str,
        status: CustomHealthStatus,
    ) -> Result<()>;
}

/// Every namespace, across all pages
pub async fn list_all_namespaces(api: &dyn CloudMapApi) -> Result<Vec<NamespaceSummary>> {
    let mut items = Vec::new();
    let mut next_token = None;
    loop {
        let page = api.list_namespaces(next_token).await?;
        items.extend(page.items);
        match page.next_token {
            Some(token) => next_token = Some(token),
            None => return Ok(items),
        }
    }
}

/// Every service in a namespace, across all pages
pub async fn list_all_services(
    api: &dyn CloudMapApi,
    namespace_id: &str,
) -> Result<Vec<ServiceSummary>> {
    let mut items = Vec::new();
    let mut next_token = None;
    loop {
        let page = api.list_services(namespace_id, next_token).await?;
        items.extend(page.items);
        match page.next_token {
            Some(token) => next_token = Some(token),
            None => return Ok(items),
        }
    }
}

/// Every instance of a service, across all pages
pub async fn list_all_instances(
    api: &dyn CloudMapApi,
    service_id: &str,
) -> Result<Vec<InstanceSummary>> {
    let mut items = Vec::new();
    let mut next_token = None;
    loop {
        let page = api.list_instances(service_id, next_token).await?;
        items.extend(page.items);
        match page.next_token {
            Some(token) => next_token = Some(token),
            None => return Ok(items),
        }
    }
}

/// Find a namespace by name, draining pagination
pub async fn find_namespace(api: &dyn CloudMapApi, name: &str) -> Result<Option<NamespaceSummary>> {
    Ok(list_all_namespaces(api)
        .await?
        .into_iter()
        .find(|ns| ns.name == name))
}

/// Find a service by name within a namespace, draining pagination
pub async fn find_service(
    api: &dyn CloudMapApi,
    namespace_id: &str,
    name: &str,
) -> Result<Option<ServiceSummary>> {
    Ok(list_all_services(api, namespace_id)
        .await?
        .into_iter()
        .find(|svc| svc.name == name))
}

/// Wraps a `CloudMapApi` with per-operation throttling and call deadlines
pub struct ThrottledCloudMap {
    inner: Arc<dyn CloudMapApi>,
    throttler: Throttler,
    timeouts: CallTimeouts,
}

impl ThrottledCloudMap {
    pub fn new(inner: Arc<dyn CloudMapApi>, throttler: Throttler, timeouts: CallTimeouts) -> Self {
        Self {
            inner,
            throttler,
            timeouts,
        }
    }
}

#[async_trait]
impl CloudMapApi for ThrottledCloudMap {
    async fn list_namespaces(&self, next_token: Option<String>) -> Result<Page<NamespaceSummary>> {
        throttled_call(
            &self.throttler,
            SERVICE_SERVICEDISCOVERY,
            "ListNamespaces",
            self.timeouts.read,
            self.inner.list_namespaces(next_token),
        )
        .await
    }

    async fn list_services(
        &self,
        namespace_id: &str,
        next_token: Option<String>,
    ) -> Result<Page<ServiceSummary>> {
        throttled_call(
            &self.throttler,
            SERVICE_SERVICEDISCOVERY,
            "ListServices",
            self.timeouts.read,
            self.inner.list_services(namespace_id, next_token),
        )
        .await
    }

    async fn create_service(&self, input: &CreateServiceInput) -> Result<ServiceSummary> {
        throttled_call(
            &self.throttler,
            SERVICE_SERVICEDISCOVERY,
            "CreateService",
            self.timeouts.write,
            self.inner.create_service(input),
        )
        .await
    }

    async fn update_service(&self, service_id: &str, dns_config: &DnsConfig) -> Result<()> {
        throttled_call(
            &self.throttler,
            SERVICE_SERVICEDISCOVERY,
            "UpdateService",
            self.timeouts.write,
            self.inner.update_service(service_id, dns_config),
        )
        .await
    }

    async fn delete_service(&self, service_id: &str) -> Result<()> {
        throttled_call(
            &self.throttler,
            SERVICE_SERVICEDISCOVERY,
            "DeleteService",
            self.timeouts.write,
            self.inner.delete_service(service_id),
        )
        .await
    }

    async fn register_instance(&self, input: &RegisterInstanceInput) -> Result<()> {
        throttled_call(
            &self.throttler,
            SERVICE_SERVICEDISCOVERY,
            "RegisterInstance",
            self.timeouts.write,
            self.inner.register_instance(input),
        )
        .await
    }

    async fn deregister_instance(&self, service_id: &str, instance_id: &str) -> Result<()> {
        throttled_call(
            &self.throttler,
            SERVICE_SERVICEDISCOVERY,
            "DeregisterInstance",
            self.timeouts.write,
            self.inner.deregister_instance(service_id, instance_id),
        )
        .await
    }

    async fn list_instances(
        &self,
        service_id: &str,
        next_token: Option<String>,
    ) -> Result<Page<InstanceSummary>> {
        throttled_call(
            &self.throttler,
            SERVICE_SERVICEDISCOVERY,
            "ListInstances",
            self.timeouts.read,
            self.inner.list_instances(service_id, next_token),
        )
        .await
    }

    async fn update_instance_custom_health_status(
        &self,
        service_id: &str,
        instance_id: &str,
        status: CustomHealthStatus,
    ) -> Result<()> {
        throttled_call(
            &self.throttler,
            SERVICE_SERVICEDISCOVERY,
            "UpdateInstanceCustomHealthStatus",
            self.timeouts.write,
            self.inner
                .update_instance_custom_health_status(service_id, instance_id, status),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::InMemoryCloudMap;
    use crate::types::NamespaceType;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_find_namespace_drains_pagination() {
        let cloudmap = InMemoryCloudMap::new("111122223333", "us-west-2").with_page_size(2);
        for i in 0..5 {
            cloudmap
                .add_namespace(&format!("ns{}.local", i), NamespaceType::DnsPrivate)
                .await;
        }

        let found = find_namespace(&cloudmap, "ns4.local").await.unwrap();
        assert_eq!(found.map(|ns| ns.name), Some("ns4.local".to_string()));
        assert_eq!(cloudmap.list_namespaces_calls(), 3);

        assert!(find_namespace(&cloudmap, "missing.local")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_all_instances_drains_pagination() {
        let cloudmap = InMemoryCloudMap::new("111122223333", "us-west-2").with_page_size(1);
        let ns = cloudmap.add_namespace("shop.local", NamespaceType::Http).await;
        let svc = cloudmap
            .create_service(&CreateServiceInput {
                name: "colorteller".to_string(),
                namespace_id: ns.id.clone(),
                creator_request_id: "uid-1".to_string(),
                dns_config: None,
                health_check_custom_config: None,
            })
            .await
            .unwrap();

        for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            cloudmap
                .register_instance(&RegisterInstanceInput {
                    service_id: svc.id.clone(),
                    instance_id: ip.to_string(),
                    attributes: BTreeMap::new(),
                })
                .await
                .unwrap();
        }

        let instances = list_all_instances(&cloudmap, &svc.id).await.unwrap();
        assert_eq!(instances.len(), 3);
        assert!(find_service(&cloudmap, &ns.id, "colorteller")
            .await
            .unwrap()
            .is_some());
    }
}
