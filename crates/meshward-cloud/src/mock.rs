use crate::appmesh::ResourceApi;
use crate::cloudmap::CloudMapApi;
use crate::error::{CloudError, Result};
use crate::types::*;
use async_trait::async_trait;
use meshward_core::ResourceKind;
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Mesh owner account, mesh, parent and name
type RemoteKey = (String, String, Option<String>, String);

/// One-shot failures keyed by operation name
#[derive(Default)]
struct FailureInjector {
    pending: RwLock<HashMap<String, CloudError>>,
}

impl FailureInjector {
    async fn arm(&self, operation: &str, error: CloudError) {
        self.pending
            .write()
            .await
            .insert(operation.to_string(), error);
    }

    async fn take(&self, operation: &str) -> Result<()> {
        match self.pending.write().await.remove(operation) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn paginate<T: Clone>(items: &[T], next_token: Option<String>, page_size: usize) -> Result<Page<T>> {
    let start = match next_token {
        Some(token) => token
            .parse::<usize>()
            .map_err(|_| CloudError::api_error("List", format!("invalid next token {}", token)))?,
        None => 0,
    };
    let end = (start + page_size).min(items.len());
    let page = items.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
    let next_token = (end < items.len()).then(|| end.to_string());
    Ok(Page {
        items: page,
        next_token,
    })
}

/// In-memory mesh API for one resource kind
///
/// Stamps `resourceOwner` with its own account, renders ARNs and counts calls
/// so tests can assert how many mutations a reconcile issued.
pub struct InMemoryResourceApi<S: RemoteSpec> {
    account_id: String,
    region: String,
    resources: Arc<RwLock<HashMap<RemoteKey, RemoteResource<S>>>>,
    failures: FailureInjector,
    describe_calls: AtomicUsize,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    _spec: PhantomData<S>,
}

impl<S: RemoteSpec> InMemoryResourceApi<S> {
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
            resources: Arc::new(RwLock::new(HashMap::new())),
            failures: FailureInjector::default(),
            describe_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            _spec: PhantomData,
        }
    }

    /// Resources of a shared mesh are only found when its owner is named
    fn remote_key(&self, id: &RemoteId) -> RemoteKey {
        (
            id.mesh_owner
                .clone()
                .unwrap_or_else(|| self.account_id.clone()),
            id.mesh_name.clone(),
            id.parent_name.clone(),
            id.name.clone(),
        )
    }

    fn arn(&self, id: &RemoteId) -> String {
        let owner = id.mesh_owner.as_deref().unwrap_or(&self.account_id);
        let mut path = format!("mesh/{}", id.mesh_name);
        if let Some(parent) = &id.parent_name {
            path.push_str(&format!("/virtualGateway/{}", parent));
        }
        if S::KIND != ResourceKind::Mesh {
            path.push_str(&format!("/{}/{}", S::KIND.display_name(), id.name));
        }
        format!("arn:aws:appmesh:{}:{}:{}", self.region, owner, path)
    }

    fn build(&self, id: &RemoteId, spec: S, resource_owner: &str) -> RemoteResource<S> {
        RemoteResource {
            id: id.clone(),
            spec,
            metadata: ResourceMetadata {
                arn: self.arn(id),
                resource_owner: resource_owner.to_string(),
                mesh_owner: id
                    .mesh_owner
                    .clone()
                    .unwrap_or_else(|| self.account_id.clone()),
                version: 1,
                uid: uuid::Uuid::new_v4().to_string(),
            },
            status: StatusCode::Active,
        }
    }

    /// Insert a resource created by another account
    pub async fn seed(&self, id: &RemoteId, spec: S, resource_owner: &str) -> RemoteResource<S> {
        let resource = self.build(id, spec, resource_owner);
        self.resources
            .write()
            .await
            .insert(self.remote_key(id), resource.clone());
        resource
    }

    /// Force the remote status of an existing resource
    pub async fn set_status(&self, id: &RemoteId, status: StatusCode) {
        if let Some(resource) = self.resources.write().await.get_mut(&self.remote_key(id)) {
            resource.status = status;
        }
    }

    /// Make the next call of `operation` (e.g. "describe") fail with `error`
    pub async fn fail_next(&self, operation: &str, error: CloudError) {
        self.failures.arm(operation, error).await;
    }

    pub async fn get(&self, id: &RemoteId) -> Option<RemoteResource<S>> {
        self.resources.read().await.get(&self.remote_key(id)).cloned()
    }

    pub async fn resource_count(&self) -> usize {
        self.resources.read().await.len()
    }

    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Total mutating calls
    pub fn mutation_calls(&self) -> usize {
        self.create_calls() + self.update_calls() + self.delete_calls()
    }
}

#[async_trait]
impl<S: RemoteSpec> ResourceApi<S> for InMemoryResourceApi<S> {
    async fn describe(&self, id: &RemoteId) -> Result<RemoteResource<S>> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        self.failures.take("describe").await?;
        self.resources
            .read()
            .await
            .get(&self.remote_key(id))
            .cloned()
            .ok_or_else(|| CloudError::not_found(S::KIND.as_str(), id.to_string()))
    }

    async fn create(&self, id: &RemoteId, spec: &S) -> Result<RemoteResource<S>> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.failures.take("create").await?;
        let mut resources = self.resources.write().await;
        let key = self.remote_key(id);
        if resources.contains_key(&key) {
            return Err(CloudError::already_exists(S::KIND.as_str(), id.to_string()));
        }
        let resource = self.build(id, spec.clone(), &self.account_id);
        resources.insert(key, resource.clone());
        debug!("Mock: {} created: {}", S::KIND, id);
        Ok(resource)
    }

    async fn update(&self, id: &RemoteId, spec: &S) -> Result<RemoteResource<S>> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.failures.take("update").await?;
        let mut resources = self.resources.write().await;
        let resource = resources
            .get_mut(&self.remote_key(id))
            .ok_or_else(|| CloudError::not_found(S::KIND.as_str(), id.to_string()))?;
        resource.spec = spec.clone();
        resource.metadata.version += 1;
        debug!("Mock: {} updated: {}", S::KIND, id);
        Ok(resource.clone())
    }

    async fn delete(&self, id: &RemoteId) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.failures.take("delete").await?;
        self.resources
            .write()
            .await
            .remove(&self.remote_key(id))
            .ok_or_else(|| CloudError::not_found(S::KIND.as_str(), id.to_string()))?;
        debug!("Mock: {} deleted: {}", S::KIND, id);
        Ok(())
    }
}

/// In-memory service-discovery API
pub struct InMemoryCloudMap {
    account_id: String,
    region: String,
    page_size: usize,
    namespaces: Arc<RwLock<Vec<NamespaceSummary>>>,
    services: Arc<RwLock<Vec<ServiceSummary>>>,
    instances: Arc<RwLock<HashMap<String, BTreeMap<String, InstanceSummary>>>>,
    /// Custom health of instances, keyed by service and instance ID
    health: Arc<RwLock<HashMap<(String, String), CustomHealthStatus>>>,
    failures: FailureInjector,
    list_namespaces_calls: AtomicUsize,
    create_service_calls: AtomicUsize,
    update_service_calls: AtomicUsize,
    delete_service_calls: AtomicUsize,
    register_calls: AtomicUsize,
    deregister_calls: AtomicUsize,
    health_update_calls: AtomicUsize,
}

impl InMemoryCloudMap {
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
            page_size: 100,
            namespaces: Arc::new(RwLock::new(Vec::new())),
            services: Arc::new(RwLock::new(Vec::new())),
            instances: Arc::new(RwLock::new(HashMap::new())),
            health: Arc::new(RwLock::new(HashMap::new())),
            failures: FailureInjector::default(),
            list_namespaces_calls: AtomicUsize::new(0),
            create_service_calls: AtomicUsize::new(0),
            update_service_calls: AtomicUsize::new(0),
            delete_service_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
            deregister_calls: AtomicUsize::new(0),
            health_update_calls: AtomicUsize::new(0),
        }
    }

    /// Set the number of items returned per listing page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn short_id(prefix: &str) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{}", prefix, &id[..16])
    }

    /// Create a namespace
    pub async fn add_namespace(&self, name: &str, type_: NamespaceType) -> NamespaceSummary {
        let ns = NamespaceSummary {
            id: Self::short_id("ns"),
            name: name.to_string(),
            type_,
        };
        self.namespaces.write().await.push(ns.clone());
        debug!("Mock: namespace created: {} ({})", name, ns.id);
        ns
    }

    /// Make the next call of `operation` (e.g. "register_instance") fail with `error`
    pub async fn fail_next(&self, operation: &str, error: CloudError) {
        self.failures.arm(operation, error).await;
    }

    pub async fn service(&self, service_id: &str) -> Option<ServiceSummary> {
        self.services
            .read()
            .await
            .iter()
            .find(|s| s.id == service_id)
            .cloned()
    }

    /// Registered instance IDs of a service
    pub async fn instance_ids(&self, service_id: &str) -> Vec<String> {
        self.instances
            .read()
            .await
            .get(service_id)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Attributes of one registered instance
    pub async fn instance(&self, service_id: &str, instance_id: &str) -> Option<InstanceSummary> {
        self.instances
            .read()
            .await
            .get(service_id)
            .and_then(|m| m.get(instance_id))
            .cloned()
    }

    /// Custom health of an instance, for services with custom health checks
    pub async fn instance_health(
        &self,
        service_id: &str,
        instance_id: &str,
    ) -> Option<CustomHealthStatus> {
        self.health
            .read()
            .await
            .get(&(service_id.to_string(), instance_id.to_string()))
            .copied()
    }

    pub fn list_namespaces_calls(&self) -> usize {
        self.list_namespaces_calls.load(Ordering::SeqCst)
    }

    pub fn create_service_calls(&self) -> usize {
        self.create_service_calls.load(Ordering::SeqCst)
    }

    pub fn update_service_calls(&self) -> usize {
        self.update_service_calls.load(Ordering::SeqCst)
    }

    pub fn delete_service_calls(&self) -> usize {
        self.delete_service_calls.load(Ordering::SeqCst)
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn deregister_calls(&self) -> usize {
        self.deregister_calls.load(Ordering::SeqCst)
    }

    pub fn health_update_calls(&self) -> usize {
        self.health_update_calls.load(Ordering::SeqCst)
    }

    async fn require_service(&self, service_id: &str) -> Result<()> {
        if self.service(service_id).await.is_none() {
            return Err(CloudError::not_found("Service", service_id));
        }
        Ok(())
    }
}

#[async_trait]
impl CloudMapApi for InMemoryCloudMap {
    async fn list_namespaces(&self, next_token: Option<String>) -> Result<Page<NamespaceSummary>> {
        self.list_namespaces_calls.fetch_add(1, Ordering::SeqCst);
        self.failures.take("list_namespaces").await?;
        paginate(&self.namespaces.read().await, next_token, self.page_size)
    }

    async fn list_services(
        &self,
        namespace_id: &str,
        next_token: Option<String>,
    ) -> Result<Page<ServiceSummary>> {
        self.failures.take("list_services").await?;
        let services: Vec<_> = self
            .services
            .read()
            .await
            .iter()
            .filter(|s| s.namespace_id == namespace_id)
            .cloned()
            .collect();
        paginate(&services, next_token, self.page_size)
    }

    async fn create_service(&self, input: &CreateServiceInput) -> Result<ServiceSummary> {
        self.create_service_calls.fetch_add(1, Ordering::SeqCst);
        self.failures.take("create_service").await?;
        let mut services = self.services.write().await;
        if services
            .iter()
            .any(|s| s.namespace_id == input.namespace_id && s.name == input.name)
        {
            return Err(CloudError::already_exists("Service", &input.name));
        }
        let id = Self::short_id("srv");
        let svc = ServiceSummary {
            arn: format!(
                "arn:aws:servicediscovery:{}:{}:service/{}",
                self.region, self.account_id, id
            ),
            id,
            name: input.name.clone(),
            namespace_id: input.namespace_id.clone(),
            creator_request_id: Some(input.creator_request_id.clone()),
            dns_config: input.dns_config.clone(),
            health_check_custom_config: input.health_check_custom_config,
        };
        services.push(svc.clone());
        debug!("Mock: service created: {} ({})", svc.name, svc.id);
        Ok(svc)
    }

    async fn update_service(&self, service_id: &str, dns_config: &DnsConfig) -> Result<()> {
        self.update_service_calls.fetch_add(1, Ordering::SeqCst);
        self.failures.take("update_service").await?;
        let mut services = self.services.write().await;
        let svc = services
            .iter_mut()
            .find(|s| s.id == service_id)
            .ok_or_else(|| CloudError::not_found("Service", service_id))?;
        svc.dns_config = Some(dns_config.clone());
        Ok(())
    }

    async fn delete_service(&self, service_id: &str) -> Result<()> {
        self.delete_service_calls.fetch_add(1, Ordering::SeqCst);
        self.failures.take("delete_service").await?;
        let registered = self
            .instances
            .read()
            .await
            .get(service_id)
            .is_some_and(|m| !m.is_empty());
        if registered {
            return Err(CloudError::api_error(
                "DeleteService",
                format!("service {} still has registered instances", service_id),
            ));
        }
        let mut services = self.services.write().await;
        let before = services.len();
        services.retain(|s| s.id != service_id);
        if services.len() == before {
            return Err(CloudError::not_found("Service", service_id));
        }
        debug!("Mock: service deleted: {}", service_id);
        Ok(())
    }

    async fn register_instance(&self, input: &RegisterInstanceInput) -> Result<()> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.failures.take("register_instance").await?;
        let svc = self
            .service(&input.service_id)
            .await
            .ok_or_else(|| CloudError::not_found("Service", &input.service_id))?;
        if svc.has_custom_health_check() {
            let status = match input.attributes.get("AWS_INIT_HEALTH_STATUS").map(String::as_str) {
                Some("UNHEALTHY") => CustomHealthStatus::Unhealthy,
                _ => CustomHealthStatus::Healthy,
            };
            self.health.write().await.insert(
                (input.service_id.clone(), input.instance_id.clone()),
                status,
            );
        }
        self.instances
            .write()
            .await
            .entry(input.service_id.clone())
            .or_default()
            .insert(
                input.instance_id.clone(),
                InstanceSummary {
                    id: input.instance_id.clone(),
                    attributes: input.attributes.clone(),
                },
            );
        debug!(
            "Mock: instance registered: {} in {}",
            input.instance_id, input.service_id
        );
        Ok(())
    }

    async fn deregister_instance(&self, service_id: &str, instance_id: &str) -> Result<()> {
        self.deregister_calls.fetch_add(1, Ordering::SeqCst);
        self.failures.take("deregister_instance").await?;
        self.require_service(service_id).await?;
        self.instances
            .write()
            .await
            .get_mut(service_id)
            .and_then(|m| m.remove(instance_id))
            .ok_or_else(|| CloudError::not_found("Instance", instance_id))?;
        self.health
            .write()
            .await
            .remove(&(service_id.to_string(), instance_id.to_string()));
        debug!("Mock: instance deregistered: {} in {}", instance_id, service_id);
        Ok(())
    }

    async fn list_instances(
        &self,
        service_id: &str,
        next_token: Option<String>,
    ) -> Result<Page<InstanceSummary>> {
        self.failures.take("list_instances").await?;
        self.require_service(service_id).await?;
        let instances: Vec<_> = self
            .instances
            .read()
            .await
            .get(service_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        paginate(&instances, next_token, self.page_size)
    }

    async fn update_instance_custom_health_status(
        &self,
        service_id: &str,
        instance_id: &str,
        status: CustomHealthStatus,
    ) -> Result<()> {
        self.health_update_calls.fetch_add(1, Ordering::SeqCst);
        self.failures.take("update_instance_custom_health_status").await?;
        let svc = self
            .service(service_id)
            .await
            .ok_or_else(|| CloudError::not_found("Service", service_id))?;
        if !svc.has_custom_health_check() {
            return Err(CloudError::api_error(
                "UpdateInstanceCustomHealthStatus",
                format!("service {} has no custom health check config", service_id),
            ));
        }
        let key = (service_id.to_string(), instance_id.to_string());
        let mut health = self.health.write().await;
        let current = health
            .get_mut(&key)
            .ok_or_else(|| CloudError::not_found("Instance", instance_id))?;
        *current = status;
        debug!("Mock: instance {} in {} is {}", instance_id, service_id, status);
        Ok(())
    }
}
