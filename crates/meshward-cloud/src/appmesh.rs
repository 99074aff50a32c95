use crate::error::Result;
use crate::throttle::{throttled_call, CallTimeouts, Throttler, SERVICE_APPMESH};
use crate::types::{RemoteId, RemoteResource, RemoteSpec};
use async_trait::async_trait;
use std::sync::Arc;

/// CRUD surface of the mesh API for one resource kind
///
/// Every operation reports a missing resource as `CloudError::NotFound`,
/// distinct from every other failure.
#[async_trait]
pub trait ResourceApi<S: RemoteSpec>: Send + Sync {
    async fn describe(&self, id: &RemoteId) -> Result<RemoteResource<S>>;

    async fn create(&self, id: &RemoteId, spec: &S) -> Result<RemoteResource<S>>;

    async fn update(&self, id: &RemoteId, spec: &S) -> Result<RemoteResource<S>>;

    async fn delete(&self, id: &RemoteId) -> Result<()>;
}

/// Wraps a `ResourceApi` with per-operation throttling and call deadlines
///
/// Operation names are `{Verb}{Kind}`, for example `DescribeVirtualNode`,
/// so throttle rules written against the remote API's operation names apply.
pub struct ThrottledResourceApi<S: RemoteSpec> {
    inner: Arc<dyn ResourceApi<S>>,
    throttler: Throttler,
    timeouts: CallTimeouts,
}

impl<S: RemoteSpec> ThrottledResourceApi<S> {
    pub fn new(inner: Arc<dyn ResourceApi<S>>, throttler: Throttler, timeouts: CallTimeouts) -> Self {
        Self {
            inner,
            throttler,
            timeouts,
        }
    }

    fn operation(verb: &str) -> String {
        format!("{}{}", verb, S::KIND.as_str())
    }
}

#[async_trait]
impl<S: RemoteSpec> ResourceApi<S> for ThrottledResourceApi<S> {
    async fn describe(&self, id: &RemoteId) -> Result<RemoteResource<S>> {
        let operation = Self::operation("Describe");
        throttled_call(
            &self.throttler,
            SERVICE_APPMESH,
            &operation,
            self.timeouts.read,
            self.inner.describe(id),
        )
        .await
    }

    async fn create(&self, id: &RemoteId, spec: &S) -> Result<RemoteResource<S>> {
        let operation = Self::operation("Create");
        throttled_call(
            &self.throttler,
            SERVICE_APPMESH,
            &operation,
            self.timeouts.write,
            self.inner.create(id, spec),
        )
        .await
    }

    async fn update(&self, id: &RemoteId, spec: &S) -> Result<RemoteResource<S>> {
        let operation = Self::operation("Update");
        throttled_call(
            &self.throttler,
            SERVICE_APPMESH,
            &operation,
            self.timeouts.write,
            self.inner.update(id, spec),
        )
        .await
    }

    async fn delete(&self, id: &RemoteId) -> Result<()> {
        let operation = Self::operation("Delete");
        throttled_call(
            &self.throttler,
            SERVICE_APPMESH,
            &operation,
            self.timeouts.write,
            self.inner.delete(id),
        )
        .await
    }
}
