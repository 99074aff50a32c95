use crate::cluster::ClusterClient;
use crate::error::{ControllerError, Result};
use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};
use meshward_core::{CoreError, EventRecord, ObjectKey, ResourceKind};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

const MERGE_PATCH: &str = "application/merge-patch+json";

/// HTTP client for the cluster API server
pub struct HttpClusterClient {
    base_url: String,
    client: Client,
}

impl HttpClusterClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, kind: &str, key: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ControllerError::cluster_api(format!("HTTP request failed: {}", e)))?;

        let resp = check_response(resp, "GET", kind, key).await?;
        resp.json::<T>()
            .await
            .map_err(|e| ControllerError::cluster_api(format!("Failed to parse {}: {}", kind, e)))
    }

    async fn merge_patch(&self, path: &str, patch: &Value, kind: &str, key: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        debug!("PATCH {}", url);

        let resp = self
            .client
            .patch(&url)
            .header(reqwest::header::CONTENT_TYPE, MERGE_PATCH)
            .body(patch.to_string())
            .send()
            .await
            .map_err(|e| ControllerError::cluster_api(format!("HTTP request failed: {}", e)))?;

        check_response(resp, "PATCH", kind, key).await?;
        Ok(())
    }
}

/// Map 404 to NotFound and every other failure to a cluster API error
async fn check_response(resp: Response, method: &str, kind: &str, key: &str) -> Result<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Err(CoreError::object_not_found(kind, key).into());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ControllerError::cluster_api(format!(
        "{} {} {} failed with status {}: {}",
        method, kind, key, status, body
    )))
}

fn list_items(body: Value) -> Vec<Value> {
    match body {
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[async_trait]
impl ClusterClient for HttpClusterClient {
    async fn list_objects(&self, kind: ResourceKind, namespace: Option<&str>) -> Result<Vec<Value>> {
        let path = kind.collection_path(namespace);
        let body: Value = self.get_json(&path, kind.as_str(), &path).await?;
        Ok(list_items(body))
    }

    async fn get_object(&self, kind: ResourceKind, key: &ObjectKey) -> Result<Value> {
        self.get_json(&key.api_path(kind), kind.as_str(), &key.to_string())
            .await
    }

    async fn patch_object(&self, kind: ResourceKind, key: &ObjectKey, patch: &Value) -> Result<()> {
        self.merge_patch(&key.api_path(kind), patch, kind.as_str(), &key.to_string())
            .await
    }

    async fn patch_status(&self, kind: ResourceKind, key: &ObjectKey, patch: &Value) -> Result<()> {
        let path = format!("{}/status", key.api_path(kind));
        self.merge_patch(&path, patch, kind.as_str(), &key.to_string())
            .await
    }

    async fn get_namespace(&self, name: &str) -> Result<Namespace> {
        self.get_json(&format!("/api/v1/namespaces/{}", name), "Namespace", name)
            .await
    }

    async fn list_pods(&self) -> Result<Vec<Pod>> {
        let body: Value = self.get_json("/api/v1/pods", "Pod", "pods").await?;
        let mut pods = Vec::new();
        for item in list_items(body) {
            pods.push(serde_json::from_value(item).map_err(|e| {
                ControllerError::cluster_api(format!("Failed to parse pod from list: {}", e))
            })?);
        }
        Ok(pods)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        self.get_json(
            &format!("/api/v1/namespaces/{}/pods/{}", namespace, name),
            "Pod",
            &format!("{}/{}", namespace, name),
        )
        .await
    }

    async fn get_node(&self, name: &str) -> Result<Node> {
        self.get_json(&format!("/api/v1/nodes/{}", name), "Node", name)
            .await
    }

    async fn record_event(&self, event: &EventRecord) -> Result<()> {
        let namespace = event.object.namespace.as_deref().unwrap_or("default");
        let url = format!("{}/api/v1/namespaces/{}/events", self.base_url, namespace);
        debug!("POST {}", url);

        let now = Utc::now().to_rfc3339();
        let body = json!({
            "apiVersion": "v1",
            "kind": "Event",
            "metadata": {
                "generateName": format!("{}.", event.object.name),
                "namespace": namespace,
            },
            "involvedObject": {
                "apiVersion": event.kind.api_version(),
                "kind": event.kind.as_str(),
                "name": event.object.name,
                "namespace": event.object.namespace,
                "uid": event.uid,
            },
            "type": event.event_type.as_str(),
            "reason": event.reason,
            "message": event.message,
            "firstTimestamp": now,
            "lastTimestamp": now,
            "count": 1,
            "source": { "component": "meshward" },
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ControllerError::cluster_api(format!("HTTP request failed: {}", e)))?;

        check_response(resp, "POST", "Event", &event.object.to_string()).await?;
        Ok(())
    }
}
