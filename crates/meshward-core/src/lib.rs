//! Meshward Core - Resource model for the meshward mesh controller
//!
//! This crate provides:
//! - The six mesh-like resource kinds and their shared `MeshResource` trait
//! - Typed conditions with change detection
//! - Label selector evaluation
//! - Error types with miette diagnostics
//! - JSON value conversion helpers

pub mod conditions;
pub mod error;
pub mod events;
pub mod resources;
pub mod selector;
pub mod types;

// Re-export commonly used types
pub use conditions::{get_condition, update_condition};
pub use error::{CoreError, Result};
pub use events::{EventRecord, EventType};
pub use resources::{
    validate_base, Condition, ConditionStatus, ConditionType, GatewayRoute, Mesh, MeshReference,
    MeshResource, VirtualGateway, VirtualGatewayReference, VirtualNode, VirtualRouter,
    VirtualService,
};
pub use selector::{selector_matches, selector_matches_or_all};
pub use types::{ObjectKey, ResourceKind};

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::{Namespace, Pod};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

/// Serialize a resource to a JSON value
pub fn to_value<T: serde::Serialize>(resource: &T) -> Result<serde_json::Value> {
    serde_json::to_value(resource).map_err(|e| {
        CoreError::serialization_error(
            format!("Failed to serialize to JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a resource from a JSON value
pub fn from_value<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| {
        CoreError::serialization_error(
            format!("Failed to deserialize from JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}
