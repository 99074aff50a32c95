//! Meshward Cloud - Remote control-plane clients for the meshward controller
//!
//! This crate provides:
//! - `ResourceApi`, the per-kind CRUD surface of the mesh API
//! - `CloudMapApi`, the paginated service-discovery surface
//! - Token-bucket throttling per operation class with bounded call deadlines
//! - In-memory backends that stand in for the managed services

pub mod appmesh;
pub mod cloudmap;
pub mod error;
pub mod mock;
pub mod throttle;
pub mod types;

// Re-export commonly used types
pub use appmesh::{ResourceApi, ThrottledResourceApi};
pub use cloudmap::{CloudMapApi, ThrottledCloudMap};
pub use error::{CloudError, Result};
pub use mock::{InMemoryCloudMap, InMemoryResourceApi};
pub use throttle::{CallTimeouts, Throttler};
pub use types::{CustomHealthStatus, RemoteId, RemoteResource, RemoteSpec, StatusCode};
