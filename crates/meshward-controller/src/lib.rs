// Allow unused assignments for diagnostic fields - they're used by the thiserror/miette macros
#![allow(unused_assignments)]

pub mod api_client;
pub mod cloudmap;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod convert;
pub mod error;
pub mod finalizers;
pub mod kinds;
pub mod members_finalizer;
pub mod membership;
pub mod mock;
pub mod outcome;
pub mod references;
pub mod resource_manager;

// Re-export primary types
pub use error::{ControllerError, Result};
pub use mock::MockCluster;
pub use outcome::ReconcileOutcome;

// Re-export cluster access
pub use api_client::HttpClusterClient;
pub use cluster::ClusterClient;

// Re-export configuration
pub use config::{normalize_account_id, CloudMapConfig, ControllerConfig, RemoteConfig};

// Re-export controller and reconciler types
pub use cloudmap::{CloudMapInstanceReconciler, CloudMapResourceManager, ServiceLocator};
pub use controller::{MeshController, RemoteBackends};
pub use finalizers::FinalizerManager;
pub use members_finalizer::{MeshMembersFinalizer, VirtualGatewayMembersFinalizer};
pub use membership::{MeshMembershipDesignator, VirtualGatewayMembershipDesignator};
pub use references::ReferenceResolver;
pub use resource_manager::{AppMeshResourceManager, Desired, ManagedKind};
