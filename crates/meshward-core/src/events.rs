use crate::types::{ObjectKey, ResourceKind};
use serde::{Deserialize, Serialize};

/// Event reason emitted while a parent waits for its members to go away
pub const REASON_PENDING_MEMBERS_DELETION: &str = "PendingMembersDeletion";

/// Event reason for failures that need a spec fix
pub const REASON_CONFIGURATION_ERROR: &str = "ConfigurationError";

/// Event reason for failures expected to resolve on retry
pub const REASON_RECONCILE_ERROR: &str = "ReconcileError";

/// Event type, as understood by the cluster's event API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Normal => "Normal",
            EventType::Warning => "Warning",
        }
    }
}

/// A diagnostic event attached to an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Kind of the object the event is about
    pub kind: ResourceKind,
    /// Key of the object the event is about
    pub object: ObjectKey,
    /// UID of the object, when known
    pub uid: Option<String>,
    /// Normal or Warning
    pub event_type: EventType,
    /// Short machine-readable reason
    pub reason: String,
    /// Human readable message
    pub message: String,
}

impl EventRecord {
    /// Create a Warning event
    pub fn warning(
        kind: ResourceKind,
        object: ObjectKey,
        uid: Option<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            object,
            uid,
            event_type: EventType::Warning,
            reason: reason.into(),
            message: message.into(),
        }
    }
}
