//! Typed condition list kept on every mesh resource's status
//!
//! A list holds at most one condition per type. Updates report whether
//! anything changed so callers can skip no-op status writes.

use crate::resources::{Condition, ConditionStatus, ConditionType, MeshResource};
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

/// Get the condition of the given type, if present
pub fn get_condition<R: MeshResource>(obj: &R, condition_type: ConditionType) -> Option<&Condition> {
    obj.conditions()
        .iter()
        .find(|c| c.type_ == condition_type)
}

/// Set a condition on `obj`, returning whether any field changed
///
/// The transition time only moves when the status itself flips; reason and
/// message edits leave it alone.
pub fn update_condition<R: MeshResource>(
    obj: &mut R,
    condition_type: ConditionType,
    status: ConditionStatus,
    reason: Option<&str>,
    message: Option<&str>,
) -> bool {
    let now = Time(Utc::now());
    let conditions = obj.conditions_mut();

    let Some(existing) = conditions.iter_mut().find(|c| c.type_ == condition_type) else {
        conditions.push(Condition {
            type_: condition_type,
            status,
            last_transition_time: Some(now),
            reason: reason.map(str::to_string),
            message: message.map(str::to_string),
        });
        return true;
    };

    let mut changed = false;
    if existing.status != status {
        existing.status = status;
        existing.last_transition_time = Some(now);
        changed = true;
    }
    if existing.reason.as_deref().unwrap_or_default() != reason.unwrap_or_default() {
        existing.reason = reason.map(str::to_string);
        changed = true;
    }
    if existing.message.as_deref().unwrap_or_default() != message.unwrap_or_default() {
        existing.message = message.map(str::to_string);
        changed = true;
    }
    changed
}
