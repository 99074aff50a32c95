use std::time::Duration;

/// Successful result of one reconcile or cleanup step
///
/// Failures travel as `Err`; this type carries the non-error signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Object and remote state agree
    Done,
    /// A dependency is not ready yet; try again on the next pass
    Requeue,
    /// Not wrong, just not yet; try again after the delay
    RetryAfter(Duration),
}

impl ReconcileOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, ReconcileOutcome::Done)
    }

    /// Combine two steps of one object: the first non-Done outcome wins
    pub fn and(self, next: ReconcileOutcome) -> ReconcileOutcome {
        match self {
            ReconcileOutcome::Done => next,
            other => other,
        }
    }
}
