//! Request lifecycle
//!
//! ```text
//! Received ──→ Validated ──→ Dispatched ──┬──→ Completed
//!    │             │                      └──→ Failed
//!    └──→ Failed   └──→ Failed
//! ```
//!
//! `Failed` before `Dispatched` means the backend was never called.

use std::fmt;

use serde::Serialize;

use crate::error::MediatorError;

/// Phase of one mediator request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    Received,
    Validated,
    Dispatched,
    Completed,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Received => "Received",
            Phase::Validated => "Validated",
            Phase::Dispatched => "Dispatched",
            Phase::Completed => "Completed",
            Phase::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }

    pub fn can_transition_to(&self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Received, Phase::Validated)
                | (Phase::Received, Phase::Failed)
                | (Phase::Validated, Phase::Dispatched)
                | (Phase::Validated, Phase::Failed)
                | (Phase::Dispatched, Phase::Completed)
                | (Phase::Dispatched, Phase::Failed)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracks and logs the phase of one request.
#[derive(Debug)]
pub struct Lifecycle {
    entity: String,
    operation: String,
    phase: Phase,
    history: Vec<Phase>,
}

impl Lifecycle {
    pub fn new(entity: impl Into<String>, operation: impl Into<String>) -> Self {
        let lifecycle = Self {
            entity: entity.into(),
            operation: operation.into(),
            phase: Phase::Received,
            history: vec![Phase::Received],
        };
        tracing::debug!(
            entity = %lifecycle.entity,
            operation = %lifecycle.operation,
            phase = %Phase::Received,
            "Request received"
        );
        lifecycle
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Phases visited so far, in order
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    /// Move to `next`. An illegal transition is an internal error.
    pub fn advance(&mut self, next: Phase) -> Result<(), MediatorError> {
        if !self.phase.can_transition_to(next) {
            return Err(MediatorError::Internal {
                reason: format!("illegal phase transition {} -> {}", self.phase, next),
            });
        }
        tracing::debug!(
            entity = %self.entity,
            operation = %self.operation,
            from = %self.phase,
            to = %next,
            "Phase transition"
        );
        self.phase = next;
        self.history.push(next);
        Ok(())
    }

    /// Record a failure and hand the error back. A request already in a
    /// terminal phase keeps its phase.
    pub fn fail(&mut self, err: MediatorError) -> MediatorError {
        tracing::warn!(
            entity = %self.entity,
            operation = %self.operation,
            phase = %self.phase,
            kind = err.kind(),
            error = %err,
            "Request failed"
        );
        if !self.phase.is_terminal() {
            self.phase = Phase::Failed;
            self.history.push(Phase::Failed);
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_transitions() {
        assert!(Phase::Received.can_transition_to(Phase::Validated));
        assert!(Phase::Validated.can_transition_to(Phase::Failed));
        assert!(!Phase::Received.can_transition_to(Phase::Dispatched));
        assert!(!Phase::Completed.can_transition_to(Phase::Failed));
        assert!(!Phase::Failed.can_transition_to(Phase::Completed));
    }

    #[test]
    fn test_lifecycle_history() {
        let mut lifecycle = Lifecycle::new("Config", "create");
        lifecycle.advance(Phase::Validated).unwrap();
        lifecycle.advance(Phase::Dispatched).unwrap();
        lifecycle.advance(Phase::Completed).unwrap();
        assert_eq!(
            lifecycle.history(),
            &[Phase::Received, Phase::Validated, Phase::Dispatched, Phase::Completed]
        );
        assert_matches!(
            lifecycle.advance(Phase::Dispatched),
            Err(MediatorError::Internal { .. })
        );
    }

    #[test]
    fn test_fail_before_dispatch() {
        let mut lifecycle = Lifecycle::new("Config", "update");
        let err = lifecycle.fail(MediatorError::Cancelled);
        assert_eq!(err, MediatorError::Cancelled);
        assert_eq!(lifecycle.phase(), Phase::Failed);
        assert!(!lifecycle.history().contains(&Phase::Dispatched));
    }
}
