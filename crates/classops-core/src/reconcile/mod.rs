//! Roster reconciliation
//!
//! Each reconciler diffs the roster's declared state against a fresh read of
//! remote state and applies the minimal set of corrections. All of them are
//! idempotent: re-running against an unchanged roster issues zero mutating
//! calls. Failures are isolated per entity (per student for accounts, per
//! team for membership/repos) and collected into a summary; only rejected
//! credentials abort a run.

pub mod accounts;
pub mod course;
pub mod repos;
pub mod teams;

pub use accounts::{default_password, reset_password, AccountReconciler};
pub use course::{ensure_course, CourseOutcome};
pub use repos::RepoProvisioner;
pub use teams::TeamReconciler;

use serde::Serialize;

/// What happened to a single entity during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityOutcome {
    Created,
    Updated,
    Unchanged,
}

/// A per-entity failure that did not abort the run
#[derive(Debug, Clone, Serialize)]
pub struct EntityFailure {
    pub entity: String,
    pub reason: String,
}

/// Per-entity result counts for one reconciliation pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failures: Vec<EntityFailure>,
}

impl ReconcileSummary {
    pub(crate) fn record(&mut self, outcome: EntityOutcome) {
        match outcome {
            EntityOutcome::Created => self.created += 1,
            EntityOutcome::Updated => self.updated += 1,
            EntityOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub(crate) fn record_failure(&mut self, entity: impl Into<String>, reason: impl Into<String>) {
        self.failures.push(EntityFailure {
            entity: entity.into(),
            reason: reason.into(),
        });
    }

    /// True when every entity reconciled without failure.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// True when the pass issued no mutations at all.
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.failures.is_empty()
    }
}

impl std::fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "created: {}, updated: {}, unchanged: {}, failed: {}",
            self.created,
            self.updated,
            self.unchanged,
            self.failures.len()
        )
    }
}
