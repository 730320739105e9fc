//! Team membership reconciliation
//!
//! Two-phase, per course: first ensure every team the roster references
//! exists (creation serialized under a per-course lock, duplicate creates
//! absorbed as success), then drive each declared student toward exactly
//! one membership by computing the full desired state and removing extras.
//! The platform is never trusted to enforce the one-team invariant itself.
//!
//! Roster rows without a team are unmanaged: whatever memberships those
//! students already have are left untouched.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use classops_remote::{CreateOutcome, RemoteResult, RemoteStateClient};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::reconcile::{EntityOutcome, ReconcileSummary};
use crate::retry::is_fatal;
use crate::roster::Roster;

/// Async locks keyed by course name, serializing team creation so that
/// concurrent runs over the same course cannot race duplicate creates.
#[derive(Debug, Default)]
pub struct CourseLocks {
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CourseLocks {
    fn for_course(&self, course: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks.entry(course.to_string()).or_default().clone()
    }
}

/// Enforces the one-team-per-course invariant from the roster
pub struct TeamReconciler<'a> {
    remote: &'a dyn RemoteStateClient,
    config: &'a RunConfig,
    locks: Arc<CourseLocks>,
}

impl<'a> TeamReconciler<'a> {
    pub fn new(remote: &'a dyn RemoteStateClient, config: &'a RunConfig) -> Self {
        Self {
            remote,
            config,
            locks: Arc::new(CourseLocks::default()),
        }
    }

    /// Share a lock registry across reconcilers running concurrently.
    pub fn with_locks(mut self, locks: Arc<CourseLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub async fn reconcile(&self, roster: &Roster) -> RemoteResult<ReconcileSummary> {
        let mut summary = ReconcileSummary::default();
        let desired = roster.teams();
        if desired.is_empty() {
            return Ok(summary);
        }

        let course = roster.course();
        let retry = &self.config.retry;

        let existing: BTreeSet<String> = retry
            .run("list_course_teams", || self.remote.list_course_teams(course))
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect();

        // Phase 1: ensure referenced teams exist. Single creator per
        // course; a conflict means someone else won the race, which is
        // equally fine.
        let mut failed_teams: BTreeSet<String> = BTreeSet::new();
        let lock = self.locks.for_course(course);
        for team in desired.keys() {
            if existing.contains(team) {
                continue;
            }
            let _guard = lock.lock().await;
            match retry
                .run("create_team", || self.remote.create_team(course, team))
                .await
            {
                Ok(CreateOutcome::Created) => {
                    info!(course, team, "team created");
                    summary.record(EntityOutcome::Created);
                }
                Ok(CreateOutcome::AlreadyExists) => {}
                Err(err) if is_fatal(&err) => return Err(err),
                Err(err) => {
                    warn!(course, team, error = %err, "team creation failed");
                    summary.record_failure(format!("team {team}"), err.to_string());
                    failed_teams.insert(team.clone());
                }
            }
        }

        // Snapshot current membership across every managed team in the
        // course, including teams the roster no longer references —
        // a moved student must be removed from those too.
        let mut current: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for team in &existing {
            let members = retry
                .run("list_team_members", || {
                    self.remote.list_team_members(course, team)
                })
                .await?;
            current.insert(team.clone(), members.into_iter().collect());
        }
        for team in desired.keys() {
            if !existing.contains(team) && !failed_teams.contains(team) {
                // freshly created above, necessarily empty
                current.insert(team.clone(), BTreeSet::new());
            }
        }

        // Phase 2: per-student corrections against the snapshot
        for (team, members) in &desired {
            if failed_teams.contains(team) {
                continue;
            }
            for student_id in members {
                match self
                    .reconcile_member(course, team, student_id, &current)
                    .await
                {
                    Ok(outcome) => summary.record(outcome),
                    Err(err) if is_fatal(&err) => return Err(err),
                    Err(err) => {
                        warn!(course, student_id, error = %err, "membership reconciliation failed");
                        summary.record_failure(student_id.clone(), err.to_string());
                    }
                }
            }
        }

        Ok(summary)
    }

    async fn reconcile_member(
        &self,
        course: &str,
        team: &str,
        student_id: &str,
        current: &BTreeMap<String, BTreeSet<String>>,
    ) -> RemoteResult<EntityOutcome> {
        let retry = &self.config.retry;
        let mut touched = false;

        for (other, members) in current {
            if other == team || !members.contains(student_id) {
                continue;
            }
            retry
                .run("remove_team_member", || {
                    self.remote.remove_team_member(course, other, student_id)
                })
                .await?;
            info!(
                course,
                student_id,
                wrong_team = other.as_str(),
                "removed from wrong team"
            );
            touched = true;
        }

        let already_member = current.get(team).is_some_and(|m| m.contains(student_id));
        if !already_member {
            retry
                .run("add_team_member", || {
                    self.remote.add_team_member(course, team, student_id)
                })
                .await?;
            info!(course, team, student_id, "added to team");
            touched = true;
        }

        Ok(if touched {
            EntityOutcome::Updated
        } else {
            EntityOutcome::Unchanged
        })
    }
}
