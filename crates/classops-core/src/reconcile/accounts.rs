//! Student account reconciliation
//!
//! For each roster entry: create the account if absent (reversed student ID
//! as the initial password, forced change on first login), or correct
//! drifted `visibility`/`restricted` settings if present. Password and
//! `must_change_password` are never re-touched on an existing account —
//! forcing a reset on every run would lock students out of their own
//! credentials.

use classops_remote::{
    AccountPatch, CreateOutcome, NewAccount, RemoteError, RemoteResult, RemoteStateClient,
    Visibility,
};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::reconcile::{EntityOutcome, ReconcileSummary};
use crate::retry::is_fatal;
use crate::roster::{Roster, RosterEntry};

/// The default password for a fresh student account: the student ID
/// reversed. `reverse(reverse(id)) == id`.
pub fn default_password(student_id: &str) -> String {
    student_id.chars().rev().collect()
}

/// Reset one student's password to the default and force a change on next
/// login. The only code path that ever rewrites a password.
pub async fn reset_password(
    remote: &dyn RemoteStateClient,
    config: &RunConfig,
    student_id: &str,
) -> RemoteResult<String> {
    let account = config
        .retry
        .run("get_account", || remote.get_account(student_id))
        .await?
        .ok_or_else(|| RemoteError::Status {
            code: 404,
            message: format!("user '{student_id}' not found"),
        })?;

    let password = default_password(student_id);
    let patch = AccountPatch {
        password: Some(password.clone()),
        must_change_password: Some(true),
        ..Default::default()
    };
    config
        .retry
        .run("update_account", || {
            remote.update_account(&account.username, &patch)
        })
        .await?;
    info!(student_id, "password reset to default");
    Ok(password)
}

/// Drives each roster student's account toward the required state
pub struct AccountReconciler<'a> {
    remote: &'a dyn RemoteStateClient,
    config: &'a RunConfig,
}

impl<'a> AccountReconciler<'a> {
    pub fn new(remote: &'a dyn RemoteStateClient, config: &'a RunConfig) -> Self {
        Self { remote, config }
    }

    /// Reconcile every roster entry on a bounded worker pool. Per-student
    /// failures land in the summary; rejected credentials abort the run.
    pub async fn reconcile(&self, roster: &Roster) -> RemoteResult<ReconcileSummary> {
        let results: Vec<(String, RemoteResult<EntityOutcome>)> =
            stream::iter(roster.entries().iter().map(|entry| async move {
                (entry.student_id.clone(), self.reconcile_entry(entry).await)
            }))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut summary = ReconcileSummary::default();
        for (student_id, result) in results {
            match result {
                Ok(outcome) => summary.record(outcome),
                Err(err) if is_fatal(&err) => return Err(err),
                Err(err) => {
                    warn!(student_id, error = %err, "account reconciliation failed");
                    summary.record_failure(student_id, err.to_string());
                }
            }
        }
        Ok(summary)
    }

    async fn reconcile_entry(&self, entry: &RosterEntry) -> RemoteResult<EntityOutcome> {
        let retry = &self.config.retry;
        let student_id = &entry.student_id;

        let existing = retry
            .run("get_account", || self.remote.get_account(student_id))
            .await?;

        match existing {
            None => {
                let account = NewAccount {
                    username: student_id.clone(),
                    password: default_password(student_id),
                    email: self.config.student_email(student_id),
                    visibility: Visibility::Limited,
                    restricted: true,
                    must_change_password: true,
                };
                let outcome = retry
                    .run("create_account", || self.remote.create_account(&account))
                    .await?;
                match outcome {
                    CreateOutcome::Created => {
                        info!(student_id, "account created");
                        Ok(EntityOutcome::Created)
                    }
                    // Appeared concurrently; the idempotency contract says
                    // this is success.
                    CreateOutcome::AlreadyExists => Ok(EntityOutcome::Unchanged),
                }
            }
            Some(state) => {
                let mut patch = AccountPatch::default();
                if state.visibility != Visibility::Limited {
                    patch.visibility = Some(Visibility::Limited);
                }
                if !state.restricted {
                    patch.restricted = Some(true);
                }
                if patch.is_empty() {
                    debug!(student_id, "account already correct");
                    return Ok(EntityOutcome::Unchanged);
                }
                retry
                    .run("update_account", || {
                        self.remote.update_account(student_id, &patch)
                    })
                    .await?;
                info!(student_id, "account settings corrected");
                Ok(EntityOutcome::Updated)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classops_remote::{AccountState, MemoryRemote};

    fn roster() -> Roster {
        Roster::parse(
            "114-2-DesignProject A1234567 Chen TeamAlpha\n\
             114-2-DesignProject B9876543 Lin TeamAlpha\n",
        )
        .unwrap()
    }

    #[test]
    fn password_is_the_reversed_student_id() {
        assert_eq!(default_password("A1234567"), "7654321A");
        // involution: reversing twice restores the ID
        assert_eq!(default_password(&default_password("A1234567")), "A1234567");
    }

    #[tokio::test]
    async fn creates_missing_accounts_with_required_settings() {
        let remote = MemoryRemote::new();
        let config = RunConfig::default();
        let reconciler = AccountReconciler::new(&remote, &config);

        let summary = reconciler.reconcile(&roster()).await.unwrap();
        assert_eq!(summary.created, 2);
        assert!(summary.is_clean());

        let stored = remote.account("A1234567").unwrap();
        assert_eq!(stored.password, "7654321A");
        assert_eq!(stored.state.visibility, Visibility::Limited);
        assert!(stored.state.restricted);
        assert!(stored.state.must_change_password);
        assert_eq!(stored.state.email, "A1234567@mail.shu.edu.tw");
    }

    #[tokio::test]
    async fn corrects_only_drifted_fields() {
        let remote = MemoryRemote::new();
        remote.seed_account(
            AccountState {
                username: "A1234567".to_string(),
                email: "A1234567@mail.shu.edu.tw".to_string(),
                visibility: Visibility::Public,
                restricted: false,
                must_change_password: false,
                last_login: None,
            },
            "chosen-by-student",
        );
        remote.seed_account(
            AccountState {
                username: "B9876543".to_string(),
                email: "B9876543@mail.shu.edu.tw".to_string(),
                visibility: Visibility::Limited,
                restricted: true,
                must_change_password: false,
                last_login: None,
            },
            "also-chosen",
        );
        let config = RunConfig::default();
        let reconciler = AccountReconciler::new(&remote, &config);

        let summary = reconciler.reconcile(&roster()).await.unwrap();
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.unchanged, 1);

        let fixed = remote.account("A1234567").unwrap();
        assert_eq!(fixed.state.visibility, Visibility::Limited);
        assert!(fixed.state.restricted);
        // password and must_change_password are never re-touched
        assert_eq!(fixed.password, "chosen-by-student");
        assert!(!fixed.state.must_change_password);
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_siblings() {
        let remote = MemoryRemote::new();
        remote.break_account("A1234567");
        let config = RunConfig {
            retry: crate::retry::RetryPolicy::new(1),
            ..Default::default()
        };
        let reconciler = AccountReconciler::new(&remote, &config);

        let summary = reconciler.reconcile(&roster()).await.unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].entity, "A1234567");
        assert!(remote.account("B9876543").is_some());
    }

    #[tokio::test]
    async fn reset_password_restores_default_and_forces_change() {
        let remote = MemoryRemote::new();
        remote.seed_account(
            AccountState {
                username: "A1234567".to_string(),
                email: "A1234567@mail.shu.edu.tw".to_string(),
                visibility: Visibility::Limited,
                restricted: true,
                must_change_password: false,
                last_login: None,
            },
            "forgotten",
        );
        let config = RunConfig::default();

        let password = reset_password(&remote, &config, "A1234567").await.unwrap();
        assert_eq!(password, "7654321A");

        let stored = remote.account("A1234567").unwrap();
        assert_eq!(stored.password, "7654321A");
        assert!(stored.state.must_change_password);
    }
}
