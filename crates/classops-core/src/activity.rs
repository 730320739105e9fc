//! Sign-in activity reporting
//!
//! `check-login` support: for every roster student, read the account's last
//! recorded web sign-in and bucket them into never-signed-in, active, or
//! account-missing. Platforms report "never" either as an absent field or
//! as an epoch-zero placeholder timestamp, so both are treated the same.
//! A student whose lookup fails (after retries) lands in `failures` and
//! does not stop the report.

use chrono::{DateTime, Utc};
use classops_remote::{RemoteResult, RemoteStateClient};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::reconcile::EntityFailure;
use crate::retry::is_fatal;
use crate::roster::Roster;

/// True when the platform has no real sign-in recorded for this value.
pub fn never_signed_in(last_login: Option<DateTime<Utc>>) -> bool {
    match last_login {
        None => true,
        // 0001-01-01 and 1970-01-01 placeholders both land at or below zero
        Some(t) => t.timestamp() <= 0,
    }
}

/// Roster students grouped by sign-in status
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoginReport {
    /// Students whose account has never been signed into
    pub never: Vec<String>,
    /// Students with at least one recorded sign-in
    pub active: Vec<String>,
    /// Students with no account on the platform at all
    pub missing: Vec<String>,
    /// Students whose lookup failed; the rest of the report still stands
    pub failures: Vec<EntityFailure>,
}

impl LoginReport {
    pub fn all_signed_in(&self) -> bool {
        self.never.is_empty() && self.missing.is_empty() && self.failures.is_empty()
    }
}

/// Check every roster student's sign-in status on a bounded worker pool.
pub async fn login_report(
    remote: &dyn RemoteStateClient,
    config: &RunConfig,
    roster: &Roster,
) -> RemoteResult<LoginReport> {
    let retry = &config.retry;
    let results: Vec<(String, RemoteResult<Option<Option<DateTime<Utc>>>>)> =
        stream::iter(roster.entries().iter().map(|entry| async move {
            let student_id = entry.student_id.clone();
            let result = retry
                .run("get_account", || remote.get_account(&student_id))
                .await
                .map(|account| account.map(|a| a.last_login));
            (entry.student_id.clone(), result)
        }))
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

    let mut report = LoginReport::default();
    for (student_id, result) in results {
        match result {
            Ok(None) => report.missing.push(student_id),
            Ok(Some(last_login)) if never_signed_in(last_login) => {
                report.never.push(student_id)
            }
            Ok(Some(_)) => report.active.push(student_id),
            Err(err) if is_fatal(&err) => return Err(err),
            Err(err) => {
                warn!(student_id, error = %err, "login lookup failed");
                report.failures.push(EntityFailure {
                    entity: student_id,
                    reason: err.to_string(),
                });
            }
        }
    }
    report.never.sort();
    report.active.sort();
    report.missing.sort();
    report.failures.sort_by(|a, b| a.entity.cmp(&b.entity));

    info!(
        never = report.never.len(),
        active = report.active.len(),
        missing = report.missing.len(),
        failed = report.failures.len(),
        "login report built"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use classops_remote::{AccountState, MemoryRemote, Visibility};

    fn seeded_account(username: &str, last_login: Option<DateTime<Utc>>) -> AccountState {
        AccountState {
            username: username.to_string(),
            email: format!("{username}@mail.shu.edu.tw"),
            visibility: Visibility::Limited,
            restricted: true,
            must_change_password: false,
            last_login,
        }
    }

    #[test]
    fn epoch_placeholders_mean_never() {
        assert!(never_signed_in(None));
        assert!(never_signed_in(DateTime::from_timestamp(0, 0)));
        // 0001-01-01 is far below the epoch
        assert!(never_signed_in(
            "0001-01-01T00:00:00Z".parse::<DateTime<Utc>>().ok()
        ));
        assert!(!never_signed_in(DateTime::from_timestamp(1_700_000_000, 0)));
    }

    #[tokio::test]
    async fn buckets_students_by_sign_in_status() {
        let remote = MemoryRemote::new();
        remote.seed_account(
            seeded_account("A1234567", DateTime::from_timestamp(1_700_000_000, 0)),
            "pw",
        );
        remote.seed_account(seeded_account("B9876543", None), "pw");
        let config = RunConfig::default();
        let roster = Roster::parse(
            "114-2-DesignProject A1234567 Chen TeamAlpha\n\
             114-2-DesignProject B9876543 Lin TeamAlpha\n\
             114-2-DesignProject C5555555 Wang TeamBeta\n",
        )
        .unwrap();

        let report = login_report(&remote, &config, &roster).await.unwrap();
        assert_eq!(report.active, vec!["A1234567"]);
        assert_eq!(report.never, vec!["B9876543"]);
        assert_eq!(report.missing, vec!["C5555555"]);
        assert!(!report.all_signed_in());
    }

    #[tokio::test]
    async fn one_broken_lookup_does_not_abort_the_report() {
        let remote = MemoryRemote::new();
        remote.break_account("A1234567");
        remote.seed_account(
            seeded_account("B9876543", DateTime::from_timestamp(1_700_000_000, 0)),
            "pw",
        );
        let config = RunConfig {
            retry: crate::retry::RetryPolicy::new(1),
            ..Default::default()
        };
        let roster = Roster::parse(
            "114-2-DesignProject A1234567 Chen TeamAlpha\n\
             114-2-DesignProject B9876543 Lin TeamAlpha\n",
        )
        .unwrap();

        let report = login_report(&remote, &config, &roster).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].entity, "A1234567");
        // the healthy sibling is still reported
        assert_eq!(report.active, vec!["B9876543"]);
        assert!(!report.all_signed_in());
    }
}
