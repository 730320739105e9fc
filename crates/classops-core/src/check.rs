//! Read-only roster verification
//!
//! `check` support: verify, without mutating anything, that remote state
//! matches what the roster declares — per student: the account exists with
//! the required settings, they are in their declared team and no other, and
//! the team's repo access is exactly its own same-named repo. This is the
//! inspection counterpart of a sync run: findings here are what the
//! reconcilers would correct.

use std::collections::{BTreeMap, BTreeSet};

use classops_remote::{RemoteResult, RemoteStateClient, Visibility};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::reconcile::EntityFailure;
use crate::retry::is_fatal;
use crate::roster::Roster;

/// Everything wrong with one student's remote state
#[derive(Debug, Clone, Serialize)]
pub struct StudentCheck {
    pub student_id: String,
    pub problems: Vec<String>,
}

/// Outcome of a read-only verification pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    pub course: String,
    /// Students whose remote state matches the roster
    pub ok: Vec<String>,
    /// Students with at least one mismatch
    pub issues: Vec<StudentCheck>,
    /// Students whose lookups failed; their state is unknown, not wrong
    pub failures: Vec<EntityFailure>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && self.failures.is_empty()
    }
}

/// Verify every roster student against remote state. Issues no mutations.
pub async fn check_roster(
    remote: &dyn RemoteStateClient,
    config: &RunConfig,
    roster: &Roster,
) -> RemoteResult<CheckReport> {
    let course = roster.course();
    let retry = &config.retry;
    let mut report = CheckReport {
        course: course.to_string(),
        ..Default::default()
    };

    // One snapshot of the course's teams, memberships, and repo grants
    let team_names: BTreeSet<String> = retry
        .run("list_course_teams", || remote.list_course_teams(course))
        .await?
        .into_iter()
        .map(|t| t.name)
        .collect();
    let mut memberships: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for team in &team_names {
        let members = retry
            .run("list_team_members", || {
                remote.list_team_members(course, team)
            })
            .await?;
        memberships.insert(team.clone(), members.into_iter().collect());
    }
    let declared_teams = roster.team_names();
    let mut team_repos: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for team in declared_teams.intersection(&team_names) {
        let repos = retry
            .run("list_team_repos", || remote.list_team_repos(course, team))
            .await?;
        team_repos.insert(team.clone(), repos);
    }

    for entry in roster.entries() {
        let student_id = &entry.student_id;
        let account = match retry
            .run("get_account", || remote.get_account(student_id))
            .await
        {
            Ok(account) => account,
            Err(err) if is_fatal(&err) => return Err(err),
            Err(err) => {
                warn!(student_id, error = %err, "account lookup failed");
                report.failures.push(EntityFailure {
                    entity: student_id.clone(),
                    reason: err.to_string(),
                });
                continue;
            }
        };

        let mut problems = Vec::new();
        match account {
            None => problems.push("account does not exist".to_string()),
            Some(state) => {
                if state.visibility != Visibility::Limited {
                    problems.push(format!(
                        "visibility is '{}', expected 'limited'",
                        state.visibility
                    ));
                }
                if !state.restricted {
                    problems.push("account is not restricted".to_string());
                }
                if let Some(team) = &entry.team {
                    check_memberships(team, student_id, &memberships, &mut problems);
                    check_team_repo(team, &team_names, &team_repos, &mut problems);
                }
            }
        }

        if problems.is_empty() {
            report.ok.push(student_id.clone());
        } else {
            report.issues.push(StudentCheck {
                student_id: student_id.clone(),
                problems,
            });
        }
    }

    info!(
        course,
        ok = report.ok.len(),
        issues = report.issues.len(),
        failed = report.failures.len(),
        "roster check complete"
    );
    Ok(report)
}

/// In the declared team, and in no other team of the course.
fn check_memberships(
    team: &str,
    student_id: &str,
    memberships: &BTreeMap<String, BTreeSet<String>>,
    problems: &mut Vec<String>,
) {
    match memberships.get(team) {
        None => problems.push(format!("team '{team}' does not exist")),
        Some(members) if !members.contains(student_id) => {
            problems.push(format!("not in team '{team}'"))
        }
        Some(_) => {}
    }
    for (other, members) in memberships {
        if other != team && members.contains(student_id) {
            problems.push(format!("also in team '{other}'"));
        }
    }
}

/// The team's repo access is exactly its own same-named repo.
fn check_team_repo(
    team: &str,
    team_names: &BTreeSet<String>,
    team_repos: &BTreeMap<String, Vec<String>>,
    problems: &mut Vec<String>,
) {
    if !team_names.contains(team) {
        // already reported as a missing team
        return;
    }
    let repos = team_repos.get(team).map(Vec::as_slice).unwrap_or_default();
    if !repos.iter().any(|r| r == team) {
        problems.push(format!("team has no repo '{team}'"));
    }
    for repo in repos {
        if repo != team {
            problems.push(format!("team has unexpected repo '{repo}'"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classops_remote::{AccountState, MemoryRemote};

    const COURSE: &str = "114-2-DesignProject";

    fn compliant_account(username: &str) -> AccountState {
        AccountState {
            username: username.to_string(),
            email: format!("{username}@mail.shu.edu.tw"),
            visibility: Visibility::Limited,
            restricted: true,
            must_change_password: false,
            last_login: None,
        }
    }

    fn roster() -> Roster {
        Roster::parse(
            "114-2-DesignProject A1234567 Chen TeamAlpha\n\
             114-2-DesignProject B9876543 Lin TeamAlpha\n",
        )
        .unwrap()
    }

    fn seed_compliant(remote: &MemoryRemote) {
        remote.seed_account(compliant_account("A1234567"), "pw");
        remote.seed_account(compliant_account("B9876543"), "pw");
        remote.seed_team(COURSE, "TeamAlpha", &["A1234567", "B9876543"]);
        remote.seed_repo(COURSE, "TeamAlpha");
    }

    #[tokio::test]
    async fn compliant_state_checks_clean_without_mutations() {
        let remote = MemoryRemote::new();
        seed_compliant(&remote);
        // grant is seeded through the trait so the fake records it
        remote
            .grant_team_repo_access(COURSE, "TeamAlpha", "TeamAlpha")
            .await
            .unwrap();
        let before = remote.mutation_count();
        let config = RunConfig::default();

        let report = check_roster(&remote, &config, &roster()).await.unwrap();
        assert!(report.is_clean(), "issues: {:?}", report.issues);
        assert_eq!(report.ok.len(), 2);
        assert_eq!(remote.mutation_count(), before);
    }

    #[tokio::test]
    async fn missing_account_and_drifted_settings_are_reported() {
        let remote = MemoryRemote::new();
        remote.seed_account(
            AccountState {
                visibility: Visibility::Public,
                restricted: false,
                ..compliant_account("A1234567")
            },
            "pw",
        );
        remote.seed_team(COURSE, "TeamAlpha", &["A1234567"]);
        remote.seed_repo(COURSE, "TeamAlpha");
        remote
            .grant_team_repo_access(COURSE, "TeamAlpha", "TeamAlpha")
            .await
            .unwrap();
        let config = RunConfig::default();

        let report = check_roster(&remote, &config, &roster()).await.unwrap();
        assert_eq!(report.issues.len(), 2);

        let chen = &report.issues[0];
        assert_eq!(chen.student_id, "A1234567");
        assert!(chen.problems.iter().any(|p| p.contains("visibility")));
        assert!(chen.problems.iter().any(|p| p.contains("not restricted")));

        let lin = &report.issues[1];
        assert_eq!(lin.problems, vec!["account does not exist".to_string()]);
    }

    #[tokio::test]
    async fn wrong_and_extra_team_memberships_are_reported() {
        let remote = MemoryRemote::new();
        remote.seed_account(compliant_account("A1234567"), "pw");
        remote.seed_account(compliant_account("B9876543"), "pw");
        // Chen sits in the wrong team, Lin in two teams at once
        remote.seed_team(COURSE, "TeamAlpha", &["B9876543"]);
        remote.seed_team(COURSE, "TeamBeta", &["A1234567", "B9876543"]);
        remote.seed_repo(COURSE, "TeamAlpha");
        remote
            .grant_team_repo_access(COURSE, "TeamAlpha", "TeamAlpha")
            .await
            .unwrap();
        let config = RunConfig::default();

        let report = check_roster(&remote, &config, &roster()).await.unwrap();
        assert_eq!(report.issues.len(), 2);
        assert!(report.issues[0]
            .problems
            .iter()
            .any(|p| p.contains("not in team 'TeamAlpha'")));
        assert!(report.issues[1]
            .problems
            .iter()
            .any(|p| p.contains("also in team 'TeamBeta'")));
    }

    #[tokio::test]
    async fn missing_repo_grant_is_reported() {
        let remote = MemoryRemote::new();
        seed_compliant(&remote);
        // repo exists but was never granted to the team
        let config = RunConfig::default();

        let report = check_roster(&remote, &config, &roster()).await.unwrap();
        assert!(report.issues[0]
            .problems
            .iter()
            .any(|p| p.contains("no repo 'TeamAlpha'")));
    }

    #[tokio::test]
    async fn one_failed_lookup_does_not_abort_the_check() {
        let remote = MemoryRemote::new();
        seed_compliant(&remote);
        remote
            .grant_team_repo_access(COURSE, "TeamAlpha", "TeamAlpha")
            .await
            .unwrap();
        remote.break_account("A1234567");
        let config = RunConfig {
            retry: crate::retry::RetryPolicy::new(1),
            ..Default::default()
        };

        let report = check_roster(&remote, &config, &roster()).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].entity, "A1234567");
        assert_eq!(report.ok, vec!["B9876543"]);
    }
}
