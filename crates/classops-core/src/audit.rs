//! Commit-authorship audit
//!
//! Walks every team repo in a course (or one team when filtered), pulls the
//! full commit log, and classifies each commit author as a roster student,
//! an administrator, or unknown. The point is to tell which teams have
//! produced real student work: repos generated from a template start with
//! instructor commits, and those must not count.
//!
//! Author identity resolution, in order:
//! 1. a commit whose author *name* equals the course name is the template
//!    generator writing as the organization — always an administrator;
//! 2. the author email resolves to a username via a platform account email
//!    (`{username}@{domain}`) or, failing that, the alias file (students
//!    commit with personal git identities); a resolved member of the repo's
//!    own team is a student, a resolved course owner is an administrator;
//! 3. the author email is in the configured admin email list;
//! 4. otherwise the author is unknown and reported once per email.

use std::collections::{BTreeMap, BTreeSet};

use classops_remote::{RemoteError, RemoteStateClient};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::alias::AliasMap;
use crate::config::RunConfig;
use crate::reconcile::EntityFailure;
use crate::retry::is_fatal;
use crate::roster::Roster;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("team '{team}' does not appear in the roster")]
    UnknownTeam { team: String },

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Where a team stands on the work-has-started question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatus {
    /// The repo has no commits at all
    NoCommits,
    /// Only administrators (or the template) have committed
    AdminOnly,
    /// At least one commit is attributable to a roster student
    HasStudentCommit,
}

/// Audit result for one team's repo
#[derive(Debug, Clone, Serialize)]
pub struct TeamAudit {
    pub team: String,
    pub repo: String,
    pub total_commits: usize,
    pub student_commits: usize,
    pub status: TeamStatus,
}

/// A commit author nobody could account for
#[derive(Debug, Clone, Serialize)]
pub struct UnknownAuthor {
    pub email: String,
    pub name: String,
}

/// Full audit output for a course
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub course: String,
    pub teams: Vec<TeamAudit>,
    pub unknown_authors: Vec<UnknownAuthor>,
    pub failures: Vec<EntityFailure>,
}

impl AuditReport {
    /// True when every team has at least one student commit and no repo
    /// failed to answer.
    pub fn all_teams_started(&self) -> bool {
        self.failures.is_empty()
            && self
                .teams
                .iter()
                .all(|t| t.status == TeamStatus::HasStudentCommit)
    }
}

enum AuthorKind {
    Student,
    Admin,
    Unknown,
}

/// Classifies commit authors across a course's team repos
pub struct CommitAuditor<'a> {
    remote: &'a dyn RemoteStateClient,
    config: &'a RunConfig,
    aliases: AliasMap,
}

impl<'a> CommitAuditor<'a> {
    pub fn new(remote: &'a dyn RemoteStateClient, config: &'a RunConfig, aliases: AliasMap) -> Self {
        Self {
            remote,
            config,
            aliases,
        }
    }

    /// Audit every team in the roster, or just `team_filter` when given.
    pub async fn audit(
        &self,
        roster: &Roster,
        team_filter: Option<&str>,
    ) -> Result<AuditReport, AuditError> {
        let course = roster.course();
        let retry = &self.config.retry;

        let team_names = roster.team_names();
        let selected: Vec<String> = match team_filter {
            Some(team) => {
                if !team_names.contains(team) {
                    return Err(AuditError::UnknownTeam {
                        team: team.to_string(),
                    });
                }
                vec![team.to_string()]
            }
            None => team_names.into_iter().collect(),
        };

        let owners: BTreeSet<String> = retry
            .run("list_owners_team_members", || {
                self.remote.list_owners_team_members(course)
            })
            .await
            .map_err(AuditError::Remote)?
            .into_iter()
            .map(|u| u.to_lowercase())
            .collect();

        let students: BTreeSet<String> = roster
            .entries()
            .iter()
            .map(|e| e.student_id.to_lowercase())
            .collect();

        // declared team -> lowercased member IDs; a commit only counts as
        // student work when its author belongs to the repo's own team
        let memberships: BTreeMap<String, BTreeSet<String>> = roster
            .teams()
            .into_iter()
            .map(|(team, members)| {
                (
                    team,
                    members.into_iter().map(|m| m.to_lowercase()).collect(),
                )
            })
            .collect();

        // platform email -> lowercased username, for students and owners
        let mut account_emails: BTreeMap<String, String> = BTreeMap::new();
        for username in students.iter().chain(owners.iter()) {
            account_emails.insert(
                self.config.student_email(username).to_lowercase(),
                username.clone(),
            );
        }

        let mut admin_emails = self.config.admin_emails.clone();
        for owner in &owners {
            admin_emails.insert(self.config.student_email(owner).to_lowercase());
        }

        let mut teams = Vec::new();
        let mut unknown: BTreeMap<String, UnknownAuthor> = BTreeMap::new();
        let mut failures = Vec::new();

        for team in selected {
            let repo = team.clone();
            let commits = match retry
                .run("list_repo_commits", || {
                    self.remote.list_repo_commits(course, &repo)
                })
                .await
            {
                Ok(commits) => commits,
                Err(err) if is_fatal(&err) => return Err(AuditError::Remote(err)),
                Err(err) => {
                    warn!(course, team, error = %err, "commit listing failed");
                    failures.push(EntityFailure {
                        entity: format!("repo {repo}"),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let empty = BTreeSet::new();
            let team_members = memberships.get(&team).unwrap_or(&empty);
            let total = commits.len();
            let mut student_commits = 0usize;
            for commit in &commits {
                match self.classify(course, &commit.author_name, &commit.author_email, team_members, &owners, &account_emails, &admin_emails) {
                    AuthorKind::Student => student_commits += 1,
                    AuthorKind::Admin => {}
                    AuthorKind::Unknown => {
                        let email = commit.author_email.to_lowercase();
                        unknown.entry(email.clone()).or_insert_with(|| UnknownAuthor {
                            email,
                            name: commit.author_name.clone(),
                        });
                    }
                }
            }

            let status = if total == 0 {
                TeamStatus::NoCommits
            } else if student_commits == 0 {
                TeamStatus::AdminOnly
            } else {
                TeamStatus::HasStudentCommit
            };
            debug!(course, team, total, student_commits, ?status, "team audited");
            teams.push(TeamAudit {
                team,
                repo,
                total_commits: total,
                student_commits,
                status,
            });
        }

        info!(
            course,
            teams = teams.len(),
            unknown_authors = unknown.len(),
            "audit complete"
        );
        Ok(AuditReport {
            course: course.to_string(),
            teams,
            unknown_authors: unknown.into_values().collect(),
            failures,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn classify(
        &self,
        course: &str,
        author_name: &str,
        author_email: &str,
        team_members: &BTreeSet<String>,
        owners: &BTreeSet<String>,
        account_emails: &BTreeMap<String, String>,
        admin_emails: &BTreeSet<String>,
    ) -> AuthorKind {
        // template generation commits carry the organization as author
        if author_name == course {
            return AuthorKind::Admin;
        }

        let email = author_email.to_lowercase();

        // platform account email first, then the alias table
        let resolved = account_emails
            .get(&email)
            .map(String::as_str)
            .or_else(|| self.aliases.resolve(&email));

        if let Some(username) = resolved {
            if team_members.contains(username) {
                return AuthorKind::Student;
            }
            if owners.contains(username) {
                return AuthorKind::Admin;
            }
        }

        if admin_emails.contains(&email) {
            return AuthorKind::Admin;
        }

        AuthorKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classops_remote::MemoryRemote;

    const COURSE: &str = "114-2-DesignProject";

    fn roster() -> Roster {
        Roster::parse(
            "114-2-DesignProject A1234567 Chen TeamAlpha\n\
             114-2-DesignProject B9876543 Lin TeamBeta\n",
        )
        .unwrap()
    }

    fn auditor_config() -> RunConfig {
        RunConfig::default()
    }

    #[tokio::test]
    async fn platform_email_commits_count_as_student_work() {
        let remote = MemoryRemote::new();
        remote.seed_repo(COURSE, "TeamAlpha");
        remote.seed_repo(COURSE, "TeamBeta");
        remote.seed_commit(COURSE, "TeamAlpha", "Chen", "A1234567@mail.shu.edu.tw");
        let config = auditor_config();

        let report = CommitAuditor::new(&remote, &config, AliasMap::default())
            .audit(&roster(), None)
            .await
            .unwrap();

        let alpha = report.teams.iter().find(|t| t.team == "TeamAlpha").unwrap();
        assert_eq!(alpha.status, TeamStatus::HasStudentCommit);
        assert_eq!(alpha.student_commits, 1);

        let beta = report.teams.iter().find(|t| t.team == "TeamBeta").unwrap();
        assert_eq!(beta.status, TeamStatus::NoCommits);
    }

    #[tokio::test]
    async fn alias_maps_personal_email_to_student() {
        let remote = MemoryRemote::new();
        remote.seed_repo(COURSE, "TeamAlpha");
        remote.seed_repo(COURSE, "TeamBeta");
        remote.seed_commit(COURSE, "TeamAlpha", "chen", "Chen.Personal@Gmail.com");
        let config = auditor_config();
        let aliases = AliasMap::parse("chen.personal@gmail.com A1234567\n").unwrap();

        let report = CommitAuditor::new(&remote, &config, aliases)
            .audit(&roster(), None)
            .await
            .unwrap();

        let alpha = report.teams.iter().find(|t| t.team == "TeamAlpha").unwrap();
        assert_eq!(alpha.status, TeamStatus::HasStudentCommit);
        assert!(report.unknown_authors.is_empty());
    }

    #[tokio::test]
    async fn template_and_owner_commits_are_admin_only() {
        let remote = MemoryRemote::new();
        remote.seed_owners(COURSE, &["teacher1"]);
        remote.seed_repo(COURSE, "TeamAlpha");
        remote.seed_repo(COURSE, "TeamBeta");
        // template generation commit authored as the organization
        remote.seed_commit(COURSE, "TeamAlpha", COURSE, "noreply@example.org");
        // instructor commit through their platform account email
        remote.seed_commit(COURSE, "TeamAlpha", "teacher1", "teacher1@mail.shu.edu.tw");
        let config = auditor_config();

        let report = CommitAuditor::new(&remote, &config, AliasMap::default())
            .audit(&roster(), None)
            .await
            .unwrap();

        let alpha = report.teams.iter().find(|t| t.team == "TeamAlpha").unwrap();
        assert_eq!(alpha.status, TeamStatus::AdminOnly);
        assert_eq!(alpha.total_commits, 2);
        assert_eq!(alpha.student_commits, 0);
        assert!(report.unknown_authors.is_empty());
        assert!(!report.all_teams_started());
    }

    #[tokio::test]
    async fn commits_from_another_teams_student_do_not_count() {
        let remote = MemoryRemote::new();
        remote.seed_repo(COURSE, "TeamAlpha");
        remote.seed_repo(COURSE, "TeamBeta");
        // Lin is enrolled, but in TeamBeta — their commit proves nothing
        // about TeamAlpha's progress
        remote.seed_commit(COURSE, "TeamAlpha", "Lin", "B9876543@mail.shu.edu.tw");
        let config = auditor_config();

        let report = CommitAuditor::new(&remote, &config, AliasMap::default())
            .audit(&roster(), None)
            .await
            .unwrap();

        let alpha = report.teams.iter().find(|t| t.team == "TeamAlpha").unwrap();
        assert_eq!(alpha.student_commits, 0);
        assert_eq!(report.unknown_authors.len(), 1);
    }

    #[tokio::test]
    async fn unknown_authors_are_deduplicated_by_email() {
        let remote = MemoryRemote::new();
        remote.seed_repo(COURSE, "TeamAlpha");
        remote.seed_repo(COURSE, "TeamBeta");
        remote.seed_commit(COURSE, "TeamAlpha", "Mystery", "who@example.org");
        remote.seed_commit(COURSE, "TeamAlpha", "Mystery", "WHO@example.org");
        remote.seed_commit(COURSE, "TeamBeta", "Mystery", "who@example.org");
        let config = auditor_config();

        let report = CommitAuditor::new(&remote, &config, AliasMap::default())
            .audit(&roster(), None)
            .await
            .unwrap();

        assert_eq!(report.unknown_authors.len(), 1);
        assert_eq!(report.unknown_authors[0].email, "who@example.org");
    }

    #[tokio::test]
    async fn report_is_identical_across_repeated_runs() {
        let remote = MemoryRemote::new();
        remote.seed_repo(COURSE, "TeamAlpha");
        remote.seed_repo(COURSE, "TeamBeta");
        remote.seed_commit(COURSE, "TeamAlpha", "Chen", "A1234567@mail.shu.edu.tw");
        remote.seed_commit(COURSE, "TeamBeta", "Mystery", "who@example.org");
        let config = auditor_config();
        let auditor = CommitAuditor::new(&remote, &config, AliasMap::default());

        let first = auditor.audit(&roster(), None).await.unwrap();
        let second = auditor.audit(&roster(), None).await.unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn team_filter_rejects_names_outside_the_roster() {
        let remote = MemoryRemote::new();
        let config = auditor_config();

        let err = CommitAuditor::new(&remote, &config, AliasMap::default())
            .audit(&roster(), Some("TeamOmega"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::UnknownTeam { .. }));
    }

    #[tokio::test]
    async fn configured_admin_emails_do_not_count_as_students() {
        let remote = MemoryRemote::new();
        remote.seed_repo(COURSE, "TeamAlpha");
        remote.seed_repo(COURSE, "TeamBeta");
        remote.seed_commit(COURSE, "TeamAlpha", "TA", "ta@staff.example.edu");
        let mut config = auditor_config();
        config.admin_emails.insert("ta@staff.example.edu".to_string());

        let report = CommitAuditor::new(&remote, &config, AliasMap::default())
            .audit(&roster(), Some("TeamAlpha"))
            .await
            .unwrap();

        assert_eq!(report.teams.len(), 1);
        assert_eq!(report.teams[0].status, TeamStatus::AdminOnly);
        assert!(report.unknown_authors.is_empty());
    }
}
