//! Remote state contract for course provisioning
//!
//! `RemoteStateClient` is the only surface through which the reconcilers and
//! the commit auditor touch the platform. It exposes the minimal set of
//! operations they need, with tagged result types instead of raw responses.
//! An in-memory fake is provided for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// Result type for remote operations
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Account/organization visibility level on the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Limited,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Limited => "limited",
            Visibility::Private => "private",
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a create call.
///
/// A conflict response (the entity already exists) is data, not an error:
/// reconciliation treats it as success so re-runs stay idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

impl CreateOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created)
    }
}

/// Remote-observed course (organization) state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseState {
    pub name: String,
    pub visibility: Visibility,
}

/// Remote-observed account state.
///
/// Owned by the platform; reconcilers only read it and correct drifted
/// fields. `must_change_password` is write-only on most platforms and is
/// never read back for existing accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountState {
    pub username: String,
    pub email: String,
    pub visibility: Visibility,
    pub restricted: bool,
    pub must_change_password: bool,
    /// Last web sign-in, if the platform reports one. Epoch-zero
    /// timestamps mean the user never signed in.
    pub last_login: Option<DateTime<Utc>>,
}

/// Fields for account creation
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    pub email: String,
    pub visibility: Visibility,
    pub restricted: bool,
    pub must_change_password: bool,
}

/// Partial account update. Only set fields are sent to the remote
/// (minimal mutation: unchanged fields are never rewritten).
#[derive(Debug, Clone, Default)]
pub struct AccountPatch {
    pub visibility: Option<Visibility>,
    pub restricted: Option<bool>,
    pub password: Option<String>,
    pub must_change_password: Option<bool>,
}

impl AccountPatch {
    pub fn is_empty(&self) -> bool {
        self.visibility.is_none()
            && self.restricted.is_none()
            && self.password.is_none()
            && self.must_change_password.is_none()
    }
}

/// A team within a course, as observed on the remote
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRecord {
    pub name: String,
}

/// One commit from a repo's log (audit-time only, never persisted)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    pub author_name: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
}

/// Reference to a template repo (`owner/repo`) used for repo generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    pub owner: String,
    pub repo: String,
}

impl std::str::FromStr for TemplateRef {
    type Err = RemoteError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => Ok(TemplateRef {
                owner: owner.to_string(),
                repo: repo.to_string(),
            }),
            _ => Err(RemoteError::Decode(format!(
                "template must be 'owner/repo', got '{s}'"
            ))),
        }
    }
}

impl std::fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Remote platform operations consumed by the reconcilers and the auditor.
///
/// Guarantees expected of implementations:
/// - create calls report a conflict as `CreateOutcome::AlreadyExists`,
///   never as an error;
/// - `list_course_teams` excludes the administrative Owners team, which is
///   reachable only through `list_owners_team_members`;
/// - listing calls are read-only and issue no mutations.
#[async_trait]
pub trait RemoteStateClient: Send + Sync {
    /// Fetch a course (organization) by name, `None` if absent.
    async fn get_course(&self, course: &str) -> RemoteResult<Option<CourseState>>;

    /// Create a private course.
    async fn create_course(&self, course: &str) -> RemoteResult<CreateOutcome>;

    /// Correct a course's visibility.
    async fn set_course_visibility(
        &self,
        course: &str,
        visibility: Visibility,
    ) -> RemoteResult<()>;

    /// Fetch an account by username, `None` if absent.
    async fn get_account(&self, username: &str) -> RemoteResult<Option<AccountState>>;

    /// Create an account with the given initial settings.
    async fn create_account(&self, account: &NewAccount) -> RemoteResult<CreateOutcome>;

    /// Apply a partial update to an existing account.
    async fn update_account(&self, username: &str, patch: &AccountPatch) -> RemoteResult<()>;

    /// List a course's teams, excluding Owners.
    async fn list_course_teams(&self, course: &str) -> RemoteResult<Vec<TeamRecord>>;

    /// Create a team scoped to specific repositories with write access.
    async fn create_team(&self, course: &str, team: &str) -> RemoteResult<CreateOutcome>;

    /// List the usernames belonging to a team.
    async fn list_team_members(&self, course: &str, team: &str) -> RemoteResult<Vec<String>>;

    /// Add a user to a team. Adding an existing member is a no-op upstream.
    async fn add_team_member(&self, course: &str, team: &str, username: &str)
        -> RemoteResult<()>;

    /// Remove a user from a team.
    async fn remove_team_member(
        &self,
        course: &str,
        team: &str,
        username: &str,
    ) -> RemoteResult<()>;

    /// Create a private repo under the course, blank or from a template.
    async fn create_repo(
        &self,
        course: &str,
        repo: &str,
        template: Option<&TemplateRef>,
    ) -> RemoteResult<CreateOutcome>;

    /// Grant a team read/write access to one repo (its own).
    async fn grant_team_repo_access(
        &self,
        course: &str,
        team: &str,
        repo: &str,
    ) -> RemoteResult<()>;

    /// Names of the repos a team currently has access to.
    async fn list_team_repos(&self, course: &str, team: &str) -> RemoteResult<Vec<String>>;

    /// Full commit log of a repo. Empty repos yield an empty list.
    async fn list_repo_commits(&self, course: &str, repo: &str)
        -> RemoteResult<Vec<CommitRecord>>;

    /// Usernames of the course's Owners (administrative) team.
    async fn list_owners_team_members(&self, course: &str) -> RemoteResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn template_ref_parses_owner_and_repo() {
        let t = TemplateRef::from_str("teacher/GameTemplate").unwrap();
        assert_eq!(t.owner, "teacher");
        assert_eq!(t.repo, "GameTemplate");
        assert_eq!(t.to_string(), "teacher/GameTemplate");
    }

    #[test]
    fn template_ref_rejects_missing_slash() {
        assert!(TemplateRef::from_str("GameTemplate").is_err());
        assert!(TemplateRef::from_str("/repo").is_err());
        assert!(TemplateRef::from_str("owner/").is_err());
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(AccountPatch::default().is_empty());
        let patch = AccountPatch {
            restricted: Some(true),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
