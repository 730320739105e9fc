//! In-memory fake for the remote state contract (testing only)
//!
//! `MemoryRemote` models a whole platform instance behind `Mutex`-guarded
//! maps and counts every mutating call it receives, so reconciliation tests
//! can assert idempotence ("a second run issues zero mutating calls")
//! without any network.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{
    AccountPatch, AccountState, CommitRecord, CourseState, CreateOutcome, NewAccount,
    RemoteResult, RemoteStateClient, TeamRecord, TemplateRef, Visibility,
};
use crate::error::RemoteError;

const OWNERS_TEAM: &str = "Owners";

/// A stored account, including write-only fields the real platform
/// would not echo back.
#[derive(Debug, Clone)]
pub struct StoredAccount {
    pub state: AccountState,
    pub password: String,
}

/// A stored repo and the teams granted access to it
#[derive(Debug, Clone, Default)]
pub struct StoredRepo {
    pub private: bool,
    pub template: Option<String>,
    pub teams: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct PlatformState {
    courses: HashMap<String, CourseState>,
    accounts: HashMap<String, StoredAccount>,
    // course -> team -> members (Owners kept separately)
    teams: HashMap<String, BTreeMap<String, BTreeSet<String>>>,
    owners: HashMap<String, BTreeSet<String>>,
    // course -> repo name -> repo
    repos: HashMap<String, BTreeMap<String, StoredRepo>>,
    commits: HashMap<(String, String), Vec<CommitRecord>>,
    // usernames whose account operations answer HTTP 500
    broken_accounts: HashSet<String>,
}

/// In-memory `RemoteStateClient` with seeding, introspection, and fault
/// injection hooks.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<PlatformState>,
    mutations: AtomicU64,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating calls received so far (creates, updates,
    /// membership edits, access grants), regardless of outcome.
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    fn record_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    // --- seeding -----------------------------------------------------

    pub fn seed_course(&self, name: &str, visibility: Visibility) {
        let mut state = self.state.lock().unwrap();
        state.courses.insert(
            name.to_string(),
            CourseState {
                name: name.to_string(),
                visibility,
            },
        );
    }

    pub fn seed_account(&self, account: AccountState, password: &str) {
        let mut state = self.state.lock().unwrap();
        state.accounts.insert(
            account.username.clone(),
            StoredAccount {
                state: account,
                password: password.to_string(),
            },
        );
    }

    pub fn seed_team(&self, course: &str, team: &str, members: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state
            .teams
            .entry(course.to_string())
            .or_default()
            .insert(
                team.to_string(),
                members.iter().map(|m| m.to_string()).collect(),
            );
    }

    pub fn seed_owners(&self, course: &str, members: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.owners.insert(
            course.to_string(),
            members.iter().map(|m| m.to_string()).collect(),
        );
    }

    pub fn seed_repo(&self, course: &str, repo: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .repos
            .entry(course.to_string())
            .or_default()
            .insert(
                repo.to_string(),
                StoredRepo {
                    private: true,
                    ..Default::default()
                },
            );
    }

    pub fn seed_commit(&self, course: &str, repo: &str, name: &str, email: &str) {
        let mut state = self.state.lock().unwrap();
        let log = state
            .commits
            .entry((course.to_string(), repo.to_string()))
            .or_default();
        let seq = log.len() as i64;
        log.push(CommitRecord {
            author_name: name.to_string(),
            author_email: email.to_string(),
            timestamp: chrono::DateTime::from_timestamp(1_700_000_000 + seq * 60, 0)
                .unwrap_or_default(),
        });
    }

    /// Make every account operation for `username` answer HTTP 500.
    pub fn break_account(&self, username: &str) {
        let mut state = self.state.lock().unwrap();
        state.broken_accounts.insert(username.to_string());
    }

    // --- introspection -----------------------------------------------

    pub fn account(&self, username: &str) -> Option<StoredAccount> {
        self.state.lock().unwrap().accounts.get(username).cloned()
    }

    pub fn team_members(&self, course: &str, team: &str) -> BTreeSet<String> {
        self.state
            .lock()
            .unwrap()
            .teams
            .get(course)
            .and_then(|teams| teams.get(team))
            .cloned()
            .unwrap_or_default()
    }

    pub fn repo(&self, course: &str, repo: &str) -> Option<StoredRepo> {
        self.state
            .lock()
            .unwrap()
            .repos
            .get(course)
            .and_then(|repos| repos.get(repo))
            .cloned()
    }

    fn check_account_fault(state: &PlatformState, username: &str) -> RemoteResult<()> {
        if state.broken_accounts.contains(username) {
            return Err(RemoteError::Status {
                code: 500,
                message: format!("injected fault for '{username}'"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStateClient for MemoryRemote {
    async fn get_course(&self, course: &str) -> RemoteResult<Option<CourseState>> {
        Ok(self.state.lock().unwrap().courses.get(course).cloned())
    }

    async fn create_course(&self, course: &str) -> RemoteResult<CreateOutcome> {
        self.record_mutation();
        let mut state = self.state.lock().unwrap();
        if state.courses.contains_key(course) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        state.courses.insert(
            course.to_string(),
            CourseState {
                name: course.to_string(),
                visibility: Visibility::Private,
            },
        );
        Ok(CreateOutcome::Created)
    }

    async fn set_course_visibility(
        &self,
        course: &str,
        visibility: Visibility,
    ) -> RemoteResult<()> {
        self.record_mutation();
        let mut state = self.state.lock().unwrap();
        let entry = state.courses.get_mut(course).ok_or(RemoteError::Status {
            code: 404,
            message: format!("course '{course}' not found"),
        })?;
        entry.visibility = visibility;
        Ok(())
    }

    async fn get_account(&self, username: &str) -> RemoteResult<Option<AccountState>> {
        let state = self.state.lock().unwrap();
        Self::check_account_fault(&state, username)?;
        Ok(state.accounts.get(username).map(|a| a.state.clone()))
    }

    async fn create_account(&self, account: &NewAccount) -> RemoteResult<CreateOutcome> {
        self.record_mutation();
        let mut state = self.state.lock().unwrap();
        Self::check_account_fault(&state, &account.username)?;
        if state.accounts.contains_key(&account.username) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        state.accounts.insert(
            account.username.clone(),
            StoredAccount {
                state: AccountState {
                    username: account.username.clone(),
                    email: account.email.clone(),
                    visibility: account.visibility,
                    restricted: account.restricted,
                    must_change_password: account.must_change_password,
                    last_login: None,
                },
                password: account.password.clone(),
            },
        );
        Ok(CreateOutcome::Created)
    }

    async fn update_account(&self, username: &str, patch: &AccountPatch) -> RemoteResult<()> {
        self.record_mutation();
        let mut state = self.state.lock().unwrap();
        Self::check_account_fault(&state, username)?;
        let account = state.accounts.get_mut(username).ok_or(RemoteError::Status {
            code: 404,
            message: format!("user '{username}' not found"),
        })?;
        if let Some(v) = patch.visibility {
            account.state.visibility = v;
        }
        if let Some(r) = patch.restricted {
            account.state.restricted = r;
        }
        if let Some(ref p) = patch.password {
            account.password = p.clone();
        }
        if let Some(m) = patch.must_change_password {
            account.state.must_change_password = m;
        }
        Ok(())
    }

    async fn list_course_teams(&self, course: &str) -> RemoteResult<Vec<TeamRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .teams
            .get(course)
            .map(|teams| {
                teams
                    .keys()
                    .filter(|name| name.as_str() != OWNERS_TEAM)
                    .map(|name| TeamRecord { name: name.clone() })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_team(&self, course: &str, team: &str) -> RemoteResult<CreateOutcome> {
        self.record_mutation();
        let mut state = self.state.lock().unwrap();
        let teams = state.teams.entry(course.to_string()).or_default();
        if teams.contains_key(team) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        teams.insert(team.to_string(), BTreeSet::new());
        Ok(CreateOutcome::Created)
    }

    async fn list_team_members(&self, course: &str, team: &str) -> RemoteResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        state
            .teams
            .get(course)
            .and_then(|teams| teams.get(team))
            .map(|members| members.iter().cloned().collect())
            .ok_or(RemoteError::Status {
                code: 404,
                message: format!("team '{team}' not found in course '{course}'"),
            })
    }

    async fn add_team_member(
        &self,
        course: &str,
        team: &str,
        username: &str,
    ) -> RemoteResult<()> {
        self.record_mutation();
        let mut state = self.state.lock().unwrap();
        let members = state
            .teams
            .get_mut(course)
            .and_then(|teams| teams.get_mut(team))
            .ok_or(RemoteError::Status {
                code: 404,
                message: format!("team '{team}' not found in course '{course}'"),
            })?;
        members.insert(username.to_string());
        Ok(())
    }

    async fn remove_team_member(
        &self,
        course: &str,
        team: &str,
        username: &str,
    ) -> RemoteResult<()> {
        self.record_mutation();
        let mut state = self.state.lock().unwrap();
        let members = state
            .teams
            .get_mut(course)
            .and_then(|teams| teams.get_mut(team))
            .ok_or(RemoteError::Status {
                code: 404,
                message: format!("team '{team}' not found in course '{course}'"),
            })?;
        members.remove(username);
        Ok(())
    }

    async fn create_repo(
        &self,
        course: &str,
        repo: &str,
        template: Option<&TemplateRef>,
    ) -> RemoteResult<CreateOutcome> {
        self.record_mutation();
        let mut state = self.state.lock().unwrap();
        let repos = state.repos.entry(course.to_string()).or_default();
        if repos.contains_key(repo) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        repos.insert(
            repo.to_string(),
            StoredRepo {
                private: true,
                template: template.map(|t| t.to_string()),
                teams: BTreeSet::new(),
            },
        );
        Ok(CreateOutcome::Created)
    }

    async fn grant_team_repo_access(
        &self,
        course: &str,
        team: &str,
        repo: &str,
    ) -> RemoteResult<()> {
        self.record_mutation();
        let mut state = self.state.lock().unwrap();
        let stored = state
            .repos
            .get_mut(course)
            .and_then(|repos| repos.get_mut(repo))
            .ok_or(RemoteError::Status {
                code: 404,
                message: format!("repo '{course}/{repo}' not found"),
            })?;
        stored.teams.insert(team.to_string());
        Ok(())
    }

    async fn list_team_repos(&self, course: &str, team: &str) -> RemoteResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .repos
            .get(course)
            .map(|repos| {
                repos
                    .iter()
                    .filter(|(_, stored)| stored.teams.contains(team))
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_repo_commits(
        &self,
        course: &str,
        repo: &str,
    ) -> RemoteResult<Vec<CommitRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .commits
            .get(&(course.to_string(), repo.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_owners_team_members(&self, course: &str) -> RemoteResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .owners
            .get(course)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }
}
