//! Gitea API backend
//!
//! Implements `RemoteStateClient` against the Gitea v1 REST API using
//! basic-auth admin credentials. Listing endpoints are paged with
//! `page`/`limit=50`; conflict responses on create endpoints are folded
//! into `CreateOutcome::AlreadyExists`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::debug;

use crate::client::{
    AccountPatch, AccountState, CommitRecord, CourseState, CreateOutcome, NewAccount,
    RemoteResult, RemoteStateClient, TeamRecord, TemplateRef, Visibility,
};
use crate::error::RemoteError;

const PAGE_LIMIT: u32 = 50;
const OWNERS_TEAM: &str = "Owners";

/// Gitea connection settings
#[derive(Debug, Clone)]
pub struct GiteaConfig {
    /// Base URL of the Gitea instance (no trailing `/api/v1`)
    pub base_url: String,
    /// Admin username used for basic auth
    pub admin_user: String,
    /// Admin password or token
    pub admin_pass: String,
}

impl GiteaConfig {
    /// Read settings from `GITEA_URL`, `GITEA_ADMIN_USER`, `GITEA_ADMIN_PASS`.
    pub fn from_env() -> Self {
        GiteaConfig {
            base_url: std::env::var("GITEA_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            admin_user: std::env::var("GITEA_ADMIN_USER").unwrap_or_default(),
            admin_pass: std::env::var("GITEA_ADMIN_PASS").unwrap_or_default(),
        }
    }
}

/// `RemoteStateClient` backed by the Gitea v1 API
pub struct GiteaClient {
    config: GiteaConfig,
    http: reqwest::Client,
    // Gitea addresses team members/repos by numeric team id, not by name.
    // Resolved ids are cached per (course, team) for the life of the client.
    team_ids: Mutex<HashMap<(String, String), i64>>,
}

#[derive(Debug, Deserialize)]
struct GiteaOrg {
    username: String,
    visibility: Visibility,
}

#[derive(Debug, Deserialize)]
struct GiteaUser {
    login: String,
    #[serde(default)]
    email: String,
    visibility: Visibility,
    #[serde(default)]
    restricted: bool,
    #[serde(default)]
    source_id: i64,
    #[serde(default)]
    last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GiteaTeam {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct GiteaCommit {
    commit: GiteaCommitMeta,
}

#[derive(Debug, Deserialize)]
struct GiteaCommitMeta {
    author: GiteaCommitAuthor,
}

#[derive(Debug, Deserialize)]
struct GiteaCommitAuthor {
    name: String,
    email: String,
    date: DateTime<Utc>,
}

fn status_error(code: u16, message: String) -> RemoteError {
    match code {
        401 | 403 => RemoteError::Authorization(message),
        _ => RemoteError::Status { code, message },
    }
}

impl GiteaClient {
    pub fn new(config: GiteaConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("classops/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        GiteaClient {
            config,
            http,
            team_ids: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(GiteaConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.basic_auth(&self.config.admin_user, Some(&self.config.admin_pass))
    }

    /// GET a single resource; 404 maps to `None`.
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> RemoteResult<Option<T>> {
        let resp = self.authed(self.http.get(self.url(path))).send().await?;
        let code = resp.status().as_u16();
        match code {
            200 => Ok(Some(resp.json::<T>().await?)),
            404 => Ok(None),
            _ => Err(status_error(code, resp.text().await.unwrap_or_default())),
        }
    }

    /// GET a paged listing, accumulating until an empty page.
    async fn get_paged<T: DeserializeOwned>(&self, path: &str) -> RemoteResult<Vec<T>> {
        let mut items = Vec::new();
        let mut page: u32 = 1;
        loop {
            let resp = self
                .authed(self.http.get(self.url(path)))
                .query(&[("page", page.to_string()), ("limit", PAGE_LIMIT.to_string())])
                .send()
                .await?;
            let code = resp.status().as_u16();
            if code != 200 {
                return Err(status_error(code, resp.text().await.unwrap_or_default()));
            }
            let batch: Vec<T> = resp.json().await?;
            if batch.is_empty() {
                return Ok(items);
            }
            items.extend(batch);
            page += 1;
        }
    }

    /// POST a create payload, folding conflicts into `AlreadyExists`.
    async fn post_create(&self, path: &str, body: serde_json::Value) -> RemoteResult<CreateOutcome> {
        let resp = self
            .authed(self.http.post(self.url(path)))
            .json(&body)
            .send()
            .await?;
        let code = resp.status().as_u16();
        match code {
            200 | 201 => Ok(CreateOutcome::Created),
            409 => Ok(CreateOutcome::AlreadyExists),
            422 => {
                // Gitea reports duplicate entities as 422 with a message
                // rather than a clean 409.
                let message = resp.text().await.unwrap_or_default();
                if message.contains("already exists") {
                    Ok(CreateOutcome::AlreadyExists)
                } else {
                    Err(RemoteError::Status { code, message })
                }
            }
            _ => Err(status_error(code, resp.text().await.unwrap_or_default())),
        }
    }

    /// Expect a 200/204 from a mutating request.
    async fn expect_ok(&self, req: reqwest::RequestBuilder) -> RemoteResult<()> {
        let resp = self.authed(req).send().await?;
        let code = resp.status().as_u16();
        match code {
            200 | 204 => Ok(()),
            _ => Err(status_error(code, resp.text().await.unwrap_or_default())),
        }
    }

    /// Resolve a team name to its numeric id, paging through the course's
    /// teams (Owners included) and caching the result.
    async fn team_id(&self, course: &str, team: &str) -> RemoteResult<i64> {
        let key = (course.to_string(), team.to_string());
        {
            let cache = self.team_ids.lock().await;
            if let Some(id) = cache.get(&key) {
                return Ok(*id);
            }
        }

        let teams: Vec<GiteaTeam> = self.get_paged(&format!("/orgs/{course}/teams")).await?;
        let mut cache = self.team_ids.lock().await;
        let mut found = None;
        for t in teams {
            if t.name == team {
                found = Some(t.id);
            }
            cache.insert((course.to_string(), t.name), t.id);
        }
        found.ok_or_else(|| RemoteError::Status {
            code: 404,
            message: format!("team '{team}' not found in course '{course}'"),
        })
    }
}

#[async_trait]
impl RemoteStateClient for GiteaClient {
    async fn get_course(&self, course: &str) -> RemoteResult<Option<CourseState>> {
        let org: Option<GiteaOrg> = self.get_optional(&format!("/orgs/{course}")).await?;
        Ok(org.map(|o| CourseState {
            name: o.username,
            visibility: o.visibility,
        }))
    }

    async fn create_course(&self, course: &str) -> RemoteResult<CreateOutcome> {
        self.post_create(
            "/orgs",
            json!({ "username": course, "visibility": Visibility::Private.as_str() }),
        )
        .await
    }

    async fn set_course_visibility(
        &self,
        course: &str,
        visibility: Visibility,
    ) -> RemoteResult<()> {
        self.expect_ok(
            self.http
                .patch(self.url(&format!("/orgs/{course}")))
                .json(&json!({ "visibility": visibility.as_str() })),
        )
        .await
    }

    async fn get_account(&self, username: &str) -> RemoteResult<Option<AccountState>> {
        let user: Option<GiteaUser> = self.get_optional(&format!("/users/{username}")).await?;
        Ok(user.map(|u| AccountState {
            username: u.login,
            email: u.email,
            visibility: u.visibility,
            restricted: u.restricted,
            // Not exposed by the user endpoint; never read back for
            // existing accounts.
            must_change_password: false,
            last_login: u.last_login,
        }))
    }

    async fn create_account(&self, account: &NewAccount) -> RemoteResult<CreateOutcome> {
        self.post_create(
            "/admin/users",
            json!({
                "username": account.username,
                "password": account.password,
                "email": account.email,
                "must_change_password": account.must_change_password,
                "visibility": account.visibility.as_str(),
                "restricted": account.restricted,
            }),
        )
        .await
    }

    async fn update_account(&self, username: &str, patch: &AccountPatch) -> RemoteResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        // The admin edit endpoint requires login_name and source_id even
        // for unrelated field updates.
        let user: GiteaUser = self
            .get_optional(&format!("/users/{username}"))
            .await?
            .ok_or_else(|| RemoteError::Status {
                code: 404,
                message: format!("user '{username}' not found"),
            })?;

        let mut body = json!({
            "login_name": username,
            "source_id": user.source_id,
        });
        if let Some(v) = patch.visibility {
            body["visibility"] = json!(v.as_str());
        }
        if let Some(r) = patch.restricted {
            body["restricted"] = json!(r);
        }
        if let Some(ref p) = patch.password {
            body["password"] = json!(p);
        }
        if let Some(m) = patch.must_change_password {
            body["must_change_password"] = json!(m);
        }

        debug!(username, "patching account");
        self.expect_ok(
            self.http
                .patch(self.url(&format!("/admin/users/{username}")))
                .json(&body),
        )
        .await
    }

    async fn list_course_teams(&self, course: &str) -> RemoteResult<Vec<TeamRecord>> {
        let teams: Vec<GiteaTeam> = self.get_paged(&format!("/orgs/{course}/teams")).await?;
        let mut cache = self.team_ids.lock().await;
        let mut records = Vec::new();
        for t in teams {
            cache.insert((course.to_string(), t.name.clone()), t.id);
            if t.name != OWNERS_TEAM {
                records.push(TeamRecord { name: t.name });
            }
        }
        Ok(records)
    }

    async fn create_team(&self, course: &str, team: &str) -> RemoteResult<CreateOutcome> {
        let outcome = self
            .post_create(
                &format!("/orgs/{course}/teams"),
                json!({
                    "name": team,
                    "permission": "write",
                    "includes_all_repositories": false,
                    "units": ["repo.code", "repo.issues", "repo.pulls"],
                }),
            )
            .await?;
        if outcome.is_created() {
            // Invalidate: the fresh id will be resolved on first use.
            self.team_ids
                .lock()
                .await
                .remove(&(course.to_string(), team.to_string()));
        }
        Ok(outcome)
    }

    async fn list_team_members(&self, course: &str, team: &str) -> RemoteResult<Vec<String>> {
        #[derive(Deserialize)]
        struct Member {
            login: String,
        }
        let id = self.team_id(course, team).await?;
        let members: Vec<Member> = self.get_paged(&format!("/teams/{id}/members")).await?;
        Ok(members.into_iter().map(|m| m.login).collect())
    }

    async fn add_team_member(
        &self,
        course: &str,
        team: &str,
        username: &str,
    ) -> RemoteResult<()> {
        let id = self.team_id(course, team).await?;
        self.expect_ok(self.http.put(self.url(&format!("/teams/{id}/members/{username}"))))
            .await
    }

    async fn remove_team_member(
        &self,
        course: &str,
        team: &str,
        username: &str,
    ) -> RemoteResult<()> {
        let id = self.team_id(course, team).await?;
        self.expect_ok(
            self.http
                .delete(self.url(&format!("/teams/{id}/members/{username}"))),
        )
        .await
    }

    async fn create_repo(
        &self,
        course: &str,
        repo: &str,
        template: Option<&TemplateRef>,
    ) -> RemoteResult<CreateOutcome> {
        match template {
            Some(t) => {
                self.post_create(
                    &format!("/repos/{}/{}/generate", t.owner, t.repo),
                    json!({
                        "owner": course,
                        "name": repo,
                        "private": true,
                        "git_content": true,
                        "topics": true,
                        "labels": true,
                    }),
                )
                .await
            }
            None => {
                self.post_create(
                    &format!("/orgs/{course}/repos"),
                    json!({ "name": repo, "private": true, "auto_init": true }),
                )
                .await
            }
        }
    }

    async fn grant_team_repo_access(
        &self,
        course: &str,
        team: &str,
        repo: &str,
    ) -> RemoteResult<()> {
        let id = self.team_id(course, team).await?;
        self.expect_ok(
            self.http
                .put(self.url(&format!("/teams/{id}/repos/{course}/{repo}"))),
        )
        .await
    }

    async fn list_team_repos(&self, course: &str, team: &str) -> RemoteResult<Vec<String>> {
        #[derive(Deserialize)]
        struct Repo {
            name: String,
        }
        let id = self.team_id(course, team).await?;
        let repos: Vec<Repo> = self.get_paged(&format!("/teams/{id}/repos")).await?;
        Ok(repos.into_iter().map(|r| r.name).collect())
    }

    async fn list_repo_commits(
        &self,
        course: &str,
        repo: &str,
    ) -> RemoteResult<Vec<CommitRecord>> {
        let mut commits = Vec::new();
        let mut page: u32 = 1;
        loop {
            let resp = self
                .authed(self.http.get(self.url(&format!("/repos/{course}/{repo}/commits"))))
                .query(&[("page", page.to_string()), ("limit", PAGE_LIMIT.to_string())])
                .send()
                .await?;
            let code = resp.status().as_u16();
            // Gitea answers 409 for a repo with no commits yet.
            if code == 409 {
                return Ok(Vec::new());
            }
            if code != 200 {
                return Err(status_error(code, resp.text().await.unwrap_or_default()));
            }
            let batch: Vec<GiteaCommit> = resp.json().await?;
            if batch.is_empty() {
                return Ok(commits);
            }
            commits.extend(batch.into_iter().map(|c| CommitRecord {
                author_name: c.commit.author.name,
                author_email: c.commit.author.email,
                timestamp: c.commit.author.date,
            }));
            page += 1;
        }
    }

    async fn list_owners_team_members(&self, course: &str) -> RemoteResult<Vec<String>> {
        self.list_team_members(course, OWNERS_TEAM).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_join_strips_trailing_slash() {
        let client = GiteaClient::new(GiteaConfig {
            base_url: "http://localhost:3000/".to_string(),
            admin_user: "admin".to_string(),
            admin_pass: "secret".to_string(),
        });
        assert_eq!(
            client.url("/orgs/114-2-DesignProject"),
            "http://localhost:3000/api/v1/orgs/114-2-DesignProject"
        );
    }

    #[test]
    fn auth_errors_are_terminal() {
        assert!(matches!(
            status_error(401, "unauthorized".into()),
            RemoteError::Authorization(_)
        ));
        assert!(matches!(
            status_error(500, "oops".into()),
            RemoteError::Status { code: 500, .. }
        ));
    }
}
