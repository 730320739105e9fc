//! Team repository provisioning
//!
//! One private repo per roster team, named after the team, created blank or
//! generated from a template, with the team granted write access. The
//! team's current repo access is read first: when the grant is already in
//! place nothing is sent, so an unchanged re-run issues no mutations.
//! Repo contents after creation belong to the students and are never
//! touched again.

use classops_remote::{RemoteResult, RemoteStateClient, TemplateRef};
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::reconcile::{EntityOutcome, ReconcileSummary};
use crate::retry::is_fatal;
use crate::roster::Roster;

/// Creates each roster team's repo and wires up its access
pub struct RepoProvisioner<'a> {
    remote: &'a dyn RemoteStateClient,
    config: &'a RunConfig,
    template: Option<TemplateRef>,
}

impl<'a> RepoProvisioner<'a> {
    pub fn new(remote: &'a dyn RemoteStateClient, config: &'a RunConfig) -> Self {
        Self {
            remote,
            config,
            template: None,
        }
    }

    /// Generate new repos from `owner/repo` instead of creating them blank.
    pub fn with_template(mut self, template: TemplateRef) -> Self {
        self.template = Some(template);
        self
    }

    pub async fn provision(&self, roster: &Roster) -> RemoteResult<ReconcileSummary> {
        let mut summary = ReconcileSummary::default();
        let course = roster.course();

        for team in roster.team_names() {
            match self.provision_team(course, &team).await {
                Ok(outcome) => summary.record(outcome),
                Err(err) if is_fatal(&err) => return Err(err),
                Err(err) => {
                    warn!(course, team, error = %err, "repo provisioning failed");
                    summary.record_failure(format!("repo {team}"), err.to_string());
                }
            }
        }
        Ok(summary)
    }

    async fn provision_team(&self, course: &str, team: &str) -> RemoteResult<EntityOutcome> {
        let retry = &self.config.retry;
        // repo name matches the team name
        let repo = team;

        let granted = retry
            .run("list_team_repos", || {
                self.remote.list_team_repos(course, team)
            })
            .await?;
        if granted.iter().any(|name| name == repo) {
            return Ok(EntityOutcome::Unchanged);
        }

        let created = retry
            .run("create_repo", || {
                self.remote.create_repo(course, repo, self.template.as_ref())
            })
            .await?
            .is_created();

        retry
            .run("grant_team_repo_access", || {
                self.remote.grant_team_repo_access(course, team, repo)
            })
            .await?;

        if created {
            info!(course, team, template = ?self.template.as_ref().map(|t| t.to_string()), "repo created");
            Ok(EntityOutcome::Created)
        } else {
            info!(course, team, "repo access restored");
            Ok(EntityOutcome::Updated)
        }
    }
}
