//! classops - course provisioning and commit audit for self-hosted Gitea
//!
//! ## Commands
//!
//! - `create-course`: create the course organization (private)
//! - `sync`: reconcile accounts, teams, and team repos from a roster file
//! - `check`: verify remote state against the roster without mutating it
//! - `audit`: classify commit authors per team repo
//! - `check-login`: report which students have never signed in
//! - `reset-password`: restore one student's default password
//!
//! Connection settings come from the environment (`GITEA_URL`,
//! `GITEA_ADMIN_USER`, `GITEA_ADMIN_PASS`), with a `.env` file honored
//! when present.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use classops_core::{
    check_roster, ensure_course, login_report, reset_password, AccountReconciler, AliasMap,
    AuditReport, CheckReport, CommitAuditor, CourseOutcome, LoginReport, RepoProvisioner, Roster,
    RunConfig, TeamReconciler, TeamStatus,
};
use classops_remote::{GiteaClient, RemoteStateClient, TemplateRef, Visibility};

#[derive(Parser)]
#[command(name = "classops")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Course provisioning and commit audit for self-hosted Gitea", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON (log lines and command output)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the course organization (private) if it does not exist
    CreateCourse {
        /// Course name, e.g. 114-2-DesignProject
        course: String,
    },

    /// Reconcile accounts, teams, and team repos from a roster file
    Sync {
        /// Path to the roster file (course student_id name [team])
        roster: PathBuf,

        /// Generate new team repos from this template (owner/repo)
        #[arg(long)]
        template: Option<String>,
    },

    /// Verify remote state against the roster without changing anything
    Check {
        /// Path to the roster file
        roster: PathBuf,
    },

    /// Audit commit authorship across the course's team repos
    Audit {
        /// Path to the roster file
        roster: PathBuf,

        /// Alias file mapping git emails to student IDs
        /// (default: {course}.aliases.csv next to the roster)
        #[arg(long)]
        aliases: Option<PathBuf>,

        /// Audit a single team instead of the whole course
        #[arg(long)]
        team: Option<String>,
    },

    /// Report which roster students have never signed in
    CheckLogin {
        /// Path to the roster file
        roster: PathBuf,
    },

    /// Reset one student's password to the default and force a change
    ResetPassword {
        /// Path to the roster file (the student must be enrolled)
        roster: PathBuf,

        /// Student ID whose password to reset
        student: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    classops_core::telemetry::init_tracing(cli.json, level);

    let remote = GiteaClient::from_env();
    let config = RunConfig::from_env();

    match cli.command {
        Commands::CreateCourse { course } => {
            cmd_create_course(&remote, &config, &course).await
        }
        Commands::Sync { roster, template } => {
            cmd_sync(&remote, &config, &roster, template.as_deref(), cli.json).await
        }
        Commands::Check { roster } => cmd_check(&remote, &config, &roster, cli.json).await,
        Commands::Audit {
            roster,
            aliases,
            team,
        } => {
            cmd_audit(
                &remote,
                &config,
                &roster,
                aliases.as_deref(),
                team.as_deref(),
                cli.json,
            )
            .await
        }
        Commands::CheckLogin { roster } => {
            cmd_check_login(&remote, &config, &roster, cli.json).await
        }
        Commands::ResetPassword { roster, student } => {
            cmd_reset_password(&remote, &config, &roster, &student).await
        }
    }
}

/// Create the course organization ahead of the first sync
async fn cmd_create_course(
    remote: &dyn RemoteStateClient,
    config: &RunConfig,
    course: &str,
) -> Result<()> {
    let outcome = ensure_course(remote, config, course)
        .await
        .context("failed to ensure course organization")?;
    match outcome {
        CourseOutcome::Created => println!("OK: created private course '{course}'"),
        CourseOutcome::Existed => println!("OK: course '{course}' already exists"),
        CourseOutcome::VisibilityFixed => {
            println!("OK: course '{course}' existed, visibility forced back to private")
        }
    }
    Ok(())
}

/// Reconcile the whole course from the roster
async fn cmd_sync(
    remote: &dyn RemoteStateClient,
    config: &RunConfig,
    roster_path: &Path,
    template: Option<&str>,
    json: bool,
) -> Result<()> {
    let roster = Roster::load(roster_path).context("invalid roster")?;
    let course = roster.course();
    let template = template
        .map(TemplateRef::from_str)
        .transpose()
        .context("invalid --template")?;

    // The course must exist before anything is attached to it; a sync run
    // never creates it, but does force drifted visibility back.
    let state = config
        .retry
        .run("get_course", || remote.get_course(course))
        .await
        .context("failed to look up course")?
        .ok_or_else(|| {
            anyhow::anyhow!(
                "course '{course}' does not exist; run `classops create-course {course}` first"
            )
        })?;
    if state.visibility != Visibility::Private {
        config
            .retry
            .run("set_course_visibility", || {
                remote.set_course_visibility(course, Visibility::Private)
            })
            .await
            .context("failed to correct course visibility")?;
    }

    let accounts = AccountReconciler::new(remote, config)
        .reconcile(&roster)
        .await
        .context("account reconciliation aborted")?;
    let teams = TeamReconciler::new(remote, config)
        .reconcile(&roster)
        .await
        .context("team reconciliation aborted")?;
    let mut provisioner = RepoProvisioner::new(remote, config);
    if let Some(template) = template {
        provisioner = provisioner.with_template(template);
    }
    let repos = provisioner
        .provision(&roster)
        .await
        .context("repo provisioning aborted")?;

    if json {
        let report = serde_json::json!({
            "course": course,
            "accounts": accounts,
            "teams": teams,
            "repos": repos,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("accounts: {accounts}");
        println!("teams:    {teams}");
        println!("repos:    {repos}");
    }

    let failed = accounts.failures.len() + teams.failures.len() + repos.failures.len();
    if failed > 0 {
        for failure in accounts
            .failures
            .iter()
            .chain(&teams.failures)
            .chain(&repos.failures)
        {
            eprintln!("FAIL: {}: {}", failure.entity, failure.reason);
        }
        bail!("{failed} entity(ies) failed to reconcile");
    }
    if !json {
        if accounts.is_noop() && teams.is_noop() && repos.is_noop() {
            println!("OK: '{course}' already matches the roster");
        } else {
            println!("OK: '{course}' reconciled");
        }
    }
    Ok(())
}

/// Verify remote state against the roster, read-only
async fn cmd_check(
    remote: &dyn RemoteStateClient,
    config: &RunConfig,
    roster_path: &Path,
    json: bool,
) -> Result<()> {
    let roster = Roster::load(roster_path).context("invalid roster")?;
    let report = check_roster(remote, config, &roster)
        .await
        .context("check aborted")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_check_report(&report);
    }
    if !report.is_clean() {
        bail!(
            "{} student(s) with issues, {} lookup failure(s)",
            report.issues.len(),
            report.failures.len()
        );
    }
    Ok(())
}

fn print_check_report(report: &CheckReport) {
    for student in &report.ok {
        println!("OK:   {student}");
    }
    for issue in &report.issues {
        println!("FAIL: {}: {}", issue.student_id, issue.problems.join("; "));
    }
    for failure in &report.failures {
        eprintln!("FAIL: {}: {}", failure.entity, failure.reason);
    }
    println!(
        "checked {} student(s): {} ok, {} with issues",
        report.ok.len() + report.issues.len(),
        report.ok.len(),
        report.issues.len()
    );
}

/// Audit commit authorship per team
async fn cmd_audit(
    remote: &dyn RemoteStateClient,
    config: &RunConfig,
    roster_path: &Path,
    aliases_path: Option<&Path>,
    team: Option<&str>,
    json: bool,
) -> Result<()> {
    let roster = Roster::load(roster_path).context("invalid roster")?;
    let aliases = load_aliases(roster_path, roster.course(), aliases_path)?;

    let report = CommitAuditor::new(remote, config, aliases)
        .audit(&roster, team)
        .await
        .context("audit aborted")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    print_audit_report(&report);
    Ok(())
}

/// Resolve the alias file: explicit flag, or `{course}.aliases.csv`
/// alongside the roster.
fn load_aliases(
    roster_path: &Path,
    course: &str,
    explicit: Option<&Path>,
) -> Result<AliasMap> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => roster_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!("{course}.aliases.csv")),
    };
    AliasMap::load(&path).context("invalid alias file")
}

fn print_audit_report(report: &AuditReport) {
    for team in &report.teams {
        let label = match team.status {
            TeamStatus::NoCommits => "no commits",
            TeamStatus::AdminOnly => "admin commits only",
            TeamStatus::HasStudentCommit => "started",
        };
        println!(
            "{:<24} {:>4} commits, {:>4} by students  [{label}]",
            team.team, team.total_commits, team.student_commits
        );
    }
    if !report.unknown_authors.is_empty() {
        println!();
        println!("unknown authors (add them to the alias file):");
        for author in &report.unknown_authors {
            println!("  {} <{}>", author.name, author.email);
        }
    }
    for failure in &report.failures {
        eprintln!("FAIL: {}: {}", failure.entity, failure.reason);
    }
}

/// Report sign-in activity for the roster's students
async fn cmd_check_login(
    remote: &dyn RemoteStateClient,
    config: &RunConfig,
    roster_path: &Path,
    json: bool,
) -> Result<()> {
    let roster = Roster::load(roster_path).context("invalid roster")?;
    let report = login_report(remote, config, &roster)
        .await
        .context("login check aborted")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    print_login_report(&report);
    Ok(())
}

fn print_login_report(report: &LoginReport) {
    if report.all_signed_in() {
        println!("OK: every student has signed in at least once");
        return;
    }
    if !report.never.is_empty() {
        println!("never signed in ({}):", report.never.len());
        for student in &report.never {
            println!("  {student}");
        }
    }
    if !report.missing.is_empty() {
        println!("no account ({}):", report.missing.len());
        for student in &report.missing {
            println!("  {student}");
        }
    }
    for failure in &report.failures {
        eprintln!("FAIL: {}: {}", failure.entity, failure.reason);
    }
    println!("active: {}", report.active.len());
}

/// Reset one enrolled student's password to the default
async fn cmd_reset_password(
    remote: &dyn RemoteStateClient,
    config: &RunConfig,
    roster_path: &Path,
    student: &str,
) -> Result<()> {
    let roster = Roster::load(roster_path).context("invalid roster")?;
    if !roster.contains_student(student) {
        bail!("student '{student}' is not enrolled in '{}'", roster.course());
    }

    let password = reset_password(remote, config, student)
        .await
        .context("password reset failed")?;
    println!("OK: password for '{student}' reset to '{password}' (change forced on next login)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use classops_remote::MemoryRemote;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    fn write_roster(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("roster.txt");
        std::fs::write(&path, "114-2-DesignProject A1234567 Chen TeamAlpha\n").unwrap();
        path
    }

    #[tokio::test]
    async fn sync_requires_an_existing_course() {
        let remote = MemoryRemote::new();
        let config = RunConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let roster = write_roster(&dir);

        let err = cmd_sync(&remote, &config, &roster, None, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("create-course"));
    }

    #[tokio::test]
    async fn sync_forces_course_visibility_back_to_private() {
        let remote = MemoryRemote::new();
        remote.seed_course("114-2-DesignProject", Visibility::Public);
        let config = RunConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let roster = write_roster(&dir);

        cmd_sync(&remote, &config, &roster, None, false)
            .await
            .unwrap();

        let course = remote
            .get_course("114-2-DesignProject")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(course.visibility, Visibility::Private);
    }

    #[test]
    fn alias_path_defaults_next_to_the_roster() {
        let dir = tempfile::tempdir().unwrap();
        let roster_path = dir.path().join("roster.txt");
        std::fs::write(&roster_path, "").unwrap();
        std::fs::write(
            dir.path().join("114-2-DesignProject.aliases.csv"),
            "someone@gmail.com A1234567\n",
        )
        .unwrap();

        let aliases = load_aliases(&roster_path, "114-2-DesignProject", None).unwrap();
        assert_eq!(aliases.resolve("someone@gmail.com"), Some("a1234567"));
    }

    #[test]
    fn missing_alias_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let roster_path = dir.path().join("roster.txt");
        let aliases = load_aliases(&roster_path, "114-2-DesignProject", None).unwrap();
        assert!(aliases.is_empty());
    }
}
