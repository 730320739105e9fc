//! classops-core: roster-driven course provisioning and commit auditing
//!
//! This crate holds everything except the HTTP transport: roster and alias
//! parsing, the reconcilers that drive a course's accounts, teams, and
//! repos toward the roster's declared state, the commit-authorship auditor,
//! the read-only roster check, and the sign-in activity report. All remote
//! access goes through the
//! `RemoteStateClient` trait from `classops-remote`, so the whole crate is
//! testable against the in-memory fake.

pub mod activity;
pub mod alias;
pub mod audit;
pub mod check;
pub mod config;
pub mod error;
pub mod reconcile;
pub mod retry;
pub mod roster;
pub mod telemetry;

pub use activity::{login_report, never_signed_in, LoginReport};
pub use alias::AliasMap;
pub use audit::{AuditError, AuditReport, CommitAuditor, TeamAudit, TeamStatus, UnknownAuthor};
pub use check::{check_roster, CheckReport, StudentCheck};
pub use config::RunConfig;
pub use error::ValidationError;
pub use reconcile::{
    default_password, ensure_course, reset_password, AccountReconciler, CourseOutcome,
    EntityFailure, EntityOutcome, ReconcileSummary, RepoProvisioner, TeamReconciler,
};
pub use retry::RetryPolicy;
pub use roster::{Roster, RosterEntry};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
