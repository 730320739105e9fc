//! classops remote layer
//!
//! Defines the `RemoteStateClient` contract the reconcilers and the commit
//! auditor run against, plus two implementations: `GiteaClient` (Gitea v1
//! REST API over reqwest) and `MemoryRemote` (in-memory fake for tests).

pub mod client;
pub mod error;
pub mod fakes;
pub mod gitea;

pub use client::{
    AccountPatch, AccountState, CommitRecord, CourseState, CreateOutcome, NewAccount,
    RemoteResult, RemoteStateClient, TeamRecord, TemplateRef, Visibility,
};
pub use error::RemoteError;
pub use fakes::MemoryRemote;
pub use gitea::{GiteaClient, GiteaConfig};
