//! Run configuration
//!
//! Settings that shape a reconciliation/audit run, read from the
//! environment (a `.env` file is loaded by the CLI before this runs).
//! Gitea connection settings live in `classops_remote::GiteaConfig`.

use std::collections::BTreeSet;

use crate::retry::RetryPolicy;

/// Configuration shared by the reconcilers and the auditor
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Domain for generated student emails: `{student_id}@{email_domain}`
    pub email_domain: String,
    /// Extra admin emails whose commits never count as student activity
    pub admin_emails: BTreeSet<String>,
    /// Worker pool bound for per-student account reconciliation
    pub concurrency: usize,
    /// Retry policy applied to every remote call
    pub retry: RetryPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            email_domain: "mail.shu.edu.tw".to_string(),
            admin_emails: BTreeSet::new(),
            concurrency: 8,
            retry: RetryPolicy::default(),
        }
    }
}

impl RunConfig {
    /// Read overrides from `CLASSOPS_EMAIL_DOMAIN`, `CLASSOPS_ADMIN_EMAILS`
    /// (comma-separated), and `CLASSOPS_CONCURRENCY`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(domain) = std::env::var("CLASSOPS_EMAIL_DOMAIN") {
            if !domain.is_empty() {
                config.email_domain = domain;
            }
        }
        if let Ok(emails) = std::env::var("CLASSOPS_ADMIN_EMAILS") {
            config.admin_emails = emails
                .split(',')
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect();
        }
        if let Ok(n) = std::env::var("CLASSOPS_CONCURRENCY") {
            if let Ok(n) = n.parse::<usize>() {
                config.concurrency = n.max(1);
            }
        }
        config
    }

    /// The platform email generated for a student account.
    pub fn student_email(&self, student_id: &str) -> String {
        format!("{student_id}@{}", self.email_domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn student_email_uses_configured_domain() {
        let config = RunConfig {
            email_domain: "example.edu".to_string(),
            ..Default::default()
        };
        assert_eq!(config.student_email("A1234567"), "A1234567@example.edu");
    }
}
