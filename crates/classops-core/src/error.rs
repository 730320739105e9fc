//! Input validation errors
//!
//! Raised while parsing roster/alias files, always before any remote
//! mutation is attempted. A single bad row aborts the whole load:
//! reconciling from a partially-wrong roster is unsafe.

use thiserror::Error;

/// Errors for malformed roster or alias input
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// Wrong column count. A display name with embedded spaces also lands
    /// here, because it would silently shift the team column.
    #[error("roster line {line}: expected 'course student_id name [team]', found {columns} column(s)")]
    MalformedRosterRow { line: usize, columns: usize },

    /// One roster file covers exactly one course
    #[error("roster line {line}: course '{found}' differs from '{expected}'; one roster covers one course")]
    MixedCourses {
        line: usize,
        found: String,
        expected: String,
    },

    /// Student IDs are unique within a course file
    #[error("roster line {line}: duplicate student id '{student_id}'")]
    DuplicateStudent { line: usize, student_id: String },

    /// No data rows at all
    #[error("roster contains no student rows")]
    EmptyRoster,

    /// Alias rows are exactly `git_email student_id`
    #[error("alias line {line}: expected 'git_email student_id', found {columns} column(s)")]
    MalformedAliasRow { line: usize, columns: usize },

    /// Duplicate alias keys would silently mask a misconfiguration,
    /// so last-one-wins is disallowed.
    #[error("alias line {line}: duplicate alias for email '{email}'")]
    DuplicateAlias { line: usize, email: String },

    /// Input file could not be read
    #[error("failed to read '{path}': {reason}")]
    Io { path: String, reason: String },
}
