//! Roster file parsing and validation
//!
//! Roster rows are whitespace-delimited: `Course StudentID StudentName [Team]`.
//! Lines starting with `#` and blank lines are skipped. Validation is total
//! and fail-fast: no partial roster is ever handed to the reconcilers.
//!
//! Course and team names can never contain whitespace here by construction;
//! a row where they would (for example a display name written as two words)
//! surfaces as `MalformedRosterRow`.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use crate::error::ValidationError;

/// One roster row, immutable after parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub course: String,
    pub student_id: String,
    pub display_name: String,
    /// Declared team. `None` means the student's memberships are unmanaged:
    /// the team reconciler leaves whatever exists untouched.
    pub team: Option<String>,
}

/// A validated roster: ordered entries, all sharing one course
#[derive(Debug, Clone)]
pub struct Roster {
    course: String,
    entries: Vec<RosterEntry>,
}

impl Roster {
    /// Parse and validate roster text. Any malformed row aborts the parse.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let mut entries: Vec<RosterEntry> = Vec::new();
        let mut course: Option<String> = None;
        let mut seen_ids: HashSet<String> = HashSet::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let columns: Vec<&str> = trimmed.split_whitespace().collect();
            if columns.len() < 3 || columns.len() > 4 {
                return Err(ValidationError::MalformedRosterRow {
                    line,
                    columns: columns.len(),
                });
            }

            let row_course = columns[0];
            match &course {
                None => course = Some(row_course.to_string()),
                Some(expected) if expected != row_course => {
                    return Err(ValidationError::MixedCourses {
                        line,
                        found: row_course.to_string(),
                        expected: expected.clone(),
                    });
                }
                Some(_) => {}
            }

            let student_id = columns[1];
            if !seen_ids.insert(student_id.to_string()) {
                return Err(ValidationError::DuplicateStudent {
                    line,
                    student_id: student_id.to_string(),
                });
            }

            entries.push(RosterEntry {
                course: row_course.to_string(),
                student_id: student_id.to_string(),
                display_name: columns[2].to_string(),
                team: columns.get(3).map(|t| t.to_string()),
            });
        }

        match course {
            Some(course) => Ok(Roster { course, entries }),
            None => Err(ValidationError::EmptyRoster),
        }
    }

    /// Load and validate a roster file from disk.
    pub fn load(path: &Path) -> Result<Self, ValidationError> {
        let text = std::fs::read_to_string(path).map_err(|e| ValidationError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&text)
    }

    pub fn course(&self) -> &str {
        &self.course
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    /// Declared team membership: `team -> set<student_id>`, sorted by team
    /// name. Rows without a team do not appear.
    pub fn teams(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut teams: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for entry in &self.entries {
            if let Some(team) = &entry.team {
                teams
                    .entry(team.clone())
                    .or_default()
                    .insert(entry.student_id.clone());
            }
        }
        teams
    }

    /// All team names referenced anywhere in the roster.
    pub fn team_names(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter_map(|e| e.team.clone())
            .collect()
    }

    pub fn contains_student(&self, student_id: &str) -> bool {
        self.entries.iter().any(|e| e.student_id == student_id)
    }
}
