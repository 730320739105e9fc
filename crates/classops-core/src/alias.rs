//! Alias table: git commit emails mapped to student IDs
//!
//! Loaded from an optional `{course}.aliases.csv` file with rows
//! `git_email student_id`. Both sides are lowercased. An absent file is an
//! empty map, not an error; a duplicate email is a load-time error.

use std::collections::HashMap;
use std::path::Path;

use crate::error::ValidationError;

/// Resolves unlinked commit emails to roster student IDs
#[derive(Debug, Clone, Default)]
pub struct AliasMap {
    map: HashMap<String, String>,
}

impl AliasMap {
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let mut map = HashMap::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let columns: Vec<&str> = trimmed.split_whitespace().collect();
            if columns.len() != 2 {
                return Err(ValidationError::MalformedAliasRow {
                    line,
                    columns: columns.len(),
                });
            }

            let email = columns[0].to_lowercase();
            let student_id = columns[1].to_lowercase();
            if map.insert(email.clone(), student_id).is_some() {
                return Err(ValidationError::DuplicateAlias { line, email });
            }
        }

        Ok(AliasMap { map })
    }

    /// Load from disk; a missing file yields an empty map.
    pub fn load(path: &Path) -> Result<Self, ValidationError> {
        if !path.exists() {
            return Ok(AliasMap::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| ValidationError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&text)
    }

    /// Look up a commit email (case-insensitive). Returns the student ID
    /// in lowercase, or `None` when unresolved.
    pub fn resolve(&self, email: &str) -> Option<&str> {
        self.map.get(&email.to_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
