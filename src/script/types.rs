//! Script file types shared by the watcher and the environment.

use std::path::PathBuf;

use serde::Serialize;

/// Script metadata parsed from the leading comment block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScriptMetadata {
    /// Display name (@name).
    pub name: Option<String>,
    /// Description (@description).
    pub description: Option<String>,
    /// Author (@author).
    pub author: Option<String>,
    /// Enabled flag (@enabled).
    pub enabled: Option<bool>,
}

/// A script file read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFile {
    /// Path relative to the script directory, with `/` separators.
    pub name: String,
    /// Full path on disk.
    pub path: PathBuf,
    pub source: String,
    /// SHA-256 of `source`, hex encoded.
    pub hash: String,
    pub metadata: ScriptMetadata,
}

impl ScriptFile {
    /// Scripts load unless the header says `@enabled false`.
    pub fn is_enabled(&self) -> bool {
        self.metadata.enabled.unwrap_or(true)
    }
}

/// A change detected in the script directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptChange {
    Added(ScriptFile),
    Modified(ScriptFile),
    Removed(String),
}

impl ScriptChange {
    /// Name of the affected script.
    pub fn name(&self) -> &str {
        match self {
            ScriptChange::Added(file) | ScriptChange::Modified(file) => &file.name,
            ScriptChange::Removed(name) => name,
        }
    }
}

/// Result of one directory scan.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Changes, init script first.
    pub changes: Vec<ScriptChange>,
    /// Files that could not be read.
    pub errors: Vec<(String, String)>,
}

impl ScanResult {
    /// Check if any changes were found.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn count_added(&self) -> usize {
        self.count(|c| matches!(c, ScriptChange::Added(_)))
    }

    pub fn count_modified(&self) -> usize {
        self.count(|c| matches!(c, ScriptChange::Modified(_)))
    }

    pub fn count_removed(&self) -> usize {
        self.count(|c| matches!(c, ScriptChange::Removed(_)))
    }

    fn count(&self, predicate: impl Fn(&ScriptChange) -> bool) -> usize {
        self.changes.iter().filter(|c| predicate(c)).count()
    }
}
