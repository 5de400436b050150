//! Script watcher for scanning the script directory and detecting changes.
//!
//! The watcher only reads files. It reports [`ScriptChange`]s; loading them
//! into Lua happens on the run context in
//! [`ScriptEnvironment`](super::environment::ScriptEnvironment).

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::types::{ScanResult, ScriptChange, ScriptFile, ScriptMetadata};
use crate::Result;

/// Polling watcher over a script directory.
pub struct ScriptWatcher {
    /// Base directory for scripts.
    scripts_dir: PathBuf,
    /// Script loaded before all others.
    init_script: String,
    /// Hash of every file seen by the last scan.
    known: HashMap<String, String>,
}

impl ScriptWatcher {
    /// Create a new watcher over `scripts_dir`.
    pub fn new<P: AsRef<Path>>(scripts_dir: P, init_script: impl Into<String>) -> Self {
        Self {
            scripts_dir: scripts_dir.as_ref().to_path_buf(),
            init_script: init_script.into(),
            known: HashMap::new(),
        }
    }

    /// Scan the directory and report what changed since the previous scan.
    ///
    /// Removals come first so a renamed script releases its registrations
    /// before the new name loads. The init script precedes other loads.
    pub fn scan(&mut self) -> ScanResult {
        let mut result = ScanResult::default();
        let mut found: BTreeMap<String, ScriptFile> = BTreeMap::new();

        if self.scripts_dir.exists() {
            self.scan_directory(&self.scripts_dir, &mut found, &mut result);
        }

        let mut removed: Vec<String> = self
            .known
            .keys()
            .filter(|name| !found.contains_key(*name))
            .cloned()
            .collect();
        removed.sort();
        for name in removed {
            self.known.remove(&name);
            result.changes.push(ScriptChange::Removed(name));
        }

        let mut loads = Vec::new();
        for (name, file) in found {
            match self.known.insert(name, file.hash.clone()) {
                None => loads.push(ScriptChange::Added(file)),
                Some(previous) if previous != file.hash => loads.push(ScriptChange::Modified(file)),
                Some(_) => {}
            }
        }
        // Stable sort keeps the rest alphabetical.
        loads.sort_by_key(|change| change.name() != self.init_script);
        result.changes.extend(loads);

        result
    }

    /// Scan a directory recursively for .lua files.
    fn scan_directory(
        &self,
        dir: &Path,
        found: &mut BTreeMap<String, ScriptFile>,
        result: &mut ScanResult,
    ) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                result.errors.push((dir.display().to_string(), e.to_string()));
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();

            if path.is_dir() {
                self.scan_directory(&path, found, result);
            } else if path.extension().is_some_and(|ext| ext == "lua") {
                match self.read_script(&path) {
                    Ok(file) => {
                        found.insert(file.name.clone(), file);
                    }
                    Err(e) => result.errors.push((path.display().to_string(), e.to_string())),
                }
            }
        }
    }

    /// Read a single script file.
    pub fn read_script(&self, path: &Path) -> Result<ScriptFile> {
        let source = fs::read_to_string(path)?;
        Ok(ScriptFile {
            name: self.script_name(path),
            path: path.to_path_buf(),
            hash: Self::calculate_hash(&source),
            metadata: Self::parse_metadata(&source),
            source,
        })
    }

    /// Name of a script: its path relative to the script directory.
    pub fn script_name(&self, path: &Path) -> String {
        path.strip_prefix(&self.scripts_dir)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Parse metadata from Lua file comments.
    ///
    /// Looks for comments like:
    /// ```lua
    /// -- @name Warps
    /// -- @description Named teleport points
    /// -- @author Steve
    /// -- @enabled true
    /// ```
    pub fn parse_metadata(content: &str) -> ScriptMetadata {
        let mut metadata = ScriptMetadata::default();

        for line in content.lines() {
            let line = line.trim();
            if !line.starts_with("--") {
                // Stop at first non-comment line
                if !line.is_empty() {
                    break;
                }
                continue;
            }

            let comment = line.trim_start_matches("--").trim();

            if let Some(value) = comment.strip_prefix("@name ") {
                metadata.name = Some(value.trim().to_string());
            } else if let Some(value) = comment.strip_prefix("@description ") {
                metadata.description = Some(value.trim().to_string());
            } else if let Some(value) = comment.strip_prefix("@author ") {
                metadata.author = Some(value.trim().to_string());
            } else if let Some(value) = comment.strip_prefix("@enabled ") {
                metadata.enabled = value.trim().parse().ok();
            }
        }

        metadata
    }

    /// SHA-256 of the file content, hex encoded.
    pub fn calculate_hash(content: &str) -> String {
        format!("{:x}", Sha256::digest(content.as_bytes()))
    }

    /// Get the scripts directory path.
    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    pub fn init_script(&self) -> &str {
        &self.init_script
    }

    /// Create the scripts directory if it doesn't exist.
    pub fn ensure_scripts_dir(&self) -> Result<()> {
        if !self.scripts_dir.exists() {
            fs::create_dir_all(&self.scripts_dir)?;
            info!("Created script directory {}", self.scripts_dir.display());
        }
        Ok(())
    }

    /// Poll the directory every `interval`, sending changes to `tx`.
    ///
    /// The task ends when the receiving side is dropped.
    pub fn spawn(mut self, interval: Duration, tx: mpsc::UnboundedSender<ScriptChange>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    debug!("Script change receiver closed, stopping watcher");
                    return;
                }

                let result = self.scan();
                for (path, error) in &result.errors {
                    warn!("Failed to read script {}: {}", path, error);
                }
                if result.has_changes() {
                    debug!(
                        "Script scan: {} added, {} modified, {} removed",
                        result.count_added(),
                        result.count_modified(),
                        result.count_removed()
                    );
                }
                for change in result.changes {
                    if tx.send(change).is_err() {
                        debug!("Script change receiver closed, stopping watcher");
                        return;
                    }
                }
            }
        })
    }
}
