//! Script lifecycle on the run context.
//!
//! The environment owns every loaded [`ScriptInstance`]. Loading a name that
//! is already loaded is a reload: the old instance is unloaded and its
//! registry drained before the new instance is created, so no handler of the
//! old instance runs afterwards.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use super::bindings::{supply_all, BindingsSupplier};
use super::instance::ScriptInstance;
use super::loader::ScriptWatcher;
use super::types::{ScriptChange, ScriptFile};
use crate::Result;

/// Summary of a loaded script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSummary {
    pub name: String,
    pub display_name: String,
    pub hash: String,
    pub closables: usize,
    pub loaded_at: DateTime<Utc>,
}

/// Loaded scripts and the suppliers that prepare each one.
pub struct ScriptEnvironment {
    directory: PathBuf,
    init_script: String,
    suppliers: Vec<Box<dyn BindingsSupplier>>,
    scripts: RefCell<BTreeMap<String, ScriptInstance>>,
}

impl std::fmt::Debug for ScriptEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEnvironment")
            .field("directory", &self.directory)
            .field("init_script", &self.init_script)
            .field("suppliers", &self.suppliers.len())
            .field("scripts", &self.names())
            .finish()
    }
}

impl ScriptEnvironment {
    /// Create an environment over `directory`.
    pub fn new(
        directory: impl Into<PathBuf>,
        init_script: impl Into<String>,
        suppliers: Vec<Box<dyn BindingsSupplier>>,
    ) -> Self {
        Self {
            directory: directory.into(),
            init_script: init_script.into(),
            suppliers,
            scripts: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn init_script(&self) -> &str {
        &self.init_script
    }

    /// A watcher over this environment's directory.
    pub fn watcher(&self) -> ScriptWatcher {
        ScriptWatcher::new(&self.directory, self.init_script.clone())
    }

    /// Load or reload a script from its source.
    ///
    /// If the script fails to run, everything it registered before failing
    /// is released and the error returned. The previous instance, if any,
    /// stays unloaded.
    pub fn load(&self, file: &ScriptFile) -> Result<()> {
        let reloading = self.unload(&file.name);

        let instance = ScriptInstance::new(&file.name, &file.path, &file.hash)
            .with_metadata(file.metadata.clone());

        let prepared =
            supply_all(&self.suppliers, &instance).and_then(|_| instance.execute(&file.source));
        if let Err(e) = prepared {
            error!("Failed to load script {}: {}", file.name, e);
            // Cleanup failures are logged by unload.
            let _ = instance.unload();
            return Err(e);
        }

        info!(
            "{} script {} ({} closables)",
            if reloading { "Reloaded" } else { "Loaded" },
            instance.display_name(),
            instance.registry().len()
        );
        self.scripts.borrow_mut().insert(file.name.clone(), instance);
        Ok(())
    }

    /// Read and load a script by path.
    pub fn load_path(&self, path: &Path) -> Result<()> {
        let watcher = self.watcher();
        let full = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.directory.join(path)
        };
        self.load(&watcher.read_script(&full)?)
    }

    /// Unload a script. Returns whether it was loaded.
    ///
    /// Cleanup failures are logged and never prevent the unload.
    pub fn unload(&self, name: &str) -> bool {
        // Closables may call back into the environment.
        let removed = self.scripts.borrow_mut().remove(name);
        match removed {
            Some(instance) => {
                let _ = instance.unload();
                info!("Unloaded script {}", name);
                true
            }
            None => false,
        }
    }

    /// Apply a change reported by the watcher.
    pub fn apply(&self, change: ScriptChange) -> Result<()> {
        match change {
            ScriptChange::Added(file) | ScriptChange::Modified(file) => {
                if file.is_enabled() {
                    self.load(&file)
                } else {
                    if self.unload(&file.name) {
                        info!("Script {} disabled", file.name);
                    }
                    Ok(())
                }
            }
            ScriptChange::Removed(name) => {
                self.unload(&name);
                Ok(())
            }
        }
    }

    /// Scan the directory once and apply everything found.
    ///
    /// Returns the watcher so polling continues from this state. Individual
    /// load failures are logged and do not stop the scan.
    pub fn load_all(&self) -> Result<ScriptWatcher> {
        let mut watcher = self.watcher();
        watcher.ensure_scripts_dir()?;

        let result = watcher.scan();
        for (path, e) in &result.errors {
            warn!("Failed to read script {}: {}", path, e);
        }
        for change in result.changes {
            let _ = self.apply(change);
        }
        Ok(watcher)
    }

    /// Unload every script, in reverse name order.
    pub fn unload_all(&self) -> usize {
        let names: Vec<String> = self.names().into_iter().rev().collect();
        names.iter().filter(|name| self.unload(name)).count()
    }

    /// Names of loaded scripts, sorted.
    pub fn names(&self) -> Vec<String> {
        self.scripts.borrow().keys().cloned().collect()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.scripts.borrow().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.scripts.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.borrow().is_empty()
    }

    /// Summaries of loaded scripts.
    pub fn scripts(&self) -> Vec<ScriptSummary> {
        self.scripts
            .borrow()
            .values()
            .map(|s| ScriptSummary {
                name: s.name().to_string(),
                display_name: s.display_name().to_string(),
                hash: s.hash().to_string(),
                closables: s.registry().len(),
                loaded_at: s.loaded_at(),
            })
            .collect()
    }

    /// Source of a loaded script as currently on disk.
    pub fn read_source(&self, name: &str) -> Result<String> {
        Ok(fs::read_to_string(self.directory.join(name))?)
    }
}

impl Drop for ScriptEnvironment {
    fn drop(&mut self) {
        if !self.scripts.get_mut().is_empty() {
            self.unload_all();
        }
    }
}
