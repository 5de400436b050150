//! A loaded script and the resources it owns.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use mlua::Lua;
use tracing::{debug, warn};
use uuid::Uuid;

use super::closable::ClosableRegistry;
use super::types::ScriptMetadata;
use crate::{BridgeError, Result};

/// One execution of one script file.
///
/// Each instance has its own Lua state and its own [`ClosableRegistry`].
/// A reload creates a new instance; the old one is unloaded first.
pub struct ScriptInstance {
    id: Uuid,
    name: String,
    path: PathBuf,
    hash: String,
    metadata: ScriptMetadata,
    lua: Lua,
    registry: Rc<ClosableRegistry>,
    loaded_at: DateTime<Utc>,
}

impl std::fmt::Debug for ScriptInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptInstance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("hash", &self.hash)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ScriptInstance {
    /// Create an instance with a fresh Lua state and an empty registry.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, hash: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            path: path.into(),
            hash: hash.into(),
            metadata: ScriptMetadata::default(),
            lua: Lua::new(),
            registry: Rc::new(ClosableRegistry::new()),
            loaded_at: Utc::now(),
        }
    }

    /// Attach header metadata.
    pub fn with_metadata(mut self, metadata: ScriptMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Path relative to the script directory.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// SHA-256 of the source this instance was built from.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn metadata(&self) -> &ScriptMetadata {
        &self.metadata
    }

    /// Display name: the `@name` header, or the file name.
    pub fn display_name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or(&self.name)
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn registry(&self) -> &Rc<ClosableRegistry> {
        &self.registry
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Run the script's top-level code.
    pub fn execute(&self, source: &str) -> Result<()> {
        self.lua
            .load(source)
            .set_name(format!("@{}", self.name))
            .exec()
            .map_err(|e| BridgeError::Script(format!("{}: {}", self.name, e)))
    }

    /// Release everything the script registered.
    ///
    /// Cleanup failures are logged and returned; the registry is empty
    /// either way.
    pub fn unload(&self) -> Result<usize> {
        match self.registry.drain() {
            Ok(released) => {
                debug!("Unloaded {} ({} closables released)", self.name, released);
                Ok(released)
            }
            Err(e) => {
                warn!("Unloaded {} with errors: {}", self.name, e);
                Err(e)
            }
        }
    }
}
