//! Test helpers for integration tests.
//!
//! Provides TestHost: a script directory in a temp dir plus the bundled
//! event bus, command registry and script environment wired together the
//! way the binary wires them.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use tempfile::TempDir;

use scriptbridge::host::{
    CommandResult, CommandSource, Event, SimpleCommandRegistry, SimpleEventBus,
};
use scriptbridge::script::{default_suppliers, register_builtin_commands, ScriptEnvironment};
use scriptbridge::{BridgeError, Result};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Event types every test host delivers.
pub const EVENT_TYPES: [&str; 3] = ["server_started", "chat", "shutdown"];

/// A host with scripts loaded from a temporary directory.
pub struct TestHost {
    pub dir: TempDir,
    pub events: Rc<SimpleEventBus>,
    pub commands: Rc<SimpleCommandRegistry>,
    pub env: Rc<ScriptEnvironment>,
}

impl TestHost {
    /// Create a host with an empty script directory.
    pub fn new() -> Self {
        scriptbridge::logging::init_test();

        let dir = tempfile::tempdir().expect("create temp dir");
        let events = Rc::new(SimpleEventBus::new(EVENT_TYPES));
        let commands = Rc::new(SimpleCommandRegistry::new());
        let env = Rc::new(ScriptEnvironment::new(
            dir.path(),
            "init.lua",
            default_suppliers(events.clone(), commands.clone(), "test"),
        ));

        Self {
            dir,
            events,
            commands,
            env,
        }
    }

    /// Create a host that also has the built-in commands.
    pub fn with_builtins() -> Self {
        let host = Self::new();
        register_builtin_commands(&host.commands, &host.env, "host").expect("register builtins");
        host
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a script file, creating parent directories.
    pub fn write_script(&self, name: &str, source: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create script dir");
        }
        fs::write(path, source).expect("write script");
    }

    pub fn remove_script(&self, name: &str) {
        fs::remove_file(self.dir.path().join(name)).expect("remove script");
    }

    /// Write and load a script.
    pub fn load(&self, name: &str, source: &str) -> Result<()> {
        self.write_script(name, source);
        self.env.load_path(Path::new(name))
    }

    /// Post an event and return how many listeners completed.
    pub fn post(&self, event_type: &str, data: serde_json::Value) -> usize {
        self.events
            .post(&Event::new(event_type, data))
            .expect("post event")
    }

    /// Run a command line as the console; returns the result and plain messages.
    pub fn dispatch(&self, line: &str) -> (std::result::Result<CommandResult, BridgeError>, Vec<String>) {
        let console = CommandSource::console();
        let result = self.commands.dispatch(&console, line);
        let messages = console
            .take_messages()
            .into_iter()
            .map(|m| m.plain().to_string())
            .collect();
        (result, messages)
    }

    /// Subscriptions and command mappings currently registered.
    pub fn registration_counts(&self) -> (usize, usize) {
        (self.events.subscription_count(), self.commands.mapping_count())
    }
}
