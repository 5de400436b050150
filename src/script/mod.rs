//! The scripting bridge.
//!
//! Scripts are Lua files in a watched directory. Each loaded script gets a
//! [`ScriptInstance`] with its own Lua state and [`ClosableRegistry`];
//! [`BindingsSupplier`]s populate its globals before it runs, and every
//! listener or command it registers is undone when it unloads.

pub mod adapter;
pub mod api;
pub mod bindings;
pub mod builtins;
pub mod closable;
pub mod environment;
pub mod instance;
pub mod loader;
pub mod registration;
pub mod types;

pub use adapter::{
    coerce_command_result, coerce_text, CommandCapabilities, HandlerKind, ScriptCommand,
    ScriptListener,
};
pub use api::{default_suppliers, CoreBindings, HostBindings, RegistrationBindings};
pub use bindings::{supply_all, Bindings, BindingsSupplier};
pub use builtins::{register_builtin_commands, ADMIN_PERMISSION};
pub use closable::{Closable, ClosableRegistry, RegistryHandle};
pub use environment::{ScriptEnvironment, ScriptSummary};
pub use instance::ScriptInstance;
pub use loader::ScriptWatcher;
pub use registration::{register_command, register_listener, CommandHandle, ListenerHandle};
pub use types::{ScanResult, ScriptChange, ScriptFile, ScriptMetadata};
