//! scriptbridge - hot-reloadable Lua scripts for a native host
//!
//! Scripts register event listeners and commands that the host invokes
//! exactly like native handlers. Every registration is tied to the script
//! that made it and is reversed when that script unloads or reloads.

pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod script;

pub use config::Config;
pub use error::{BridgeError, CleanupFailure, Result};
pub use host::{
    BridgeContext, CommandHandler, CommandMapping, CommandRegistry, CommandResult, CommandSource,
    Event, EventBus, NativeCommand, Order, SimpleCommandRegistry, SimpleEventBus, Text,
};
pub use script::{
    default_suppliers, BindingsSupplier, Closable, ClosableRegistry, ScriptChange,
    ScriptEnvironment, ScriptWatcher,
};
