//! Host subsystems the bridge wraps.
//!
//! Scripts never touch these directly: registrations go through the
//! [`EventBus`] and [`CommandRegistry`] traits, and every registration is
//! reversed through the same traits when its script unloads.

pub mod commands;
pub mod events;
pub mod text;

use std::rc::Rc;

pub use commands::{
    normalize_alias, split_command_line, CommandHandler, CommandMapping, CommandRegistry,
    CommandResult, CommandSource, MappingId, NativeCommand, NativeHandler, SimpleCommandRegistry,
    UNKNOWN_USAGE,
};
pub use events::{Event, EventBus, EventCallback, Order, SimpleEventBus, SubscriptionId};
pub use text::Text;

/// Everything the bridge needs from the host, passed explicitly to bindings
/// suppliers and registration functions.
#[derive(Clone)]
pub struct BridgeContext {
    /// Event subsystem.
    pub events: Rc<dyn EventBus>,
    /// Command subsystem.
    pub commands: Rc<dyn CommandRegistry>,
    /// Owner recorded on command registrations.
    pub owner: String,
}

impl std::fmt::Debug for BridgeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeContext")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

impl BridgeContext {
    /// Create a context over the given subsystems.
    pub fn new(
        events: Rc<dyn EventBus>,
        commands: Rc<dyn CommandRegistry>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            events,
            commands,
            owner: owner.into(),
        }
    }
}
