//! Host command subsystem.
//!
//! A [`CommandHandler`] is the native command contract. Handlers are
//! registered in a [`CommandRegistry`] under one or more aliases and invoked
//! by [`SimpleCommandRegistry::dispatch`] once per executed command line.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use mlua::{UserData, UserDataFields, UserDataMethods, Value};
use tracing::debug;

use super::text::Text;
use crate::{BridgeError, Result};

/// Usage text reported when a handler does not describe itself.
pub const UNKNOWN_USAGE: &str = "unknown";

/// Outcome of processing a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandResult {
    successes: i64,
}

impl CommandResult {
    /// A single success.
    pub fn success() -> Self {
        Self { successes: 1 }
    }

    /// Nothing succeeded.
    pub fn empty() -> Self {
        Self { successes: 0 }
    }

    /// A result with an explicit success count.
    pub fn with_successes(successes: i64) -> Self {
        Self { successes }
    }

    /// Number of successes.
    pub fn successes(&self) -> i64 {
        self.successes
    }

    /// Whether anything succeeded.
    pub fn is_success(&self) -> bool {
        self.successes > 0
    }
}

impl UserData for CommandResult {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("successes", |_, this| Ok(this.successes));
        fields.add_field_method_get("success", |_, this| Ok(this.is_success()));
    }
}

#[derive(Debug)]
struct SourceState {
    name: String,
    permissions: BTreeSet<String>,
    all_permissions: bool,
    messages: RefCell<Vec<Text>>,
}

/// The sender of a command: the console or a named user.
///
/// Cloning shares the same message inbox.
#[derive(Debug, Clone)]
pub struct CommandSource {
    state: Rc<SourceState>,
}

impl CommandSource {
    /// The console, which holds every permission.
    pub fn console() -> Self {
        Self::build("console", BTreeSet::new(), true)
    }

    /// A named user holding only the given permissions.
    pub fn user<I, S>(name: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(
            name,
            permissions.into_iter().map(Into::into).collect(),
            false,
        )
    }

    fn build(name: impl Into<String>, permissions: BTreeSet<String>, all: bool) -> Self {
        Self {
            state: Rc::new(SourceState {
                name: name.into(),
                permissions,
                all_permissions: all,
                messages: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Name of the sender.
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Whether the sender holds `permission`.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.state.all_permissions || self.state.permissions.contains(permission)
    }

    /// Deliver a message to the sender.
    pub fn send_message(&self, text: Text) {
        self.state.messages.borrow_mut().push(text);
    }

    /// Messages delivered so far.
    pub fn messages(&self) -> Vec<Text> {
        self.state.messages.borrow().clone()
    }

    /// Remove and return delivered messages.
    pub fn take_messages(&self) -> Vec<Text> {
        self.state.messages.take()
    }
}

impl UserData for CommandSource {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("name", |_, this| Ok(this.name().to_string()));
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("has_permission", |_, this, permission: String| {
            Ok(this.has_permission(&permission))
        });
        methods.add_method("send_message", |_, this, value: Value| {
            let text = crate::script::adapter::coerce_text(value)
                .map_err(BridgeError::into_lua)?
                .unwrap_or_default();
            this.send_message(text);
            Ok(())
        });
    }
}

/// The native command contract.
///
/// Only [`process`](CommandHandler::process) is required; the other methods
/// have the documented defaults.
pub trait CommandHandler {
    /// Execute the command with the raw argument string.
    fn process(&self, source: &CommandSource, arguments: &str) -> Result<CommandResult>;

    /// Completions for a partially typed argument string.
    fn suggestions(&self, _source: &CommandSource, _arguments: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Whether `source` may run the command.
    fn test_permission(&self, _source: &CommandSource) -> Result<bool> {
        Ok(true)
    }

    /// One-line description.
    fn short_description(&self, _source: &CommandSource) -> Result<Option<Text>> {
        Ok(None)
    }

    /// Longer help text.
    fn help(&self, _source: &CommandSource) -> Result<Option<Text>> {
        Ok(None)
    }

    /// Usage line.
    fn usage(&self, _source: &CommandSource) -> Result<Text> {
        Ok(Text::of(UNKNOWN_USAGE))
    }
}

type ProcessFn = dyn Fn(&CommandSource, &str) -> Result<CommandResult>;

/// A command handler implemented by a Rust closure.
pub struct NativeCommand {
    process: Box<ProcessFn>,
    permission: Option<String>,
    description: Option<Text>,
    usage: Option<Text>,
}

impl fmt::Debug for NativeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCommand")
            .field("permission", &self.permission)
            .field("description", &self.description)
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}

impl NativeCommand {
    /// Create a command from its process function.
    pub fn new<F>(process: F) -> Self
    where
        F: Fn(&CommandSource, &str) -> Result<CommandResult> + 'static,
    {
        Self {
            process: Box::new(process),
            permission: None,
            description: None,
            usage: None,
        }
    }

    /// Require a permission to run the command.
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }

    /// Set the short description.
    pub fn with_description(mut self, description: impl Into<Text>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the usage line.
    pub fn with_usage(mut self, usage: impl Into<Text>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    /// Share as a handler that scripts can pass to `registerCommand`.
    pub fn into_handle(self) -> NativeHandler {
        NativeHandler(Rc::new(self))
    }
}

impl CommandHandler for NativeCommand {
    fn process(&self, source: &CommandSource, arguments: &str) -> Result<CommandResult> {
        (self.process)(source, arguments)
    }

    fn test_permission(&self, source: &CommandSource) -> Result<bool> {
        Ok(self
            .permission
            .as_deref()
            .map_or(true, |p| source.has_permission(p)))
    }

    fn short_description(&self, _source: &CommandSource) -> Result<Option<Text>> {
        Ok(self.description.clone())
    }

    fn usage(&self, _source: &CommandSource) -> Result<Text> {
        Ok(self
            .usage
            .clone()
            .unwrap_or_else(|| Text::of(UNKNOWN_USAGE)))
    }
}

/// A native handler exposed to script code.
///
/// Passing one to `registerCommand` registers it unchanged.
#[derive(Clone)]
pub struct NativeHandler(pub Rc<dyn CommandHandler>);

impl fmt::Debug for NativeHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NativeHandler")
    }
}

impl UserData for NativeHandler {}

/// Identifier of a command mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MappingId(pub u64);

/// A registered command: a handler and the aliases it claimed.
#[derive(Clone)]
pub struct CommandMapping {
    id: MappingId,
    owner: String,
    aliases: Vec<String>,
    handler: Rc<dyn CommandHandler>,
}

impl fmt::Debug for CommandMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandMapping")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("aliases", &self.aliases)
            .finish_non_exhaustive()
    }
}

impl CommandMapping {
    /// Mapping identifier.
    pub fn id(&self) -> MappingId {
        self.id
    }

    /// Owner the mapping was registered for.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// First alias claimed.
    pub fn primary(&self) -> &str {
        &self.aliases[0]
    }

    /// Every alias claimed, primary first.
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// The registered handler.
    pub fn handler(&self) -> &Rc<dyn CommandHandler> {
        &self.handler
    }
}

/// The host command subsystem as seen by the bridge.
pub trait CommandRegistry {
    /// Register `handler` under `aliases` on behalf of `owner`.
    ///
    /// Aliases already claimed by another mapping are skipped; registration
    /// fails with [`BridgeError::NativeRegistration`] if none remain.
    fn register(
        &self,
        owner: &str,
        handler: Rc<dyn CommandHandler>,
        aliases: &[String],
    ) -> Result<CommandMapping>;

    /// Remove a mapping and release its aliases.
    fn unregister(&self, mapping: &CommandMapping) -> Result<()>;
}

/// Normalise an alias as typed by a user or script.
pub fn normalize_alias(alias: &str) -> String {
    alias.trim().trim_start_matches('/').to_lowercase()
}

/// Split a command line into its alias and argument string.
pub fn split_command_line(line: &str) -> (String, &str) {
    let line = line.trim().trim_start_matches('/');
    match line.find(char::is_whitespace) {
        Some(pos) => (normalize_alias(&line[..pos]), line[pos..].trim_start()),
        None => (normalize_alias(line), ""),
    }
}

/// Single-threaded command registry.
#[derive(Default)]
pub struct SimpleCommandRegistry {
    mappings: RefCell<BTreeMap<MappingId, CommandMapping>>,
    aliases: RefCell<BTreeMap<String, MappingId>>,
    next_id: Cell<u64>,
}

impl fmt::Debug for SimpleCommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleCommandRegistry")
            .field("mappings", &self.mapping_count())
            .field("aliases", &self.aliases())
            .finish()
    }
}

impl SimpleCommandRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live mappings.
    pub fn mapping_count(&self) -> usize {
        self.mappings.borrow().len()
    }

    /// Every claimed alias, sorted.
    pub fn aliases(&self) -> Vec<String> {
        self.aliases.borrow().keys().cloned().collect()
    }

    /// Mapping owning `alias`.
    pub fn get(&self, alias: &str) -> Option<CommandMapping> {
        let id = *self.aliases.borrow().get(&normalize_alias(alias))?;
        self.mappings.borrow().get(&id).cloned()
    }

    /// Every live mapping, in registration order.
    pub fn mappings(&self) -> Vec<CommandMapping> {
        self.mappings.borrow().values().cloned().collect()
    }

    /// Execute a command line such as `/warp home`.
    ///
    /// The handler's permission check runs first; the handler is then
    /// invoked exactly once.
    pub fn dispatch(&self, source: &CommandSource, line: &str) -> Result<CommandResult> {
        let (alias, arguments) = split_command_line(line);
        let mapping = self
            .get(&alias)
            .ok_or_else(|| BridgeError::NotFound(format!("command '{alias}'")))?;

        if !mapping.handler.test_permission(source)? {
            return Err(BridgeError::Permission(format!(
                "{} may not use '{}'",
                source.name(),
                alias
            )));
        }

        debug!("{} issued command: /{} {}", source.name(), alias, arguments);
        mapping.handler.process(source, arguments)
    }

    /// Completions for a partially typed command line.
    ///
    /// Without a space the alias itself is completed; otherwise the handler
    /// is asked for argument suggestions.
    pub fn suggestions(&self, source: &CommandSource, line: &str) -> Result<Vec<String>> {
        let trimmed = line.trim_start().trim_start_matches('/');
        if !trimmed.contains(char::is_whitespace) {
            let prefix = normalize_alias(trimmed);
            return Ok(self
                .aliases
                .borrow()
                .keys()
                .filter(|a| a.starts_with(&prefix))
                .cloned()
                .collect());
        }

        let (alias, arguments) = split_command_line(line);
        match self.get(&alias) {
            Some(mapping) if mapping.handler.test_permission(source)? => {
                mapping.handler.suggestions(source, arguments)
            }
            _ => Ok(Vec::new()),
        }
    }
}

impl CommandRegistry for SimpleCommandRegistry {
    fn register(
        &self,
        owner: &str,
        handler: Rc<dyn CommandHandler>,
        aliases: &[String],
    ) -> Result<CommandMapping> {
        let mut claimed: Vec<String> = Vec::new();
        {
            let taken = self.aliases.borrow();
            for alias in aliases.iter().map(|a| normalize_alias(a)) {
                if alias.is_empty() || taken.contains_key(&alias) || claimed.contains(&alias) {
                    continue;
                }
                claimed.push(alias);
            }
        }

        if claimed.is_empty() {
            return Err(BridgeError::NativeRegistration(format!(
                "no free alias among [{}]",
                aliases.join(", ")
            )));
        }

        let id = MappingId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let mapping = CommandMapping {
            id,
            owner: owner.to_string(),
            aliases: claimed,
            handler,
        };

        {
            let mut taken = self.aliases.borrow_mut();
            for alias in &mapping.aliases {
                taken.insert(alias.clone(), id);
            }
        }
        self.mappings.borrow_mut().insert(id, mapping.clone());

        debug!(
            "Registered command /{} for {} (aliases: {})",
            mapping.primary(),
            owner,
            mapping.aliases.join(", ")
        );
        Ok(mapping)
    }

    fn unregister(&self, mapping: &CommandMapping) -> Result<()> {
        let removed = self
            .mappings
            .borrow_mut()
            .remove(&mapping.id)
            .ok_or_else(|| {
                BridgeError::NativeRegistration(format!(
                    "command /{} is not registered",
                    mapping.primary()
                ))
            })?;

        self.aliases.borrow_mut().retain(|_, id| *id != removed.id);
        debug!("Removed command /{}", removed.primary());
        Ok(())
    }
}
