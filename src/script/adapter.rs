//! Adapters that let script values stand in for native handlers.
//!
//! A [`ScriptListener`] forwards events to a script function. A
//! [`ScriptCommand`] implements [`CommandHandler`] over a script table:
//! `process` is required, every other member is optional and falls back to
//! the native default when absent.

use std::fmt;
use std::rc::Rc;

use mlua::{Function, IntoLuaMulti, Lua, LuaSerdeExt, Table, Value};
use tracing::warn;

use crate::host::{
    CommandHandler, CommandResult, CommandSource, Event, EventCallback, NativeHandler, Text,
    UNKNOWN_USAGE,
};
use crate::{BridgeError, Result};

/// Script member names of the command contract.
pub mod members {
    pub const PROCESS: &str = "process";
    pub const SUGGESTIONS: &str = "getSuggestions";
    pub const PERMISSION: &str = "testPermission";
    pub const SHORT_DESCRIPTION: &str = "shortDescription";
    pub const HELP: &str = "help";
    pub const USAGE: &str = "usage";
}

/// Convert a script value to text.
///
/// Native text passes through, strings and numbers become plain text, nil
/// means no text.
pub fn coerce_text(value: Value) -> Result<Option<Text>> {
    match value {
        Value::Nil => Ok(None),
        Value::String(s) => Ok(Some(Text::of(s.to_str()?.to_string()))),
        Value::Integer(i) => Ok(Some(Text::of(i.to_string()))),
        Value::Number(n) => Ok(Some(Text::of(n.to_string()))),
        Value::Boolean(b) => Ok(Some(Text::of(b.to_string()))),
        Value::UserData(ud) => match ud.borrow::<Text>() {
            Ok(text) => Ok(Some((*text).clone())),
            Err(_) => Err(BridgeError::InvalidArgument(
                "userdata is not text".to_string(),
            )),
        },
        other => Err(BridgeError::InvalidArgument(format!(
            "cannot convert {} to text",
            other.type_name()
        ))),
    }
}

/// Convert the value returned by a script `process` member.
pub fn coerce_command_result(value: Value) -> Result<CommandResult> {
    match value {
        Value::Nil | Value::Boolean(true) => Ok(CommandResult::success()),
        Value::Boolean(false) => Ok(CommandResult::empty()),
        Value::Integer(n) => Ok(CommandResult::with_successes(n)),
        Value::Number(n) if n.fract() == 0.0 => Ok(CommandResult::with_successes(n as i64)),
        Value::UserData(ud) => match ud.borrow::<CommandResult>() {
            Ok(result) => Ok(*result),
            Err(_) => Err(BridgeError::InvalidArgument(
                "process returned a userdata that is not a command result".to_string(),
            )),
        },
        other => Err(BridgeError::InvalidArgument(format!(
            "process returned {}",
            other.type_name()
        ))),
    }
}

/// Lua truthiness.
fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Nil | Value::Boolean(false))
}

/// Build the table a script listener receives for an event.
pub fn event_to_lua(lua: &Lua, event: &Event) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    table.set("type", event.event_type.as_str())?;
    table.set("data", lua.to_value(&event.data)?)?;
    Ok(table)
}

/// Listener adapter forwarding events to a script function.
#[derive(Clone)]
pub struct ScriptListener {
    lua: Lua,
    handler: Function,
    script: String,
}

impl fmt::Debug for ScriptListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptListener")
            .field("script", &self.script)
            .finish_non_exhaustive()
    }
}

impl ScriptListener {
    /// Wrap `handler`, owned by the named script.
    pub fn new(lua: &Lua, handler: Function, script: impl Into<String>) -> Self {
        Self {
            lua: lua.clone(),
            handler,
            script: script.into(),
        }
    }

    /// Invoke the script function with the event.
    pub fn handle(&self, event: &Event) -> Result<()> {
        let table = event_to_lua(&self.lua, event)?;
        self.handler.call::<()>(table).map_err(|e| {
            BridgeError::Script(format!("{} listener for '{}': {}", self.script, event.event_type, e))
        })
    }

    /// The adapter as a native event callback.
    pub fn into_callback(self) -> EventCallback {
        Rc::new(move |event: &Event| self.handle(event))
    }
}

/// Which optional command members a script table defines.
///
/// Probed once when the adapter is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandCapabilities {
    pub suggestions: bool,
    pub permission: bool,
    pub short_description: bool,
    pub help: bool,
    pub usage: bool,
}

impl CommandCapabilities {
    /// Inspect `object` for the optional members.
    pub fn probe(object: &Table) -> Result<Self> {
        Ok(Self {
            suggestions: has_member(object, members::SUGGESTIONS)?,
            permission: has_member(object, members::PERMISSION)?,
            short_description: has_member(object, members::SHORT_DESCRIPTION)?,
            help: has_member(object, members::HELP)?,
            usage: has_member(object, members::USAGE)?,
        })
    }
}

fn has_member(object: &Table, name: &str) -> Result<bool> {
    Ok(!object.get::<Value>(name)?.is_nil())
}

/// Command handler implemented by a script table.
pub struct ScriptCommand {
    object: Table,
    process: Function,
    capabilities: CommandCapabilities,
    script: String,
}

impl fmt::Debug for ScriptCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptCommand")
            .field("script", &self.script)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl ScriptCommand {
    /// Wrap a script table.
    ///
    /// Fails with [`BridgeError::MissingRequiredMember`] when `process` is
    /// absent, before anything is registered.
    pub fn new(object: Table, script: impl Into<String>) -> Result<Self> {
        let process = match object.get::<Value>(members::PROCESS)? {
            Value::Function(f) => f,
            Value::Nil => {
                return Err(BridgeError::MissingRequiredMember(
                    members::PROCESS.to_string(),
                ))
            }
            other => {
                return Err(BridgeError::InvalidArgument(format!(
                    "'{}' must be a function, got {}",
                    members::PROCESS,
                    other.type_name()
                )))
            }
        };
        let capabilities = CommandCapabilities::probe(&object)?;

        Ok(Self {
            object,
            process,
            capabilities,
            script: script.into(),
        })
    }

    /// Optional members found at construction.
    pub fn capabilities(&self) -> CommandCapabilities {
        self.capabilities
    }

    /// Call a function member. Callers pass the table itself first so the
    /// member sees `object:member(...)` semantics.
    fn call_member(&self, name: &str, args: impl IntoLuaMulti) -> Result<Value> {
        let function: Function = self.object.get(name)?;
        function
            .call::<Value>(args)
            .map_err(|e| BridgeError::Script(format!("{} {}: {}", self.script, name, e)))
    }

    /// Read a text member; functions are called with the source.
    fn text_member(&self, present: bool, name: &str, source: &CommandSource) -> Result<Option<Text>> {
        if !present {
            return Ok(None);
        }
        match self.object.get::<Value>(name)? {
            Value::Function(_) => {
                coerce_text(self.call_member(name, (self.object.clone(), source.clone()))?)
            }
            value => coerce_text(value),
        }
    }
}

impl CommandHandler for ScriptCommand {
    fn process(&self, source: &CommandSource, arguments: &str) -> Result<CommandResult> {
        let value = self
            .process
            .call::<Value>((self.object.clone(), source.clone(), arguments))
            .map_err(|e| BridgeError::Script(format!("{} process: {}", self.script, e)))?;
        coerce_command_result(value)
    }

    fn suggestions(&self, source: &CommandSource, arguments: &str) -> Result<Vec<String>> {
        if !self.capabilities.suggestions {
            return Ok(Vec::new());
        }
        match self.call_member(
            members::SUGGESTIONS,
            (self.object.clone(), source.clone(), arguments),
        )? {
            Value::Nil => Ok(Vec::new()),
            Value::Table(list) => Ok(list
                .sequence_values::<String>()
                .collect::<mlua::Result<Vec<_>>>()?),
            other => Err(BridgeError::InvalidArgument(format!(
                "{} returned {}",
                members::SUGGESTIONS,
                other.type_name()
            ))),
        }
    }

    fn test_permission(&self, source: &CommandSource) -> Result<bool> {
        if !self.capabilities.permission {
            return Ok(true);
        }
        let value = self.call_member(members::PERMISSION, (self.object.clone(), source.clone()))?;
        Ok(is_truthy(&value))
    }

    fn short_description(&self, source: &CommandSource) -> Result<Option<Text>> {
        self.text_member(
            self.capabilities.short_description,
            members::SHORT_DESCRIPTION,
            source,
        )
    }

    fn help(&self, source: &CommandSource) -> Result<Option<Text>> {
        self.text_member(self.capabilities.help, members::HELP, source)
    }

    fn usage(&self, source: &CommandSource) -> Result<Text> {
        Ok(self
            .text_member(self.capabilities.usage, members::USAGE, source)?
            .unwrap_or_else(|| {
                if self.capabilities.usage {
                    warn!("{} usage member produced no text", self.script);
                }
                Text::of(UNKNOWN_USAGE)
            }))
    }
}

/// The first argument of `registerCommand`, resolved once.
pub enum HandlerKind {
    /// Already a native handler; registered unchanged.
    Native(Rc<dyn CommandHandler>),
    /// A script table wrapped in an adapter.
    Script(ScriptCommand),
}

impl fmt::Debug for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKind::Native(_) => f.write_str("Native"),
            HandlerKind::Script(cmd) => f.debug_tuple("Script").field(cmd).finish(),
        }
    }
}

impl HandlerKind {
    /// Classify a script value.
    pub fn resolve(value: Value, script: &str) -> Result<Self> {
        match value {
            Value::UserData(ud) => match ud.borrow::<NativeHandler>() {
                Ok(native) => Ok(HandlerKind::Native(Rc::clone(&native.0))),
                Err(_) => Err(BridgeError::InvalidArgument(
                    "userdata is not a command handler".to_string(),
                )),
            },
            Value::Table(object) => Ok(HandlerKind::Script(ScriptCommand::new(object, script)?)),
            Value::Nil => Err(BridgeError::InvalidArgument(
                "missing command handler".to_string(),
            )),
            other => Err(BridgeError::InvalidArgument(format!(
                "command handler must be a table or native handler, got {}",
                other.type_name()
            ))),
        }
    }

    /// The handler to register.
    pub fn into_handler(self) -> Rc<dyn CommandHandler> {
        match self {
            HandlerKind::Native(handler) => handler,
            HandlerKind::Script(command) => Rc::new(command),
        }
    }
}
