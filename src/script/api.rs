//! Bindings suppliers shipped with the bridge.
//!
//! [`CoreBindings`] gives every script its registry, identity, logging and
//! the `Order` and `text` helpers. [`HostBindings`] exposes the bundled host
//! subsystems. [`RegistrationBindings`] installs `registerListener` and
//! `registerCommand`.

use std::rc::Rc;

use mlua::{Lua, LuaSerdeExt, Result as LuaResult, Table, Value};
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};

use super::bindings::{Bindings, BindingsSupplier};
use super::closable::RegistryHandle;
use super::instance::ScriptInstance;
use super::registration::{command_function, listener_function};
use crate::host::{
    BridgeContext, CommandSource, Event, Order, SimpleCommandRegistry, SimpleEventBus, Text,
};
use crate::logging::SCRIPT_TARGET;
use crate::{BridgeError, Result};

/// Registry, identity, logging, `Order` and `text`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoreBindings;

impl BindingsSupplier for CoreBindings {
    fn supply_bindings(&self, script: &ScriptInstance, bindings: &mut Bindings) -> Result<()> {
        let lua = script.lua();

        let registry = RegistryHandle::new(Rc::clone(script.registry()), script.name());
        bindings.set("registry", Value::UserData(lua.create_userdata(registry)?));
        bindings.set("script", Value::Table(script_table(lua, script)?));
        bindings.set("log", Value::Table(log_table(lua, script.name())?));
        bindings.set("print", Value::Function(print_function(lua, script.name())?));
        bindings.set("Order", Value::Table(order_table(lua)?));

        // text("&aGreen") -> Text
        let text = lua.create_function(|_, source: String| Ok(Text::from_formatting_codes(&source)))?;
        bindings.set("text", Value::Function(text));

        Ok(())
    }
}

/// Identity table: name, path, id, display name and header metadata.
fn script_table(lua: &Lua, script: &ScriptInstance) -> LuaResult<Table> {
    let table = lua.create_table()?;
    table.set("name", script.name())?;
    table.set("path", script.path().display().to_string())?;
    table.set("id", script.id().to_string())?;
    table.set("display_name", script.display_name())?;
    table.set("hash", script.hash())?;
    table.set("loaded_at", script.loaded_at().to_rfc3339())?;
    table.set("metadata", lua.to_value(script.metadata())?)?;
    Ok(table)
}

/// `log.info/warn/error/debug(message)`.
fn log_table(lua: &Lua, script: &str) -> LuaResult<Table> {
    let log = lua.create_table()?;

    let name = script.to_string();
    log.set(
        "info",
        lua.create_function(move |_, message: Value| {
            info!(target: SCRIPT_TARGET, script = %name, "{}", value_to_string(&message));
            Ok(())
        })?,
    )?;

    let name = script.to_string();
    log.set(
        "warn",
        lua.create_function(move |_, message: Value| {
            warn!(target: SCRIPT_TARGET, script = %name, "{}", value_to_string(&message));
            Ok(())
        })?,
    )?;

    let name = script.to_string();
    log.set(
        "error",
        lua.create_function(move |_, message: Value| {
            error!(target: SCRIPT_TARGET, script = %name, "{}", value_to_string(&message));
            Ok(())
        })?,
    )?;

    let name = script.to_string();
    log.set(
        "debug",
        lua.create_function(move |_, message: Value| {
            debug!(target: SCRIPT_TARGET, script = %name, "{}", value_to_string(&message));
            Ok(())
        })?,
    )?;

    Ok(log)
}

/// `print(...)` routed to the log instead of stdout.
fn print_function(lua: &Lua, script: &str) -> LuaResult<mlua::Function> {
    let name = script.to_string();
    lua.create_function(move |_, args: mlua::Variadic<Value>| {
        let line = args.iter().map(value_to_string).collect::<Vec<_>>().join("\t");
        info!(target: SCRIPT_TARGET, script = %name, "{}", line);
        Ok(())
    })
}

/// `Order.PRE` .. `Order.POST`.
fn order_table(lua: &Lua) -> LuaResult<Table> {
    let table = lua.create_table()?;
    for order in Order::ALL {
        table.set(order.name(), order)?;
    }
    Ok(table)
}

/// Convert a Lua Value to a string for output.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.to_str().map(|s| s.to_string()).unwrap_or_default(),
        Value::Table(_) => "[table]".to_string(),
        Value::Function(_) => "[function]".to_string(),
        Value::Thread(_) => "[thread]".to_string(),
        Value::UserData(ud) => match ud.borrow::<Text>() {
            Ok(text) => text.plain().to_string(),
            Err(_) => "[userdata]".to_string(),
        },
        Value::LightUserData(_) => "[lightuserdata]".to_string(),
        Value::Error(e) => format!("[error: {}]", e),
        _ => "[unknown]".to_string(),
    }
}

/// `events` and `commands` tables over the bundled host subsystems.
#[derive(Debug, Clone)]
pub struct HostBindings {
    events: Rc<SimpleEventBus>,
    commands: Rc<SimpleCommandRegistry>,
}

impl HostBindings {
    pub fn new(events: Rc<SimpleEventBus>, commands: Rc<SimpleCommandRegistry>) -> Self {
        Self { events, commands }
    }

    fn events_table(&self, lua: &Lua) -> LuaResult<Table> {
        let table = lua.create_table()?;

        // events.post(type, [data]) -> delivered count
        let events = Rc::clone(&self.events);
        let post = lua.create_function(move |lua, (event_type, data): (String, Value)| {
            let data: JsonValue = lua.from_value(data)?;
            events
                .post(&Event::new(event_type, data))
                .map_err(BridgeError::into_lua)
        })?;
        table.set("post", post)?;

        // events.types() -> { "chat", ... }
        let events = Rc::clone(&self.events);
        table.set("types", lua.create_function(move |_, ()| Ok(events.event_types()))?)?;

        let events = Rc::clone(&self.events);
        table.set(
            "is_known",
            lua.create_function(move |_, event_type: String| {
                Ok(crate::host::EventBus::is_known(events.as_ref(), &event_type))
            })?,
        )?;

        Ok(table)
    }

    fn commands_table(&self, lua: &Lua) -> LuaResult<Table> {
        let table = lua.create_table()?;

        // commands.dispatch(line) -> { successes = n, messages = { ... } }
        let commands = Rc::clone(&self.commands);
        let dispatch = lua.create_function(move |lua, line: String| {
            let console = CommandSource::console();
            let result = commands
                .dispatch(&console, &line)
                .map_err(BridgeError::into_lua)?;

            let outcome = lua.create_table()?;
            outcome.set("successes", result.successes())?;
            let messages: Vec<String> = console
                .take_messages()
                .iter()
                .map(|m| m.plain().to_string())
                .collect();
            outcome.set("messages", messages)?;
            Ok(outcome)
        })?;
        table.set("dispatch", dispatch)?;

        let commands = Rc::clone(&self.commands);
        table.set("aliases", lua.create_function(move |_, ()| Ok(commands.aliases()))?)?;

        let commands = Rc::clone(&self.commands);
        table.set(
            "suggestions",
            lua.create_function(move |_, line: String| {
                commands
                    .suggestions(&CommandSource::console(), &line)
                    .map_err(BridgeError::into_lua)
            })?,
        )?;

        Ok(table)
    }
}

impl BindingsSupplier for HostBindings {
    fn supply_bindings(&self, script: &ScriptInstance, bindings: &mut Bindings) -> Result<()> {
        let lua = script.lua();
        bindings.set("events", Value::Table(self.events_table(lua)?));
        bindings.set("commands", Value::Table(self.commands_table(lua)?));
        Ok(())
    }
}

/// `registerListener` and `registerCommand`, bound to the script's registry.
#[derive(Debug, Clone)]
pub struct RegistrationBindings {
    context: BridgeContext,
}

impl RegistrationBindings {
    pub fn new(context: BridgeContext) -> Self {
        Self { context }
    }
}

impl BindingsSupplier for RegistrationBindings {
    fn supply_bindings(&self, script: &ScriptInstance, bindings: &mut Bindings) -> Result<()> {
        let lua = script.lua();
        let listener = listener_function(
            lua,
            self.context.clone(),
            Rc::clone(script.registry()),
            script.name().to_string(),
        )?;
        let command = command_function(
            lua,
            self.context.clone(),
            Rc::clone(script.registry()),
            script.name().to_string(),
        )?;
        bindings.set("registerListener", Value::Function(listener));
        bindings.set("registerCommand", Value::Function(command));
        Ok(())
    }
}

/// The standard supplier chain over the bundled host subsystems.
pub fn default_suppliers(
    events: Rc<SimpleEventBus>,
    commands: Rc<SimpleCommandRegistry>,
    owner: &str,
) -> Vec<Box<dyn BindingsSupplier>> {
    let context = BridgeContext::new(events.clone(), commands.clone(), owner);
    vec![
        Box::new(CoreBindings),
        Box::new(HostBindings::new(events, commands)),
        Box::new(RegistrationBindings::new(context)),
    ]
}
