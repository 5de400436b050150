//! `registerListener` and `registerCommand`.
//!
//! Both functions validate their arguments completely before touching the
//! host. A registration that reaches the host is always paired with a
//! [`Closable`] bound in the calling script's registry, so an unload
//! reverses it. A failed call binds nothing.

use std::rc::Rc;

use mlua::{Function, Lua, MultiValue, UserData, UserDataFields, UserDataMethods, Value};
use tracing::{debug, warn};

use super::adapter::{HandlerKind, ScriptListener};
use super::closable::{Closable, ClosableRegistry};
use crate::host::{BridgeContext, CommandMapping, Order, SubscriptionId};
use crate::{BridgeError, Result};

/// Script handle for a listener registration.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    id: SubscriptionId,
    event_type: String,
    order: Order,
    closable: Closable,
}

impl ListenerHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn order(&self) -> Order {
        self.order
    }

    /// Cleanup that unsubscribes the listener.
    pub fn closable(&self) -> &Closable {
        &self.closable
    }
}

impl UserData for ListenerHandle {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("id", |_, this| Ok(this.id.to_string()));
        fields.add_field_method_get("event", |_, this| Ok(this.event_type.clone()));
        fields.add_field_method_get("order", |_, this| Ok(this.order));
        fields.add_field_method_get("closed", |_, this| Ok(this.closable.is_closed()));
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("close", |_, this, ()| {
            this.closable.close().map_err(BridgeError::into_lua)
        });
    }
}

/// Script handle for a command registration.
#[derive(Debug, Clone)]
pub struct CommandHandle {
    mapping: CommandMapping,
    closable: Closable,
}

impl CommandHandle {
    pub fn mapping(&self) -> &CommandMapping {
        &self.mapping
    }

    /// Cleanup that unregisters the command.
    pub fn closable(&self) -> &Closable {
        &self.closable
    }
}

impl UserData for CommandHandle {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("primary", |_, this| Ok(this.mapping.primary().to_string()));
        fields.add_field_method_get("aliases", |_, this| Ok(this.mapping.aliases().to_vec()));
        fields.add_field_method_get("closed", |_, this| Ok(this.closable.is_closed()));
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("close", |_, this, ()| {
            this.closable.close().map_err(BridgeError::into_lua)
        });
    }
}

fn ensure_open(registry: &ClosableRegistry, script: &str) -> Result<()> {
    if registry.is_drained() {
        return Err(BridgeError::InvalidArgument(format!(
            "{script} has been unloaded and cannot register"
        )));
    }
    Ok(())
}

fn parse_order(value: &Value) -> Result<Order> {
    match value {
        Value::UserData(ud) => ud
            .borrow::<Order>()
            .map(|order| *order)
            .map_err(|_| BridgeError::InvalidArgument("userdata is not an Order".to_string())),
        Value::String(s) => s.to_str()?.parse(),
        other => Err(BridgeError::InvalidArgument(format!(
            "order must be an Order or string, got {}",
            other.type_name()
        ))),
    }
}

/// Turn a callable script value into a function.
///
/// Tables and userdata count when their metatable has `__call`.
fn as_callable(lua: &Lua, value: &Value) -> Result<Option<Function>> {
    let has_call = match value {
        Value::Function(function) => return Ok(Some(function.clone())),
        Value::Table(table) => match table.metatable() {
            Some(metatable) => !metatable.raw_get::<Value>("__call")?.is_nil(),
            None => false,
        },
        Value::UserData(ud) => match ud.metatable() {
            Ok(metatable) => !metatable.get::<Value>("__call")?.is_nil(),
            Err(_) => false,
        },
        _ => false,
    };
    if !has_call {
        return Ok(None);
    }

    let wrapper = lua
        .load("local callable = ... return function(...) return callable(...) end")
        .set_name("=callable")
        .call::<Function>(value.clone())?;
    Ok(Some(wrapper))
}

/// `registerListener(eventType, [order], handler)`.
pub fn register_listener(
    ctx: &BridgeContext,
    lua: &Lua,
    registry: &ClosableRegistry,
    script: &str,
    args: MultiValue,
) -> Result<ListenerHandle> {
    ensure_open(registry, script)?;
    let args: Vec<Value> = args.into_iter().collect();

    let event_type = match args.first() {
        Some(Value::String(s)) => s.to_str()?.to_string(),
        Some(other) => {
            return Err(BridgeError::InvalidArgument(format!(
                "event type must be a string, got {}",
                other.type_name()
            )))
        }
        None => {
            return Err(BridgeError::InvalidArgument(
                "missing event type".to_string(),
            ))
        }
    };
    if !ctx.events.is_known(&event_type) {
        return Err(BridgeError::InvalidArgument(format!(
            "unknown event type '{event_type}'"
        )));
    }

    let missing_handler =
        || BridgeError::InvalidArgument("registerListener expects a handler function".to_string());
    let (order, handler) = match args.get(1) {
        Some(first) => match as_callable(lua, first)? {
            Some(handler) => (Order::default(), handler),
            None => {
                let handler = match args.get(2) {
                    Some(value) => as_callable(lua, value)?,
                    None => None,
                }
                .ok_or_else(missing_handler)?;
                (parse_order(first)?, handler)
            }
        },
        None => return Err(missing_handler()),
    };

    let callback = ScriptListener::new(lua, handler, script).into_callback();
    let id = ctx.events.subscribe(&event_type, order, callback)?;

    let events = Rc::clone(&ctx.events);
    let closable = registry.bind(Closable::new(
        format!("listener {event_type}#{id}"),
        move || events.unsubscribe(id),
    ));

    debug!("{} listening to '{}' at {} ({})", script, event_type, order, id);
    Ok(ListenerHandle {
        id,
        event_type,
        order,
        closable,
    })
}

fn parse_alias(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.to_str()?.to_string()),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(BridgeError::InvalidArgument(format!(
            "alias must be a string, got {}",
            other.type_name()
        ))),
    }
}

/// `registerCommand(handler, aliases...)`.
///
/// `handler` is either a native handler or a script table with a `process`
/// member.
pub fn register_command(
    ctx: &BridgeContext,
    registry: &ClosableRegistry,
    script: &str,
    args: MultiValue,
) -> Result<CommandHandle> {
    ensure_open(registry, script)?;
    let mut args = args.into_iter();
    let handler = HandlerKind::resolve(args.next().unwrap_or(Value::Nil), script)?;
    let aliases = args.map(|v| parse_alias(&v)).collect::<Result<Vec<_>>>()?;
    if aliases.is_empty() {
        return Err(BridgeError::InvalidArgument(
            "registerCommand needs at least one alias".to_string(),
        ));
    }

    let mapping = ctx
        .commands
        .register(&ctx.owner, handler.into_handler(), &aliases)?;

    let commands = Rc::clone(&ctx.commands);
    let registered = mapping.clone();
    let closable = registry.bind(Closable::new(
        format!("command /{}", mapping.primary()),
        move || commands.unregister(&registered),
    ));

    debug!("{} registered command /{}", script, mapping.primary());
    Ok(CommandHandle { mapping, closable })
}

/// Build the script-facing `registerListener` function.
pub fn listener_function(
    lua: &Lua,
    ctx: BridgeContext,
    registry: Rc<ClosableRegistry>,
    script: String,
) -> mlua::Result<Function> {
    lua.create_function(move |lua, args: MultiValue| {
        register_listener(&ctx, lua, &registry, &script, args).map_err(|e| {
            warn!("{}: registerListener failed: {}", script, e);
            e.into_lua()
        })
    })
}

/// Build the script-facing `registerCommand` function.
pub fn command_function(
    lua: &Lua,
    ctx: BridgeContext,
    registry: Rc<ClosableRegistry>,
    script: String,
) -> mlua::Result<Function> {
    lua.create_function(move |_, args: MultiValue| {
        register_command(&ctx, &registry, &script, args).map_err(|e| {
            warn!("{}: registerCommand failed: {}", script, e);
            e.into_lua()
        })
    })
}
