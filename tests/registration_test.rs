//! Registration function tests.
//!
//! Exercises `registerListener` and `registerCommand` from script code the
//! way plugin authors call them.

mod common;

use std::path::Path;

use serde_json::json;

use common::TestHost;
use scriptbridge::host::{CommandResult, NativeCommand, Order};
use scriptbridge::script::{
    default_suppliers, Bindings, BindingsSupplier, ScriptEnvironment, ScriptInstance,
};
use scriptbridge::{BridgeError, Result};

#[test]
fn test_listener_order_and_default() {
    let host = TestHost::new();
    host.load(
        "orders.lua",
        r#"
        seen = {}
        registerListener("chat", Order.POST, function() table.insert(seen, "post") end)
        registerListener("chat", function() table.insert(seen, "default") end)
        registerListener("chat", Order.PRE, function() table.insert(seen, "pre") end)
        registerListener("chat", "last", function() table.insert(seen, "last") end)
        registerCommand({
            process = function(self, source) source:send_message(table.concat(seen, ",")) end,
        }, "seen")
        "#,
    )
    .unwrap();

    assert_eq!(host.post("chat", json!({})), 4);
    assert_eq!(host.dispatch("/seen").1, vec!["pre,default,last,post"]);
}

#[test]
fn test_listener_handle_fields() {
    let host = TestHost::new();
    host.load(
        "handle.lua",
        r#"
        local handle = registerListener("shutdown", Order.LATE, function() end)
        registerCommand({
            process = function(self, source)
                source:send_message(handle.event .. " " .. handle.order.name .. " " .. tostring(handle.closed))
                source:send_message(string.sub(handle.id, 1, 4))
            end,
        }, "handle")
        "#,
    )
    .unwrap();

    assert_eq!(host.dispatch("/handle").1, vec!["shutdown LATE false", "sub_"]);
}

#[test]
fn test_event_data_reaches_script() {
    let host = TestHost::new();
    host.load(
        "echo.lua",
        r#"
        last = "none"
        registerListener("chat", function(event)
            last = event.type .. ":" .. event.data.sender .. ":" .. event.data.message
        end)
        registerCommand({ process = function(self, s) s:send_message(last) end }, "last")
        "#,
    )
    .unwrap();

    host.post("chat", json!({ "sender": "alex", "message": "hello" }));

    assert_eq!(host.dispatch("/last").1, vec!["chat:alex:hello"]);
}

#[test]
fn test_failing_listener_does_not_stop_others() {
    let host = TestHost::new();
    host.load(
        "mixed.lua",
        r#"
        hits = 0
        registerListener("chat", Order.EARLY, function() error("listener exploded") end)
        registerListener("chat", function() hits = hits + 1 end)
        registerCommand({ process = function(self, s) s:send_message(tostring(hits)) end }, "hits")
        "#,
    )
    .unwrap();

    assert_eq!(host.post("chat", json!({})), 1);
    assert_eq!(host.dispatch("/hits").1, vec!["1"]);
}

#[test]
fn test_unknown_event_type_rejected() {
    let host = TestHost::new();

    let err = host
        .load("bad.lua", r#"registerListener("explosion", function() end)"#)
        .unwrap_err();

    assert!(err.to_string().contains("unknown event type"));
    assert_eq!(host.registration_counts(), (0, 0));
}

#[test]
fn test_pcall_sees_invalid_argument() {
    let host = TestHost::new();
    host.load(
        "pcall.lua",
        r#"
        local ok, err = pcall(registerListener, "chat")
        result = tostring(ok) .. " " .. tostring(err)
        registerCommand({ process = function(self, s) s:send_message(result) end }, "result")
        "#,
    )
    .unwrap();

    let (_, messages) = host.dispatch("/result");
    assert!(messages[0].starts_with("false"));
    assert!(messages[0].contains("invalid argument"));
    assert_eq!(host.registration_counts(), (0, 1));
}

#[test]
fn test_missing_process_leaves_registry_unchanged() {
    let host = TestHost::new();
    host.load(
        "missing.lua",
        r#"
        local ok, err = pcall(registerCommand, { usage = "<x>", help = "nothing" }, "missing")
        message = tostring(err)
        size = registry:size()
        registerCommand({
            process = function(self, s) s:send_message(message .. "|" .. size) end,
        }, "why")
        "#,
    )
    .unwrap();

    assert_eq!(host.commands.mapping_count(), 1);
    let (_, messages) = host.dispatch("/why");
    assert!(messages[0].contains("missing required member 'process'"));
    assert!(messages[0].ends_with("|0"));
}

#[test]
fn test_two_aliases_route_to_same_process() {
    let host = TestHost::new();
    host.load(
        "warp.lua",
        r#"
        registerCommand({
            process = function(self, source, args)
                source:send_message(source.name .. " warps to " .. args)
                return 2
            end,
        }, "warp", "w")
        "#,
    )
    .unwrap();

    let (first, long) = host.dispatch("/warp spawn");
    let (second, short) = host.dispatch("/w spawn");

    assert_eq!(first.unwrap().successes(), 2);
    assert_eq!(second.unwrap().successes(), 2);
    assert_eq!(long, short);
    assert_eq!(long, vec!["console warps to spawn"]);
    assert_eq!(host.commands.mapping_count(), 1);
}

#[test]
fn test_command_optional_members() {
    let host = TestHost::new();
    host.load(
        "described.lua",
        r#"
        registerCommand({
            process = function() end,
            shortDescription = text("&bTeleport"),
            usage = "<place>",
            getSuggestions = function(self, source, args) return { "spawn", "shop" } end,
            testPermission = function(self, source) return source:has_permission("warp.use") end,
        }, "tp")
        registerCommand({ process = function() end }, "plain")
        "#,
    )
    .unwrap();

    let console = scriptbridge::CommandSource::console();
    let tp = host.commands.get("tp").unwrap();
    let plain = host.commands.get("plain").unwrap();

    assert_eq!(
        tp.handler().short_description(&console).unwrap().unwrap().plain(),
        "Teleport"
    );
    assert_eq!(tp.handler().usage(&console).unwrap().plain(), "<place>");
    assert_eq!(
        host.commands.suggestions(&console, "/tp s").unwrap(),
        vec!["spawn", "shop"]
    );

    assert!(plain.handler().short_description(&console).unwrap().is_none());
    assert!(plain.handler().help(&console).unwrap().is_none());
    assert_eq!(plain.handler().usage(&console).unwrap().plain(), "unknown");
    assert!(plain.handler().suggestions(&console, "").unwrap().is_empty());

    let guest = scriptbridge::CommandSource::user("guest", Vec::<String>::new());
    let err = host.commands.dispatch(&guest, "/tp spawn").unwrap_err();
    assert!(matches!(err, BridgeError::Permission(_)));
    assert!(plain.handler().test_permission(&guest).unwrap());
}

/// Exposes a native command handler to scripts as `nativeEcho`.
struct NativeEchoBindings;

impl BindingsSupplier for NativeEchoBindings {
    fn supply_bindings(&self, script: &ScriptInstance, bindings: &mut Bindings) -> Result<()> {
        let echo = NativeCommand::new(|source, args| {
            source.send_message(format!("native {args}").into());
            Ok(CommandResult::with_successes(3))
        })
        .with_description("Native echo");
        let handle = script.lua().create_userdata(echo.into_handle())?;
        bindings.set("nativeEcho", mlua::Value::UserData(handle));
        Ok(())
    }
}

#[test]
fn test_native_handler_passes_through() {
    let host = TestHost::new();
    let mut suppliers = default_suppliers(host.events.clone(), host.commands.clone(), "test");
    suppliers.push(Box::new(NativeEchoBindings));
    let env = ScriptEnvironment::new(host.path(), "init.lua", suppliers);

    host.write_script("native.lua", r#"handle = registerCommand(nativeEcho, "echo", "e")"#);
    env.load_path(Path::new("native.lua")).unwrap();

    let (result, messages) = host.dispatch("/e hi");
    assert_eq!(result.unwrap().successes(), 3);
    assert_eq!(messages, vec!["native hi"]);

    let console = scriptbridge::CommandSource::console();
    let mapping = host.commands.get("echo").unwrap();
    assert_eq!(
        mapping.handler().short_description(&console).unwrap().unwrap().plain(),
        "Native echo"
    );

    env.unload("native.lua");
    assert_eq!(host.commands.mapping_count(), 0);
}

#[test]
fn test_alias_conflict_binds_nothing() {
    let host = TestHost::new();
    host.load(
        "first.lua",
        r#"registerCommand({ process = function() end }, "shared")"#,
    )
    .unwrap();

    let err = host
        .load(
            "second.lua",
            r#"registerCommand({ process = function() end }, "shared")"#,
        )
        .unwrap_err();

    assert!(err.to_string().contains("native registration failed"));
    assert_eq!(host.commands.mapping_count(), 1);

    host.env.unload("first.lua");
    host.load(
        "second.lua",
        r#"registerCommand({ process = function() end }, "shared")"#,
    )
    .unwrap();
    assert_eq!(host.commands.get("shared").unwrap().owner(), "test");
}

#[test]
fn test_order_values_exposed() {
    let host = TestHost::new();
    host.load(
        "orders.lua",
        r#"
        names = {}
        for _, key in ipairs({ "PRE", "AFTER_PRE", "FIRST", "EARLY", "DEFAULT", "LATE", "LAST", "BEFORE_POST", "POST" }) do
            table.insert(names, Order[key].name)
        end
        registerCommand({ process = function(self, s) s:send_message(table.concat(names, ",")) end }, "orders")
        "#,
    )
    .unwrap();

    let expected: Vec<&str> = Order::ALL.iter().map(|o| o.name()).collect();
    assert_eq!(host.dispatch("/orders").1, vec![expected.join(",")]);
}
