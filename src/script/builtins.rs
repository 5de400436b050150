//! Native commands the host registers for managing scripts.

use std::rc::{Rc, Weak};

use crate::host::{
    CommandHandler, CommandMapping, CommandRegistry, CommandResult, CommandSource, NativeCommand,
    SimpleCommandRegistry, Text,
};
use crate::{BridgeError, Result};

use super::environment::ScriptEnvironment;

/// Permission required by commands that change what is loaded.
pub const ADMIN_PERMISSION: &str = "scriptbridge.admin";

fn environment(env: &Weak<ScriptEnvironment>) -> Result<Rc<ScriptEnvironment>> {
    env.upgrade()
        .ok_or_else(|| BridgeError::NotFound("script environment".to_string()))
}

fn script_name(arguments: &str) -> Result<String> {
    let name = arguments.trim();
    if name.is_empty() {
        return Err(BridgeError::InvalidArgument("missing script name".to_string()));
    }
    if name.ends_with(".lua") {
        Ok(name.to_string())
    } else {
        Ok(format!("{name}.lua"))
    }
}

fn scripts_command(env: Weak<ScriptEnvironment>) -> NativeCommand {
    NativeCommand::new(move |source, _| {
        let env = environment(&env)?;
        let scripts = env.scripts();
        source.send_message(Text::of(format!("{} script(s) loaded", scripts.len())));
        for script in &scripts {
            source.send_message(Text::of(format!(
                "{} ({}) - {} closable(s), loaded {}",
                script.name,
                script.display_name,
                script.closables,
                script.loaded_at.format("%Y-%m-%d %H:%M:%S")
            )));
        }
        Ok(CommandResult::with_successes(scripts.len() as i64))
    })
    .with_description("List loaded scripts")
    .with_usage("/scripts")
}

fn reload_command(env: Weak<ScriptEnvironment>) -> NativeCommand {
    NativeCommand::new(move |source, arguments| {
        let env = environment(&env)?;
        let name = script_name(arguments)?;
        env.load_path(std::path::Path::new(&name))?;
        source.send_message(Text::of(format!("Reloaded {name}")));
        Ok(CommandResult::success())
    })
    .with_permission(ADMIN_PERMISSION)
    .with_description("Load or reload a script")
    .with_usage("/reload <script>")
}

fn unload_command(env: Weak<ScriptEnvironment>) -> NativeCommand {
    NativeCommand::new(move |source, arguments| {
        let env = environment(&env)?;
        let name = script_name(arguments)?;
        if env.unload(&name) {
            source.send_message(Text::of(format!("Unloaded {name}")));
            Ok(CommandResult::success())
        } else {
            Err(BridgeError::NotFound(format!("script '{name}'")))
        }
    })
    .with_permission(ADMIN_PERMISSION)
    .with_description("Unload a script until it changes on disk")
    .with_usage("/unload <script>")
}

fn help_command(commands: Weak<SimpleCommandRegistry>) -> NativeCommand {
    NativeCommand::new(move |source, _| {
        let commands = commands
            .upgrade()
            .ok_or_else(|| BridgeError::NotFound("command registry".to_string()))?;
        let mut shown = 0;
        for mapping in commands.mappings() {
            let handler = mapping.handler();
            if !handler.test_permission(source)? {
                continue;
            }
            let description = handler
                .short_description(source)?
                .map(|d| d.plain().to_string())
                .unwrap_or_default();
            source.send_message(Text::of(format!(
                "/{} {} - {}",
                mapping.primary(),
                handler.usage(source)?.plain(),
                description
            )));
            shown += 1;
        }
        Ok(CommandResult::with_successes(shown))
    })
    .with_description("List available commands")
    .with_usage("/help")
}

/// Register `scripts`, `reload`, `unload` and `help`.
pub fn register_builtin_commands(
    commands: &Rc<SimpleCommandRegistry>,
    env: &Rc<ScriptEnvironment>,
    owner: &str,
) -> Result<Vec<CommandMapping>> {
    let builtins: Vec<(NativeCommand, &str)> = vec![
        (scripts_command(Rc::downgrade(env)), "scripts"),
        (reload_command(Rc::downgrade(env)), "reload"),
        (unload_command(Rc::downgrade(env)), "unload"),
        (help_command(Rc::downgrade(commands)), "help"),
    ];

    builtins
        .into_iter()
        .map(|(command, alias)| {
            let handler: Rc<dyn CommandHandler> = Rc::new(command);
            commands.register(owner, handler, &[alias.to_string()])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SimpleEventBus;
    use crate::script::api::default_suppliers;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _dir: TempDir,
        commands: Rc<SimpleCommandRegistry>,
        env: Rc<ScriptEnvironment>,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("hello.lua"), "-- @name Hello\nx = 1").unwrap();

        let events = Rc::new(SimpleEventBus::new(["chat"]));
        let commands = Rc::new(SimpleCommandRegistry::new());
        let env = Rc::new(ScriptEnvironment::new(
            dir.path(),
            "init.lua",
            default_suppliers(events, commands.clone(), "test"),
        ));
        register_builtin_commands(&commands, &env, "host").unwrap();

        Fixture {
            _dir: dir,
            commands,
            env,
        }
    }

    #[test]
    fn test_reload_and_list() {
        let f = fixture();
        let console = CommandSource::console();

        f.commands.dispatch(&console, "/reload hello").unwrap();
        assert!(f.env.is_loaded("hello.lua"));

        let result = f.commands.dispatch(&console, "/scripts").unwrap();
        assert_eq!(result.successes(), 1);
        let messages = console.take_messages();
        assert_eq!(messages[0].plain(), "Reloaded hello.lua");
        assert!(messages[2].plain().starts_with("hello.lua (Hello)"));
    }

    #[test]
    fn test_unload_unknown_script() {
        let f = fixture();
        let err = f
            .commands
            .dispatch(&CommandSource::console(), "/unload missing")
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));
    }

    #[test]
    fn test_admin_commands_need_permission() {
        let f = fixture();
        let guest = CommandSource::user("guest", Vec::<String>::new());

        let err = f.commands.dispatch(&guest, "/reload hello").unwrap_err();
        assert!(matches!(err, BridgeError::Permission(_)));
        assert!(!f.env.is_loaded("hello.lua"));
    }

    #[test]
    fn test_help_lists_visible_commands() {
        let f = fixture();
        let guest = CommandSource::user("guest", Vec::<String>::new());

        let result = f.commands.dispatch(&guest, "/help").unwrap();

        assert_eq!(result.successes(), 2);
        let lines: Vec<String> = guest.messages().iter().map(|m| m.plain().to_string()).collect();
        assert!(lines.contains(&"/scripts /scripts - List loaded scripts".to_string()));
        assert!(lines.iter().all(|l| !l.starts_with("/reload")));
    }

    #[test]
    fn test_script_name_normalization() {
        assert_eq!(script_name(" warp ").unwrap(), "warp.lua");
        assert_eq!(script_name("a/b.lua").unwrap(), "a/b.lua");
        assert!(script_name("  ").is_err());
    }
}
