use std::rc::Rc;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tracing::{debug, error, info, warn};

use scriptbridge::host::{CommandSource, Event, EventBus, SimpleCommandRegistry, SimpleEventBus};
use scriptbridge::script::{default_suppliers, register_builtin_commands, ScriptEnvironment};
use scriptbridge::{Config, Result};

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() {
    // Load configuration, writing the default on first start
    let config = match Config::load_or_create(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {CONFIG_PATH}: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };

    // Initialize logging
    if let Err(e) = scriptbridge::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        scriptbridge::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    info!("scriptbridge starting");

    // Lua state is single-threaded; everything touching it runs here.
    let local = LocalSet::new();
    if let Err(e) = local.run_until(run(config)).await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    let events = Rc::new(SimpleEventBus::new(config.host.event_types.iter().cloned()));
    let commands = Rc::new(SimpleCommandRegistry::new());

    let environment = Rc::new(ScriptEnvironment::new(
        config.scripts.directory_path(),
        config.scripts.init_script.clone(),
        default_suppliers(events.clone(), commands.clone(), &config.host.owner),
    ));
    register_builtin_commands(&commands, &environment, &config.host.owner)?;

    let watcher = environment.load_all()?;
    info!(
        "Loaded {} script(s) from {}",
        environment.len(),
        environment.directory().display()
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let poller = watcher.spawn(config.scripts.poll_interval(), tx);

    fire(&events, "server_started", json!({ "scripts": environment.names() }));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            Some(change) = rx.recv() => {
                debug!("Script change: {}", change.name());
                // Load failures are logged by the environment.
                let _ = environment.apply(change);
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&events, &commands, &line),
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            },
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }
    }

    fire(&events, "shutdown", json!({}));
    poller.abort();
    let unloaded = environment.unload_all();
    info!("Unloaded {} script(s), shutting down", unloaded);
    Ok(())
}

/// Console input: `/command args` dispatches, anything else is chat.
fn handle_line(events: &SimpleEventBus, commands: &SimpleCommandRegistry, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    if line.starts_with('/') {
        let console = CommandSource::console();
        let outcome = commands.dispatch(&console, line);
        for message in console.take_messages() {
            println!("{message}");
        }
        match outcome {
            Ok(result) if !result.is_success() => println!("(no result)"),
            Ok(_) => {}
            Err(e) => println!("Error: {e}"),
        }
    } else {
        fire(events, "chat", json!({ "sender": "console", "message": line }));
    }
}

fn fire(events: &SimpleEventBus, event_type: &str, data: serde_json::Value) {
    if !events.is_known(event_type) {
        debug!("Event type '{}' not configured, not firing", event_type);
        return;
    }
    match events.post(&Event::new(event_type, data)) {
        Ok(delivered) => debug!("'{}' delivered to {} listener(s)", event_type, delivered),
        Err(e) => warn!("Failed to fire '{}': {}", event_type, e),
    }
}
