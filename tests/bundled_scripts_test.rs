//! The scripts shipped in `scripts/` load and behave as documented.

mod common;

use std::fs;
use std::path::Path;

use serde_json::json;

use common::TestHost;
use scriptbridge::CommandSource;

fn host_with_bundled_scripts() -> TestHost {
    let host = TestHost::with_builtins();
    let bundled = Path::new(env!("CARGO_MANIFEST_DIR")).join("scripts");
    for entry in fs::read_dir(bundled).unwrap() {
        let path = entry.unwrap().path();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        host.write_script(&name, &fs::read_to_string(&path).unwrap());
    }
    host.env.load_all().unwrap();
    host
}

#[test]
fn test_bundled_scripts_load() {
    let host = host_with_bundled_scripts();

    assert_eq!(host.env.names(), vec!["init.lua", "warp.lua"]);
    let (result, messages) = host.dispatch("/scripts");
    assert_eq!(result.unwrap().successes(), 2);
    assert!(messages.iter().any(|m| m.starts_with("warp.lua (Warps)")));
}

#[test]
fn test_history_command() {
    let host = host_with_bundled_scripts();

    let (result, messages) = host.dispatch("/history");
    assert_eq!(result.unwrap().successes(), 0);
    assert_eq!(messages, vec!["No chat yet"]);

    host.post("chat", json!({ "sender": "alex", "message": "hi" }));
    host.post("chat", json!({ "sender": "sam", "message": "hello" }));

    let (result, messages) = host.dispatch("/hist");
    assert_eq!(result.unwrap().successes(), 2);
    assert_eq!(messages, vec!["alex: hi", "sam: hello"]);
}

#[test]
fn test_warp_commands() {
    let host = host_with_bundled_scripts();

    let (_, messages) = host.dispatch("/setwarp shop 10 70 -5");
    assert_eq!(messages, vec!["Warp shop set"]);

    let (_, messages) = host.dispatch("/w shop");
    assert_eq!(messages, vec!["Warping console to shop (10 70 -5)"]);

    let console = CommandSource::console();
    assert_eq!(
        host.commands.suggestions(&console, "/warp s").unwrap(),
        vec!["shop", "spawn"]
    );

    // setwarp announces itself in chat, which init.lua records.
    let (_, messages) = host.dispatch("/history");
    assert_eq!(messages, vec!["warps: new warp shop"]);

    let guest = CommandSource::user("guest", Vec::<String>::new());
    assert!(host.commands.dispatch(&guest, "/warp spawn").is_err());
}

#[test]
fn test_unload_bundled_scripts() {
    let host = host_with_bundled_scripts();
    let builtins = 4;
    assert_eq!(host.commands.mapping_count(), builtins + 3);

    assert_eq!(host.env.unload_all(), 2);

    assert_eq!(host.commands.mapping_count(), builtins);
    assert_eq!(host.events.subscription_count(), 0);
}
