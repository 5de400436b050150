//! Global scope population for script instances.
//!
//! Before a script first runs, each [`BindingsSupplier`] adds named values
//! to a [`Bindings`] surface. Suppliers only describe values; nothing is
//! registered with the host here. The surface is applied to the script's
//! globals once every supplier has run.

use std::collections::BTreeMap;

use mlua::{Lua, Value};
use tracing::debug;

use super::instance::ScriptInstance;
use crate::Result;

/// Named values destined for a script's global scope.
#[derive(Debug, Default)]
pub struct Bindings {
    values: BTreeMap<String, Value>,
}

impl Bindings {
    /// Create an empty surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a binding. The last writer wins.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if self.values.insert(name.clone(), value).is_some() {
            debug!("Binding '{}' overridden", name);
        }
    }

    /// Current value of a binding.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Bound names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Install every binding as a global of `lua`.
    pub fn apply(self, lua: &Lua) -> Result<()> {
        let globals = lua.globals();
        for (name, value) in self.values {
            globals.set(name, value)?;
        }
        Ok(())
    }
}

/// Contributes values to a script's global scope.
pub trait BindingsSupplier {
    /// Add bindings for `script`, which is loaded but has not run yet.
    fn supply_bindings(&self, script: &ScriptInstance, bindings: &mut Bindings) -> Result<()>;
}

/// Run suppliers in order and install the result.
pub fn supply_all(
    suppliers: &[Box<dyn BindingsSupplier>],
    script: &ScriptInstance,
) -> Result<usize> {
    let mut bindings = Bindings::new();
    for supplier in suppliers {
        supplier.supply_bindings(script, &mut bindings)?;
    }
    let count = bindings.len();
    bindings.apply(script.lua())?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct Constant(&'static str, i64);

    impl BindingsSupplier for Constant {
        fn supply_bindings(&self, _script: &ScriptInstance, bindings: &mut Bindings) -> Result<()> {
            bindings.set(self.0, Value::Integer(self.1));
            Ok(())
        }
    }

    fn instance() -> ScriptInstance {
        ScriptInstance::new("test.lua", PathBuf::from("scripts/test.lua"), "hash")
    }

    #[test]
    fn test_last_writer_wins() {
        let script = instance();
        let suppliers: Vec<Box<dyn BindingsSupplier>> = vec![
            Box::new(Constant("answer", 1)),
            Box::new(Constant("other", 7)),
            Box::new(Constant("answer", 42)),
        ];

        assert_eq!(supply_all(&suppliers, &script).unwrap(), 2);
        assert_eq!(script.lua().globals().get::<i64>("answer").unwrap(), 42);
        assert_eq!(script.lua().globals().get::<i64>("other").unwrap(), 7);
    }

    #[test]
    fn test_bindings_surface() {
        let mut bindings = Bindings::new();
        assert!(bindings.is_empty());

        bindings.set("b", Value::Boolean(true));
        bindings.set("a", Value::Nil);

        assert_eq!(bindings.names(), vec!["a", "b"]);
        assert!(bindings.contains("b"));
        assert!(matches!(bindings.get("b"), Some(Value::Boolean(true))));
        assert!(bindings.get("c").is_none());
    }
}
