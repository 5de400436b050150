//! Per-script resource tracking.
//!
//! Every native registration a script makes is paired with a [`Closable`]
//! that reverses it. The script's [`ClosableRegistry`] releases them all,
//! newest first, when the script unloads or is replaced by a reload.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use mlua::{AnyUserData, Function, MetaMethod, UserData, UserDataFields, UserDataMethods, Value};
use tracing::{debug, warn};

use crate::error::CleanupFailure;
use crate::{BridgeError, Result};

type CloseFn = Box<dyn FnOnce() -> Result<()>>;

struct ClosableInner {
    label: String,
    action: RefCell<Option<CloseFn>>,
    closed: Cell<bool>,
}

/// A one-shot cleanup action.
///
/// Clones share the action, so the copy held by a registry and the copy
/// handed back to a script release the same resource. The action runs at
/// most once no matter how many times [`close`](Closable::close) is called.
#[derive(Clone)]
pub struct Closable {
    inner: Rc<ClosableInner>,
}

impl fmt::Debug for Closable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closable")
            .field("label", &self.inner.label)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Closable {
    /// Wrap a cleanup action.
    pub fn new<F>(label: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        Self {
            inner: Rc::new(ClosableInner {
                label: label.into(),
                action: RefCell::new(Some(Box::new(action))),
                closed: Cell::new(false),
            }),
        }
    }

    /// Cleanup that calls a script function.
    pub fn from_lua_function(label: impl Into<String>, function: Function) -> Self {
        Self::new(label, move || {
            function.call::<()>(())?;
            Ok(())
        })
    }

    /// Description used in logs and failure reports.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Whether the action has already run.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    /// Run the action if it has not run yet.
    ///
    /// A failed action still counts as run and is not retried.
    pub fn close(&self) -> Result<()> {
        let action = self.inner.action.borrow_mut().take();
        match action {
            Some(action) => {
                self.inner.closed.set(true);
                action()
            }
            None => Ok(()),
        }
    }

    /// Whether two handles share the same action.
    pub fn same_as(&self, other: &Closable) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl UserData for Closable {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("label", |_, this| Ok(this.label().to_string()));
        fields.add_field_method_get("closed", |_, this| Ok(this.is_closed()));
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("close", |_, this, ()| this.close().map_err(BridgeError::into_lua));
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("Closable({})", this.label()))
        });
    }
}

/// Ordered set of cleanup actions owned by one script instance.
///
/// Once drained the registry stays closed: anything bound afterwards is
/// released on the spot.
#[derive(Default)]
pub struct ClosableRegistry {
    closables: RefCell<Vec<Closable>>,
    drained: Cell<bool>,
}

impl fmt::Debug for ClosableRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosableRegistry")
            .field("size", &self.len())
            .finish()
    }
}

impl ClosableRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `closable` and hand it back.
    ///
    /// On a drained registry the closable is closed immediately instead.
    pub fn bind(&self, closable: Closable) -> Closable {
        if self.drained.get() {
            warn!("Registry already drained, releasing '{}'", closable.label());
            if let Err(e) = closable.close() {
                warn!("Cleanup '{}' failed: {}", closable.label(), e);
            }
            return closable;
        }

        debug!("Bound closable '{}'", closable.label());
        let mut closables = self.closables.borrow_mut();
        closables.retain(|c| !c.is_closed());
        closables.push(closable.clone());
        closable
    }

    /// Whether [`drain`](Self::drain) has run.
    pub fn is_drained(&self) -> bool {
        self.drained.get()
    }

    /// Number of tracked closables that have not been closed.
    pub fn len(&self) -> usize {
        self.prune();
        self.closables.borrow().len()
    }

    /// Whether nothing live is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(&self) {
        self.closables.borrow_mut().retain(|c| !c.is_closed());
    }

    /// Release everything, newest first, and close the registry.
    ///
    /// Every action runs even when an earlier one fails. Returns how many
    /// actions ran, or [`BridgeError::Cleanup`] listing the failures once the
    /// whole drain has finished.
    pub fn drain(&self) -> Result<usize> {
        self.drained.set(true);
        let mut released = 0;
        let mut failures = Vec::new();

        loop {
            let closables = self.closables.take();
            if closables.is_empty() {
                break;
            }

            for closable in closables.iter().rev() {
                if closable.is_closed() {
                    continue;
                }
                released += 1;
                if let Err(e) = closable.close() {
                    warn!("Cleanup '{}' failed: {}", closable.label(), e);
                    failures.push(CleanupFailure {
                        label: closable.label().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(released)
        } else {
            Err(BridgeError::Cleanup(failures))
        }
    }
}

/// Script-facing view of a registry, bound as the `registry` global.
#[derive(Clone)]
pub struct RegistryHandle {
    registry: Rc<ClosableRegistry>,
    script: String,
}

impl RegistryHandle {
    /// Wrap the registry of the named script.
    pub fn new(registry: Rc<ClosableRegistry>, script: impl Into<String>) -> Self {
        Self {
            registry,
            script: script.into(),
        }
    }
}

impl UserData for RegistryHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        // registry:bind(function | closable) -> closable
        methods.add_method("bind", |_, this, value: Value| {
            let closable = match value {
                Value::Function(function) => Closable::from_lua_function(
                    format!("{} custom cleanup #{}", this.script, this.registry.len() + 1),
                    function,
                ),
                Value::UserData(ud) => closable_from_userdata(&ud)?,
                other => {
                    return Err(BridgeError::InvalidArgument(format!(
                        "registry:bind expects a function or closable, got {}",
                        other.type_name()
                    ))
                    .into_lua())
                }
            };
            Ok(this.registry.bind(closable))
        });

        methods.add_method("size", |_, this, ()| Ok(this.registry.len()));
    }
}

fn closable_from_userdata(ud: &AnyUserData) -> mlua::Result<Closable> {
    if let Ok(closable) = ud.borrow::<Closable>() {
        return Ok((*closable).clone());
    }
    if let Ok(handle) = ud.borrow::<super::registration::ListenerHandle>() {
        return Ok(handle.closable().clone());
    }
    if let Ok(handle) = ud.borrow::<super::registration::CommandHandle>() {
        return Ok(handle.closable().clone());
    }
    Err(BridgeError::InvalidArgument("userdata is not closable".to_string()).into_lua())
}
