//! Host event subsystem.
//!
//! The bridge only needs [`EventBus`]: validate an event type, subscribe a
//! callback at an [`Order`], and unsubscribe it again. [`SimpleEventBus`] is
//! the in-process implementation used by the bundled host and the tests.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use mlua::{MetaMethod, UserData, UserDataFields, UserDataMethods};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::{BridgeError, Result};

/// Position of a listener in the delivery sequence of an event.
///
/// Listeners run from [`Order::Pre`] to [`Order::Post`]; listeners with the
/// same order run in subscription order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Order {
    Pre,
    AfterPre,
    First,
    Early,
    #[default]
    Default,
    Late,
    Last,
    BeforePost,
    Post,
}

impl Order {
    /// Every order, in delivery sequence.
    pub const ALL: [Order; 9] = [
        Order::Pre,
        Order::AfterPre,
        Order::First,
        Order::Early,
        Order::Default,
        Order::Late,
        Order::Last,
        Order::BeforePost,
        Order::Post,
    ];

    /// Upper-case name, as exposed in the script `Order` table.
    pub fn name(self) -> &'static str {
        match self {
            Order::Pre => "PRE",
            Order::AfterPre => "AFTER_PRE",
            Order::First => "FIRST",
            Order::Early => "EARLY",
            Order::Default => "DEFAULT",
            Order::Late => "LATE",
            Order::Last => "LAST",
            Order::BeforePost => "BEFORE_POST",
            Order::Post => "POST",
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Order {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Order::ALL
            .into_iter()
            .find(|order| order.name() == normalized)
            .ok_or_else(|| BridgeError::InvalidArgument(format!("unknown order '{s}'")))
    }
}

impl UserData for Order {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("name", |_, this| Ok(this.name()));
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| Ok(this.name()));
        methods.add_meta_method(MetaMethod::Eq, |_, this, other: mlua::AnyUserData| {
            Ok(other.borrow::<Order>().map(|o| *o == *this).unwrap_or(false))
        });
    }
}

/// An event fired by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event category name.
    pub event_type: String,
    /// Event payload.
    pub data: JsonValue,
}

impl Event {
    /// Create an event with a payload.
    pub fn new(event_type: impl Into<String>, data: JsonValue) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    /// Create an event without a payload.
    pub fn bare(event_type: impl Into<String>) -> Self {
        Self::new(event_type, JsonValue::Null)
    }
}

/// Identifier of an event subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub_{}", self.0)
    }
}

/// Native listener callback.
pub type EventCallback = Rc<dyn Fn(&Event) -> Result<()>>;

/// The host event subsystem as seen by the bridge.
pub trait EventBus {
    /// Whether `event_type` names an event category this bus delivers.
    fn is_known(&self, event_type: &str) -> bool;

    /// Subscribe `callback` to `event_type` at `order`.
    fn subscribe(
        &self,
        event_type: &str,
        order: Order,
        callback: EventCallback,
    ) -> Result<SubscriptionId>;

    /// Remove a subscription.
    ///
    /// Fails with [`BridgeError::NativeRegistration`] if the subscription
    /// does not exist.
    fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;
}

struct Subscription {
    id: SubscriptionId,
    event_type: String,
    order: Order,
    callback: EventCallback,
}

/// Single-threaded event bus with a fixed set of event categories.
pub struct SimpleEventBus {
    event_types: RefCell<BTreeSet<String>>,
    subscriptions: RefCell<Vec<Subscription>>,
    next_id: Cell<u64>,
}

impl fmt::Debug for SimpleEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleEventBus")
            .field("event_types", &self.event_types.borrow())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

impl SimpleEventBus {
    /// Create a bus delivering the given event categories.
    pub fn new<I, S>(event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            event_types: RefCell::new(event_types.into_iter().map(Into::into).collect()),
            subscriptions: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }

    /// Add an event category.
    pub fn add_event_type(&self, event_type: impl Into<String>) {
        self.event_types.borrow_mut().insert(event_type.into());
    }

    /// Known event categories, sorted.
    pub fn event_types(&self) -> Vec<String> {
        self.event_types.borrow().iter().cloned().collect()
    }

    /// Total number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    /// Number of live subscriptions for one event category.
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.subscriptions
            .borrow()
            .iter()
            .filter(|s| s.event_type == event_type)
            .count()
    }

    /// Order a subscription was registered at.
    pub fn order_of(&self, id: SubscriptionId) -> Option<Order> {
        self.subscriptions
            .borrow()
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.order)
    }

    /// Deliver an event to its subscribers.
    ///
    /// Returns the number of callbacks that completed successfully. A failing
    /// callback is logged and does not stop delivery to the rest.
    pub fn post(&self, event: &Event) -> Result<usize> {
        if !self.is_known(&event.event_type) {
            return Err(BridgeError::NotFound(format!(
                "event type '{}'",
                event.event_type
            )));
        }

        // Callbacks may subscribe or unsubscribe, so the borrow ends here.
        let callbacks: Vec<(SubscriptionId, EventCallback)> = {
            let subs = self.subscriptions.borrow();
            let mut matching: Vec<&Subscription> = subs
                .iter()
                .filter(|s| s.event_type == event.event_type)
                .collect();
            matching.sort_by_key(|s| (s.order, s.id));
            matching
                .into_iter()
                .map(|s| (s.id, Rc::clone(&s.callback)))
                .collect()
        };

        let mut delivered = 0;
        for (id, callback) in callbacks {
            match callback(event) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    "Listener {} for '{}' failed: {}",
                    id, event.event_type, e
                ),
            }
        }

        Ok(delivered)
    }
}

impl EventBus for SimpleEventBus {
    fn is_known(&self, event_type: &str) -> bool {
        self.event_types.borrow().contains(event_type)
    }

    fn subscribe(
        &self,
        event_type: &str,
        order: Order,
        callback: EventCallback,
    ) -> Result<SubscriptionId> {
        if !self.is_known(event_type) {
            return Err(BridgeError::NativeRegistration(format!(
                "unknown event type '{event_type}'"
            )));
        }

        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        self.subscriptions.borrow_mut().push(Subscription {
            id,
            event_type: event_type.to_string(),
            order,
            callback,
        });

        debug!("Subscribed {} to '{}' at {}", id, event_type, order);
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let mut subs = self.subscriptions.borrow_mut();
        let idx = subs
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| BridgeError::NativeRegistration(format!("{id} is not subscribed")))?;
        let removed = subs.remove(idx);
        debug!("Unsubscribed {} from '{}'", id, removed.event_type);
        Ok(())
    }
}
