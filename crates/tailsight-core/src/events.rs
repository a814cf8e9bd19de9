//! Trigger event, in-process event bus and the emission layer.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::collections::map::HashMap;
use crate::dom::{ElementId, EventTarget, Host};

/// Event type name dispatched for every trigger.
pub const LAST_ELEMENT_VISIBLE: &str = "lastElementVisible";

/// Opaque identifier of a controller instance, for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trigger-{}", self.0)
    }
}

/// Payload of a `lastElementVisible` event.
///
/// Bubbles, crosses shadow boundaries and is cancelable.
#[derive(Debug)]
pub struct LastElementVisible {
    pub element: ElementId,
    pub manager: InstanceId,
    pub timestamp: Duration,
    default_prevented: Cell<bool>,
}

impl LastElementVisible {
    pub fn new(element: ElementId, manager: InstanceId, timestamp: Duration) -> Self {
        Self {
            element,
            manager,
            timestamp,
            default_prevented: Cell::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        LAST_ELEMENT_VISIBLE
    }

    pub fn bubbles(&self) -> bool {
        true
    }

    pub fn composed(&self) -> bool {
        true
    }

    pub fn cancelable(&self) -> bool {
        true
    }

    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }
}

pub type Listener = Rc<dyn Fn(&LastElementVisible)>;

/// Listener table keyed by target.
///
/// Dispatch iterates a snapshot: listeners added during a dispatch are not
/// called until the next one, and listeners removed during a dispatch still
/// see the current event.
#[derive(Default)]
pub struct EventBus {
    listeners: RefCell<HashMap<EventTarget, Vec<(u64, Listener)>>>,
    next_id: Cell<u64>,
    dispatched: Cell<u64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, target: EventTarget, listener: Listener) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.listeners
            .borrow_mut()
            .entry(target)
            .or_default()
            .push((id, listener));
        id
    }

    /// Safe to call for unknown ids.
    pub fn remove_listener(&self, target: EventTarget, id: u64) {
        let mut listeners = self.listeners.borrow_mut();
        if let Some(list) = listeners.get_mut(&target) {
            list.retain(|(listener_id, _)| *listener_id != id);
            if list.is_empty() {
                listeners.remove(&target);
            }
        }
    }

    pub fn listener_count(&self, target: EventTarget) -> usize {
        self.listeners
            .borrow()
            .get(&target)
            .map_or(0, |list| list.len())
    }

    /// Total number of dispatches, across all targets.
    pub fn dispatch_count(&self) -> u64 {
        self.dispatched.get()
    }

    /// Calls every listener on `target`. Returns `false` if one of them
    /// called [`LastElementVisible::prevent_default`].
    pub fn dispatch(&self, target: EventTarget, event: &LastElementVisible) -> bool {
        let snapshot: Vec<Listener> = self
            .listeners
            .borrow()
            .get(&target)
            .map(|list| list.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();
        self.dispatched.set(self.dispatched.get() + 1);
        for listener in snapshot {
            listener(event);
        }
        !event.default_prevented()
    }

    /// Registers `handler` and returns a handle that removes it.
    pub fn subscribe(
        self: &Rc<Self>,
        handler: impl Fn(&LastElementVisible) + 'static,
        options: SubscribeOptions,
    ) -> Subscription {
        let target = options.target.unwrap_or(EventTarget::Document);
        if options.signal.as_ref().is_some_and(AbortSignal::is_aborted) {
            return Subscription {
                bus: Weak::new(),
                target,
                id: 0,
            };
        }
        let id = self.add_listener(target, Rc::new(handler));
        if let Some(signal) = options.signal {
            let bus = Rc::downgrade(self);
            signal.on_abort(move || {
                if let Some(bus) = bus.upgrade() {
                    bus.remove_listener(target, id);
                }
            });
        }
        Subscription {
            bus: Rc::downgrade(self),
            target,
            id,
        }
    }
}

/// Options for [`EventBus::subscribe`].
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    /// Where to listen. Defaults to the document.
    pub target: Option<EventTarget>,
    /// Removes the listener when aborted.
    pub signal: Option<AbortSignal>,
}

impl SubscribeOptions {
    pub fn on(target: EventTarget) -> Self {
        Self {
            target: Some(target),
            signal: None,
        }
    }

    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[must_use = "dropping the handle keeps the listener registered"]
pub struct Subscription {
    bus: Weak<EventBus>,
    target: EventTarget,
    id: u64,
}

impl Subscription {
    /// Removes the listener. Idempotent.
    pub fn unsubscribe(&self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove_listener(self.target, self.id);
        }
    }

    pub fn target(&self) -> EventTarget {
        self.target
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("target", &self.target)
            .field("id", &self.id)
            .finish()
    }
}

#[derive(Default)]
struct AbortState {
    aborted: Cell<bool>,
    callbacks: RefCell<Vec<Box<dyn FnOnce()>>>,
}

/// Cancellation token for subscriptions.
#[derive(Clone, Default)]
pub struct AbortSignal {
    state: Rc<AbortState>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_aborted(&self) -> bool {
        self.state.aborted.get()
    }

    /// Runs `callback` on abort, or right away if already aborted.
    pub fn on_abort(&self, callback: impl FnOnce() + 'static) {
        if self.is_aborted() {
            callback();
        } else {
            self.state.callbacks.borrow_mut().push(Box::new(callback));
        }
    }

    pub fn abort(&self) {
        if self.state.aborted.replace(true) {
            return;
        }
        let callbacks = std::mem::take(&mut *self.state.callbacks.borrow_mut());
        for callback in callbacks {
            callback();
        }
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

/// Dispatches `event` on the root of the element's tree and, when set and
/// different, on `global_target`. Returns the targets that received it.
pub(crate) fn emit_trigger(
    bus: &EventBus,
    host: &dyn Host,
    global_target: Option<EventTarget>,
    event: &LastElementVisible,
) -> Vec<EventTarget> {
    let root = host.tree_root(event.element);
    let mut targets = vec![root];
    bus.dispatch(root, event);
    if let Some(global) = global_target.filter(|g| *g != root) {
        bus.dispatch(global, event);
        targets.push(global);
    }
    log::trace!(
        "{} dispatched {} for element #{} on {:?}",
        event.manager,
        LAST_ELEMENT_VISIBLE,
        event.element,
        targets
    );
    targets
}
