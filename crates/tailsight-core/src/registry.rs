//! Live-instance registry for bulk teardown.
//!
//! The registry is a service owned by the application shell and handed to
//! controllers through [`Environment`](crate::Environment). Controllers add
//! themselves on construction (and on revival) and remove themselves on
//! cleanup; nothing else reads it.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::collections::map::HashMap;
use crate::controller::{PaginationTrigger, TriggerInner};
use crate::dom::{EventTarget, Host, HostCallback, HostEvent, ListenerId};
use crate::events::InstanceId;

#[derive(Default)]
struct RegistryState {
    live: HashMap<InstanceId, Weak<RefCell<TriggerInner>>>,
    unload_hook: Option<ListenerId>,
}

#[derive(Clone, Default)]
pub struct Registry {
    state: Rc<RefCell<RegistryState>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, id: InstanceId, inner: Weak<RefCell<TriggerInner>>) {
        let mut state = self.state.borrow_mut();
        state.live.retain(|_, inner| inner.strong_count() > 0);
        state.live.insert(id, inner);
    }

    pub(crate) fn remove(&self, id: InstanceId) {
        self.state.borrow_mut().live.remove(&id);
    }

    /// Number of registered instances that are still alive.
    pub fn len(&self) -> usize {
        self.state
            .borrow()
            .live
            .values()
            .filter(|inner| inner.strong_count() > 0)
            .count()
    }

    /// Number of entries held, dead or alive.
    pub fn entry_count(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.state
            .borrow()
            .live
            .get(&id)
            .is_some_and(|inner| inner.strong_count() > 0)
    }

    /// Forgets every instance without tearing it down.
    pub fn clear(&self) {
        self.state.borrow_mut().live.clear();
    }

    /// Cleans up every live instance. Returns how many were cleaned.
    pub fn cleanup_all(&self) -> usize {
        let live: Vec<_> = self
            .state
            .borrow_mut()
            .live
            .drain()
            .map(|(_, inner)| inner)
            .collect();
        let mut cleaned = 0;
        for inner in live {
            if let Some(inner) = inner.upgrade() {
                PaginationTrigger::from_inner(inner).cleanup();
                cleaned += 1;
            }
        }
        if cleaned > 0 {
            log::debug!("registry cleaned up {cleaned} trigger(s)");
        }
        cleaned
    }

    /// Runs [`cleanup_all`](Self::cleanup_all) when the page is hidden for
    /// unload. Installed at most once; returns `false` if already installed
    /// or the host refused the listener.
    pub fn install_unload_hook(&self, host: &dyn Host) -> bool {
        if self.state.borrow().unload_hook.is_some() {
            return false;
        }
        let weak = Rc::downgrade(&self.state);
        let callback: HostCallback = Rc::new(move || {
            if let Some(state) = weak.upgrade() {
                Registry { state }.cleanup_all();
            }
        });
        match host.add_listener(EventTarget::Window, HostEvent::PageHide, false, callback) {
            Ok(id) => {
                self.state.borrow_mut().unload_hook = Some(id);
                true
            }
            Err(err) => {
                log::warn!("page unload hook not installed: {err}");
                false
            }
        }
    }

    pub fn uninstall_unload_hook(&self, host: &dyn Host) {
        if let Some(id) = self.state.borrow_mut().unload_hook.take() {
            host.remove_listener(id);
        }
    }

    pub fn has_unload_hook(&self) -> bool {
        self.state.borrow().unload_hook.is_some()
    }
}
