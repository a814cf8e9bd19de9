use std::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;

use super::{AdapterContext, AdapterKind, ObservationAdapter, SignalSink, ViewportProbe};
use crate::dom::{ElementId, Host, HostCallback, HostEvent, ListenerId};
use crate::scheduler::{Scheduler, TaskSlot, Wait};

struct PollingState {
    host: Rc<dyn Host>,
    scheduler: Rc<dyn Scheduler>,
    probe: Rc<ViewportProbe>,
    sink: SignalSink,
    target: Option<ElementId>,
    listeners: SmallVec<[ListenerId; 2]>,
    frame: TaskSlot,
}

/// Fallback for hosts without an intersection observer.
///
/// Listens passively to scroll on the container (or window) and to window
/// resize, and re-checks the target's geometry at most once per animation
/// frame.
pub struct PollingAdapter {
    state: Rc<RefCell<PollingState>>,
}

impl PollingAdapter {
    pub fn new(context: AdapterContext) -> Self {
        Self {
            state: Rc::new(RefCell::new(PollingState {
                host: context.host,
                scheduler: context.scheduler,
                probe: context.probe,
                sink: context.sink,
                target: None,
                listeners: SmallVec::new(),
                frame: TaskSlot::default(),
            })),
        }
    }

    fn attach_listeners(&self) {
        let mut state = self.state.borrow_mut();
        if !state.listeners.is_empty() {
            return;
        }
        let weak = Rc::downgrade(&self.state);
        let on_event: HostCallback = Rc::new(move || {
            if let Some(state) = weak.upgrade() {
                schedule_tick(&state);
            }
        });
        let host = state.host.clone();
        let passive = host.capabilities().passive_listeners;
        let scroll_target = host.scroll_target(state.probe.container());
        for (target, event) in [
            (scroll_target, HostEvent::Scroll),
            (crate::dom::EventTarget::Window, HostEvent::Resize),
        ] {
            match host.add_listener(target, event, passive, on_event.clone()) {
                Ok(id) => state.listeners.push(id),
                Err(err) => log::debug!("polling listener for {} not installed: {err}", event.as_str()),
            }
        }
    }
}

fn schedule_tick(shared: &Rc<RefCell<PollingState>>) {
    let mut state = shared.borrow_mut();
    if state.target.is_none() || state.frame.is_live() {
        return;
    }
    let weak = Rc::downgrade(shared);
    let scheduler = state.scheduler.clone();
    state.frame.arm(&*scheduler, Wait::Frame, move |generation| {
        Box::new(move || {
            if let Some(state) = weak.upgrade() {
                tick(&state, generation);
            }
        })
    });
}

fn tick(shared: &Rc<RefCell<PollingState>>, generation: u64) {
    let (target, probe, sink) = {
        let mut state = shared.borrow_mut();
        if !state.frame.claim(generation) {
            return;
        }
        let Some(target) = state.target else {
            return;
        };
        (target, state.probe.clone(), state.sink.clone())
    };
    if probe.check(target) {
        sink(target);
    }
}

impl ObservationAdapter for PollingAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Polling
    }

    fn target(&self) -> Option<ElementId> {
        self.state.borrow().target
    }

    fn observe(&mut self, element: ElementId) -> bool {
        if self.target() == Some(element) {
            return true;
        }
        self.unobserve();
        if !self.state.borrow().host.is_attached(element) {
            log::trace!("refusing to poll detached element #{element}");
            return false;
        }
        self.state.borrow_mut().target = Some(element);
        self.attach_listeners();
        // The element may already be inside the margin; check on the next frame.
        schedule_tick(&self.state);
        true
    }

    fn unobserve(&mut self) {
        let mut state = self.state.borrow_mut();
        state.target = None;
        let scheduler = state.scheduler.clone();
        state.frame.cancel(&*scheduler);
    }

    fn disconnect(&mut self) {
        self.unobserve();
        let mut state = self.state.borrow_mut();
        let host = state.host.clone();
        for id in state.listeners.drain(..) {
            host.remove_listener(id);
        }
    }
}
