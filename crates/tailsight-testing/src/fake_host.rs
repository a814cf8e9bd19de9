//! A simulated document for driving controllers without a browser.
//!
//! Elements are boxes in content coordinates of their scroller (the document
//! or a container element). Scrolling, resizing and visibility changes queue
//! platform events; nothing reaches a listener or observer until
//! [`FakeHost::flush`], mirroring the browser's asynchronous delivery.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use tailsight_core::{
    is_within_margin, Capabilities, ElementId, EventTarget, Host, HostCallback, HostError,
    HostEvent, IntersectionCallback, IntersectionEntry, IntersectionInit,
    IntersectionObserverHandle, ListenerId, Rect, ResizeCallback, ResizeObserverHandle,
};

const DOCUMENT_ELEMENT: ElementId = ElementId(1);

struct FakeElement {
    /// Box relative to the scroller's content origin.
    rect: Rect,
    scroller: Option<ElementId>,
    attached: bool,
    tree_root: EventTarget,
    scroll_top: f64,
}

struct FakeListener {
    target: EventTarget,
    event: HostEvent,
    passive: bool,
    callback: HostCallback,
}

struct FakeIntersectionObserver {
    init: IntersectionInit,
    callback: IntersectionCallback,
    /// Last reported state per target; `None` until the initial report.
    targets: BTreeMap<ElementId, Option<bool>>,
}

struct FakeResizeObserver {
    callback: ResizeCallback,
    targets: Vec<ElementId>,
}

struct DocumentState {
    next_id: u64,
    viewport_width: f64,
    viewport_height: f64,
    scroll_y: f64,
    hidden: bool,
    capabilities: Capabilities,
    fail_intersection_observer: bool,
    fail_observe: bool,
    elements: BTreeMap<ElementId, FakeElement>,
    listeners: BTreeMap<u64, FakeListener>,
    intersection_observers: BTreeMap<u64, FakeIntersectionObserver>,
    resize_observers: BTreeMap<u64, FakeResizeObserver>,
    pending_events: Vec<(EventTarget, HostEvent)>,
    pending_resizes: Vec<ElementId>,
    observers_created: u64,
}

impl DocumentState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn viewport(&self) -> Rect {
        Rect::new(0.0, 0.0, self.viewport_width, self.viewport_height)
    }

    fn is_attached(&self, element: ElementId) -> bool {
        if element == DOCUMENT_ELEMENT {
            return true;
        }
        match self.elements.get(&element) {
            Some(el) if el.attached => el.scroller.map_or(true, |scroller| self.is_attached(scroller)),
            _ => false,
        }
    }

    fn bounding_rect(&self, element: ElementId) -> Option<Rect> {
        if element == DOCUMENT_ELEMENT {
            return Some(self.viewport());
        }
        if !self.is_attached(element) {
            return None;
        }
        let el = self.elements.get(&element)?;
        match el.scroller {
            None => Some(el.rect.translate(0.0, -self.scroll_y)),
            Some(scroller) => {
                let parent = self.bounding_rect(scroller)?;
                let offset = self.elements.get(&scroller).map_or(0.0, |s| s.scroll_top);
                Some(el.rect.translate(parent.x, parent.y - offset))
            }
        }
    }

    fn root_rect(&self, root: Option<ElementId>) -> Rect {
        root.and_then(|root| self.bounding_rect(root))
            .unwrap_or_else(|| self.viewport())
    }

    fn intersection_entry(
        &self,
        observer: &FakeIntersectionObserver,
        target: ElementId,
    ) -> IntersectionEntry {
        let root = self.root_rect(observer.init.root);
        let Some(rect) = self.bounding_rect(target) else {
            return IntersectionEntry {
                target,
                is_intersecting: false,
                intersection_ratio: 0.0,
            };
        };
        let touching = is_within_margin(&rect, &root, &observer.init.root_margin, true);
        let expanded = root.expand(&observer.init.root_margin.resolve(&root));
        let ratio = visible_ratio(&rect, &expanded);
        let min_threshold = observer.init.thresholds.first().copied().unwrap_or(0.0);
        IntersectionEntry {
            target,
            is_intersecting: touching && (min_threshold <= 0.0 || ratio >= min_threshold),
            intersection_ratio: ratio,
        }
    }
}

fn visible_ratio(target: &Rect, root: &Rect) -> f64 {
    let area = target.width * target.height;
    if area <= 0.0 {
        return if target.touches(root) { 1.0 } else { 0.0 };
    }
    let width = (target.right().min(root.right()) - target.left().max(root.left())).max(0.0);
    let height = (target.bottom().min(root.bottom()) - target.top().max(root.top())).max(0.0);
    (width * height / area).clamp(0.0, 1.0)
}

/// In-memory [`Host`].
#[derive(Clone)]
pub struct FakeHost {
    state: Rc<RefCell<DocumentState>>,
}

impl FakeHost {
    pub fn new(viewport_width: f64, viewport_height: f64) -> Self {
        Self {
            state: Rc::new(RefCell::new(DocumentState {
                next_id: DOCUMENT_ELEMENT.0,
                viewport_width,
                viewport_height,
                scroll_y: 0.0,
                hidden: false,
                capabilities: Capabilities::full(),
                fail_intersection_observer: false,
                fail_observe: false,
                elements: BTreeMap::new(),
                listeners: BTreeMap::new(),
                intersection_observers: BTreeMap::new(),
                resize_observers: BTreeMap::new(),
                pending_events: Vec::new(),
                pending_resizes: Vec::new(),
                observers_created: 0,
            })),
        }
    }

    pub fn set_capabilities(&self, capabilities: Capabilities) {
        self.state.borrow_mut().capabilities = capabilities;
    }

    /// Makes intersection observer construction fail while the capability is
    /// still advertised.
    pub fn fail_intersection_observer(&self, fail: bool) {
        self.state.borrow_mut().fail_intersection_observer = fail;
    }

    /// Makes every observer reject new targets as detached, as if the node
    /// left the tree between the attachment check and the observe call.
    pub fn fail_observe(&self, fail: bool) {
        self.state.borrow_mut().fail_observe = fail;
    }

    /// Adds a box to the document, in document content coordinates.
    pub fn create_element(&self, rect: Rect) -> ElementId {
        self.insert_element(rect, None)
    }

    /// Adds a box inside the scroll container `scroller`.
    pub fn create_element_in(&self, scroller: ElementId, rect: Rect) -> ElementId {
        self.insert_element(rect, Some(scroller).filter(|s| *s != DOCUMENT_ELEMENT))
    }

    fn insert_element(&self, rect: Rect, scroller: Option<ElementId>) -> ElementId {
        let mut state = self.state.borrow_mut();
        let id = ElementId(state.allocate());
        state.elements.insert(
            id,
            FakeElement {
                rect,
                scroller,
                attached: true,
                tree_root: EventTarget::Document,
                scroll_top: 0.0,
            },
        );
        id
    }

    pub fn set_rect(&self, element: ElementId, rect: Rect) {
        let mut state = self.state.borrow_mut();
        if let Some(el) = state.elements.get_mut(&element) {
            el.rect = rect;
            state.pending_resizes.push(element);
        }
    }

    pub fn detach(&self, element: ElementId) {
        if let Some(el) = self.state.borrow_mut().elements.get_mut(&element) {
            el.attached = false;
        }
    }

    pub fn attach(&self, element: ElementId) {
        if let Some(el) = self.state.borrow_mut().elements.get_mut(&element) {
            el.attached = true;
        }
    }

    /// Puts `element` in a shadow tree whose root is `root`.
    pub fn set_tree_root(&self, element: ElementId, root: EventTarget) {
        if let Some(el) = self.state.borrow_mut().elements.get_mut(&element) {
            el.tree_root = root;
        }
    }

    pub fn scroll_y(&self) -> f64 {
        self.state.borrow().scroll_y
    }

    /// Scrolls the document. A window scroll event is queued only if the
    /// position changed.
    pub fn scroll_to(&self, y: f64) {
        let mut state = self.state.borrow_mut();
        let y = y.max(0.0);
        if state.scroll_y != y {
            state.scroll_y = y;
            state.pending_events.push((EventTarget::Window, HostEvent::Scroll));
        }
    }

    /// Scrolls a container element, queueing a scroll event on it if the
    /// position changed.
    pub fn scroll_element_to(&self, scroller: ElementId, top: f64) {
        let mut state = self.state.borrow_mut();
        let top = top.max(0.0);
        let moved = match state.elements.get_mut(&scroller) {
            Some(el) if el.scroll_top != top => {
                el.scroll_top = top;
                true
            }
            _ => false,
        };
        if moved {
            state
                .pending_events
                .push((EventTarget::Node(scroller), HostEvent::Scroll));
        }
    }

    /// Resizes the viewport, queueing a window resize event and a resize
    /// notification for the document element.
    pub fn resize_viewport(&self, width: f64, height: f64) {
        let mut state = self.state.borrow_mut();
        state.viewport_width = width;
        state.viewport_height = height;
        state.pending_events.push((EventTarget::Window, HostEvent::Resize));
        state.pending_resizes.push(DOCUMENT_ELEMENT);
    }

    pub fn set_hidden(&self, hidden: bool) {
        let mut state = self.state.borrow_mut();
        if state.hidden != hidden {
            state.hidden = hidden;
            state
                .pending_events
                .push((EventTarget::Document, HostEvent::VisibilityChange));
        }
    }

    pub fn page_hide(&self) {
        self.state
            .borrow_mut()
            .pending_events
            .push((EventTarget::Window, HostEvent::PageHide));
    }

    pub fn listener_count(&self, event: HostEvent) -> usize {
        self.state
            .borrow()
            .listeners
            .values()
            .filter(|listener| listener.event == event)
            .count()
    }

    pub fn passive_listener_count(&self) -> usize {
        self.state
            .borrow()
            .listeners
            .values()
            .filter(|listener| listener.passive)
            .count()
    }

    pub fn intersection_observer_count(&self) -> usize {
        self.state.borrow().intersection_observers.len()
    }

    /// Total observers ever built, including disconnected ones.
    pub fn intersection_observers_created(&self) -> u64 {
        self.state.borrow().observers_created
    }

    pub fn resize_observer_count(&self) -> usize {
        self.state.borrow().resize_observers.len()
    }

    /// Every element currently observed by a live intersection observer.
    pub fn observed_elements(&self) -> Vec<ElementId> {
        self.state
            .borrow()
            .intersection_observers
            .values()
            .flat_map(|observer| observer.targets.keys().copied())
            .collect()
    }

    pub fn has_pending(&self) -> bool {
        let state = self.state.borrow();
        !state.pending_events.is_empty()
            || !state.pending_resizes.is_empty()
            || state.intersection_observers.values().any(|observer| {
                observer.targets.iter().any(|(target, last)| {
                    let current = state.intersection_entry(observer, *target).is_intersecting;
                    *last != Some(current)
                })
            })
    }

    /// Delivers queued events, resize notifications and intersection
    /// changes. Callbacks run with no internal borrow held.
    pub fn flush(&self) {
        let events = std::mem::take(&mut self.state.borrow_mut().pending_events);
        for (target, event) in events {
            let callbacks: Vec<HostCallback> = self
                .state
                .borrow()
                .listeners
                .values()
                .filter(|listener| listener.target == target && listener.event == event)
                .map(|listener| listener.callback.clone())
                .collect();
            for callback in callbacks {
                callback();
            }
        }

        let resized = std::mem::take(&mut self.state.borrow_mut().pending_resizes);
        if !resized.is_empty() {
            let deliveries: Vec<(ResizeCallback, Vec<ElementId>)> = self
                .state
                .borrow()
                .resize_observers
                .values()
                .filter_map(|observer| {
                    let hits: Vec<ElementId> = observer
                        .targets
                        .iter()
                        .copied()
                        .filter(|target| resized.contains(target))
                        .collect();
                    (!hits.is_empty()).then(|| (observer.callback.clone(), hits))
                })
                .collect();
            for (callback, hits) in deliveries {
                callback(&hits);
            }
        }

        let deliveries: Vec<(IntersectionCallback, Vec<IntersectionEntry>)> = {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;
            let mut deliveries = Vec::new();
            let ids: Vec<u64> = state.intersection_observers.keys().copied().collect();
            for id in ids {
                let Some(observer) = state.intersection_observers.get(&id) else {
                    continue;
                };
                let entries: Vec<IntersectionEntry> = observer
                    .targets
                    .iter()
                    .map(|(target, last)| (state.intersection_entry(observer, *target), *last))
                    .filter(|(entry, last)| *last != Some(entry.is_intersecting))
                    .map(|(entry, _)| entry)
                    .collect();
                if entries.is_empty() {
                    continue;
                }
                let callback = observer.callback.clone();
                if let Some(observer) = state.intersection_observers.get_mut(&id) {
                    for entry in &entries {
                        observer.targets.insert(entry.target, Some(entry.is_intersecting));
                    }
                }
                deliveries.push((callback, entries));
            }
            deliveries
        };
        for (callback, entries) in deliveries {
            callback(&entries);
        }
    }
}

impl Host for FakeHost {
    fn capabilities(&self) -> Capabilities {
        self.state.borrow().capabilities
    }

    fn is_attached(&self, element: ElementId) -> bool {
        self.state.borrow().is_attached(element)
    }

    fn bounding_rect(&self, element: ElementId) -> Option<Rect> {
        self.state.borrow().bounding_rect(element)
    }

    fn viewport_rect(&self) -> Rect {
        self.state.borrow().viewport()
    }

    fn document_element(&self) -> ElementId {
        DOCUMENT_ELEMENT
    }

    fn tree_root(&self, element: ElementId) -> EventTarget {
        self.state
            .borrow()
            .elements
            .get(&element)
            .map_or(EventTarget::Document, |el| el.tree_root)
    }

    fn is_document_hidden(&self) -> bool {
        self.state.borrow().hidden
    }

    fn create_intersection_observer(
        &self,
        init: &IntersectionInit,
        callback: IntersectionCallback,
    ) -> Result<Box<dyn IntersectionObserverHandle>, HostError> {
        let mut state = self.state.borrow_mut();
        if !state.capabilities.intersection_observer {
            return Err(HostError::Unsupported("IntersectionObserver"));
        }
        if state.fail_intersection_observer {
            return Err(HostError::Platform("observer construction failed".into()));
        }
        let id = state.allocate();
        state.observers_created += 1;
        state.intersection_observers.insert(
            id,
            FakeIntersectionObserver {
                init: init.clone(),
                callback,
                targets: BTreeMap::new(),
            },
        );
        Ok(Box::new(FakeIntersectionHandle {
            state: Rc::downgrade(&self.state),
            id,
        }))
    }

    fn create_resize_observer(
        &self,
        callback: ResizeCallback,
    ) -> Result<Box<dyn ResizeObserverHandle>, HostError> {
        let mut state = self.state.borrow_mut();
        if !state.capabilities.resize_observer {
            return Err(HostError::Unsupported("ResizeObserver"));
        }
        let id = state.allocate();
        state.resize_observers.insert(
            id,
            FakeResizeObserver {
                callback,
                targets: Vec::new(),
            },
        );
        Ok(Box::new(FakeResizeHandle {
            state: Rc::downgrade(&self.state),
            id,
        }))
    }

    fn add_listener(
        &self,
        target: EventTarget,
        event: HostEvent,
        passive: bool,
        callback: HostCallback,
    ) -> Result<ListenerId, HostError> {
        let mut state = self.state.borrow_mut();
        let passive = passive && state.capabilities.passive_listeners;
        let id = state.allocate();
        state.listeners.insert(
            id,
            FakeListener {
                target,
                event,
                passive,
                callback,
            },
        );
        Ok(ListenerId(id))
    }

    fn remove_listener(&self, id: ListenerId) {
        self.state.borrow_mut().listeners.remove(&id.0);
    }
}

struct FakeIntersectionHandle {
    state: Weak<RefCell<DocumentState>>,
    id: u64,
}

impl IntersectionObserverHandle for FakeIntersectionHandle {
    fn observe(&mut self, element: ElementId) -> Result<(), HostError> {
        let state = self
            .state
            .upgrade()
            .ok_or_else(|| HostError::Platform("document dropped".into()))?;
        let mut state = state.borrow_mut();
        if !state.is_attached(element) || state.fail_observe {
            return Err(HostError::Detached(element));
        }
        let observer = state
            .intersection_observers
            .get_mut(&self.id)
            .ok_or_else(|| HostError::Platform("observer disconnected".into()))?;
        observer.targets.entry(element).or_insert(None);
        Ok(())
    }

    fn unobserve(&mut self, element: ElementId) -> Result<(), HostError> {
        if let Some(state) = self.state.upgrade() {
            if let Some(observer) = state.borrow_mut().intersection_observers.get_mut(&self.id) {
                observer.targets.remove(&element);
            }
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.borrow_mut().intersection_observers.remove(&self.id);
        }
    }
}

impl Drop for FakeIntersectionHandle {
    fn drop(&mut self) {
        self.disconnect();
    }
}

struct FakeResizeHandle {
    state: Weak<RefCell<DocumentState>>,
    id: u64,
}

impl ResizeObserverHandle for FakeResizeHandle {
    fn observe(&mut self, element: ElementId) -> Result<(), HostError> {
        let state = self
            .state
            .upgrade()
            .ok_or_else(|| HostError::Platform("document dropped".into()))?;
        let mut state = state.borrow_mut();
        if !state.is_attached(element) {
            return Err(HostError::Detached(element));
        }
        if let Some(observer) = state.resize_observers.get_mut(&self.id) {
            if !observer.targets.contains(&element) {
                observer.targets.push(element);
            }
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.borrow_mut().resize_observers.remove(&self.id);
        }
    }
}

impl Drop for FakeResizeHandle {
    fn drop(&mut self) {
        self.disconnect();
    }
}
