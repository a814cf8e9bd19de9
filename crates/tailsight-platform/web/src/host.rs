use std::cell::{Cell, RefCell};
use std::rc::Rc;

use js_sys::{Array, Reflect, WeakMap};
use tailsight_core::collections::map::HashMap;
use tailsight_core::{
    Capabilities, ElementId, EventTarget, Host, HostCallback, HostError, HostEvent,
    IntersectionCallback, IntersectionEntry, IntersectionInit, IntersectionObserverHandle,
    ListenerId, Rect, ResizeCallback, ResizeObserverHandle,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    AddEventListenerOptions, Document, Element, IntersectionObserverEntry, IntersectionObserverInit,
    Node, ResizeObserverEntry, Window,
};

use crate::handles::HandleTable;

/// Node count below which the table is never pruned.
const PRUNE_FLOOR: usize = 256;

pub(crate) fn platform_error(err: JsValue) -> HostError {
    HostError::Platform(err.as_string().unwrap_or_else(|| format!("{err:?}")))
}

/// Drops `value` from a fresh task.
///
/// Listener and observer closures can be released from inside their own
/// invocation; wasm-bindgen must not free a closure that is still running.
pub(crate) fn release_later<T: 'static>(value: T) {
    let Some(window) = web_sys::window() else {
        return;
    };
    let release = Closure::once_into_js(move || drop(value));
    if let Err(err) =
        window.set_timeout_with_callback_and_timeout_and_arguments_0(release.unchecked_ref(), 0)
    {
        log::trace!("deferred release failed: {err:?}");
    }
}

/// DOM nodes known to the host, looked up both ways.
pub(crate) struct NodeTable {
    nodes: HandleTable<Node>,
    /// Node -> id, without keeping nodes alive.
    ids: WeakMap,
    prune_at: usize,
}

impl NodeTable {
    fn new() -> Self {
        Self {
            nodes: HandleTable::new(),
            ids: WeakMap::new(),
            prune_at: PRUNE_FLOOR,
        }
    }

    pub(crate) fn register(&mut self, node: &Node) -> ElementId {
        if let Some(id) = self.lookup(node) {
            return id;
        }
        if self.nodes.len() >= self.prune_at {
            let removed = self.prune();
            self.prune_at = (self.nodes.len() * 2).max(PRUNE_FLOOR);
            log::trace!("pruned {removed} detached nodes");
        }
        let id = self.nodes.insert(node.clone());
        self.ids.set(node, &JsValue::from_f64(id.0 as f64));
        id
    }

    pub(crate) fn lookup(&self, node: &Node) -> Option<ElementId> {
        let raw = self.ids.get(node).as_f64()?;
        let id = ElementId(raw as u64);
        self.nodes.contains(id).then_some(id)
    }

    pub(crate) fn node(&self, id: ElementId) -> Option<Node> {
        self.nodes.get(id).cloned()
    }

    pub(crate) fn element(&self, id: ElementId) -> Option<Element> {
        self.node(id)?.dyn_into::<Element>().ok()
    }

    /// Forgets nodes that left the document. The first registered node, the
    /// document element, is always kept.
    fn prune(&mut self) -> usize {
        self.nodes
            .retain(|id, node| id == ElementId(1) || node.is_connected())
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }
}

struct ListenerEntry {
    target: web_sys::EventTarget,
    event: &'static str,
    closure: Closure<dyn FnMut()>,
}

/// [`Host`] backed by the browser window this module runs in.
///
/// Elements are handed to the controller as [`ElementId`]s; register them
/// with [`register`](Self::register) first.
pub struct WebHost {
    window: Window,
    document: Document,
    root: Element,
    document_element: ElementId,
    capabilities: Capabilities,
    nodes: Rc<RefCell<NodeTable>>,
    listeners: RefCell<HashMap<u64, ListenerEntry>>,
    next_listener: Cell<u64>,
}

impl WebHost {
    pub fn new() -> Result<Self, HostError> {
        let window = web_sys::window().ok_or(HostError::Unsupported("window"))?;
        let document = window
            .document()
            .ok_or(HostError::Unsupported("document"))?;
        let root = document
            .document_element()
            .ok_or(HostError::Unsupported("document element"))?;
        let capabilities = probe_capabilities(&window, &document);
        log::debug!("web host capabilities: {capabilities:?}");

        let mut nodes = NodeTable::new();
        let document_element = nodes.register(&root);
        Ok(Self {
            window,
            document,
            root,
            document_element,
            capabilities,
            nodes: Rc::new(RefCell::new(nodes)),
            listeners: RefCell::new(HashMap::default()),
            next_listener: Cell::new(0),
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Handle for `element`; the same element always gets the same id.
    pub fn register(&self, element: &Element) -> ElementId {
        self.nodes.borrow_mut().register(element)
    }

    pub fn element(&self, id: ElementId) -> Option<Element> {
        self.nodes.borrow().element(id)
    }

    pub fn known_nodes(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// DOM object behind a bus target.
    pub(crate) fn dom_target(&self, target: EventTarget) -> Option<web_sys::EventTarget> {
        match target {
            EventTarget::Window => Some(self.window.clone().into()),
            EventTarget::Document => Some(self.document.clone().into()),
            EventTarget::Node(id) => self.nodes.borrow().node(id).map(Into::into),
        }
    }
}

fn has_property(object: &JsValue, name: &str) -> bool {
    Reflect::has(object, &JsValue::from_str(name)).unwrap_or(false)
}

fn probe_capabilities(window: &Window, document: &Document) -> Capabilities {
    Capabilities {
        intersection_observer: has_property(window, "IntersectionObserver"),
        resize_observer: has_property(window, "ResizeObserver"),
        animation_frame: has_property(window, "requestAnimationFrame"),
        passive_listeners: true,
        page_visibility: has_property(document, "hidden"),
    }
}

impl Host for WebHost {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn is_attached(&self, element: ElementId) -> bool {
        self.nodes
            .borrow()
            .node(element)
            .is_some_and(|node| node.is_connected())
    }

    fn bounding_rect(&self, element: ElementId) -> Option<Rect> {
        let element = self.element(element).filter(|e| e.is_connected())?;
        let rect = element.get_bounding_client_rect();
        Some(Rect::new(rect.x(), rect.y(), rect.width(), rect.height()))
    }

    fn viewport_rect(&self) -> Rect {
        Rect::new(
            0.0,
            0.0,
            self.root.client_width() as f64,
            self.root.client_height() as f64,
        )
    }

    fn document_element(&self) -> ElementId {
        self.document_element
    }

    fn tree_root(&self, element: ElementId) -> EventTarget {
        let Some(node) = self.nodes.borrow().node(element) else {
            return EventTarget::Document;
        };
        let root = node.get_root_node();
        if root.is_instance_of::<Document>() {
            EventTarget::Document
        } else {
            EventTarget::Node(self.nodes.borrow_mut().register(&root))
        }
    }

    fn is_document_hidden(&self) -> bool {
        self.document.hidden()
    }

    fn create_intersection_observer(
        &self,
        init: &IntersectionInit,
        callback: IntersectionCallback,
    ) -> Result<Box<dyn IntersectionObserverHandle>, HostError> {
        if !self.capabilities.intersection_observer {
            return Err(HostError::Unsupported("IntersectionObserver"));
        }
        let options = IntersectionObserverInit::new();
        options.set_root_margin(&init.root_margin.to_string());
        let thresholds: Array = init
            .thresholds
            .iter()
            .map(|ratio| JsValue::from_f64(*ratio))
            .collect();
        options.set_threshold(&thresholds);
        if let Some(root) = init.root {
            let root = self.element(root).ok_or(HostError::Detached(root))?;
            options.set_root(Some(&root));
        }

        let nodes = Rc::downgrade(&self.nodes);
        let closure = Closure::<dyn FnMut(Array)>::new(move |records: Array| {
            let Some(nodes) = nodes.upgrade() else {
                return;
            };
            let entries: Vec<IntersectionEntry> = {
                let nodes = nodes.borrow();
                records
                    .iter()
                    .filter_map(|record| {
                        let record: IntersectionObserverEntry = record.unchecked_into();
                        Some(IntersectionEntry {
                            target: nodes.lookup(&record.target())?,
                            is_intersecting: record.is_intersecting(),
                            intersection_ratio: record.intersection_ratio(),
                        })
                    })
                    .collect()
            };
            if !entries.is_empty() {
                callback(&entries);
            }
        });
        let observer = web_sys::IntersectionObserver::new_with_options(
            closure.as_ref().unchecked_ref(),
            &options,
        )
        .map_err(platform_error)?;

        Ok(Box::new(WebIntersectionObserver {
            observer,
            nodes: self.nodes.clone(),
            closure: Some(closure),
        }))
    }

    fn create_resize_observer(
        &self,
        callback: ResizeCallback,
    ) -> Result<Box<dyn ResizeObserverHandle>, HostError> {
        if !self.capabilities.resize_observer {
            return Err(HostError::Unsupported("ResizeObserver"));
        }
        let nodes = Rc::downgrade(&self.nodes);
        let closure = Closure::<dyn FnMut(Array)>::new(move |records: Array| {
            let Some(nodes) = nodes.upgrade() else {
                return;
            };
            let targets: Vec<ElementId> = {
                let nodes = nodes.borrow();
                records
                    .iter()
                    .filter_map(|record| {
                        let record: ResizeObserverEntry = record.unchecked_into();
                        nodes.lookup(&record.target())
                    })
                    .collect()
            };
            if !targets.is_empty() {
                callback(&targets);
            }
        });
        let observer = web_sys::ResizeObserver::new(closure.as_ref().unchecked_ref())
            .map_err(platform_error)?;

        Ok(Box::new(WebResizeObserver {
            observer,
            nodes: self.nodes.clone(),
            closure: Some(closure),
        }))
    }

    fn add_listener(
        &self,
        target: EventTarget,
        event: HostEvent,
        passive: bool,
        callback: HostCallback,
    ) -> Result<ListenerId, HostError> {
        let dom_target = self.dom_target(target).ok_or(match target {
            EventTarget::Node(id) => HostError::Detached(id),
            _ => HostError::Unsupported("event target"),
        })?;
        let closure = Closure::<dyn FnMut()>::new(move || callback());
        let options = AddEventListenerOptions::new();
        options.set_passive(passive);
        dom_target
            .add_event_listener_with_callback_and_add_event_listener_options(
                event.as_str(),
                closure.as_ref().unchecked_ref(),
                &options,
            )
            .map_err(platform_error)?;

        let id = self.next_listener.get() + 1;
        self.next_listener.set(id);
        self.listeners.borrow_mut().insert(
            id,
            ListenerEntry {
                target: dom_target,
                event: event.as_str(),
                closure,
            },
        );
        Ok(ListenerId(id))
    }

    fn remove_listener(&self, id: ListenerId) {
        let Some(entry) = self.listeners.borrow_mut().remove(&id.0) else {
            return;
        };
        if let Err(err) = entry
            .target
            .remove_event_listener_with_callback(entry.event, entry.closure.as_ref().unchecked_ref())
        {
            log::debug!("removing {} listener failed: {err:?}", entry.event);
        }
        release_later(entry.closure);
    }
}

struct WebIntersectionObserver {
    observer: web_sys::IntersectionObserver,
    nodes: Rc<RefCell<NodeTable>>,
    closure: Option<Closure<dyn FnMut(Array)>>,
}

impl IntersectionObserverHandle for WebIntersectionObserver {
    fn observe(&mut self, element: ElementId) -> Result<(), HostError> {
        let target = self
            .nodes
            .borrow()
            .element(element)
            .ok_or(HostError::Detached(element))?;
        self.observer.observe(&target);
        Ok(())
    }

    fn unobserve(&mut self, element: ElementId) -> Result<(), HostError> {
        let target = self
            .nodes
            .borrow()
            .element(element)
            .ok_or(HostError::Detached(element))?;
        self.observer.unobserve(&target);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.observer.disconnect();
        if let Some(closure) = self.closure.take() {
            release_later(closure);
        }
    }
}

impl Drop for WebIntersectionObserver {
    fn drop(&mut self) {
        self.disconnect();
    }
}

struct WebResizeObserver {
    observer: web_sys::ResizeObserver,
    nodes: Rc<RefCell<NodeTable>>,
    closure: Option<Closure<dyn FnMut(Array)>>,
}

impl ResizeObserverHandle for WebResizeObserver {
    fn observe(&mut self, element: ElementId) -> Result<(), HostError> {
        let target = self
            .nodes
            .borrow()
            .element(element)
            .ok_or(HostError::Detached(element))?;
        self.observer.observe(&target);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.observer.disconnect();
        if let Some(closure) = self.closure.take() {
            release_later(closure);
        }
    }
}

impl Drop for WebResizeObserver {
    fn drop(&mut self) {
        self.disconnect();
    }
}
