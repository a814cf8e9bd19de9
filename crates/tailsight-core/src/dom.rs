//! Host boundary: element handles, geometry queries and platform facilities.
//!
//! The controller never touches a real document directly. Everything it
//! needs from the platform goes through [`Host`], so the same logic runs
//! against a browser (see `tailsight-platform-web`) or the simulated document
//! in `tailsight-testing`.

use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::config::RootMargin;
use crate::error::HostError;
use crate::geometry::Rect;

/// Opaque handle to an element owned by the host.
///
/// Handles do not keep the element alive; ask [`Host::is_attached`] before
/// trusting one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Something events can be dispatched on or listened to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventTarget {
    Window,
    Document,
    /// An element or the root of a detached/shadow tree.
    Node(ElementId),
}

/// Platform events the controller subscribes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostEvent {
    Scroll,
    Resize,
    VisibilityChange,
    PageHide,
}

impl HostEvent {
    /// DOM event type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HostEvent::Scroll => "scroll",
            HostEvent::Resize => "resize",
            HostEvent::VisibilityChange => "visibilitychange",
            HostEvent::PageHide => "pagehide",
        }
    }
}

/// Identifies a listener registered through [`Host::add_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Which optional platform primitives a host provides.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub intersection_observer: bool,
    pub resize_observer: bool,
    pub animation_frame: bool,
    pub passive_listeners: bool,
    pub page_visibility: bool,
}

impl Capabilities {
    /// Every facility available.
    pub const fn full() -> Self {
        Self {
            intersection_observer: true,
            resize_observer: true,
            animation_frame: true,
            passive_listeners: true,
            page_visibility: true,
        }
    }

    /// A bare host: only listeners and timers.
    pub const fn minimal() -> Self {
        Self {
            intersection_observer: false,
            resize_observer: false,
            animation_frame: false,
            passive_listeners: false,
            page_visibility: false,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::full()
    }
}

/// One notification from an intersection observer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntersectionEntry {
    pub target: ElementId,
    pub is_intersecting: bool,
    pub intersection_ratio: f64,
}

/// Options used to build a platform intersection observer.
#[derive(Clone, Debug, PartialEq)]
pub struct IntersectionInit {
    /// Scroll container, or `None` for the top-level viewport.
    pub root: Option<ElementId>,
    pub root_margin: RootMargin,
    pub thresholds: SmallVec<[f64; 4]>,
}

pub type IntersectionCallback = Rc<dyn Fn(&[IntersectionEntry])>;
pub type ResizeCallback = Rc<dyn Fn(&[ElementId])>;
pub type HostCallback = Rc<dyn Fn()>;

/// A live platform intersection observer.
pub trait IntersectionObserverHandle {
    fn observe(&mut self, element: ElementId) -> Result<(), HostError>;
    fn unobserve(&mut self, element: ElementId) -> Result<(), HostError>;
    fn disconnect(&mut self);
}

/// A live platform resize observer.
pub trait ResizeObserverHandle {
    fn observe(&mut self, element: ElementId) -> Result<(), HostError>;
    fn disconnect(&mut self);
}

/// Everything the controller consumes from the platform.
///
/// Implementations must deliver observer notifications and listener
/// callbacks asynchronously (from their own event loop), never from inside
/// one of the calls below.
pub trait Host {
    /// Capability probe, consulted once when a controller is built.
    fn capabilities(&self) -> Capabilities;

    /// Liveness check for a handle.
    fn is_attached(&self, element: ElementId) -> bool;

    /// Current bounding box, or `None` when the element is gone.
    fn bounding_rect(&self, element: ElementId) -> Option<Rect>;

    /// The top-level viewport box.
    fn viewport_rect(&self) -> Rect;

    /// The document's scrolling element.
    fn document_element(&self) -> ElementId;

    /// Root of the tree containing `element`: the document, or a shadow root.
    fn tree_root(&self, element: ElementId) -> EventTarget;

    fn is_document_hidden(&self) -> bool;

    fn create_intersection_observer(
        &self,
        init: &IntersectionInit,
        callback: IntersectionCallback,
    ) -> Result<Box<dyn IntersectionObserverHandle>, HostError>;

    fn create_resize_observer(
        &self,
        callback: ResizeCallback,
    ) -> Result<Box<dyn ResizeObserverHandle>, HostError>;

    fn add_listener(
        &self,
        target: EventTarget,
        event: HostEvent,
        passive: bool,
        callback: HostCallback,
    ) -> Result<ListenerId, HostError>;

    fn remove_listener(&self, id: ListenerId);

    /// Box of the element that scrolls, falling back to the viewport for the
    /// document element or a vanished container.
    fn root_rect(&self, container: ElementId) -> Rect {
        if container == self.document_element() {
            return self.viewport_rect();
        }
        self.bounding_rect(container)
            .unwrap_or_else(|| self.viewport_rect())
    }

    /// Listener target for scroll events of `container`.
    fn scroll_target(&self, container: ElementId) -> EventTarget {
        if container == self.document_element() {
            EventTarget::Window
        } else {
            EventTarget::Node(container)
        }
    }
}
