//! Viewport observation.
//!
//! One subscription per controller reports when the watched element enters
//! the margin-expanded viewport. Two implementations sit behind
//! [`ObservationAdapter`]:
//! - [`IntersectionAdapter`] - backed by the host's intersection observer
//! - [`PollingAdapter`] - scroll/resize driven geometry checks, at most one
//!   per animation frame
//!
//! The kind is chosen once from the host's [`Capabilities`]. Failing to
//! construct the platform observer is not an error; the controller drops to
//! polling for good.

mod native;
mod polling;

use std::cell::Cell;
use std::rc::Rc;

pub use native::IntersectionAdapter;
pub use polling::PollingAdapter;

use crate::config::{RootMargin, TriggerConfig};
use crate::dom::{Capabilities, ElementId, Host, IntersectionInit};
use crate::feed::FeedRenderer;
use crate::geometry::is_within_margin;
use crate::scheduler::Scheduler;

/// Which adapter implementation is in use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdapterKind {
    Intersection,
    Polling,
}

impl AdapterKind {
    pub fn for_capabilities(capabilities: &Capabilities) -> Self {
        if capabilities.intersection_observer {
            AdapterKind::Intersection
        } else {
            AdapterKind::Polling
        }
    }
}

/// Receives "element is inside the margin" signals.
pub type SignalSink = Rc<dyn Fn(ElementId)>;

/// A single-target visibility subscription.
pub trait ObservationAdapter {
    fn kind(&self) -> AdapterKind;

    /// Currently observed element.
    fn target(&self) -> Option<ElementId>;

    /// Replaces the observed element. Returns `false` (observing nothing)
    /// when the element is detached or the platform refused it.
    fn observe(&mut self, element: ElementId) -> bool;

    /// Always safe; platform errors are swallowed.
    fn unobserve(&mut self);

    /// Releases every platform resource. The adapter is unusable afterwards.
    fn disconnect(&mut self);
}

/// Answers "is this element within the viewport margin of the container".
///
/// Shared between the controller and its adapters; it holds its own copy of
/// the geometry-relevant config so it never needs to reach into controller
/// state.
pub struct ViewportProbe {
    host: Rc<dyn Host>,
    renderer: Rc<dyn FeedRenderer>,
    margin: Cell<RootMargin>,
    allow_zero_size: Cell<bool>,
    container: Cell<ElementId>,
}

impl ViewportProbe {
    pub fn new(
        host: Rc<dyn Host>,
        renderer: Rc<dyn FeedRenderer>,
        config: &TriggerConfig,
        container: ElementId,
    ) -> Self {
        Self {
            host,
            renderer,
            margin: Cell::new(config.root_margin),
            allow_zero_size: Cell::new(config.allow_zero_size),
            container: Cell::new(container),
        }
    }

    pub fn update_config(&self, config: &TriggerConfig) {
        self.margin.set(config.root_margin);
        self.allow_zero_size.set(config.allow_zero_size);
    }

    pub fn set_container(&self, container: ElementId) {
        self.container.set(container);
    }

    pub fn container(&self) -> ElementId {
        self.container.get()
    }

    pub fn check(&self, element: ElementId) -> bool {
        if !self.host.is_attached(element) {
            return false;
        }
        let margin = self.margin.get();
        if let Some(answer) = self.renderer.is_within_viewport_margin(element, &margin) {
            return answer;
        }
        let Some(rect) = self.host.bounding_rect(element) else {
            return false;
        };
        let root = self.host.root_rect(self.container.get());
        is_within_margin(&rect, &root, &margin, self.allow_zero_size.get())
    }
}

/// Everything an adapter needs to start.
#[derive(Clone)]
pub struct AdapterContext {
    pub host: Rc<dyn Host>,
    pub scheduler: Rc<dyn Scheduler>,
    pub probe: Rc<ViewportProbe>,
    pub config: TriggerConfig,
    pub sink: SignalSink,
}

impl AdapterContext {
    pub fn intersection_init(&self) -> IntersectionInit {
        let container = self.probe.container();
        IntersectionInit {
            root: (container != self.host.document_element()).then_some(container),
            root_margin: self.config.root_margin,
            thresholds: self.config.threshold.values(),
        }
    }
}

/// Builds the adapter for `kind`, falling back to polling if the platform
/// observer cannot be created. Check [`ObservationAdapter::kind`] for what
/// was actually built.
pub fn build_adapter(kind: AdapterKind, context: AdapterContext) -> Box<dyn ObservationAdapter> {
    if kind == AdapterKind::Intersection {
        match IntersectionAdapter::new(&context) {
            Ok(adapter) => return Box::new(adapter),
            Err(err) => {
                log::debug!("intersection observer unavailable ({err}), falling back to polling");
            }
        }
    }
    Box::new(PollingAdapter::new(context))
}
