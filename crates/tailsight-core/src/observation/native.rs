use std::rc::Rc;

use super::{AdapterContext, AdapterKind, ObservationAdapter};
use crate::dom::{ElementId, Host, IntersectionCallback, IntersectionObserverHandle};
use crate::error::HostError;

/// Adapter over the host's intersection observer.
pub struct IntersectionAdapter {
    host: Rc<dyn Host>,
    observer: Option<Box<dyn IntersectionObserverHandle>>,
    target: Option<ElementId>,
}

impl IntersectionAdapter {
    pub fn new(context: &AdapterContext) -> Result<Self, HostError> {
        if !context.host.capabilities().intersection_observer {
            return Err(HostError::Unsupported("IntersectionObserver"));
        }
        let sink = context.sink.clone();
        let callback: IntersectionCallback = Rc::new(move |entries| {
            for entry in entries.iter().filter(|entry| entry.is_intersecting) {
                sink(entry.target);
            }
        });
        let observer = context
            .host
            .create_intersection_observer(&context.intersection_init(), callback)?;
        Ok(Self {
            host: context.host.clone(),
            observer: Some(observer),
            target: None,
        })
    }
}

impl ObservationAdapter for IntersectionAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Intersection
    }

    fn target(&self) -> Option<ElementId> {
        self.target
    }

    fn observe(&mut self, element: ElementId) -> bool {
        if self.target == Some(element) {
            return true;
        }
        self.unobserve();
        if !self.host.is_attached(element) {
            log::trace!("refusing to observe detached element #{element}");
            return false;
        }
        let Some(observer) = self.observer.as_mut() else {
            return false;
        };
        match observer.observe(element) {
            Ok(()) => {
                self.target = Some(element);
                true
            }
            Err(err) => {
                log::debug!("observe #{element} failed: {err}");
                false
            }
        }
    }

    fn unobserve(&mut self) {
        let Some(target) = self.target.take() else {
            return;
        };
        if let Some(observer) = self.observer.as_mut() {
            if let Err(err) = observer.unobserve(target) {
                log::trace!("unobserve #{target} ignored: {err}");
            }
        }
    }

    fn disconnect(&mut self) {
        self.target = None;
        if let Some(mut observer) = self.observer.take() {
            observer.disconnect();
        }
    }
}
