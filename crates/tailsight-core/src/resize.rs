//! Size-change notifications for the scroll container.

use std::rc::Rc;

use crate::dom::{ElementId, EventTarget, Host, HostCallback, HostEvent, ListenerId, ResizeCallback, ResizeObserverHandle};

/// Watches the scroll element with a resize observer (when the host has one)
/// and the window for resize events. Both feed the same callback; the
/// controller throttles it through a single timer.
pub(crate) struct ResizeMonitor {
    host: Rc<dyn Host>,
    observer: Option<Box<dyn ResizeObserverHandle>>,
    window_listener: Option<ListenerId>,
}

impl ResizeMonitor {
    pub(crate) fn start(host: Rc<dyn Host>, scroll_element: ElementId, on_resize: HostCallback) -> Self {
        let observer = if host.capabilities().resize_observer {
            observe_element(&*host, scroll_element, on_resize.clone())
        } else {
            None
        };
        let passive = host.capabilities().passive_listeners;
        let window_listener = match host.add_listener(EventTarget::Window, HostEvent::Resize, passive, on_resize) {
            Ok(id) => Some(id),
            Err(err) => {
                log::debug!("window resize listener not installed: {err}");
                None
            }
        };
        Self {
            host,
            observer,
            window_listener,
        }
    }

    pub(crate) fn is_observing_element(&self) -> bool {
        self.observer.is_some()
    }

    pub(crate) fn stop(&mut self) {
        if let Some(mut observer) = self.observer.take() {
            observer.disconnect();
        }
        if let Some(id) = self.window_listener.take() {
            self.host.remove_listener(id);
        }
    }
}

fn observe_element(
    host: &dyn Host,
    element: ElementId,
    on_resize: HostCallback,
) -> Option<Box<dyn ResizeObserverHandle>> {
    let callback: ResizeCallback = Rc::new(move |_| on_resize());
    let mut observer = match host.create_resize_observer(callback) {
        Ok(observer) => observer,
        Err(err) => {
            log::debug!("resize observer unavailable: {err}");
            return None;
        }
    };
    match observer.observe(element) {
        Ok(()) => Some(observer),
        Err(err) => {
            log::debug!("resize observer refused #{element}: {err}");
            observer.disconnect();
            None
        }
    }
}
