use std::rc::{Rc, Weak};

use js_sys::{Object, Reflect};
use tailsight_core::{EventBus, EventTarget, LastElementVisible, SubscribeOptions, Subscription};
use wasm_bindgen::JsValue;
use web_sys::{CustomEvent, CustomEventInit};

use crate::host::WebHost;

/// Re-dispatches bus events as DOM `CustomEvent`s.
///
/// `event.detail` carries `element`, `manager` and `timestamp` (ms). When a
/// DOM listener calls `preventDefault()`, the bus event is marked too.
pub struct DomEventBridge {
    bus: Rc<EventBus>,
    host: Weak<WebHost>,
    subscriptions: Vec<Subscription>,
}

impl DomEventBridge {
    pub fn new(bus: Rc<EventBus>, host: &Rc<WebHost>) -> Self {
        Self {
            bus,
            host: Rc::downgrade(host),
            subscriptions: Vec::new(),
        }
    }

    /// Mirrors events dispatched on `target` to the matching DOM object.
    pub fn forward(&mut self, target: EventTarget) -> &mut Self {
        if self.subscriptions.iter().any(|s| s.target() == target) {
            return self;
        }
        let host = self.host.clone();
        let subscription = self.bus.subscribe(
            move |event| {
                if let Some(host) = host.upgrade() {
                    redispatch(&host, target, event);
                }
            },
            SubscribeOptions::on(target),
        );
        self.subscriptions.push(subscription);
        self
    }

    pub fn close(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }
}

impl Drop for DomEventBridge {
    fn drop(&mut self) {
        self.close();
    }
}

fn event_detail(host: &WebHost, event: &LastElementVisible) -> Object {
    let detail = Object::new();
    let element = host
        .element(event.element)
        .map(JsValue::from)
        .unwrap_or(JsValue::NULL);
    let timestamp = event.timestamp.as_secs_f64() * 1000.0;
    for (key, value) in [
        ("element", element),
        ("manager", JsValue::from(event.manager.to_string())),
        ("timestamp", JsValue::from(timestamp)),
    ] {
        // Setting a property on a fresh plain object does not throw.
        let _ = Reflect::set(&detail, &JsValue::from_str(key), &value);
    }
    detail
}

fn redispatch(host: &WebHost, target: EventTarget, event: &LastElementVisible) {
    let Some(dom_target) = host.dom_target(target) else {
        log::trace!("no DOM object for {target:?}, event not mirrored");
        return;
    };
    let init = CustomEventInit::new();
    init.set_bubbles(event.bubbles());
    init.set_composed(event.composed());
    init.set_cancelable(event.cancelable());
    init.set_detail(&event_detail(host, event));

    let dom_event = match CustomEvent::new_with_event_init_dict(event.name(), &init) {
        Ok(dom_event) => dom_event,
        Err(err) => {
            log::debug!("building {} failed: {err:?}", event.name());
            return;
        }
    };
    match dom_target.dispatch_event(&dom_event) {
        Ok(true) => {}
        Ok(false) => event.prevent_default(),
        Err(err) => log::debug!("dispatching {} failed: {err:?}", event.name()),
    }
}
