//! Browser host for tailsight.
//!
//! [`WebPlatform`] bundles a [`WebHost`] (DOM geometry, `IntersectionObserver`,
//! `ResizeObserver`, event listeners), a [`WebScheduler`] and an event bus
//! whose `lastElementVisible` events are mirrored to the document as DOM
//! `CustomEvent`s. Everything except [`HandleTable`] only exists on `wasm32`.

mod handles;

pub use handles::HandleTable;

#[cfg(target_arch = "wasm32")]
mod bridge;
#[cfg(target_arch = "wasm32")]
mod feed;
#[cfg(target_arch = "wasm32")]
mod host;
#[cfg(target_arch = "wasm32")]
mod scheduler;

#[cfg(target_arch = "wasm32")]
pub use bridge::DomEventBridge;
#[cfg(target_arch = "wasm32")]
pub use feed::{DomFeed, HiddenAttributeIndicator};
#[cfg(target_arch = "wasm32")]
pub use host::WebHost;
#[cfg(target_arch = "wasm32")]
pub use scheduler::WebScheduler;

#[cfg(target_arch = "wasm32")]
pub use platform::{init_logging, WebPlatform};

#[cfg(target_arch = "wasm32")]
mod platform {
    use std::rc::Rc;

    use tailsight_core::{
        Environment, EventBus, EventTarget, Host, HostError, PaginationTrigger, PartialConfig,
        Registry,
    };
    use web_sys::Element;

    use crate::{DomEventBridge, DomFeed, WebHost, WebScheduler};

    /// Routes `log` output to the browser console.
    pub fn init_logging(level: log::Level) {
        wasm_logger::init(wasm_logger::Config::new(level));
    }

    /// Everything a page needs to run triggers.
    pub struct WebPlatform {
        host: Rc<WebHost>,
        scheduler: Rc<WebScheduler>,
        bus: Rc<EventBus>,
        registry: Registry,
        bridge: DomEventBridge,
    }

    impl WebPlatform {
        /// Builds the host and scheduler, mirrors document events to the DOM
        /// and cleans every trigger up on `pagehide`.
        pub fn new() -> Result<Self, HostError> {
            let host = Rc::new(WebHost::new()?);
            let scheduler = Rc::new(WebScheduler::new(host.capabilities().animation_frame)?);
            let bus = Rc::new(EventBus::new());
            let registry = Registry::new();
            registry.install_unload_hook(&*host);
            let mut bridge = DomEventBridge::new(bus.clone(), &host);
            bridge.forward(EventTarget::Document);
            Ok(Self {
                host,
                scheduler,
                bus,
                registry,
                bridge,
            })
        }

        pub fn host(&self) -> &Rc<WebHost> {
            &self.host
        }

        pub fn bus(&self) -> &Rc<EventBus> {
            &self.bus
        }

        pub fn registry(&self) -> &Registry {
            &self.registry
        }

        /// Mirrors events dispatched on another target, e.g. a shadow root
        /// or a configured global target.
        pub fn forward(&mut self, target: EventTarget) {
            self.bridge.forward(target);
        }

        pub fn environment(&self) -> Environment {
            Environment::new(self.host.clone(), self.scheduler.clone())
                .with_bus(self.bus.clone())
                .with_registry(self.registry.clone())
        }

        /// A trigger over `list`, not initialized yet.
        pub fn attach(&self, list: Element, options: &PartialConfig) -> PaginationTrigger {
            self.attach_feed(DomFeed::new(self.host.clone(), list), options)
        }

        pub fn attach_feed(&self, feed: DomFeed, options: &PartialConfig) -> PaginationTrigger {
            PaginationTrigger::new(self.environment(), Rc::new(feed), options)
        }
    }
}
