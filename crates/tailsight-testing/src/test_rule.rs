use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tailsight_core::{
    Capabilities, Clock, ElementId, Environment, EventBus, EventTarget, InstanceId, LoopScheduler,
    PaginationTrigger, PartialConfig, Registry, SubscribeOptions, Subscription,
};

use crate::fake_feed::FakeFeed;
use crate::fake_host::FakeHost;

pub const VIEWPORT_WIDTH: f64 = 800.0;
pub const VIEWPORT_HEIGHT: f64 = 600.0;
pub const ITEM_HEIGHT: f64 = 100.0;

/// Virtual time advanced per simulated frame.
pub const FRAME: Duration = Duration::from_millis(16);

const IDLE_FRAME_LIMIT: usize = 1000;

/// Manually advanced time source.
#[derive(Clone, Default)]
pub struct VirtualClock(Rc<Cell<Duration>>);

impl VirtualClock {
    pub fn advance(&self, by: Duration) {
        self.0.set(self.0.get() + by);
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        self.0.get()
    }
}

pub type VirtualScheduler = LoopScheduler<VirtualClock>;

/// A `lastElementVisible` event seen on the document.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecordedEvent {
    pub element: ElementId,
    pub manager: InstanceId,
    pub timestamp: Duration,
}

/// Drives a feed in a simulated 800x600 document, one virtual frame at a
/// time, and records every trigger dispatched on the document.
pub struct FeedTestRule {
    host: FakeHost,
    clock: VirtualClock,
    scheduler: Rc<VirtualScheduler>,
    bus: Rc<EventBus>,
    registry: Registry,
    feed: Rc<FakeFeed>,
    events: Rc<RefCell<Vec<RecordedEvent>>>,
    _recorder: Subscription,
}

impl Default for FeedTestRule {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedTestRule {
    pub fn new() -> Self {
        Self::with_feed(|host| FakeFeed::new(host, VIEWPORT_WIDTH, ITEM_HEIGHT))
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        let rule = Self::new();
        rule.host.set_capabilities(capabilities);
        rule
    }

    /// Builds the feed with access to the host, e.g. to create a scroll
    /// container first.
    pub fn with_feed(build: impl FnOnce(FakeHost) -> FakeFeed) -> Self {
        crate::init_logging();
        let host = FakeHost::new(VIEWPORT_WIDTH, VIEWPORT_HEIGHT);
        let clock = VirtualClock::default();
        let scheduler = Rc::new(LoopScheduler::new(clock.clone()));
        let bus = Rc::new(EventBus::new());
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let recorder = bus.subscribe(
            move |event| {
                sink.borrow_mut().push(RecordedEvent {
                    element: event.element,
                    manager: event.manager,
                    timestamp: event.timestamp,
                })
            },
            SubscribeOptions::on(EventTarget::Document),
        );
        let feed = Rc::new(build(host.clone()));
        Self {
            host,
            clock,
            scheduler,
            bus,
            registry: Registry::new(),
            feed,
            events,
            _recorder: recorder,
        }
    }

    pub fn host(&self) -> &FakeHost {
        &self.host
    }

    pub fn feed(&self) -> &Rc<FakeFeed> {
        &self.feed
    }

    pub fn scheduler(&self) -> &Rc<VirtualScheduler> {
        &self.scheduler
    }

    pub fn bus(&self) -> &Rc<EventBus> {
        &self.bus
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn environment(&self) -> Environment {
        Environment::new(Rc::new(self.host.clone()), self.scheduler.clone())
            .with_bus(self.bus.clone())
            .with_registry(self.registry.clone())
    }

    /// A controller over the rule's feed. Not initialized yet.
    pub fn trigger(&self, options: PartialConfig) -> PaginationTrigger {
        PaginationTrigger::new(self.environment(), self.feed.clone(), &options)
    }

    /// Same as [`trigger`](Self::trigger) followed by `init()` and
    /// [`await_idle`](Self::await_idle).
    pub fn started_trigger(&self, options: PartialConfig) -> PaginationTrigger {
        let trigger = self.trigger(options);
        trigger.init();
        self.await_idle();
        trigger
    }

    /// One frame: time moves by [`FRAME`], host events and due timers run,
    /// then frame callbacks, then whatever they caused on the host.
    pub fn advance_frame(&self) {
        self.clock.advance(FRAME);
        self.host.flush();
        self.scheduler.run_due_timers();
        self.scheduler.run_frame();
        self.host.flush();
    }

    /// Steps whole frames until at least `duration` has passed.
    pub fn advance(&self, duration: Duration) {
        let target = self.clock.now() + duration;
        while self.clock.now() < target {
            self.advance_frame();
        }
    }

    pub fn advance_ms(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Runs frames until no timer, frame callback or host notification is
    /// pending.
    pub fn await_idle(&self) {
        let mut frames = 0;
        while self.scheduler.has_pending() || self.host.has_pending() {
            self.advance_frame();
            frames += 1;
            if frames > IDLE_FRAME_LIMIT {
                panic!("Feed failed to settle after {} frames", IDLE_FRAME_LIMIT);
            }
        }
    }

    pub fn scroll_to(&self, y: f64) {
        self.host.scroll_to(y);
    }

    pub fn scroll_by(&self, dy: f64) {
        self.host.scroll_to(self.host.scroll_y() + dy);
    }

    /// Scrolls the document so the last row's bottom meets the viewport's.
    pub fn scroll_to_bottom(&self) {
        self.host
            .scroll_to(self.feed.content_height() - VIEWPORT_HEIGHT);
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.borrow().clone()
    }

    pub fn event_count(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn triggered_elements(&self) -> Vec<ElementId> {
        self.events.borrow().iter().map(|event| event.element).collect()
    }

    pub fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }
}
