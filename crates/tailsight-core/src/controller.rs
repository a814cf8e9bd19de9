//! The pagination trigger controller.
//!
//! [`PaginationTrigger`] is a cheap-to-clone handle around shared state. It
//! wires an [`ObservationAdapter`] to the [`TriggerCore`] state machine,
//! runs the debounce and re-arm timers through the [`Scheduler`], and emits
//! [`LastElementVisible`] events on the [`EventBus`].
//!
//! Every callback handed to the host or scheduler holds a weak reference and
//! a slot generation, and checks `destroyed` before acting. The shared state
//! is never borrowed while a listener, indicator or registry runs.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{PartialConfig, TriggerConfig};
use crate::dom::{Capabilities, ElementId, EventTarget, Host, HostCallback, HostEvent, ListenerId};
use crate::events::{emit_trigger, EventBus, InstanceId, LastElementVisible, SubscribeOptions, Subscription};
use crate::feed::FeedRenderer;
use crate::observation::{
    build_adapter, AdapterContext, AdapterKind, ObservationAdapter, SignalSink, ViewportProbe,
};
use crate::registry::Registry;
use crate::resize::ResizeMonitor;
use crate::scheduler::{Scheduler, TaskSlot, Wait};
use crate::trigger::{SignalOutcome, TriggerCore, TriggerState, Verdict};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Frames to wait after loading ends or a plain resume, so layout settles.
const SETTLE_FRAMES: u32 = 2;

/// Platform services a controller runs against.
#[derive(Clone)]
pub struct Environment {
    pub host: Rc<dyn Host>,
    pub scheduler: Rc<dyn Scheduler>,
    pub bus: Rc<EventBus>,
    pub registry: Option<Registry>,
}

impl Environment {
    pub fn new(host: Rc<dyn Host>, scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            host,
            scheduler,
            bus: Rc::new(EventBus::new()),
            registry: None,
        }
    }

    /// Shares an event bus between controllers.
    pub fn with_bus(mut self, bus: Rc<EventBus>) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }
}

/// Diagnostic counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TriggerStats {
    /// Visibility signals delivered by the adapter or the resize path.
    pub signals_received: u64,
    /// Signals and decisions dropped because loading or paused.
    pub signals_suppressed: u64,
    pub debounces_started: u64,
    pub triggers_emitted: u64,
    /// Decisions discarded because the element already triggered.
    pub duplicates_suppressed: u64,
}

/// What the next re-arm should do beyond observing the last item.
#[derive(Clone, Copy, Debug, Default)]
struct RearmRequest {
    /// Fire immediately if the last item is already inside the margin.
    proactive: bool,
    /// Feed a signal through the debounce if the last item is inside.
    mutation_check: bool,
}

impl RearmRequest {
    const OBSERVE: Self = Self {
        proactive: false,
        mutation_check: false,
    };

    const PROACTIVE: Self = Self {
        proactive: true,
        mutation_check: false,
    };

    fn merge(self, other: Self) -> Self {
        Self {
            proactive: self.proactive || other.proactive,
            mutation_check: self.mutation_check || other.mutation_check,
        }
    }
}

struct Emission {
    event: LastElementVisible,
    global_target: Option<EventTarget>,
}

type WeakInner = Weak<RefCell<TriggerInner>>;

pub(crate) struct TriggerInner {
    id: InstanceId,
    host: Rc<dyn Host>,
    scheduler: Rc<dyn Scheduler>,
    renderer: Rc<dyn FeedRenderer>,
    bus: Rc<EventBus>,
    registry: Option<Registry>,
    config: TriggerConfig,
    explicit_container: Option<ElementId>,
    probe: Rc<ViewportProbe>,
    preferred_kind: AdapterKind,
    adapter_kind: AdapterKind,
    adapter: Option<Box<dyn ObservationAdapter>>,
    resize: Option<ResizeMonitor>,
    visibility_listener: Option<ListenerId>,
    core: TriggerCore,
    setup_complete: bool,
    destroyed: bool,
    observation_disconnected: bool,
    auto_paused: bool,
    debounce: TaskSlot,
    resize_throttle: TaskSlot,
    rearm: TaskSlot,
    rearm_request: RearmRequest,
    /// Frames the live re-arm task still waits, counting its own.
    rearm_frames_left: u32,
    stats: TriggerStats,
    warned_missing_indicator: bool,
}

fn resolve_container(
    host: &dyn Host,
    renderer: &dyn FeedRenderer,
    explicit: Option<ElementId>,
) -> ElementId {
    explicit
        .filter(|element| host.is_attached(*element))
        .or_else(|| {
            renderer
                .scroll_container()
                .filter(|element| host.is_attached(*element))
        })
        .unwrap_or_else(|| host.document_element())
}

impl TriggerInner {
    fn current_last(&self) -> Option<ElementId> {
        self.renderer
            .last_item_element()
            .filter(|element| self.host.is_attached(*element))
    }

    fn observe(&mut self, element: ElementId) {
        let Some(adapter) = self.adapter.as_mut() else {
            return;
        };
        if adapter.observe(element) {
            if let Some(previous) = self.core.arm(element) {
                log::trace!("{} moved observation #{previous} -> #{element}", self.id);
            }
        } else {
            self.core.disarm();
        }
    }

    fn unobserve(&mut self) {
        if let Some(adapter) = self.adapter.as_mut() {
            adapter.unobserve();
        }
        self.core.disarm();
    }

    fn cancel_debounce(&mut self) {
        self.core.cancel_debounce();
        self.debounce.cancel(&*self.scheduler);
    }

    fn accept_signal(&mut self, element: ElementId, weak: &WeakInner) {
        self.stats.signals_received += 1;
        match self.core.signal(element) {
            SignalOutcome::Debounce => {
                self.stats.debounces_started += 1;
                let weak = weak.clone();
                self.debounce.arm(
                    &*self.scheduler,
                    Wait::Timeout(self.config.debounce),
                    move |generation| {
                        Box::new(move || {
                            if let Some(trigger) = PaginationTrigger::upgrade(&weak) {
                                trigger.on_debounce_elapsed(generation);
                            }
                        })
                    },
                );
            }
            SignalOutcome::Pending => {
                log::trace!("{} debounce already pending for #{element}", self.id);
            }
            SignalOutcome::Suppressed => self.stats.signals_suppressed += 1,
            SignalOutcome::NotObserved => {
                log::trace!("{} ignored signal for unobserved #{element}", self.id);
            }
        }
    }

    fn conclude(&mut self, verdict: Verdict) -> Option<Emission> {
        match verdict {
            Verdict::Emit { element, stale } => {
                if let Some(adapter) = self.adapter.as_mut() {
                    adapter.unobserve();
                }
                if let Some(stale) = stale.filter(|stale| *stale != element) {
                    log::trace!("{} dropped stale target #{stale}", self.id);
                }
                self.stats.triggers_emitted += 1;
                log::debug!("{} triggered for #{element}", self.id);
                Some(Emission {
                    event: LastElementVisible::new(element, self.id, self.scheduler.now()),
                    global_target: self.config.event_target,
                })
            }
            Verdict::Duplicate(element) => {
                self.stats.duplicates_suppressed += 1;
                log::trace!("{} already triggered for #{element}", self.id);
                None
            }
            Verdict::Suppressed => {
                self.stats.signals_suppressed += 1;
                None
            }
            Verdict::Empty => None,
        }
    }

    fn build_observation(&mut self, weak: &WeakInner) {
        if let Some(mut adapter) = self.adapter.take() {
            adapter.disconnect();
        }
        self.core.disarm();
        let sink: SignalSink = {
            let weak = weak.clone();
            Rc::new(move |element| {
                if let Some(trigger) = PaginationTrigger::upgrade(&weak) {
                    trigger.on_signal(element);
                }
            })
        };
        let context = AdapterContext {
            host: self.host.clone(),
            scheduler: self.scheduler.clone(),
            probe: self.probe.clone(),
            config: self.config.clone(),
            sink,
        };
        let adapter = build_adapter(self.preferred_kind, context);
        let kind = adapter.kind();
        // A failed platform observer is not retried.
        self.preferred_kind = kind;
        self.adapter_kind = kind;
        self.adapter = Some(adapter);
        self.observation_disconnected = false;
    }

    fn rebuild_observation(&mut self, weak: &WeakInner) {
        self.cancel_debounce();
        self.build_observation(weak);
        if let Some(last) = self.current_last() {
            self.observe(last);
        }
    }

    fn disconnect_observation(&mut self) {
        if let Some(mut adapter) = self.adapter.take() {
            adapter.disconnect();
        }
        self.core.disarm();
        self.observation_disconnected = true;
    }

    fn start_resize_monitor(&mut self, weak: &WeakInner) {
        if let Some(mut monitor) = self.resize.take() {
            monitor.stop();
        }
        let weak = weak.clone();
        let on_resize: HostCallback = Rc::new(move || {
            if let Some(trigger) = PaginationTrigger::upgrade(&weak) {
                trigger.on_resize();
            }
        });
        let monitor = ResizeMonitor::start(self.host.clone(), self.probe.container(), on_resize);
        if !monitor.is_observing_element() {
            log::debug!("{} watches window resize only", self.id);
        }
        self.resize = Some(monitor);
    }

    fn install_visibility_listener(&mut self, weak: &WeakInner) {
        if self.visibility_listener.is_some() || !self.host.capabilities().page_visibility {
            return;
        }
        let weak = weak.clone();
        let callback: HostCallback = Rc::new(move || {
            if let Some(trigger) = PaginationTrigger::upgrade(&weak) {
                trigger.on_visibility_change();
            }
        });
        match self
            .host
            .add_listener(EventTarget::Document, HostEvent::VisibilityChange, false, callback)
        {
            Ok(id) => self.visibility_listener = Some(id),
            Err(err) => log::debug!("{} visibility listener not installed: {err}", self.id),
        }
    }

    fn remove_visibility_listener(&mut self) {
        if let Some(id) = self.visibility_listener.take() {
            self.host.remove_listener(id);
        }
    }

    fn setup(&mut self, weak: &WeakInner) {
        self.build_observation(weak);
        self.start_resize_monitor(weak);
        if self.config.pause_on_hidden {
            self.install_visibility_listener(weak);
            if self.host.capabilities().page_visibility && self.host.is_document_hidden() {
                self.core.pause();
                self.auto_paused = true;
            }
        }
        if let Some(last) = self.current_last() {
            self.observe(last);
        }
        self.setup_complete = true;
        log::debug!("{} initialized ({:?} observation)", self.id, self.adapter_kind);
    }

    fn schedule_rearm(&mut self, weak: &WeakInner, frames: u32, request: RearmRequest) {
        self.rearm_request = self.rearm_request.merge(request);
        let pending = if self.rearm.is_live() {
            self.rearm_frames_left
        } else {
            0
        };
        self.arm_rearm_frame(weak, frames.max(1).max(pending));
    }

    fn arm_rearm_frame(&mut self, weak: &WeakInner, remaining: u32) {
        self.rearm_frames_left = remaining;
        let weak = weak.clone();
        self.rearm.arm(&*self.scheduler, Wait::Frame, move |generation| {
            Box::new(move || {
                if let Some(trigger) = PaginationTrigger::upgrade(&weak) {
                    trigger.on_rearm_frame(generation, remaining);
                }
            })
        });
    }

    /// Releases every platform resource and timer.
    fn teardown(&mut self) {
        self.debounce.cancel(&*self.scheduler);
        self.resize_throttle.cancel(&*self.scheduler);
        self.rearm.cancel(&*self.scheduler);
        self.rearm_request = RearmRequest::default();
        if let Some(mut adapter) = self.adapter.take() {
            adapter.disconnect();
        }
        if let Some(mut monitor) = self.resize.take() {
            monitor.stop();
        }
        self.remove_visibility_listener();
    }
}

impl Drop for TriggerInner {
    fn drop(&mut self) {
        if !self.destroyed {
            self.teardown();
        }
        if let Some(registry) = self.registry.take() {
            registry.remove(self.id);
        }
    }
}

/// Emits one `lastElementVisible` event each time the last item of a growing
/// list comes into view.
///
/// ```text
/// let trigger = PaginationTrigger::new(env, renderer, &PartialConfig::new());
/// let _sub = trigger.subscribe(|event| fetch_page_after(event.element), SubscribeOptions::default());
/// trigger.init();
/// // in the fetch path:
/// trigger.set_loading(true);
/// // ...append items...
/// trigger.set_loading(false);
/// ```
#[derive(Clone)]
pub struct PaginationTrigger {
    inner: Rc<RefCell<TriggerInner>>,
}

impl PaginationTrigger {
    pub fn new(env: Environment, renderer: Rc<dyn FeedRenderer>, options: &PartialConfig) -> Self {
        let config = TriggerConfig::normalize(options);
        let id = InstanceId(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed));
        let container = resolve_container(&*env.host, &*renderer, None);
        let probe = Rc::new(ViewportProbe::new(
            env.host.clone(),
            renderer.clone(),
            &config,
            container,
        ));
        let preferred_kind = AdapterKind::for_capabilities(&env.host.capabilities());
        let inner = Rc::new(RefCell::new(TriggerInner {
            id,
            host: env.host,
            scheduler: env.scheduler,
            renderer,
            bus: env.bus,
            registry: env.registry,
            config,
            explicit_container: None,
            probe,
            preferred_kind,
            adapter_kind: preferred_kind,
            adapter: None,
            resize: None,
            visibility_listener: None,
            core: TriggerCore::new(),
            setup_complete: false,
            destroyed: false,
            observation_disconnected: false,
            auto_paused: false,
            debounce: TaskSlot::default(),
            resize_throttle: TaskSlot::default(),
            rearm: TaskSlot::default(),
            rearm_request: RearmRequest::default(),
            rearm_frames_left: 0,
            stats: TriggerStats::default(),
            warned_missing_indicator: false,
        }));
        let trigger = Self { inner };
        trigger.register();
        trigger
    }

    pub(crate) fn from_inner(inner: Rc<RefCell<TriggerInner>>) -> Self {
        Self { inner }
    }

    fn upgrade(weak: &WeakInner) -> Option<Self> {
        weak.upgrade().map(Self::from_inner)
    }

    fn weak(&self) -> WeakInner {
        Rc::downgrade(&self.inner)
    }

    fn register(&self) {
        let (registry, id) = {
            let inner = self.inner.borrow();
            (inner.registry.clone(), inner.id)
        };
        if let Some(registry) = registry {
            registry.add(id, self.weak());
        }
    }

    /// Sets up observation, resize monitoring and the visibility listener.
    ///
    /// A no-op while already set up. After [`cleanup`](Self::cleanup) it
    /// revives the instance.
    pub fn init(&self) {
        let weak = self.weak();
        let revived = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let revived = inner.destroyed;
            if revived {
                inner.destroyed = false;
                log::debug!("{} revived", inner.id);
            } else if inner.setup_complete {
                return;
            }
            inner.setup(&weak);
            revived
        };
        if revived {
            self.register();
        }
    }

    /// Tears everything down. Idempotent; later calls to any method other
    /// than [`init`](Self::init), [`update_config`](Self::update_config) and
    /// [`set_scroll_container`](Self::set_scroll_container) are no-ops.
    pub fn cleanup(&self) {
        let (registry, id, was_loading) = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            if inner.destroyed {
                return;
            }
            inner.destroyed = true;
            inner.setup_complete = false;
            inner.teardown();
            let was_loading = inner.core.is_loading();
            inner.core.reset();
            inner.auto_paused = false;
            inner.observation_disconnected = false;
            log::debug!("{} destroyed", inner.id);
            (inner.registry.clone(), inner.id, was_loading)
        };
        if was_loading {
            self.show_indicator(false);
        }
        if let Some(registry) = registry {
            registry.remove(id);
        }
    }

    /// Alias of [`cleanup`](Self::cleanup).
    pub fn destroy(&self) {
        self.cleanup();
    }

    /// Marks the start or end of a page fetch.
    ///
    /// While loading, every signal is dropped. Ending a load re-checks the
    /// last item after layout settles and fires right away if it is already
    /// inside the margin.
    pub fn set_loading(&self, loading: bool) {
        let weak = self.weak();
        {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            if inner.destroyed || inner.core.is_loading() == loading {
                return;
            }
            if loading {
                inner.core.begin_loading();
                inner.debounce.cancel(&*inner.scheduler);
                inner.rearm.cancel(&*inner.scheduler);
                inner.rearm_request = RearmRequest::default();
            } else {
                inner.core.end_loading();
                inner.schedule_rearm(&weak, SETTLE_FRAMES, RearmRequest::PROACTIVE);
            }
            log::debug!("{} loading={loading}", inner.id);
        }
        self.show_indicator(loading);
    }

    fn show_indicator(&self, visible: bool) {
        let renderer = self.inner.borrow().renderer.clone();
        match renderer.loading_indicator() {
            Some(indicator) if visible => indicator.show(),
            Some(indicator) => indicator.hide(),
            None => {
                let mut inner = self.inner.borrow_mut();
                if cfg!(debug_assertions) && !inner.warned_missing_indicator {
                    inner.warned_missing_indicator = true;
                    log::warn!("{}: feed renderer has no loading indicator", inner.id);
                }
            }
        }
    }

    /// Stops triggering. `disconnect_observation` (or the
    /// `disconnect_on_pause` option) also drops the observer until
    /// [`resume`](Self::resume).
    pub fn pause(&self, disconnect_observation: bool) {
        self.pause_with(disconnect_observation, false);
    }

    fn pause_with(&self, disconnect_observation: bool, auto: bool) {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        if inner.destroyed {
            return;
        }
        let disconnect = disconnect_observation || inner.config.disconnect_on_pause;
        if inner.core.is_paused() {
            if !auto {
                inner.auto_paused = false;
            }
        } else {
            inner.core.pause();
            inner.debounce.cancel(&*inner.scheduler);
            inner.rearm.cancel(&*inner.scheduler);
            inner.rearm_request = RearmRequest::default();
            inner.auto_paused = auto;
            log::debug!("{} paused{}", inner.id, if auto { " (document hidden)" } else { "" });
        }
        if disconnect && !inner.observation_disconnected && inner.setup_complete {
            inner.disconnect_observation();
        }
    }

    /// Undoes [`pause`](Self::pause). A disconnected observer is rebuilt and
    /// the last item checked immediately; otherwise the check waits two
    /// frames for layout to settle.
    pub fn resume(&self) {
        self.resume_with(false);
    }

    fn resume_with(&self, auto: bool) {
        let weak = self.weak();
        let rebuilt = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            if inner.destroyed || !inner.core.is_paused() || (auto && !inner.auto_paused) {
                return;
            }
            inner.auto_paused = false;
            inner.core.resume();
            log::debug!("{} resumed", inner.id);
            if inner.observation_disconnected {
                inner.build_observation(&weak);
                true
            } else {
                inner.schedule_rearm(&weak, SETTLE_FRAMES, RearmRequest::PROACTIVE);
                false
            }
        };
        if rebuilt {
            self.rearm(RearmRequest::PROACTIVE);
        }
    }

    /// Merges `partial` into the current config.
    ///
    /// Rebuilds observation when margin, threshold or the zero-size guard
    /// changed, then re-checks on the next frame. Revives a destroyed
    /// instance.
    pub fn update_config(&self, partial: &PartialConfig) {
        let weak = self.weak();
        let (revive, resume_auto) = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let next = inner.config.merged(partial);
            let observation_changed = inner.config.observation_differs(&next);
            let visibility_changed = inner.config.pause_on_hidden != next.pause_on_hidden;
            inner.config = next;
            inner.probe.update_config(&inner.config);
            if inner.destroyed {
                (true, false)
            } else if !inner.setup_complete {
                (false, false)
            } else {
                if observation_changed && !inner.observation_disconnected {
                    log::debug!("{} observation options changed, rebuilding", inner.id);
                    inner.rebuild_observation(&weak);
                }
                let mut resume_auto = false;
                if visibility_changed {
                    if inner.config.pause_on_hidden {
                        inner.install_visibility_listener(&weak);
                    } else {
                        inner.remove_visibility_listener();
                        resume_auto = inner.auto_paused;
                    }
                }
                inner.schedule_rearm(&weak, 1, RearmRequest::PROACTIVE);
                (false, resume_auto)
            }
        };
        if revive {
            self.init();
        } else if resume_auto {
            self.resume_with(true);
        }
    }

    /// Switches the element that scrolls the list. `None` falls back to the
    /// renderer's container, then the document. Revives a destroyed
    /// instance.
    pub fn set_scroll_container(&self, container: Option<ElementId>) {
        let weak = self.weak();
        let revive = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            inner.explicit_container = container;
            let resolved = resolve_container(&*inner.host, &*inner.renderer, container);
            let changed = resolved != inner.probe.container();
            inner.probe.set_container(resolved);
            if inner.destroyed {
                true
            } else {
                if changed && inner.setup_complete {
                    log::debug!("{} scroll container is now #{resolved}", inner.id);
                    if !inner.observation_disconnected {
                        inner.rebuild_observation(&weak);
                    }
                    inner.start_resize_monitor(&weak);
                    inner.schedule_rearm(&weak, 1, RearmRequest::PROACTIVE);
                }
                false
            }
        };
        if revive {
            self.init();
        }
    }

    /// Re-targets the last item after the caller changed the list outside
    /// the load cycle. With `force_check_on_mutation`, an item already inside
    /// the margin is fed through the debounce as if it had just appeared.
    pub fn notify_external_mutation(&self) {
        let weak = self.weak();
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        if inner.destroyed {
            return;
        }
        let request = RearmRequest {
            proactive: false,
            mutation_check: inner.config.force_check_on_mutation,
        };
        inner.schedule_rearm(&weak, 1, request);
    }

    /// Forgets the last triggered element after the list was replaced, and
    /// re-checks on the next frame.
    pub fn notify_feed_cleared(&self) {
        let weak = self.weak();
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        if inner.destroyed {
            return;
        }
        inner.core.clear_emitted();
        inner.cancel_debounce();
        inner.unobserve();
        inner.schedule_rearm(&weak, 1, RearmRequest::PROACTIVE);
    }

    /// Manual check of the last item, bypassing the debounce.
    ///
    /// Only acts in polling mode unless `force` is set. Returns `true` if a
    /// trigger was emitted.
    pub fn check_now(&self, force: bool) -> bool {
        let emission = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            if inner.destroyed || !inner.setup_complete || inner.core.is_suppressed() {
                return false;
            }
            if inner.adapter_kind == AdapterKind::Intersection && !force {
                return false;
            }
            let Some(last) = inner.current_last() else {
                return false;
            };
            if !inner.probe.check(last) {
                return false;
            }
            inner.observe(last);
            inner.cancel_debounce();
            let verdict = inner.core.fire(Some(last));
            inner.conclude(verdict)
        };
        match emission {
            Some(emission) => {
                self.dispatch(emission);
                true
            }
            None => false,
        }
    }

    /// Listens for this controller's bus events. Defaults to the document.
    pub fn subscribe(
        &self,
        handler: impl Fn(&LastElementVisible) + 'static,
        options: SubscribeOptions,
    ) -> Subscription {
        let bus = self.inner.borrow().bus.clone();
        bus.subscribe(handler, options)
    }

    fn on_signal(&self, element: ElementId) {
        let weak = self.weak();
        let mut inner = self.inner.borrow_mut();
        if inner.destroyed {
            return;
        }
        inner.accept_signal(element, &weak);
    }

    fn on_debounce_elapsed(&self, generation: u64) {
        let emission = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            if inner.destroyed || !inner.debounce.claim(generation) {
                return;
            }
            let last = inner.current_last();
            let verdict = inner.core.debounce_elapsed(last);
            inner.conclude(verdict)
        };
        if let Some(emission) = emission {
            self.dispatch(emission);
        }
    }

    fn on_resize(&self) {
        let weak = self.weak();
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        if inner.destroyed || inner.resize_throttle.is_live() {
            return;
        }
        inner.resize_throttle.arm(
            &*inner.scheduler,
            Wait::Timeout(inner.config.resize_throttle),
            move |generation| {
                Box::new(move || {
                    if let Some(trigger) = PaginationTrigger::upgrade(&weak) {
                        trigger.on_resize_elapsed(generation);
                    }
                })
            },
        );
    }

    fn on_resize_elapsed(&self, generation: u64) {
        let weak = self.weak();
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        if inner.destroyed || !inner.resize_throttle.claim(generation) || inner.core.is_suppressed() {
            return;
        }
        let Some(last) = inner.current_last() else {
            return;
        };
        if inner.probe.check(last) {
            inner.observe(last);
            inner.accept_signal(last, &weak);
        }
    }

    fn on_visibility_change(&self) {
        let (hidden, enabled) = {
            let inner = self.inner.borrow();
            if inner.destroyed {
                return;
            }
            (inner.host.is_document_hidden(), inner.config.pause_on_hidden)
        };
        if !enabled {
            return;
        }
        if hidden {
            self.pause_with(false, true);
        } else {
            self.resume_with(true);
        }
    }

    fn on_rearm_frame(&self, generation: u64, remaining: u32) {
        let weak = self.weak();
        let request = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            if inner.destroyed || !inner.rearm.claim(generation) {
                return;
            }
            if remaining > 1 {
                inner.arm_rearm_frame(&weak, remaining - 1);
                return;
            }
            std::mem::take(&mut inner.rearm_request)
        };
        self.rearm(request);
    }

    /// Observes the current last item and, depending on `request`, checks
    /// it against the margin.
    fn rearm(&self, request: RearmRequest) {
        let weak = self.weak();
        let emission = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            if inner.destroyed || inner.core.is_suppressed() {
                return;
            }
            let Some(last) = inner.current_last() else {
                inner.unobserve();
                return;
            };
            inner.observe(last);
            if !(request.proactive || request.mutation_check) || !inner.probe.check(last) {
                return;
            }
            if request.proactive {
                inner.cancel_debounce();
                let verdict = inner.core.fire(Some(last));
                inner.conclude(verdict)
            } else {
                inner.accept_signal(last, &weak);
                None
            }
        };
        if let Some(emission) = emission {
            self.dispatch(emission);
        }
    }

    fn dispatch(&self, emission: Emission) {
        let (bus, host) = {
            let inner = self.inner.borrow();
            if inner.destroyed {
                return;
            }
            (inner.bus.clone(), inner.host.clone())
        };
        emit_trigger(&bus, &*host, emission.global_target, &emission.event);

        // Listeners usually start loading synchronously; only re-arm if not.
        let weak = self.weak();
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        if !inner.destroyed && !inner.core.is_suppressed() {
            inner.schedule_rearm(&weak, 1, RearmRequest::OBSERVE);
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.inner.borrow().id
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.borrow().setup_complete
    }

    pub fn is_loading(&self) -> bool {
        self.inner.borrow().core.is_loading()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.borrow().core.is_paused()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.borrow().destroyed
    }

    pub fn state(&self) -> TriggerState {
        self.inner.borrow().core.state()
    }

    pub fn observed_target(&self) -> Option<ElementId> {
        self.inner.borrow().core.observed()
    }

    pub fn last_emitted(&self) -> Option<ElementId> {
        self.inner.borrow().core.last_emitted()
    }

    pub fn stats(&self) -> TriggerStats {
        self.inner.borrow().stats
    }

    pub fn config(&self) -> TriggerConfig {
        self.inner.borrow().config.clone()
    }

    pub fn scroll_container(&self) -> ElementId {
        self.inner.borrow().probe.container()
    }

    /// Which platform facilities the host reports.
    pub fn capabilities(&self) -> Capabilities {
        self.inner.borrow().host.capabilities()
    }

    pub fn adapter_kind(&self) -> AdapterKind {
        self.inner.borrow().adapter_kind
    }

    pub fn bus(&self) -> Rc<EventBus> {
        self.inner.borrow().bus.clone()
    }
}

impl std::fmt::Debug for PaginationTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("PaginationTrigger")
            .field("id", &inner.id)
            .field("state", &inner.core.state())
            .field("observed", &inner.core.observed())
            .field("last_emitted", &inner.core.last_emitted())
            .field("destroyed", &inner.destroyed)
            .finish()
    }
}
