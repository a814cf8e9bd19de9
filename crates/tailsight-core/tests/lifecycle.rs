use std::rc::Rc;
use std::time::Duration;

use serde_json::json;
use tailsight_core::{
    Environment, HostEvent, PaginationTrigger, PartialConfig, Rect, Scheduler, Task, TaskId,
    TriggerState,
};
use tailsight_testing::{FakeFeed, FeedTestRule, VirtualScheduler, ITEM_HEIGHT, VIEWPORT_WIDTH};

/// Forwards to the rule's scheduler but never cancels, so every stale task
/// still runs.
struct NeverCancels(Rc<VirtualScheduler>);

impl Scheduler for NeverCancels {
    fn now(&self) -> Duration {
        self.0.now()
    }

    fn set_timeout(&self, delay: Duration, task: Task) -> TaskId {
        self.0.set_timeout(delay, task)
    }

    fn request_animation_frame(&self, task: Task) -> TaskId {
        self.0.request_animation_frame(task)
    }

    fn cancel(&self, _id: TaskId) {}
}

fn trigger_with_stale_tasks(rule: &FeedTestRule) -> PaginationTrigger {
    let env = Environment::new(
        Rc::new(rule.host().clone()),
        Rc::new(NeverCancels(rule.scheduler().clone())),
    )
    .with_bus(rule.bus().clone())
    .with_registry(rule.registry().clone());
    let trigger = PaginationTrigger::new(env, rule.feed().clone(), &PartialConfig::new());
    trigger.init();
    rule.await_idle();
    trigger
}

#[test]
fn test_init_is_idempotent() {
    let rule = FeedTestRule::new();
    let items = rule.feed().append_items(10);
    let trigger = rule.trigger(PartialConfig::new());
    trigger.init();
    trigger.init();
    rule.await_idle();

    let host = rule.host();
    assert!(trigger.is_initialized());
    assert_eq!(host.intersection_observers_created(), 1);
    assert_eq!(host.observed_elements(), vec![items[9]]);
    assert_eq!(host.listener_count(HostEvent::VisibilityChange), 1);
    assert_eq!(host.listener_count(HostEvent::Resize), 1);
    assert_eq!(host.resize_observer_count(), 1);
}

#[test]
fn test_cleanup_is_idempotent_and_releases_everything() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new());
    assert!(rule.registry().contains(trigger.instance_id()));

    trigger.cleanup();
    trigger.destroy();

    let host = rule.host();
    assert!(trigger.is_destroyed());
    assert_eq!(host.intersection_observer_count(), 0);
    assert_eq!(host.resize_observer_count(), 0);
    assert_eq!(host.listener_count(HostEvent::Resize), 0);
    assert_eq!(host.listener_count(HostEvent::VisibilityChange), 0);
    assert!(!rule.registry().contains(trigger.instance_id()));
    assert_eq!(trigger.observed_target(), None);
}

#[test]
fn test_cleanup_during_debounce_never_emits() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new());

    rule.scroll_to(200.0);
    rule.advance_frame();
    assert_eq!(trigger.state(), TriggerState::Debouncing);
    trigger.cleanup();
    assert!(!rule.scheduler().has_pending());

    rule.advance_ms(500);
    assert_eq!(rule.event_count(), 0);
}

#[test]
fn test_debounce_firing_after_cleanup_is_ignored() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    let trigger = trigger_with_stale_tasks(&rule);

    rule.scroll_to(200.0);
    rule.advance_frame();
    assert_eq!(trigger.state(), TriggerState::Debouncing);
    trigger.cleanup();
    assert!(rule.scheduler().pending_timers() > 0);

    rule.await_idle();
    assert_eq!(rule.event_count(), 0);
    assert_eq!(trigger.stats().triggers_emitted, 0);
}

#[test]
fn test_settle_frame_after_cleanup_is_ignored() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    rule.scroll_to(200.0);
    let trigger = trigger_with_stale_tasks(&rule);
    let emitted = rule.event_count();

    trigger.set_loading(true);
    rule.feed().append_items(1);
    trigger.set_loading(false);
    trigger.cleanup();
    assert!(rule.scheduler().pending_frames() > 0);

    rule.await_idle();
    assert_eq!(rule.event_count(), emitted);
    assert_eq!(trigger.observed_target(), None);
}

#[test]
fn test_calls_after_cleanup_are_noops() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    rule.scroll_to(200.0);
    let trigger = rule.trigger(PartialConfig::new());
    trigger.cleanup();

    trigger.set_loading(true);
    trigger.pause(true);
    trigger.resume();
    trigger.notify_external_mutation();
    trigger.notify_feed_cleared();
    assert!(!trigger.check_now(true));
    rule.await_idle();

    assert!(!trigger.is_loading());
    assert_eq!(rule.feed().indicator().map(|i| i.shows()), Some(0));
    assert_eq!(rule.event_count(), 0);
}

#[test]
fn test_init_revives_after_cleanup() {
    let rule = FeedTestRule::new();
    let items = rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new());
    trigger.cleanup();

    trigger.init();
    assert!(!trigger.is_destroyed());
    assert!(rule.registry().contains(trigger.instance_id()));
    rule.scroll_to(200.0);
    rule.await_idle();
    assert_eq!(rule.triggered_elements(), vec![items[9]]);
}

#[test]
fn test_update_config_revives_after_cleanup() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new());
    trigger.cleanup();

    trigger.update_config(&PartialConfig::new().debounce_ms(20));
    assert!(!trigger.is_destroyed());
    assert!(trigger.is_initialized());
    assert_eq!(trigger.config().debounce.as_millis(), 20);
}

#[test]
fn test_cleanup_while_loading_hides_indicator() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new());
    trigger.set_loading(true);
    trigger.cleanup();

    let indicator = rule.feed().indicator().expect("indicator");
    assert!(!indicator.is_visible());
    assert!(!trigger.is_loading());
}

#[test]
fn test_missing_indicator_is_tolerated() {
    let rule = FeedTestRule::with_feed(|host| {
        FakeFeed::new(host, VIEWPORT_WIDTH, ITEM_HEIGHT).without_indicator()
    });
    rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new());
    trigger.set_loading(true);
    trigger.set_loading(false);
    assert!(!trigger.is_loading());
}

#[test]
fn test_pause_with_disconnect_rebuilds_on_resume() {
    let rule = FeedTestRule::new();
    let items = rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new());

    trigger.pause(true);
    assert_eq!(rule.host().intersection_observer_count(), 0);
    assert_eq!(trigger.observed_target(), None);
    rule.scroll_to(200.0);
    rule.await_idle();
    assert_eq!(rule.event_count(), 0);

    // Re-checked right away, without waiting for frames.
    trigger.resume();
    assert_eq!(rule.triggered_elements(), vec![items[9]]);
    assert_eq!(rule.host().intersection_observers_created(), 2);
}

#[test]
fn test_disconnect_on_pause_option() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new().disconnect_on_pause(true));
    trigger.pause(false);
    assert_eq!(rule.host().intersection_observer_count(), 0);
    trigger.resume();
    assert_eq!(rule.host().intersection_observer_count(), 1);
}

#[test]
fn test_hidden_document_pauses_and_resumes() {
    let rule = FeedTestRule::new();
    let items = rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new());

    rule.host().set_hidden(true);
    rule.advance_frame();
    assert!(trigger.is_paused());
    rule.scroll_to(200.0);
    rule.await_idle();
    assert_eq!(rule.event_count(), 0);

    rule.host().set_hidden(false);
    rule.await_idle();
    assert!(!trigger.is_paused());
    assert_eq!(rule.triggered_elements(), vec![items[9]]);
}

#[test]
fn test_visibility_never_overrides_manual_pause() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new());

    trigger.pause(false);
    rule.host().set_hidden(true);
    rule.advance_frame();
    rule.host().set_hidden(false);
    rule.await_idle();
    assert!(trigger.is_paused());
}

#[test]
fn test_hidden_at_init_starts_paused() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    rule.host().set_hidden(true);
    let trigger = rule.started_trigger(PartialConfig::new());
    assert!(trigger.is_paused());

    rule.host().set_hidden(false);
    rule.await_idle();
    assert!(!trigger.is_paused());
}

#[test]
fn test_pause_on_hidden_can_be_disabled() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new().pause_on_hidden(false));
    assert_eq!(rule.host().listener_count(HostEvent::VisibilityChange), 0);

    rule.host().set_hidden(true);
    rule.advance_frame();
    assert!(!trigger.is_paused());

    trigger.update_config(&PartialConfig::new().pause_on_hidden("true"));
    assert_eq!(rule.host().listener_count(HostEvent::VisibilityChange), 1);
}

#[test]
fn test_registry_cleans_up_all_instances_on_page_hide() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    let first = rule.started_trigger(PartialConfig::new());
    let second = rule.started_trigger(PartialConfig::new());
    assert_ne!(first.instance_id(), second.instance_id());
    assert_eq!(rule.registry().len(), 2);

    assert!(rule.registry().install_unload_hook(rule.host()));
    assert!(!rule.registry().install_unload_hook(rule.host()));
    assert_eq!(rule.host().listener_count(HostEvent::PageHide), 1);

    rule.host().page_hide();
    rule.advance_frame();
    assert!(first.is_destroyed());
    assert!(second.is_destroyed());
    assert!(rule.registry().is_empty());
}

#[test]
fn test_dropped_instances_leave_registry() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    let kept = rule.started_trigger(PartialConfig::new());
    for _ in 0..50 {
        drop(rule.started_trigger(PartialConfig::new()));
    }

    assert_eq!(rule.registry().len(), 1);
    assert_eq!(rule.registry().entry_count(), 1);
    assert_eq!(rule.registry().cleanup_all(), 1);
    assert!(kept.is_destroyed());
}

#[test]
fn test_margin_change_rebuilds_observer() {
    let rule = FeedTestRule::new();
    let items = rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new());

    // Same thresholds by value: no rebuild.
    trigger.update_config(&PartialConfig::new().threshold(json!([0.0])));
    rule.await_idle();
    assert_eq!(rule.host().intersection_observers_created(), 1);

    // Row 10 (900..1000) falls inside a 500px band and fires.
    trigger.update_config(&PartialConfig::new().root_margin("0px 0px 500px 0px"));
    rule.await_idle();
    assert_eq!(rule.host().intersection_observers_created(), 2);
    assert_eq!(rule.triggered_elements(), vec![items[9]]);
}

#[test]
fn test_scroll_container_swap_rebuilds_observation() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new());
    let document = trigger.scroll_container();

    let panel = rule.host().create_element(Rect::new(0.0, 0.0, 400.0, 300.0));
    trigger.set_scroll_container(Some(panel));
    assert_eq!(trigger.scroll_container(), panel);
    assert_eq!(rule.host().intersection_observers_created(), 2);

    // Unchanged container: nothing rebuilt.
    trigger.set_scroll_container(Some(panel));
    assert_eq!(rule.host().intersection_observers_created(), 2);

    trigger.set_scroll_container(None);
    assert_eq!(trigger.scroll_container(), document);
}
