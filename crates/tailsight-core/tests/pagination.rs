use std::cell::Cell;
use std::rc::Rc;

use tailsight_core::{EventTarget, PartialConfig, SubscribeOptions, TriggerState};
use tailsight_testing::FeedTestRule;

#[test]
fn test_ten_then_twenty_items() {
    let rule = FeedTestRule::new();
    let first = rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new());

    assert_eq!(trigger.observed_target(), Some(first[9]));
    assert_eq!(rule.event_count(), 0);

    // Row 10 now sits at 700..800, inside the 200px pre-load band.
    rule.scroll_to(200.0);
    rule.advance_frame();
    assert_eq!(rule.event_count(), 0, "debounce still pending");
    rule.await_idle();
    assert_eq!(rule.triggered_elements(), vec![first[9]]);

    trigger.set_loading(true);
    let second = rule.feed().append_items(10);
    trigger.set_loading(false);
    rule.await_idle();
    assert_eq!(trigger.observed_target(), Some(second[9]));
    assert_eq!(rule.event_count(), 1);

    rule.scroll_to(1200.0);
    rule.await_idle();
    assert_eq!(rule.triggered_elements(), vec![first[9], second[9]]);

    let indicator = rule.feed().indicator().expect("indicator");
    assert_eq!((indicator.shows(), indicator.hides()), (1, 1));
}

#[test]
fn test_repeated_signals_trigger_once() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new());

    rule.scroll_to(200.0);
    rule.await_idle();
    for offset in [0.0, 250.0, 100.0, 300.0, 50.0, 400.0] {
        rule.scroll_to(offset);
        rule.advance_frame();
    }
    rule.await_idle();

    assert_eq!(rule.event_count(), 1);
    let stats = trigger.stats();
    assert_eq!(stats.triggers_emitted, 1);
    assert!(stats.duplicates_suppressed >= 1);
}

#[test]
fn test_no_trigger_while_loading() {
    let rule = FeedTestRule::new();
    let items = rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new());

    trigger.set_loading(true);
    assert_eq!(trigger.state(), TriggerState::Suppressed);
    rule.scroll_to(200.0);
    rule.await_idle();
    assert_eq!(rule.event_count(), 0);
    assert!(trigger.stats().signals_suppressed > 0);

    // Still in view when loading ends: fires without a new scroll.
    trigger.set_loading(false);
    rule.await_idle();
    assert_eq!(rule.triggered_elements(), vec![items[9]]);
}

#[test]
fn test_no_trigger_while_paused() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new());

    trigger.pause(false);
    rule.scroll_to(200.0);
    rule.await_idle();
    assert_eq!(rule.event_count(), 0);

    trigger.resume();
    rule.await_idle();
    assert_eq!(rule.event_count(), 1);
}

#[test]
fn test_pause_cancels_pending_debounce() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new());

    rule.scroll_to(200.0);
    rule.advance_frame();
    assert_eq!(trigger.state(), TriggerState::Debouncing);
    trigger.pause(false);
    assert_eq!(rule.scheduler().pending_timers(), 0);
    rule.await_idle();
    assert_eq!(rule.event_count(), 0);
}

#[test]
fn test_pause_resume_roundtrip_triggers_at_most_once() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    rule.scroll_to(200.0);
    let trigger = rule.started_trigger(PartialConfig::new());
    assert_eq!(rule.event_count(), 1);

    trigger.pause(false);
    trigger.resume();
    rule.await_idle();
    assert_eq!(rule.event_count(), 1);

    trigger.pause(true);
    trigger.resume();
    rule.await_idle();
    assert_eq!(rule.event_count(), 1);
}

#[test]
fn test_dedup_survives_debounce_window() {
    let rule = FeedTestRule::new();
    let items = rule.feed().append_items(10);
    rule.scroll_to(200.0);
    let trigger = rule.started_trigger(PartialConfig::new());
    assert_eq!(rule.triggered_elements(), vec![items[9]]);

    // A fresh signal for row 10, then a row comes and goes inside the window.
    rule.scroll_to(0.0);
    rule.advance_frame();
    rule.scroll_to(200.0);
    rule.advance_frame();
    assert_eq!(trigger.state(), TriggerState::Debouncing);
    rule.feed().append_items(1);
    rule.advance_frame();
    rule.feed().remove_last();
    rule.await_idle();

    assert_eq!(rule.event_count(), 1);
    assert_eq!(trigger.last_emitted(), Some(items[9]));
}

#[test]
fn test_item_appended_during_debounce_is_the_one_reported() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new());

    rule.scroll_to(200.0);
    rule.advance_frame();
    let appended = rule.feed().append_items(1);
    rule.await_idle();

    assert_eq!(rule.triggered_elements(), vec![appended[0]]);
    assert_eq!(trigger.last_emitted(), Some(appended[0]));
}

#[test]
fn test_listener_can_start_loading_synchronously() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new());
    let loader = trigger.clone();
    let _sub = trigger.subscribe(move |_| loader.set_loading(true), SubscribeOptions::default());

    rule.scroll_to(200.0);
    rule.await_idle();

    assert_eq!(rule.event_count(), 1);
    assert!(trigger.is_loading());
    assert_eq!(trigger.state(), TriggerState::Suppressed);
}

#[test]
fn test_global_target_receives_a_second_dispatch() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    let trigger =
        rule.started_trigger(PartialConfig::new().event_target(Some(EventTarget::Window)));
    let window_hits = Rc::new(Cell::new(0));
    let hits = window_hits.clone();
    let _sub = trigger.subscribe(
        move |_| hits.set(hits.get() + 1),
        SubscribeOptions::on(EventTarget::Window),
    );

    rule.scroll_to(200.0);
    rule.await_idle();
    assert_eq!(rule.event_count(), 1);
    assert_eq!(window_hits.get(), 1);
}

#[test]
fn test_global_target_equal_to_tree_root_dispatches_once() {
    let rule = FeedTestRule::new();
    rule.feed().append_items(10);
    let _trigger =
        rule.started_trigger(PartialConfig::new().event_target(Some(EventTarget::Document)));

    rule.scroll_to(200.0);
    rule.await_idle();
    assert_eq!(rule.event_count(), 1);
    assert_eq!(rule.bus().dispatch_count(), 1);
}

#[test]
fn test_event_lands_on_shadow_root() {
    let rule = FeedTestRule::new();
    let items = rule.feed().append_items(10);
    let shadow_root = EventTarget::Node(items[0]);
    rule.host().set_tree_root(items[9], shadow_root);
    let trigger = rule.started_trigger(PartialConfig::new());
    let shadow_hits = Rc::new(Cell::new(0));
    let hits = shadow_hits.clone();
    let _sub = trigger.subscribe(move |_| hits.set(hits.get() + 1), SubscribeOptions::on(shadow_root));

    rule.scroll_to(200.0);
    rule.await_idle();
    assert_eq!(shadow_hits.get(), 1);
    assert_eq!(rule.event_count(), 0);
}

#[test]
fn test_feed_cleared_forgets_last_trigger() {
    let rule = FeedTestRule::new();
    let items = rule.feed().append_items(10);
    rule.scroll_to(200.0);
    let trigger = rule.started_trigger(PartialConfig::new());
    assert_eq!(rule.event_count(), 1);

    trigger.notify_feed_cleared();
    rule.await_idle();
    assert_eq!(rule.triggered_elements(), vec![items[9], items[9]]);
}

#[test]
fn test_empty_feed_observes_nothing() {
    let rule = FeedTestRule::new();
    let trigger = rule.started_trigger(PartialConfig::new());
    assert_eq!(trigger.observed_target(), None);
    assert_eq!(trigger.state(), TriggerState::Idle);

    let items = rule.feed().append_items(3);
    trigger.notify_external_mutation();
    rule.await_idle();
    assert_eq!(rule.triggered_elements(), vec![items[2]]);
}

#[test]
fn test_detached_last_row_is_released() {
    let rule = FeedTestRule::new();
    let items = rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new());
    assert_eq!(trigger.observed_target(), Some(items[9]));

    rule.host().detach(items[9]);
    trigger.notify_external_mutation();
    rule.scroll_to(200.0);
    rule.await_idle();

    assert_eq!(trigger.observed_target(), None);
    assert_eq!(trigger.state(), TriggerState::Idle);
    assert!(rule.host().observed_elements().is_empty());
    assert_eq!(rule.event_count(), 0);
}

#[test]
fn test_observe_rejected_as_detached_leaves_core_disarmed() {
    let rule = FeedTestRule::new();
    let items = rule.feed().append_items(10);
    rule.host().fail_observe(true);
    let trigger = rule.started_trigger(PartialConfig::new());

    assert_eq!(trigger.observed_target(), None);
    assert_eq!(trigger.state(), TriggerState::Idle);
    rule.scroll_to(200.0);
    rule.await_idle();
    assert_eq!(rule.event_count(), 0);

    // The next retarget succeeds once the race is over.
    rule.host().fail_observe(false);
    trigger.notify_external_mutation();
    rule.await_idle();
    assert_eq!(rule.triggered_elements(), vec![items[9]]);
}

#[test]
fn test_mutation_notice_keeps_loading_settle() {
    let rule = FeedTestRule::new();
    let first = rule.feed().append_items(10);
    let trigger = rule.started_trigger(PartialConfig::new());
    assert_eq!(trigger.observed_target(), Some(first[9]));

    trigger.set_loading(true);
    let second = rule.feed().append_items(10);
    trigger.set_loading(false);
    trigger.notify_external_mutation();

    rule.advance_frame();
    assert_eq!(trigger.observed_target(), Some(first[9]), "still settling");
    rule.advance_frame();
    assert_eq!(trigger.observed_target(), Some(second[9]));
}
