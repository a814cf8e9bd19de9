//! Scrolls a simulated feed towards its end, frame by frame, and loads one
//! page every time the trigger fires.
//!
//! Run with:
//! ```bash
//! RUST_LOG=debug cargo run -p feed-demo -- --pages 5 --polling '{"debounceMs": 50}'
//! ```

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tailsight_core::{Capabilities, PartialConfig, SubscribeOptions};
use tailsight_testing::{FeedTestRule, VIEWPORT_HEIGHT};

const PAGE_SIZE: usize = 10;
const SCROLL_STEP: f64 = 40.0;
const LOAD_LATENCY: Duration = Duration::from_millis(300);
const MAX_FRAMES: usize = 20_000;

#[derive(Debug, Parser)]
#[command(name = "feed-demo")]
#[command(about = "Scrolls a simulated feed and loads a page per trigger", long_about = None)]
struct DemoArgs {
    /// Pages to load before exiting
    #[arg(long, default_value_t = 5)]
    pages: usize,

    /// Observe by polling geometry instead of an intersection observer
    #[arg(long)]
    polling: bool,

    /// Trigger options as a JSON object, e.g. '{"debounceMs": 50}'
    options: Option<String>,
}

impl DemoArgs {
    fn options(&self) -> anyhow::Result<PartialConfig> {
        match &self.options {
            Some(json) => PartialConfig::from_json(json).context("options must be a JSON object"),
            None => Ok(PartialConfig::new()),
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = DemoArgs::parse();
    let options = args.options()?;

    let rule = if args.polling {
        FeedTestRule::with_capabilities(Capabilities::minimal())
    } else {
        FeedTestRule::new()
    };
    rule.feed().append_items(PAGE_SIZE);

    let trigger = rule.trigger(options);
    let requested = Rc::new(Cell::new(false));
    let on_trigger = requested.clone();
    let _subscription = trigger.subscribe(
        move |event| {
            log::info!("{} asks for more after item #{}", event.manager, event.element);
            on_trigger.set(true);
        },
        SubscribeOptions::default(),
    );
    trigger.init();
    log::info!(
        "feed of {} items, observing with {:?}",
        rule.feed().len(),
        trigger.adapter_kind()
    );

    let mut loaded = 0;
    let mut arrival: Option<Duration> = None;
    for _ in 0..MAX_FRAMES {
        if loaded >= args.pages {
            break;
        }
        match arrival {
            Some(due) if rule.now() >= due => {
                rule.feed().append_items(PAGE_SIZE);
                trigger.set_loading(false);
                arrival = None;
                loaded += 1;
                log::info!("page {loaded} arrived, {} items", rule.feed().len());
            }
            Some(_) => {}
            None => {
                let bottom = (rule.feed().content_height() - VIEWPORT_HEIGHT).max(0.0);
                rule.scroll_to((rule.host().scroll_y() + SCROLL_STEP).min(bottom));
            }
        }
        rule.advance_frame();
        if requested.replace(false) {
            trigger.set_loading(true);
            arrival = Some(rule.now() + LOAD_LATENCY);
        }
    }

    let stats = trigger.stats();
    trigger.cleanup();
    anyhow::ensure!(
        loaded >= args.pages,
        "feed stalled after {loaded} of {} pages ({stats:?})",
        args.pages
    );
    log::info!("done in {:?} of virtual time: {stats:?}", rule.now());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<DemoArgs, clap::Error> {
        DemoArgs::try_parse_from(std::iter::once("feed-demo").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.pages, 5);
        assert!(!args.polling);
        assert!(args.options().unwrap().debounce_ms.is_none());
    }

    #[test]
    fn test_flags_and_options() {
        let args = parse(&["--polling", "--pages", "3", r#"{"debounceMs": 50}"#]).unwrap();
        assert_eq!(args.pages, 3);
        assert!(args.polling);
        assert!(args.options().unwrap().debounce_ms.is_some());
    }

    #[test]
    fn test_rejects_bad_arguments() {
        assert!(parse(&["--fast"]).is_err());
        assert!(parse(&["--pages"]).is_err());
        assert!(parse(&["--pages", "many"]).is_err());
        assert!(parse(&["not json"]).unwrap().options().is_err());
    }
}
