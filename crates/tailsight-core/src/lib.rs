//! Deduplicated "last item is visible" trigger for infinitely growing lists.
//!
//! A [`PaginationTrigger`] watches the last item of a list through the
//! host's intersection observer (or a polling fallback) and emits exactly one
//! `lastElementVisible` event per item, debounced and suppressed while the
//! caller is loading the next page or has paused it.
//!
//! Platform access goes through [`Host`] and [`Scheduler`], so the same
//! controller runs in a browser and against a simulated document in tests.

pub mod collections;
pub mod config;
pub mod controller;
pub mod dom;
pub mod error;
pub mod events;
pub mod feed;
pub mod geometry;
pub mod observation;
pub mod registry;
mod resize;
pub mod scheduler;
pub mod trigger;

pub use config::{MarginValue, PartialConfig, RootMargin, Threshold, TriggerConfig};
pub use controller::{Environment, PaginationTrigger, TriggerStats};
pub use dom::{
    Capabilities, ElementId, EventTarget, Host, HostCallback, HostEvent, IntersectionCallback,
    IntersectionEntry, IntersectionInit, IntersectionObserverHandle, ListenerId, ResizeCallback,
    ResizeObserverHandle,
};
pub use error::HostError;
pub use events::{
    AbortSignal, EventBus, InstanceId, LastElementVisible, Listener, SubscribeOptions, Subscription,
    LAST_ELEMENT_VISIBLE,
};
pub use feed::{FeedRenderer, LoadingIndicator};
pub use geometry::{is_within_margin, Insets, Rect};
pub use observation::AdapterKind;
pub use registry::Registry;
pub use scheduler::{Clock, LoopScheduler, Scheduler, Task, TaskId, WallClock};
pub use trigger::{TriggerCore, TriggerState};
