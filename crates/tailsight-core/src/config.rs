//! Configuration normalization.
//!
//! Options arrive loosely typed ([`PartialConfig`], usually straight from
//! JSON) and are coerced into a [`TriggerConfig`] where every field is usable.
//! Normalization never fails: anything malformed falls back to the field's
//! default.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use smallvec::SmallVec;

use crate::dom::EventTarget;
use crate::geometry::{Insets, Rect};

/// Upper bound for every timing option, in milliseconds.
pub const MAX_TIMING_MS: f64 = 10_000.0;

pub const DEFAULT_ROOT_MARGIN: &str = "0px 0px 200px 0px";
pub const DEFAULT_THRESHOLD: f64 = 0.0;
pub const DEFAULT_DEBOUNCE_MS: u64 = 150;
pub const DEFAULT_RESIZE_THROTTLE_MS: u64 = 100;
pub const DEFAULT_TRANSITION_MS: u64 = 300;

/// A single margin offset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MarginValue {
    Px(f64),
    /// Percentage of the root box along the same axis.
    Percent(f64),
}

impl MarginValue {
    /// Parses `"10px"`, `"-5%"` or a bare number (pixels).
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        let (number, value): (&str, fn(f64) -> Self) = if let Some(n) = token.strip_suffix('%') {
            (n, MarginValue::Percent)
        } else if let Some(n) = token.strip_suffix("px") {
            (n, MarginValue::Px)
        } else {
            (token, MarginValue::Px)
        };
        number
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(value)
    }

    /// Resolves to pixels against `reference` (the root's extent on this axis).
    pub fn to_pixels(&self, reference: f64) -> f64 {
        match *self {
            MarginValue::Px(px) => px,
            MarginValue::Percent(pct) => reference * pct / 100.0,
        }
    }
}

impl Default for MarginValue {
    fn default() -> Self {
        MarginValue::Px(0.0)
    }
}

impl fmt::Display for MarginValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarginValue::Px(px) => write!(f, "{}px", px),
            MarginValue::Percent(pct) => write!(f, "{}%", pct),
        }
    }
}

/// Four signed offsets around the viewport, CSS `margin` order.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RootMargin {
    pub top: MarginValue,
    pub right: MarginValue,
    pub bottom: MarginValue,
    pub left: MarginValue,
}

impl RootMargin {
    /// Parses 1 to 4 value shorthand. Returns `None` for anything else.
    pub fn parse(input: &str) -> Option<Self> {
        let values = input
            .split_whitespace()
            .map(MarginValue::parse)
            .collect::<Option<SmallVec<[MarginValue; 4]>>>()?;

        match values.as_slice() {
            [all] => Some(Self::uniform(*all)),
            [vertical, horizontal] => Some(Self {
                top: *vertical,
                right: *horizontal,
                bottom: *vertical,
                left: *horizontal,
            }),
            [top, horizontal, bottom] => Some(Self {
                top: *top,
                right: *horizontal,
                bottom: *bottom,
                left: *horizontal,
            }),
            [top, right, bottom, left] => Some(Self {
                top: *top,
                right: *right,
                bottom: *bottom,
                left: *left,
            }),
            _ => None,
        }
    }

    pub fn uniform(value: MarginValue) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }

    /// Resolves percentages against `root` and returns pixel insets.
    pub fn resolve(&self, root: &Rect) -> Insets {
        Insets {
            top: self.top.to_pixels(root.height),
            right: self.right.to_pixels(root.width),
            bottom: self.bottom.to_pixels(root.height),
            left: self.left.to_pixels(root.width),
        }
    }
}

impl fmt::Display for RootMargin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.top, self.right, self.bottom, self.left)
    }
}

/// Visibility ratio(s) at which the platform reports a crossing.
#[derive(Clone, Debug, PartialEq)]
pub enum Threshold {
    Single(f64),
    /// Sorted ascending, deduplicated, every value in `[0, 1]`.
    Multiple(SmallVec<[f64; 4]>),
}

impl Threshold {
    pub fn values(&self) -> SmallVec<[f64; 4]> {
        match self {
            Threshold::Single(value) => SmallVec::from_slice(&[*value]),
            Threshold::Multiple(values) => values.clone(),
        }
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Threshold::Single(DEFAULT_THRESHOLD)
    }
}

/// Normalized controller configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct TriggerConfig {
    pub root_margin: RootMargin,
    pub threshold: Threshold,
    /// Quiet period before a visibility signal becomes a trigger.
    pub debounce: Duration,
    /// Minimum spacing between resize-driven re-checks.
    pub resize_throttle: Duration,
    /// Duration of the caller's item-insertion transition, for callers that
    /// want to delay their own follow-up work by it.
    pub transition_duration: Duration,
    /// Extra target that receives every trigger besides the element's tree.
    pub event_target: Option<EventTarget>,
    /// Pause while the document is hidden.
    pub pause_on_hidden: bool,
    /// Make [`pause`](crate::PaginationTrigger::pause) disconnect observation.
    pub disconnect_on_pause: bool,
    /// Re-check geometry after [`notify_external_mutation`](crate::PaginationTrigger::notify_external_mutation).
    pub force_check_on_mutation: bool,
    /// Allow boxes with no extent (zero-size sentinels) to count as visible.
    pub allow_zero_size: bool,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            root_margin: default_root_margin(),
            threshold: Threshold::default(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            resize_throttle: Duration::from_millis(DEFAULT_RESIZE_THROTTLE_MS),
            transition_duration: Duration::from_millis(DEFAULT_TRANSITION_MS),
            event_target: None,
            pause_on_hidden: true,
            disconnect_on_pause: false,
            force_check_on_mutation: false,
            allow_zero_size: false,
        }
    }
}

impl TriggerConfig {
    /// Normalizes `partial` on top of the defaults.
    pub fn normalize(partial: &PartialConfig) -> Self {
        Self::default().merged(partial)
    }

    /// Returns a copy with every field present in `partial` coerced and
    /// applied. Absent fields keep their current value; malformed ones reset
    /// to the default.
    pub fn merged(&self, partial: &PartialConfig) -> Self {
        let defaults = Self::default();
        Self {
            root_margin: partial
                .root_margin
                .as_ref()
                .map_or(self.root_margin, |v| coerce_margin(v).unwrap_or(defaults.root_margin)),
            threshold: partial
                .threshold
                .as_ref()
                .map_or_else(|| self.threshold.clone(), coerce_threshold),
            debounce: coerce_timing(partial.debounce_ms.as_ref(), self.debounce, defaults.debounce),
            resize_throttle: coerce_timing(
                partial.resize_throttle_ms.as_ref(),
                self.resize_throttle,
                defaults.resize_throttle,
            ),
            transition_duration: coerce_timing(
                partial.transition_duration_ms.as_ref(),
                self.transition_duration,
                defaults.transition_duration,
            ),
            event_target: partial.event_target.unwrap_or(self.event_target),
            pause_on_hidden: coerce_flag(
                partial.pause_on_hidden.as_ref(),
                self.pause_on_hidden,
                defaults.pause_on_hidden,
            ),
            disconnect_on_pause: coerce_flag(
                partial.disconnect_on_pause.as_ref(),
                self.disconnect_on_pause,
                defaults.disconnect_on_pause,
            ),
            force_check_on_mutation: coerce_flag(
                partial.force_check_on_mutation.as_ref(),
                self.force_check_on_mutation,
                defaults.force_check_on_mutation,
            ),
            allow_zero_size: coerce_flag(
                partial.allow_zero_size.as_ref(),
                self.allow_zero_size,
                defaults.allow_zero_size,
            ),
        }
    }

    /// Whether switching to `other` requires rebuilding the observer.
    ///
    /// Thresholds compare by value.
    pub fn observation_differs(&self, other: &TriggerConfig) -> bool {
        self.root_margin != other.root_margin
            || self.threshold.values() != other.threshold.values()
            || self.allow_zero_size != other.allow_zero_size
    }
}

/// Loosely typed options as supplied by the caller.
///
/// Every field is optional; `None` means "leave as is".
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartialConfig {
    pub root_margin: Option<Value>,
    pub threshold: Option<Value>,
    pub debounce_ms: Option<Value>,
    pub resize_throttle_ms: Option<Value>,
    pub transition_duration_ms: Option<Value>,
    #[serde(skip)]
    pub event_target: Option<Option<EventTarget>>,
    pub pause_on_hidden: Option<Value>,
    pub disconnect_on_pause: Option<Value>,
    pub force_check_on_mutation: Option<Value>,
    pub allow_zero_size: Option<Value>,
}

impl PartialConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn root_margin(mut self, value: impl Into<Value>) -> Self {
        self.root_margin = Some(value.into());
        self
    }

    pub fn threshold(mut self, value: impl Into<Value>) -> Self {
        self.threshold = Some(value.into());
        self
    }

    pub fn debounce_ms(mut self, value: impl Into<Value>) -> Self {
        self.debounce_ms = Some(value.into());
        self
    }

    pub fn resize_throttle_ms(mut self, value: impl Into<Value>) -> Self {
        self.resize_throttle_ms = Some(value.into());
        self
    }

    pub fn transition_duration_ms(mut self, value: impl Into<Value>) -> Self {
        self.transition_duration_ms = Some(value.into());
        self
    }

    pub fn event_target(mut self, target: Option<EventTarget>) -> Self {
        self.event_target = Some(target);
        self
    }

    pub fn pause_on_hidden(mut self, value: impl Into<Value>) -> Self {
        self.pause_on_hidden = Some(value.into());
        self
    }

    pub fn disconnect_on_pause(mut self, value: impl Into<Value>) -> Self {
        self.disconnect_on_pause = Some(value.into());
        self
    }

    pub fn force_check_on_mutation(mut self, value: impl Into<Value>) -> Self {
        self.force_check_on_mutation = Some(value.into());
        self
    }

    pub fn allow_zero_size(mut self, value: impl Into<Value>) -> Self {
        self.allow_zero_size = Some(value.into());
        self
    }
}

fn default_root_margin() -> RootMargin {
    RootMargin::parse(DEFAULT_ROOT_MARGIN).unwrap_or_default()
}

/// Numbers and numeric strings; anything non-finite is rejected.
fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn coerce_timing(value: Option<&Value>, current: Duration, default: Duration) -> Duration {
    let Some(value) = value else {
        return current;
    };
    match coerce_number(value) {
        Some(ms) if ms >= 0.0 => Duration::from_millis(ms.min(MAX_TIMING_MS).round() as u64),
        _ => default,
    }
}

fn coerce_flag(value: Option<&Value>, current: bool, default: bool) -> bool {
    let Some(value) = value else {
        return current;
    };
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().map_or(default, |n| n != 0.0),
        Value::String(s) => match s.trim() {
            "true" | "1" => true,
            "false" | "0" => false,
            _ => default,
        },
        _ => default,
    }
}

fn coerce_margin(value: &Value) -> Option<RootMargin> {
    match value {
        Value::String(s) => RootMargin::parse(s),
        Value::Number(_) => coerce_number(value).map(|px| RootMargin::uniform(MarginValue::Px(px))),
        _ => None,
    }
}

fn coerce_threshold(value: &Value) -> Threshold {
    match value {
        Value::Array(items) => {
            let mut values: SmallVec<[f64; 4]> = items
                .iter()
                .filter_map(coerce_number)
                .map(|v| v.clamp(0.0, 1.0))
                .collect();
            values.sort_by(f64::total_cmp);
            values.dedup();
            if values.is_empty() {
                Threshold::default()
            } else {
                Threshold::Multiple(values)
            }
        }
        other => coerce_number(other)
            .map(|v| Threshold::Single(v.clamp(0.0, 1.0)))
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use smallvec::smallvec;

    #[test]
    fn test_defaults_are_sane() {
        let config = TriggerConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(DEFAULT_DEBOUNCE_MS));
        assert_eq!(config.threshold, Threshold::Single(0.0));
        assert_eq!(config.root_margin.bottom, MarginValue::Px(200.0));
    }

    #[test]
    fn test_invalid_debounce_falls_back_to_default() {
        let default = Duration::from_millis(DEFAULT_DEBOUNCE_MS);
        for bad in [json!(-5), json!("abc"), json!(null), json!([1, 2])] {
            let config = TriggerConfig::normalize(&PartialConfig::new().debounce_ms(bad.clone()));
            assert_eq!(config.debounce, default, "input {bad}");
        }
    }

    #[test]
    fn test_timing_is_clamped_and_coerced() {
        let config = TriggerConfig::normalize(
            &PartialConfig::new()
                .debounce_ms(50_000)
                .resize_throttle_ms("250")
                .transition_duration_ms(12.6),
        );
        assert_eq!(config.debounce, Duration::from_millis(10_000));
        assert_eq!(config.resize_throttle, Duration::from_millis(250));
        assert_eq!(config.transition_duration, Duration::from_millis(13));
    }

    #[test]
    fn test_threshold_array_sorted_and_deduplicated() {
        let config =
            TriggerConfig::normalize(&PartialConfig::new().threshold(json!([1.5, -1, 0.3, 0.3])));
        assert_eq!(config.threshold, Threshold::Multiple(smallvec![0.0, 0.3, 1.0]));
    }

    #[test]
    fn test_threshold_empty_after_filtering_uses_default() {
        let config =
            TriggerConfig::normalize(&PartialConfig::new().threshold(json!(["x", null])));
        assert_eq!(config.threshold, Threshold::Single(DEFAULT_THRESHOLD));

        let config = TriggerConfig::normalize(&PartialConfig::new().threshold(json!(7)));
        assert_eq!(config.threshold, Threshold::Single(1.0));
    }

    #[test]
    fn test_margin_shorthand() {
        let one = RootMargin::parse("10px").unwrap();
        assert_eq!(one, RootMargin::uniform(MarginValue::Px(10.0)));

        let two = RootMargin::parse("10px 20%").unwrap();
        assert_eq!(two.top, MarginValue::Px(10.0));
        assert_eq!(two.right, MarginValue::Percent(20.0));
        assert_eq!(two.bottom, MarginValue::Px(10.0));
        assert_eq!(two.left, MarginValue::Percent(20.0));

        let three = RootMargin::parse("1px 2px 3px").unwrap();
        assert_eq!(three.bottom, MarginValue::Px(3.0));
        assert_eq!(three.left, MarginValue::Px(2.0));

        let four = RootMargin::parse("-1px 2px 3px 4px").unwrap();
        assert_eq!(four.top, MarginValue::Px(-1.0));
        assert_eq!(four.left, MarginValue::Px(4.0));

        assert!(RootMargin::parse("1px 2px 3px 4px 5px").is_none());
        assert!(RootMargin::parse("ten").is_none());
        assert!(RootMargin::parse("").is_none());
    }

    #[test]
    fn test_malformed_margin_uses_default() {
        let config = TriggerConfig::normalize(&PartialConfig::new().root_margin("lots"));
        assert_eq!(config.root_margin, default_root_margin());
    }

    #[test]
    fn test_margin_round_trips_through_display() {
        let margin = RootMargin::parse("0px 0px 25% 0px").unwrap();
        assert_eq!(margin.to_string(), "0px 0px 25% 0px");
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let base = TriggerConfig::normalize(&PartialConfig::new().debounce_ms(40));
        let merged = base.merged(&PartialConfig::new().pause_on_hidden(false));
        assert_eq!(merged.debounce, Duration::from_millis(40));
        assert!(!merged.pause_on_hidden);
        assert!(!base.observation_differs(&merged));
    }

    #[test]
    fn test_observation_differs_compares_thresholds_by_value() {
        let a = TriggerConfig::normalize(&PartialConfig::new().threshold(json!([0.5, 0.1])));
        let b = TriggerConfig::normalize(&PartialConfig::new().threshold(json!([0.1, 0.5, 0.5])));
        assert!(!a.observation_differs(&b));

        let c = b.merged(&PartialConfig::new().root_margin("0px"));
        assert!(b.observation_differs(&c));
    }

    #[test]
    fn test_from_json() {
        let partial = PartialConfig::from_json(
            r#"{"rootMargin": "0px 0px 50% 0px", "debounceMs": "abc", "pauseOnHidden": "false"}"#,
        )
        .unwrap();
        let config = TriggerConfig::normalize(&partial);
        assert_eq!(config.root_margin.bottom, MarginValue::Percent(50.0));
        assert_eq!(config.debounce, Duration::from_millis(DEFAULT_DEBOUNCE_MS));
        assert!(!config.pause_on_hidden);
    }
}
