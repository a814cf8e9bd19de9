use std::rc::Rc;

use tailsight_core::{ElementId, FeedRenderer, LoadingIndicator};
use web_sys::Element;

use crate::host::WebHost;

/// Indicator shown and hidden through the `hidden` attribute.
pub struct HiddenAttributeIndicator {
    element: Element,
}

impl HiddenAttributeIndicator {
    pub fn new(element: Element) -> Self {
        Self { element }
    }

    fn set_hidden(&self, hidden: bool) {
        if let Err(err) = self.element.toggle_attribute_with_force("hidden", hidden) {
            log::debug!("toggling loading indicator failed: {err:?}");
        }
    }
}

impl LoadingIndicator for HiddenAttributeIndicator {
    fn show(&self) {
        self.set_hidden(false);
    }

    fn hide(&self) {
        self.set_hidden(true);
    }
}

/// A list element whose last element child is the last item.
///
/// An indicator placed as the list's last child is skipped.
pub struct DomFeed {
    host: Rc<WebHost>,
    list: Element,
    indicator: Option<HiddenAttributeIndicator>,
    container: Option<Element>,
}

impl DomFeed {
    pub fn new(host: Rc<WebHost>, list: Element) -> Self {
        Self {
            host,
            list,
            indicator: None,
            container: None,
        }
    }

    pub fn with_indicator(mut self, element: Element) -> Self {
        self.indicator = Some(HiddenAttributeIndicator::new(element));
        self
    }

    pub fn with_scroll_container(mut self, element: Element) -> Self {
        self.container = Some(element);
        self
    }

    pub fn list(&self) -> &Element {
        &self.list
    }
}

impl FeedRenderer for DomFeed {
    fn last_item_element(&self) -> Option<ElementId> {
        let mut last = self.list.last_element_child();
        if let (Some(candidate), Some(indicator)) = (&last, &self.indicator) {
            if *candidate == indicator.element {
                last = candidate.previous_element_sibling();
            }
        }
        last.map(|element| self.host.register(&element))
    }

    fn loading_indicator(&self) -> Option<&dyn LoadingIndicator> {
        self.indicator
            .as_ref()
            .map(|indicator| indicator as &dyn LoadingIndicator)
    }

    fn scroll_container(&self) -> Option<ElementId> {
        self.container
            .as_ref()
            .map(|element| self.host.register(element))
    }
}
