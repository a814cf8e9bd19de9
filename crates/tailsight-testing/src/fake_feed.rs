//! A list of fixed-height rows living in a [`FakeHost`].

use std::cell::{Cell, RefCell};

use tailsight_core::{ElementId, FeedRenderer, LoadingIndicator, Rect, RootMargin};

use crate::fake_host::FakeHost;

/// Indicator that only counts calls.
#[derive(Default)]
pub struct CountingIndicator {
    shows: Cell<u32>,
    hides: Cell<u32>,
    visible: Cell<bool>,
}

impl CountingIndicator {
    pub fn shows(&self) -> u32 {
        self.shows.get()
    }

    pub fn hides(&self) -> u32 {
        self.hides.get()
    }

    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }
}

impl LoadingIndicator for CountingIndicator {
    fn show(&self) {
        self.shows.set(self.shows.get() + 1);
        self.visible.set(true);
    }

    fn hide(&self) {
        self.hides.set(self.hides.get() + 1);
        self.visible.set(false);
    }
}

/// Rows stacked top to bottom, either in the document or in a container.
pub struct FakeFeed {
    host: FakeHost,
    container: Option<ElementId>,
    top: f64,
    width: f64,
    item_height: f64,
    items: RefCell<Vec<ElementId>>,
    indicator: Option<CountingIndicator>,
    geometry_override: Cell<Option<bool>>,
}

impl FakeFeed {
    pub fn new(host: FakeHost, width: f64, item_height: f64) -> Self {
        Self {
            host,
            container: None,
            top: 0.0,
            width,
            item_height,
            items: RefCell::new(Vec::new()),
            indicator: Some(CountingIndicator::default()),
            geometry_override: Cell::new(None),
        }
    }

    /// Places rows in `container` and reports it as the scroll container.
    pub fn in_container(mut self, container: ElementId) -> Self {
        self.container = Some(container);
        self
    }

    /// Offset of the first row from the top of its scroller.
    pub fn with_top(mut self, top: f64) -> Self {
        self.top = top;
        self
    }

    pub fn without_indicator(mut self) -> Self {
        self.indicator = None;
        self
    }

    /// Appends `count` rows and returns them.
    pub fn append_items(&self, count: usize) -> Vec<ElementId> {
        let mut items = self.items.borrow_mut();
        let mut added = Vec::with_capacity(count);
        for _ in 0..count {
            let rect = Rect::new(
                0.0,
                self.top + items.len() as f64 * self.item_height,
                self.width,
                self.item_height,
            );
            let id = match self.container {
                Some(container) => self.host.create_element_in(container, rect),
                None => self.host.create_element(rect),
            };
            items.push(id);
            added.push(id);
        }
        added
    }

    /// Detaches every row.
    pub fn clear(&self) {
        for item in self.items.borrow_mut().drain(..) {
            self.host.detach(item);
        }
    }

    /// Detaches the last row.
    pub fn remove_last(&self) -> Option<ElementId> {
        let removed = self.items.borrow_mut().pop();
        if let Some(item) = removed {
            self.host.detach(item);
        }
        removed
    }

    pub fn items(&self) -> Vec<ElementId> {
        self.items.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Content height of all rows, including the top offset.
    pub fn content_height(&self) -> f64 {
        self.top + self.len() as f64 * self.item_height
    }

    pub fn indicator(&self) -> Option<&CountingIndicator> {
        self.indicator.as_ref()
    }

    /// Answers geometry queries with `answer` instead of bounding boxes.
    pub fn override_geometry(&self, answer: Option<bool>) {
        self.geometry_override.set(answer);
    }
}

impl FeedRenderer for FakeFeed {
    fn last_item_element(&self) -> Option<ElementId> {
        self.items.borrow().last().copied()
    }

    fn loading_indicator(&self) -> Option<&dyn LoadingIndicator> {
        self.indicator
            .as_ref()
            .map(|indicator| indicator as &dyn LoadingIndicator)
    }

    fn scroll_container(&self) -> Option<ElementId> {
        self.container
    }

    fn is_within_viewport_margin(&self, _element: ElementId, _margin: &RootMargin) -> Option<bool> {
        self.geometry_override.get()
    }
}
