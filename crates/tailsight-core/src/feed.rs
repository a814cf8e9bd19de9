//! Contract of the rendering collaborator.

use crate::config::RootMargin;
use crate::dom::ElementId;

/// Shows progress while the caller fetches the next page.
pub trait LoadingIndicator {
    fn show(&self);
    fn hide(&self);
}

/// The list being paginated, as seen by the controller.
///
/// Only [`last_item_element`](Self::last_item_element) is required. The other
/// capabilities are optional; the controller warns once in debug builds when
/// it needs one that is missing and carries on without it.
///
/// Implementations must not call back into the controller from these
/// methods.
pub trait FeedRenderer {
    /// Current last item, or `None` for an empty list. Must reflect DOM
    /// mutations synchronously.
    fn last_item_element(&self) -> Option<ElementId>;

    fn loading_indicator(&self) -> Option<&dyn LoadingIndicator> {
        None
    }

    /// Element that scrolls the list, when it is not the document.
    fn scroll_container(&self) -> Option<ElementId> {
        None
    }

    /// Geometry override. `None` lets the controller compute the answer from
    /// bounding boxes.
    fn is_within_viewport_margin(&self, element: ElementId, margin: &RootMargin) -> Option<bool> {
        let _ = (element, margin);
        None
    }
}
