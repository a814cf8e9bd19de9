//! Bounding-box math for "is the last item inside the viewport margin".

use crate::config::RootMargin;

/// Axis-aligned rectangle in viewport coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// True for boxes without area: `display: none`, collapsed, or a
    /// zero-height sentinel row.
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Returns the rectangle translated by `(dx, dy)`.
    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    /// Grows the rectangle outwards by the given insets.
    ///
    /// Negative insets shrink it.
    pub fn expand(&self, insets: &Insets) -> Self {
        Self {
            x: self.x - insets.left,
            y: self.y - insets.top,
            width: self.width + insets.left + insets.right,
            height: self.height + insets.top + insets.bottom,
        }
    }

    /// Edge-inclusive overlap test.
    ///
    /// Touching edges count as overlap so that a zero-height sentinel sitting
    /// exactly on the margin line is reported as inside.
    pub fn touches(&self, other: &Rect) -> bool {
        self.left() <= other.right()
            && self.right() >= other.left()
            && self.top() <= other.bottom()
            && self.bottom() >= other.top()
    }
}

/// Resolved margin offsets in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Insets {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

/// Returns whether `target` lies within `root` expanded by `margin`.
///
/// Percentages in the margin resolve against the root box. Boxes with no
/// extent are rejected unless `allow_zero_size` is set.
pub fn is_within_margin(
    target: &Rect,
    root: &Rect,
    margin: &RootMargin,
    allow_zero_size: bool,
) -> bool {
    if target.is_degenerate() && !allow_zero_size {
        return false;
    }
    let expanded = root.expand(&margin.resolve(root));
    target.touches(&expanded)
}
