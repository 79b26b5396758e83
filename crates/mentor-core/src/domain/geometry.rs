//! Render-space to source-space coordinate scaling.
//!
//! The mentor clicks on a *rendered* video element whose size follows the
//! mentor's window layout.  The child's screen has its own *natural* (source)
//! resolution.  A click is transmitted in source space:
//!
//! ```text
//! source_x = x * source_width  / rendered_width
//! source_y = y * source_height / rendered_height
//! ```
//!
//! The factor is recomputed from live dimensions on every event; layout can
//! reflow between two clicks, so a cached factor would drift.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Returns `true` if either dimension is zero, negative, or not finite.
    pub fn is_degenerate(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
    }
}

/// An on-screen bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// Errors produced when a click cannot be mapped to the source screen.
#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    /// The rendered element has no area (hidden or not laid out yet).
    #[error("rendered frame has no area ({0:?})")]
    EmptyRendered(Size),
    /// The source stream has not reported its natural size yet.
    #[error("source frame size unknown ({0:?})")]
    EmptySource(Size),
}

/// Maps `(x, y)`, relative to `rendered`'s top-left corner, into source pixels.
///
/// The result is rounded to the nearest pixel and clamped to the source frame.
///
/// # Errors
///
/// Returns [`GeometryError`] when either frame is degenerate.
///
/// # Examples
///
/// ```rust
/// use mentor_core::{scale_to_source, Rect, Size};
///
/// let rendered = Rect::new(0.0, 0.0, 800.0, 600.0);
/// let source = Size::new(1600.0, 1200.0);
/// assert_eq!(scale_to_source(100.0, 100.0, rendered, source).unwrap(), (200, 200));
/// ```
pub fn scale_to_source(
    x: f64,
    y: f64,
    rendered: Rect,
    source: Size,
) -> Result<(i32, i32), GeometryError> {
    let rendered = rendered.size();
    if rendered.is_degenerate() {
        return Err(GeometryError::EmptyRendered(rendered));
    }
    if source.is_degenerate() {
        return Err(GeometryError::EmptySource(source));
    }

    let sx = x * (source.width / rendered.width);
    let sy = y * (source.height / rendered.height);

    let max_x = (source.width - 1.0).max(0.0);
    let max_y = (source.height - 1.0).max(0.0);
    Ok((
        sx.round().clamp(0.0, max_x) as i32,
        sy.round().clamp(0.0, max_y) as i32,
    ))
}
