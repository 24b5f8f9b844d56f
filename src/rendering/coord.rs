//! Display-area geometry: sizes, points, rectangles and the letterbox calculation.
//!
//! Rectangles are integer, edge-exclusive (`right`/`bottom` are one past the last
//! pixel) and expressed in display-area pixels with `(0, 0)` at the top-left.

use serde::{Deserialize, Serialize};

/// Width/height pair in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Each dimension clamped to at least one pixel.
    pub fn at_least_one(self) -> Self {
        Self::new(self.width.max(1), self.height.max(1))
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width after applying a pixel aspect ratio; a ratio <= 0 means square pixels.
    pub fn with_pixel_aspect(self, pixel_aspect_ratio: f64) -> Self {
        if pixel_aspect_ratio > 0.0 {
            let width = (self.width as f64 * pixel_aspect_ratio).round().max(1.0) as u32;
            Self::new(width, self.height)
        } else {
            self
        }
    }
}

/// Sub-pixel position used by vector overlays.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Integer rectangle, `right`/`bottom` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub const fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    /// Rectangle covering a whole area.
    pub fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width as i32, size.height as i32)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }

    /// Overlap of two rectangles (may be empty).
    pub fn intersect(&self, other: &Rect) -> Rect {
        Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        )
    }
}

/// Destination rectangle for a video inside a target area.
///
/// In [`FillMode::Fill`](super::types::FillMode::Fill) the whole area is used. In
/// `KeepAspectRatio` the video's aspect ratio (times the pixel aspect ratio when it
/// is positive) is preserved and the remainder of exactly one axis is split evenly
/// between both sides. Zero-sized inputs are treated as one pixel.
pub fn letterbox(
    target: Size,
    video: Size,
    pixel_aspect_ratio: f64,
    mode: super::types::FillMode,
) -> Rect {
    let target = target.at_least_one();
    let mut rect = Rect::from_size(target);
    if mode == super::types::FillMode::Fill {
        return rect;
    }

    let video = video.at_least_one();
    let mut ratio = video.width as f64 / video.height as f64;
    if pixel_aspect_ratio > 0.0 {
        ratio *= pixel_aspect_ratio;
    }

    let target_w = target.width as f64;
    let target_h = target.height as f64;
    let height = target_w / ratio;
    if height <= target_h {
        let delta = ((target_h - height) / 2.0) as i32;
        rect.top += delta;
        rect.bottom -= delta;
    } else {
        let width = target_h * ratio;
        let delta = ((target_w - width) / 2.0) as i32;
        rect.left += delta;
        rect.right -= delta;
    }
    rect
}
