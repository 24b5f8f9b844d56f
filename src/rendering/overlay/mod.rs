//! Keyed overlay store and the overlay variants drawn over the video.
//!
//! Overlays are kept in insertion order; later entries draw on top. Inserting with an
//! existing key drops the old overlay and appends the new one at the end.

mod bitmap;
mod shapes;
mod video;

pub use bitmap::BitmapOverlay;
pub use shapes::{LineOverlay, PolygonOverlay, RectangleOverlay, TextOverlay};
pub use video::VideoOverlay;

use crate::error::{PresentError, PresentResult};

use super::raster::{Canvas, TextRasterizer};

/// Stable identifier of an overlay.
pub type OverlayKey = u16;

/// Everything an overlay needs to draw itself.
pub struct DrawContext<'a, 'c> {
    pub canvas: &'a mut Canvas<'c>,
    pub text: &'a mut TextRasterizer,
}

/// Drawing capability shared by all overlay variants.
pub trait Drawable {
    fn draw(&self, ctx: &mut DrawContext<'_, '_>) -> PresentResult<()>;

    fn opacity(&self) -> u8;

    fn set_opacity(&mut self, opacity: u8);
}

/// One overlay of any kind.
#[derive(Debug, Clone)]
pub enum Overlay {
    Line(LineOverlay),
    Rectangle(RectangleOverlay),
    Polygon(PolygonOverlay),
    Text(TextOverlay),
    Bitmap(BitmapOverlay),
    Video(VideoOverlay),
}

impl Overlay {
    fn as_drawable(&self) -> &dyn Drawable {
        match self {
            Overlay::Line(o) => o,
            Overlay::Rectangle(o) => o,
            Overlay::Polygon(o) => o,
            Overlay::Text(o) => o,
            Overlay::Bitmap(o) => o,
            Overlay::Video(o) => o,
        }
    }

    fn as_drawable_mut(&mut self) -> &mut dyn Drawable {
        match self {
            Overlay::Line(o) => o,
            Overlay::Rectangle(o) => o,
            Overlay::Polygon(o) => o,
            Overlay::Text(o) => o,
            Overlay::Bitmap(o) => o,
            Overlay::Video(o) => o,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Overlay::Line(_) => "line",
            Overlay::Rectangle(_) => "rectangle",
            Overlay::Polygon(_) => "polygon",
            Overlay::Text(_) => "text",
            Overlay::Bitmap(_) => "bitmap",
            Overlay::Video(_) => "video",
        }
    }

    pub fn draw(&self, ctx: &mut DrawContext<'_, '_>) -> PresentResult<()> {
        self.as_drawable().draw(ctx)
    }

    pub fn opacity(&self) -> u8 {
        self.as_drawable().opacity()
    }

    pub fn set_opacity(&mut self, opacity: u8) {
        self.as_drawable_mut().set_opacity(opacity);
    }

    pub fn as_video_mut(&mut self) -> Option<&mut VideoOverlay> {
        match self {
            Overlay::Video(v) => Some(v),
            _ => None,
        }
    }
}

/// Ordered collection of overlays, at most one per key.
#[derive(Debug, Default)]
pub struct OverlayStore {
    entries: Vec<(OverlayKey, Overlay)>,
}

impl OverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the end of the draw order, returning the overlay it replaced.
    pub fn insert(&mut self, key: OverlayKey, overlay: Overlay) -> Option<Overlay> {
        let replaced = self.remove(key);
        log::debug!(
            "[OVERLAY] {} {} overlay {}",
            if replaced.is_some() { "Replaced" } else { "Added" },
            overlay.kind(),
            key
        );
        self.entries.push((key, overlay));
        replaced
    }

    /// Remove by key; absent keys are a no-op.
    pub fn remove(&mut self, key: OverlayKey) -> Option<Overlay> {
        let index = self.entries.iter().position(|(k, _)| *k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Drop every overlay, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn get(&self, key: OverlayKey) -> Option<&Overlay> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, o)| o)
    }

    pub fn get_mut(&mut self, key: OverlayKey) -> Option<&mut Overlay> {
        self.entries
            .iter_mut()
            .find(|(k, _)| *k == key)
            .map(|(_, o)| o)
    }

    /// Same as [`get_mut`](Self::get_mut) but a missing key is an error.
    pub fn require_mut(&mut self, key: OverlayKey) -> PresentResult<&mut Overlay> {
        self.get_mut(key)
            .ok_or_else(|| PresentError::InvalidArgument(format!("no overlay with key {}", key)))
    }

    /// Keys in draw order.
    pub fn keys(&self) -> Vec<OverlayKey> {
        self.entries.iter().map(|(k, _)| *k).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Draw every overlay in order. A failing overlay is logged and skipped.
    /// Returns the number drawn successfully.
    pub fn draw_all(&self, ctx: &mut DrawContext<'_, '_>) -> usize {
        let mut drawn = 0;
        for (key, overlay) in &self.entries {
            match overlay.draw(ctx) {
                Ok(()) => drawn += 1,
                Err(e) => log::warn!(
                    "[OVERLAY] Skipping {} overlay {}: {}",
                    overlay.kind(),
                    key,
                    e
                ),
            }
        }
        drawn
    }
}
