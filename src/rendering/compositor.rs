//! Per-frame scene composition.
//!
//! Order of a frame: fill the display texture (letterbox color), stretch the source
//! into the target rectangle, draw the unit quad through the shader pair, draw the
//! overlays in insertion order and present when a window is attached.

use crate::error::PresentResult;

use super::coord::Rect;
use super::device::GraphicsDevice;
use super::overlay::{DrawContext, OverlayStore};
use super::raster::{Canvas, TextRasterizer};
use super::shader::ShaderState;
use super::types::{Color, Frame};

/// Inputs of one composed frame.
pub struct Scene<'a> {
    /// Stretch source; `None` leaves only the background.
    pub source: Option<&'a Frame>,
    pub target_rect: Rect,
    pub background: Color,
    pub shaders: &'a ShaderState,
    /// `None` when overlays are hidden.
    pub overlays: Option<&'a OverlayStore>,
}

/// Owns per-frame helpers that outlive a single frame.
#[derive(Default)]
pub struct Compositor {
    text: TextRasterizer,
}

impl Compositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stretch the scene source and compose it.
    pub fn present<D: GraphicsDevice>(&mut self, device: &mut D, scene: &Scene<'_>) -> PresentResult<()> {
        device.stretch(scene.source, scene.target_rect, scene.background)?;
        self.compose(device, scene)
    }

    /// Fill the display texture with one color instead of stretching, then compose.
    pub fn present_cleared<D: GraphicsDevice>(
        &mut self,
        device: &mut D,
        color: Color,
        scene: &Scene<'_>,
    ) -> PresentResult<()> {
        device.fill_display(color)?;
        self.compose(device, scene)
    }

    fn compose<D: GraphicsDevice>(&mut self, device: &mut D, scene: &Scene<'_>) -> PresentResult<()> {
        match scene.overlays.filter(|store| !store.is_empty()) {
            Some(store) => {
                let text = &mut self.text;
                let mut paint = |canvas: &mut Canvas<'_>| {
                    store.draw_all(&mut DrawContext {
                        canvas,
                        text: &mut *text,
                    });
                };
                device.render_scene(scene.shaders, Some(&mut paint))?;
            }
            None => device.render_scene(scene.shaders, None)?,
        }

        if device.is_windowed() {
            device.present()?;
        }
        Ok(())
    }
}
