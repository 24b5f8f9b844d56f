//! Secondary video stream composited as an overlay.

use crate::error::{PresentError, PresentResult};
use crate::rendering::blit::fill_surface;
use crate::rendering::convert::convert_into;
use crate::rendering::coord::Rect;
use crate::rendering::format::PixelFormat;
use crate::rendering::surface::PresentationSurface;
use crate::rendering::types::{ChromaOrder, Frame, Planes};

use super::{DrawContext, Drawable};

/// A live video picture with its own size and format.
///
/// Frames are written into a private surface and converted once per update, so
/// drawing only scales the converted picture.
#[derive(Debug, Clone)]
pub struct VideoOverlay {
    surface: PresentationSurface,
    picture: Option<Frame>,
    pub dest: Rect,
    pub opacity: u8,
}

impl VideoOverlay {
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        dest: Rect,
        opacity: u8,
        alignment: usize,
    ) -> PresentResult<Self> {
        if format == PixelFormat::Pal8 {
            return Err(PresentError::UnsupportedFormat(format!(
                "{} is not supported for overlay streams",
                format
            )));
        }
        if dest.is_empty() {
            return Err(PresentError::InvalidArgument(format!(
                "overlay stream rectangle {:?} is empty",
                dest
            )));
        }
        let surface = PresentationSurface::allocate(width, height, format, 0.0, alignment)?;
        Ok(Self {
            surface,
            picture: None,
            dest,
            opacity,
        })
    }

    pub fn format(&self) -> PixelFormat {
        self.surface.format()
    }

    pub fn has_frame(&self) -> bool {
        self.picture.is_some()
    }

    /// Replace the picture with a new frame.
    pub fn update_frame(&mut self, planes: &Planes<'_>, interleaved_order: ChromaOrder) -> PresentResult<()> {
        fill_surface(&mut self.surface, planes, interleaved_order)?;
        let picture = self
            .picture
            .get_or_insert_with(|| Frame::black(self.surface.width(), self.surface.height()));
        convert_into(&self.surface, picture);
        Ok(())
    }
}

impl Drawable for VideoOverlay {
    fn draw(&self, ctx: &mut DrawContext<'_, '_>) -> PresentResult<()> {
        let picture = self
            .picture
            .as_ref()
            .ok_or_else(|| PresentError::NotReady("overlay stream has no frame yet".to_string()))?;
        ctx.canvas.blit_image(picture, self.dest, None, self.opacity);
        Ok(())
    }

    fn opacity(&self) -> u8 {
        self.opacity
    }

    fn set_opacity(&mut self, opacity: u8) {
        self.opacity = opacity;
    }
}
