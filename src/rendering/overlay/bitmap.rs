//! Static bitmap overlays loaded from image files or caller memory.

use std::path::Path;

use crate::error::{PresentError, PresentResult};
use crate::rendering::coord::Rect;
use crate::rendering::types::{Color, Frame, Plane};

use super::{DrawContext, Drawable};

/// Image scaled into a destination rectangle.
///
/// An empty destination draws the image at its natural size from the rectangle's
/// top-left corner.
#[derive(Debug, Clone)]
pub struct BitmapOverlay {
    image: Frame,
    pub dest: Rect,
    pub color_key: Option<Color>,
    pub opacity: u8,
}

impl BitmapOverlay {
    /// Decode any format the `image` crate understands.
    pub fn from_file(
        path: impl AsRef<Path>,
        dest: Rect,
        color_key: Option<Color>,
        opacity: u8,
    ) -> PresentResult<Self> {
        let path = path.as_ref();
        let rgba = image::open(path)
            .map_err(|e| {
                PresentError::InvalidArgument(format!("bitmap {}: {}", path.display(), e))
            })?
            .to_rgba8();
        let (width, height) = rgba.dimensions();
        let mut data = rgba.into_raw();
        for px in data.chunks_exact_mut(4) {
            px.swap(0, 2);
        }
        let image = Frame::from_bgra(width, height, width as usize * 4, data)?;
        log::debug!(
            "[OVERLAY] Loaded bitmap {} ({}x{})",
            path.display(),
            width,
            height
        );
        Ok(Self {
            image,
            dest,
            color_key,
            opacity,
        })
    }

    /// Copy BGRA pixels from caller memory.
    pub fn from_pixels(
        pixels: &[u8],
        stride: usize,
        width: u32,
        height: u32,
        dest: Rect,
        color_key: Option<Color>,
        opacity: u8,
    ) -> PresentResult<Self> {
        if width == 0 || height == 0 {
            return Err(PresentError::InvalidArgument(format!(
                "bitmap size {}x{} must be non-zero",
                width, height
            )));
        }
        let src = Plane::new(pixels, stride);
        let row_bytes = width as usize * 4;
        src.validate("bitmap", row_bytes, height as usize)?;

        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for y in 0..height as usize {
            data.extend_from_slice(src.row(y, row_bytes));
        }
        Ok(Self {
            image: Frame::from_bgra(width, height, row_bytes, data)?,
            dest,
            color_key,
            opacity,
        })
    }

    pub fn image(&self) -> &Frame {
        &self.image
    }

    fn target(&self) -> Rect {
        if self.dest.is_empty() {
            Rect::from_xywh(
                self.dest.left,
                self.dest.top,
                self.image.width as i32,
                self.image.height as i32,
            )
        } else {
            self.dest
        }
    }
}

impl Drawable for BitmapOverlay {
    fn draw(&self, ctx: &mut DrawContext<'_, '_>) -> PresentResult<()> {
        ctx.canvas
            .blit_image(&self.image, self.target(), self.color_key, self.opacity);
        Ok(())
    }

    fn opacity(&self) -> u8 {
        self.opacity
    }

    fn set_opacity(&mut self, opacity: u8) {
        self.opacity = opacity;
    }
}
