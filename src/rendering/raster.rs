//! CPU rasterization onto BGRA frames.
//!
//! Used for overlay drawing on every device and for the stretch/quad passes of the
//! software device. Blending works on premultiplied destinations, so drawing onto a
//! transparent layer yields a premultiplied layer and drawing onto an opaque frame
//! is ordinary source-over.

use glyphon::{Attrs, Buffer, Family, FontSystem, Metrics, Shaping, SwashCache};

use super::coord::{Point, Rect, Size};
use super::types::{Color, Frame};

/// Mutable drawing view over a BGRA frame.
pub struct Canvas<'a> {
    data: &'a mut [u8],
    width: u32,
    height: u32,
    stride: usize,
}

impl<'a> Canvas<'a> {
    pub fn new(frame: &'a mut Frame) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            stride: frame.stride,
            data: &mut frame.data,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    fn bounds(&self) -> Rect {
        Rect::from_size(self.size())
    }

    #[inline]
    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            None
        } else {
            Some(y as usize * self.stride + x as usize * 4)
        }
    }

    /// Overwrite every pixel.
    pub fn clear(&mut self, color: Color) {
        self.fill_rect(self.bounds(), color);
    }

    /// Overwrite a rectangle (clipped) without blending.
    pub fn fill_rect(&mut self, rect: Rect, color: Color) {
        let r = rect.intersect(&self.bounds());
        if r.is_empty() {
            return;
        }
        let px = color.to_bgra();
        for y in r.top..r.bottom {
            let start = y as usize * self.stride + r.left as usize * 4;
            let end = start + r.width() as usize * 4;
            for chunk in self.data[start..end].chunks_exact_mut(4) {
                chunk.copy_from_slice(&px);
            }
        }
    }

    /// Source-over one pixel; `coverage` scales the color's alpha.
    pub fn blend_pixel(&mut self, x: i32, y: i32, color: Color, coverage: u8) {
        let Some(i) = self.offset(x, y) else {
            return;
        };
        let a = (color.a() as u32 * coverage as u32 + 127) / 255;
        if a == 0 {
            return;
        }
        let inv = 255 - a;
        let src = [color.b() as u32, color.g() as u32, color.r() as u32];
        let dst = &mut self.data[i..i + 4];
        for c in 0..3 {
            dst[c] = ((src[c] * a + dst[c] as u32 * inv + 127) / 255) as u8;
        }
        dst[3] = (a + (dst[3] as u32 * inv + 127) / 255).min(255) as u8;
    }

    /// Antialiased line of the given width with round caps.
    pub fn draw_line(&mut self, from: Point, to: Point, width: f32, color: Color) {
        let half = (width.max(1.0)) / 2.0;
        let min_x = (from.x.min(to.x) - half - 1.0).floor() as i32;
        let max_x = (from.x.max(to.x) + half + 1.0).ceil() as i32;
        let min_y = (from.y.min(to.y) - half - 1.0).floor() as i32;
        let max_y = (from.y.max(to.y) + half + 1.0).ceil() as i32;
        let area = Rect::new(min_x, min_y, max_x, max_y).intersect(&self.bounds());

        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let len_sq = dx * dx + dy * dy;

        for y in area.top..area.bottom {
            for x in area.left..area.right {
                let p = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                let t = if len_sq > 0.0 {
                    (((p.x - from.x) * dx + (p.y - from.y) * dy) / len_sq).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let closest = Point::new(from.x + t * dx, from.y + t * dy);
                let coverage = (half + 0.5 - p.distance(&closest)).clamp(0.0, 1.0);
                if coverage > 0.0 {
                    self.blend_pixel(x, y, color, (coverage * 255.0).round() as u8);
                }
            }
        }
    }

    /// Connected line segments, optionally closing back to the first point.
    pub fn draw_polyline(&mut self, points: &[Point], width: f32, color: Color, closed: bool) {
        for pair in points.windows(2) {
            self.draw_line(pair[0], pair[1], width, color);
        }
        if closed && points.len() > 2 {
            self.draw_line(points[points.len() - 1], points[0], width, color);
        }
    }

    /// Outline of a rectangle along its pixel edges.
    pub fn draw_rect_outline(&mut self, rect: Rect, width: f32, color: Color) {
        let l = rect.left as f32 + 0.5;
        let t = rect.top as f32 + 0.5;
        let r = rect.right as f32 - 0.5;
        let b = rect.bottom as f32 - 0.5;
        let corners = [
            Point::new(l, t),
            Point::new(r, t),
            Point::new(r, b),
            Point::new(l, b),
        ];
        self.draw_polyline(&corners, width, color, true);
    }

    /// Draw `image` scaled (nearest) into `dest`, blending with its own alpha.
    ///
    /// Pixels whose RGB equals `color_key` are skipped.
    pub fn blit_image(&mut self, image: &Frame, dest: Rect, color_key: Option<Color>, opacity: u8) {
        let area = dest.intersect(&self.bounds());
        if area.is_empty() || dest.is_empty() || image.width == 0 || image.height == 0 {
            return;
        }
        let (dw, dh) = (dest.width() as i64, dest.height() as i64);
        for y in area.top..area.bottom {
            let sy = ((y - dest.top) as i64 * image.height as i64 / dh) as u32;
            for x in area.left..area.right {
                let sx = ((x - dest.left) as i64 * image.width as i64 / dw) as u32;
                let color = Color::from_bgra(image.pixel(sx, sy));
                if color_key.is_some_and(|key| key.same_rgb(color)) {
                    continue;
                }
                self.blend_pixel(x, y, color, opacity);
            }
        }
    }

    /// Bilinear stretch of `src` into `dest`, replacing the destination pixels.
    pub fn stretch_from(&mut self, src: &Frame, dest: Rect) {
        let area = dest.intersect(&self.bounds());
        if area.is_empty() || src.width == 0 || src.height == 0 {
            return;
        }
        let sx_scale = src.width as f32 / dest.width() as f32;
        let sy_scale = src.height as f32 / dest.height() as f32;
        let max_x = src.width as f32 - 1.0;
        let max_y = src.height as f32 - 1.0;

        for y in area.top..area.bottom {
            let fy = (((y - dest.top) as f32 + 0.5) * sy_scale - 0.5).clamp(0.0, max_y);
            let y0 = fy.floor() as u32;
            let y1 = (y0 + 1).min(src.height - 1);
            let wy = fy - y0 as f32;
            for x in area.left..area.right {
                let fx = (((x - dest.left) as f32 + 0.5) * sx_scale - 0.5).clamp(0.0, max_x);
                let x0 = fx.floor() as u32;
                let x1 = (x0 + 1).min(src.width - 1);
                let wx = fx - x0 as f32;

                let p00 = src.pixel(x0, y0);
                let p10 = src.pixel(x1, y0);
                let p01 = src.pixel(x0, y1);
                let p11 = src.pixel(x1, y1);
                let mut out = [0u8; 4];
                for c in 0..4 {
                    let top = p00[c] as f32 * (1.0 - wx) + p10[c] as f32 * wx;
                    let bottom = p01[c] as f32 * (1.0 - wx) + p11[c] as f32 * wx;
                    out[c] = (top * (1.0 - wy) + bottom * wy).round() as u8;
                }
                if let Some(i) = self.offset(x, y) {
                    self.data[i..i + 4].copy_from_slice(&out);
                }
            }
        }
    }
}

/// Shapes and rasterizes text with cosmic-text (via glyphon).
///
/// The font database is loaded on first use. Rasterized glyphs stay cached
/// across frames.
#[derive(Default)]
pub struct TextRasterizer {
    font_system: Option<FontSystem>,
    swash_cache: Option<SwashCache>,
}

impl TextRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw `text` with its top-left corner at `origin`, clipped to the canvas.
    pub fn draw(
        &mut self,
        canvas: &mut Canvas<'_>,
        text: &str,
        font_family: &str,
        font_size: f32,
        origin: Point,
        color: Color,
    ) {
        let font_system = self.font_system.get_or_insert_with(|| {
            log::debug!("[OVERLAY] Loading font database for text overlays");
            FontSystem::new()
        });

        let size = font_size.max(1.0);
        let mut buffer = Buffer::new(font_system, Metrics::new(size, size * 1.2));
        let canvas_size = canvas.size();
        buffer.set_size(
            font_system,
            Some((canvas_size.width as f32 - origin.x).max(1.0)),
            Some((canvas_size.height as f32 - origin.y).max(1.0)),
        );
        let family = if font_family.is_empty() {
            Family::SansSerif
        } else {
            Family::Name(font_family)
        };
        buffer.set_text(
            font_system,
            text,
            &Attrs::new().family(family),
            Shaping::Advanced,
        );
        buffer.shape_until_scroll(font_system, false);

        let swash_cache = self.swash_cache.get_or_insert_with(SwashCache::new);
        let base = glyphon::Color::rgba(color.r(), color.g(), color.b(), color.a());
        let (ox, oy) = (origin.x.round() as i32, origin.y.round() as i32);
        buffer.draw(font_system, swash_cache, base, |x, y, w, h, c| {
            let glyph = Color::from_argb(c.a(), c.r(), c.g(), c.b());
            for dy in 0..h as i32 {
                for dx in 0..w as i32 {
                    canvas.blend_pixel(ox + x + dx, oy + y + dy, glyph, 255);
                }
            }
        });
    }
}
