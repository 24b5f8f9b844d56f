//! Vector and text overlays.

use crate::error::{PresentError, PresentResult};
use crate::rendering::coord::{Point, Rect};
use crate::rendering::types::Color;

use super::{DrawContext, Drawable};

fn check_width(width: f32) -> PresentResult<()> {
    if width.is_finite() && width > 0.0 {
        Ok(())
    } else {
        Err(PresentError::InvalidArgument(format!(
            "line width {} must be positive",
            width
        )))
    }
}

fn check_point(p: &Point) -> PresentResult<()> {
    if p.x.is_finite() && p.y.is_finite() {
        Ok(())
    } else {
        Err(PresentError::InvalidArgument(format!("point {:?} is not finite", p)))
    }
}

#[derive(Debug, Clone)]
pub struct LineOverlay {
    pub from: Point,
    pub to: Point,
    pub width: f32,
    pub color: Color,
    pub opacity: u8,
}

impl LineOverlay {
    pub fn new(from: Point, to: Point, width: f32, color: Color, opacity: u8) -> PresentResult<Self> {
        check_width(width)?;
        check_point(&from)?;
        check_point(&to)?;
        Ok(Self {
            from,
            to,
            width,
            color,
            opacity,
        })
    }
}

impl Drawable for LineOverlay {
    fn draw(&self, ctx: &mut DrawContext<'_, '_>) -> PresentResult<()> {
        ctx.canvas
            .draw_line(self.from, self.to, self.width, self.color.with_opacity(self.opacity));
        Ok(())
    }

    fn opacity(&self) -> u8 {
        self.opacity
    }

    fn set_opacity(&mut self, opacity: u8) {
        self.opacity = opacity;
    }
}

/// Rectangle outline.
#[derive(Debug, Clone)]
pub struct RectangleOverlay {
    pub rect: Rect,
    pub width: f32,
    pub color: Color,
    pub opacity: u8,
}

impl RectangleOverlay {
    pub fn new(rect: Rect, width: f32, color: Color, opacity: u8) -> PresentResult<Self> {
        check_width(width)?;
        if rect.is_empty() {
            return Err(PresentError::InvalidArgument(format!(
                "rectangle {:?} is empty",
                rect
            )));
        }
        Ok(Self {
            rect,
            width,
            color,
            opacity,
        })
    }
}

impl Drawable for RectangleOverlay {
    fn draw(&self, ctx: &mut DrawContext<'_, '_>) -> PresentResult<()> {
        ctx.canvas
            .draw_rect_outline(self.rect, self.width, self.color.with_opacity(self.opacity));
        Ok(())
    }

    fn opacity(&self) -> u8 {
        self.opacity
    }

    fn set_opacity(&mut self, opacity: u8) {
        self.opacity = opacity;
    }
}

/// Closed polygon outline.
#[derive(Debug, Clone)]
pub struct PolygonOverlay {
    pub points: Vec<Point>,
    pub width: f32,
    pub color: Color,
    pub opacity: u8,
}

impl PolygonOverlay {
    pub fn new(points: Vec<Point>, width: f32, color: Color, opacity: u8) -> PresentResult<Self> {
        check_width(width)?;
        if points.len() < 3 {
            return Err(PresentError::InvalidArgument(format!(
                "polygon needs at least 3 points, got {}",
                points.len()
            )));
        }
        points.iter().try_for_each(check_point)?;
        Ok(Self {
            points,
            width,
            color,
            opacity,
        })
    }
}

impl Drawable for PolygonOverlay {
    fn draw(&self, ctx: &mut DrawContext<'_, '_>) -> PresentResult<()> {
        ctx.canvas.draw_polyline(
            &self.points,
            self.width,
            self.color.with_opacity(self.opacity),
            true,
        );
        Ok(())
    }

    fn opacity(&self) -> u8 {
        self.opacity
    }

    fn set_opacity(&mut self, opacity: u8) {
        self.opacity = opacity;
    }
}

/// Single- or multi-line text anchored at its top-left corner.
#[derive(Debug, Clone)]
pub struct TextOverlay {
    pub text: String,
    pub font_family: String,
    pub font_size: f32,
    pub origin: Point,
    pub color: Color,
    pub opacity: u8,
}

impl TextOverlay {
    /// An empty `font_family` selects the default sans-serif face.
    pub fn new(
        text: impl Into<String>,
        font_family: impl Into<String>,
        font_size: f32,
        origin: Point,
        color: Color,
        opacity: u8,
    ) -> PresentResult<Self> {
        let text = text.into();
        if text.is_empty() {
            return Err(PresentError::InvalidArgument("text overlay is empty".to_string()));
        }
        if !(font_size.is_finite() && font_size > 0.0) {
            return Err(PresentError::InvalidArgument(format!(
                "font size {} must be positive",
                font_size
            )));
        }
        check_point(&origin)?;
        Ok(Self {
            text,
            font_family: font_family.into(),
            font_size,
            origin,
            color,
            opacity,
        })
    }
}

impl Drawable for TextOverlay {
    fn draw(&self, ctx: &mut DrawContext<'_, '_>) -> PresentResult<()> {
        ctx.text.draw(
            ctx.canvas,
            &self.text,
            &self.font_family,
            self.font_size,
            self.origin,
            self.color.with_opacity(self.opacity),
        );
        Ok(())
    }

    fn opacity(&self) -> u8 {
        self.opacity
    }

    fn set_opacity(&mut self, opacity: u8) {
        self.opacity = opacity;
    }
}
