//! Offscreen video surface and the unit-quad geometry of the display target.

use crate::error::{PresentError, PresentResult};

use super::coord::Size;
use super::format::PixelFormat;
use super::types::Color;

/// Byte region of one plane inside a surface allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneRegion {
    pub offset: usize,
    pub pitch: usize,
    pub row_bytes: usize,
    pub rows: usize,
}

impl PlaneRegion {
    pub fn end(&self) -> usize {
        self.offset + self.pitch * self.rows
    }

    pub fn row<'a>(&self, data: &'a [u8], y: usize) -> &'a [u8] {
        let start = self.offset + y * self.pitch;
        &data[start..start + self.row_bytes]
    }

    pub fn row_mut<'a>(&self, data: &'a mut [u8], y: usize) -> &'a mut [u8] {
        let start = self.offset + y * self.pitch;
        &mut data[start..start + self.row_bytes]
    }
}

/// Where the chroma samples of a surface live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaRegions {
    /// Packed or RGB formats carry no separate chroma.
    None,
    /// Separate U and V planes (three-plane 4:2:0).
    Separate { u: PlaneRegion, v: PlaneRegion },
    /// One plane of interleaved U/V pairs (two-plane 4:2:0).
    Interleaved(PlaneRegion),
}

/// CPU-writable surface holding one video frame in its native layout.
#[derive(Debug, Clone)]
pub struct PresentationSurface {
    width: u32,
    height: u32,
    format: PixelFormat,
    pitch: usize,
    pixel_aspect_ratio: f64,
    data: Vec<u8>,
    palette: Option<Vec<Color>>,
}

impl PresentationSurface {
    /// Allocate a surface whose rows are padded to `alignment` bytes and clear it to black.
    pub fn allocate(
        width: u32,
        height: u32,
        format: PixelFormat,
        pixel_aspect_ratio: f64,
        alignment: usize,
    ) -> PresentResult<Self> {
        if width == 0 || height == 0 {
            return Err(PresentError::InvalidArgument(format!(
                "video surface size {}x{} must be positive",
                width, height
            )));
        }
        if !pixel_aspect_ratio.is_finite() || pixel_aspect_ratio < 0.0 {
            return Err(PresentError::InvalidArgument(format!(
                "pixel aspect ratio {} must be a finite value >= 0",
                pixel_aspect_ratio
            )));
        }

        let pitch = format.pitch_for(width, alignment);
        let len = format.surface_len(pitch, height);
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|e| {
            PresentError::AllocationError(format!("{} byte {} surface: {}", len, format, e))
        })?;
        data.resize(len, 0);

        let palette = (format == PixelFormat::Pal8).then(grayscale_palette);
        let mut surface = Self {
            width,
            height,
            format,
            pitch,
            pixel_aspect_ratio,
            data,
            palette,
        };
        surface.clear_to_black();
        Ok(surface)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Luma (or packed) row pitch in bytes.
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    pub fn pixel_aspect_ratio(&self) -> f64 {
        self.pixel_aspect_ratio
    }

    /// Size the video occupies once non-square pixels are accounted for.
    pub fn display_size(&self) -> Size {
        self.size().with_pixel_aspect(self.pixel_aspect_ratio)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The first plane: luma for planar formats, the whole image otherwise.
    pub fn luma_region(&self) -> PlaneRegion {
        PlaneRegion {
            offset: 0,
            pitch: self.pitch,
            row_bytes: self.format.row_bytes(self.width),
            rows: self.height as usize,
        }
    }

    pub fn chroma_regions(&self) -> ChromaRegions {
        let Some((cw, ch)) = self.format.chroma_size(self.width, self.height) else {
            return ChromaRegions::None;
        };
        let (cw, ch) = (cw as usize, ch as usize);
        let luma_end = self.luma_region().end();
        match self.format {
            PixelFormat::Yv12 => {
                let half = self.pitch / 2;
                let v = PlaneRegion {
                    offset: luma_end,
                    pitch: half,
                    row_bytes: cw,
                    rows: ch,
                };
                let u = PlaneRegion {
                    offset: v.end(),
                    ..v
                };
                ChromaRegions::Separate { u, v }
            }
            _ => ChromaRegions::Interleaved(PlaneRegion {
                offset: luma_end,
                pitch: self.pitch,
                row_bytes: cw * 2,
                rows: ch,
            }),
        }
    }

    /// Fill with the format's representation of opaque black.
    pub fn clear_to_black(&mut self) {
        match self.format {
            PixelFormat::Yv12 | PixelFormat::Nv12 => {
                let luma_end = self.luma_region().end();
                self.data[..luma_end].fill(16);
                self.data[luma_end..].fill(128);
            }
            PixelFormat::Yuy2 => fill_pattern(&mut self.data, &[16, 128]),
            PixelFormat::Uyvy => fill_pattern(&mut self.data, &[128, 16]),
            PixelFormat::Argb32 | PixelFormat::Rgb32 => fill_pattern(&mut self.data, &[0, 0, 0, 0xFF]),
            PixelFormat::Rgb555 | PixelFormat::Rgb565 | PixelFormat::Gray8 => self.data.fill(0),
            PixelFormat::Pal8 => {
                let black = self
                    .palette
                    .as_ref()
                    .and_then(|p| p.iter().position(|c| c.same_rgb(Color::BLACK)))
                    .unwrap_or(0);
                self.data.fill(black as u8);
            }
        }
    }

    pub fn palette(&self) -> Option<&[Color]> {
        self.palette.as_deref()
    }

    /// Replace the palette of a `Pal8` surface. Up to 256 entries; missing entries are black.
    pub fn set_palette(&mut self, colors: &[Color]) -> PresentResult<()> {
        if self.format != PixelFormat::Pal8 {
            return Err(PresentError::InvalidArgument(format!(
                "{} surfaces have no palette",
                self.format
            )));
        }
        if colors.is_empty() || colors.len() > 256 {
            return Err(PresentError::InvalidArgument(format!(
                "palette must hold 1..=256 entries, got {}",
                colors.len()
            )));
        }
        let mut palette = vec![Color::BLACK; 256];
        palette[..colors.len()].copy_from_slice(colors);
        self.palette = Some(palette);
        Ok(())
    }
}

fn fill_pattern(data: &mut [u8], pattern: &[u8]) {
    for chunk in data.chunks_mut(pattern.len()) {
        chunk.copy_from_slice(&pattern[..chunk.len()]);
    }
}

fn grayscale_palette() -> Vec<Color> {
    (0..=255u8).map(|v| Color::rgb(v, v, v)).collect()
}

/// Vertex of the full-screen quad: position and texture coordinate, both in 0..1.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

/// Unit quad as a triangle strip: top-left, top-right, bottom-left, bottom-right.
pub const UNIT_QUAD: [QuadVertex; 4] = [
    QuadVertex {
        position: [0.0, 0.0],
        uv: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, 0.0],
        uv: [1.0, 0.0],
    },
    QuadVertex {
        position: [0.0, 1.0],
        uv: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        uv: [1.0, 1.0],
    },
];

/// Column-major orthographic projection mapping display pixels (origin top-left)
/// to clip space, depth range 0..1.
pub fn ortho_projection(size: Size) -> [[f32; 4]; 4] {
    let size = size.at_least_one();
    let w = size.width as f32;
    let h = size.height as f32;
    [
        [2.0 / w, 0.0, 0.0, 0.0],
        [0.0, -2.0 / h, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [-1.0, 1.0, 0.0, 1.0],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform(m: &[[f32; 4]; 4], x: f32, y: f32) -> (f32, f32) {
        let v = [x, y, 0.0, 1.0];
        let mut out = [0.0f32; 4];
        for (col, value) in m.iter().zip(v) {
            for row in 0..4 {
                out[row] += col[row] * value;
            }
        }
        (out[0] / out[3], out[1] / out[3])
    }

    #[test]
    fn test_allocate_rejects_zero_size() {
        assert!(matches!(
            PresentationSurface::allocate(0, 10, PixelFormat::Yv12, 0.0, 16),
            Err(PresentError::InvalidArgument(_))
        ));
        assert!(PresentationSurface::allocate(10, 10, PixelFormat::Yv12, -1.0, 16).is_err());
    }

    #[test]
    fn test_yv12_layout() {
        let s = PresentationSurface::allocate(16, 16, PixelFormat::Yv12, 0.0, 32).unwrap();
        assert_eq!(s.pitch(), 32);
        assert_eq!(s.data().len(), 32 * 16 + 2 * 16 * 8);
        let ChromaRegions::Separate { u, v } = s.chroma_regions() else {
            panic!("expected separate chroma planes");
        };
        assert_eq!(v.offset, 32 * 16);
        assert_eq!(v.pitch, 16);
        assert_eq!(u.offset, v.offset + 16 * 8);
        assert_eq!((u.row_bytes, u.rows), (8, 8));
        assert_eq!(u.end(), s.data().len());
    }

    #[test]
    fn test_nv12_layout_odd_size() {
        let s = PresentationSurface::allocate(15, 9, PixelFormat::Nv12, 0.0, 1).unwrap();
        assert_eq!(s.pitch(), 16);
        let ChromaRegions::Interleaved(uv) = s.chroma_regions() else {
            panic!("expected interleaved chroma");
        };
        assert_eq!(uv.offset, 16 * 9);
        assert_eq!(uv.row_bytes, 16);
        assert_eq!(uv.rows, 5);
        assert_eq!(uv.end(), s.data().len());
    }

    #[test]
    fn test_cleared_to_black() {
        let s = PresentationSurface::allocate(4, 4, PixelFormat::Yv12, 0.0, 4).unwrap();
        assert!(s.data()[..16].iter().all(|&b| b == 16));
        assert!(s.data()[16..].iter().all(|&b| b == 128));

        let s = PresentationSurface::allocate(4, 1, PixelFormat::Uyvy, 0.0, 4).unwrap();
        assert_eq!(&s.data()[..4], &[128, 16, 128, 16]);

        let s = PresentationSurface::allocate(2, 1, PixelFormat::Argb32, 0.0, 4).unwrap();
        assert_eq!(s.data(), &[0, 0, 0, 255, 0, 0, 0, 255]);
    }

    #[test]
    fn test_palette_only_for_pal8() {
        let mut s = PresentationSurface::allocate(2, 2, PixelFormat::Pal8, 0.0, 4).unwrap();
        assert_eq!(s.palette().unwrap()[200], Color::rgb(200, 200, 200));
        s.set_palette(&[Color::rgb(255, 0, 0)]).unwrap();
        assert_eq!(s.palette().unwrap()[0], Color::rgb(255, 0, 0));
        assert_eq!(s.palette().unwrap()[1], Color::BLACK);
        assert!(s.set_palette(&[]).is_err());

        let mut rgb = PresentationSurface::allocate(2, 2, PixelFormat::Rgb32, 0.0, 4).unwrap();
        assert!(rgb.set_palette(&[Color::BLACK]).is_err());
    }

    #[test]
    fn test_display_size_uses_pixel_aspect() {
        let s = PresentationSurface::allocate(720, 576, PixelFormat::Yv12, 16.0 / 15.0, 16).unwrap();
        assert_eq!(s.display_size(), Size::new(768, 576));
    }

    #[test]
    fn test_ortho_projection_corners() {
        let m = ortho_projection(Size::new(640, 480));
        let (x, y) = transform(&m, 0.0, 0.0);
        assert!((x + 1.0).abs() < 1e-6 && (y - 1.0).abs() < 1e-6);
        let (x, y) = transform(&m, 640.0, 480.0);
        assert!((x - 1.0).abs() < 1e-6 && (y + 1.0).abs() < 1e-6);
        let (x, y) = transform(&m, 320.0, 240.0);
        assert!(x.abs() < 1e-6 && y.abs() < 1e-6);
    }

    #[test]
    fn test_unit_quad_is_pod() {
        let bytes: &[u8] = bytemuck::cast_slice(&UNIT_QUAD);
        assert_eq!(bytes.len(), 4 * 16);
    }
}
