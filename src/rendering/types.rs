//! Core value types shared by the presentation engine.

use serde::{Deserialize, Serialize};

use crate::error::{PresentError, PresentResult};

/// How the video is mapped onto the display area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FillMode {
    /// Letterbox/pillarbox so the video keeps its aspect ratio.
    #[default]
    KeepAspectRatio,
    /// Stretch to the whole display area.
    Fill,
}

/// Order of the two chroma channels in caller-supplied planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChromaOrder {
    /// U (Cb) first.
    Uv,
    /// V (Cr) first.
    Vu,
}

/// 32-bit ARGB color (alpha in the high byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(pub u32);

impl Color {
    pub const BLACK: Color = Color(0xFF00_0000);
    pub const WHITE: Color = Color(0xFFFF_FFFF);
    pub const TRANSPARENT: Color = Color(0);

    pub const fn from_argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Color(((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::from_argb(0xFF, r, g, b)
    }

    pub const fn a(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub const fn r(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub const fn g(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn b(self) -> u8 {
        self.0 as u8
    }

    /// Pixel in BGRA memory order.
    pub const fn to_bgra(self) -> [u8; 4] {
        [self.b(), self.g(), self.r(), self.a()]
    }

    pub const fn from_bgra(px: [u8; 4]) -> Self {
        Self::from_argb(px[3], px[2], px[1], px[0])
    }

    /// Same color with its alpha scaled by `opacity` (0..=255).
    pub fn with_opacity(self, opacity: u8) -> Self {
        let a = (self.a() as u32 * opacity as u32 + 127) / 255;
        Color((self.0 & 0x00FF_FFFF) | (a << 24))
    }

    /// Equality ignoring alpha, as used by bitmap color keys.
    pub fn same_rgb(self, other: Color) -> bool {
        self.0 & 0x00FF_FFFF == other.0 & 0x00FF_FFFF
    }
}

/// One caller-owned pixel plane.
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    /// Byte distance between row starts; may exceed the tight row size.
    pub pitch: usize,
}

impl<'a> Plane<'a> {
    pub fn new(data: &'a [u8], pitch: usize) -> Self {
        Self { data, pitch }
    }

    /// Check that `rows` rows of `row_bytes` each are addressable.
    pub fn validate(&self, name: &str, row_bytes: usize, rows: usize) -> PresentResult<()> {
        if self.pitch < row_bytes {
            return Err(PresentError::InvalidArgument(format!(
                "{} pitch {} is smaller than the row size {}",
                name, self.pitch, row_bytes
            )));
        }
        let needed = if rows == 0 {
            0
        } else {
            self.pitch * (rows - 1) + row_bytes
        };
        if self.data.len() < needed {
            return Err(PresentError::InvalidArgument(format!(
                "{} holds {} bytes, {} rows at pitch {} need {}",
                name,
                self.data.len(),
                rows,
                self.pitch,
                needed
            )));
        }
        Ok(())
    }

    pub fn row(&self, y: usize, row_bytes: usize) -> &'a [u8] {
        let start = y * self.pitch;
        &self.data[start..start + row_bytes]
    }
}

/// Decoded frame planes as handed over by a decoder.
#[derive(Debug, Clone, Copy)]
pub enum Planes<'a> {
    /// Single interleaved plane (4:2:2, RGB, grayscale, paletted).
    Packed(Plane<'a>),
    /// Full-resolution luma plus one interleaved chroma plane.
    SemiPlanar { luma: Plane<'a>, chroma: Plane<'a> },
    /// Separate luma and chroma planes.
    Planar {
        y: Plane<'a>,
        u: Plane<'a>,
        v: Plane<'a>,
    },
}

impl<'a> Planes<'a> {
    pub fn plane_count(&self) -> usize {
        match self {
            Planes::Packed(_) => 1,
            Planes::SemiPlanar { .. } => 2,
            Planes::Planar { .. } => 3,
        }
    }
}

/// Owned BGRA8 image: the display format of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Bytes per row (at least `width * 4`).
    pub stride: usize,
    pub data: Vec<u8>,
}

impl Frame {
    /// Tightly packed frame filled with `color`.
    pub fn filled(width: u32, height: u32, color: Color) -> Self {
        let px = color.to_bgra();
        let count = width as usize * height as usize;
        let mut data = Vec::with_capacity(count * 4);
        for _ in 0..count {
            data.extend_from_slice(&px);
        }
        Self {
            width,
            height,
            stride: width as usize * 4,
            data,
        }
    }

    /// Opaque black frame.
    pub fn black(width: u32, height: u32) -> Self {
        Self::filled(width, height, Color::BLACK)
    }

    /// Wrap caller pixels, checking that stride and length cover the image.
    pub fn from_bgra(width: u32, height: u32, stride: usize, data: Vec<u8>) -> PresentResult<Self> {
        if width == 0 || height == 0 {
            return Err(PresentError::InvalidArgument(format!(
                "frame size {}x{} must be non-zero",
                width, height
            )));
        }
        Plane::new(&data, stride).validate("frame", width as usize * 4, height as usize)?;
        Ok(Self {
            width,
            height,
            stride,
            data,
        })
    }

    pub fn fill(&mut self, color: Color) {
        let px = color.to_bgra();
        let row_bytes = self.width as usize * 4;
        for y in 0..self.height as usize {
            let start = y * self.stride;
            for chunk in self.data[start..start + row_bytes].chunks_exact_mut(4) {
                chunk.copy_from_slice(&px);
            }
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = y as usize * self.stride + x as usize * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * 4]
    }

    /// Copy rows into `out` using a tight `width * 4` stride.
    pub fn copy_tight(&self, out: &mut [u8]) {
        let row_bytes = self.width as usize * 4;
        for (y, dst) in out
            .chunks_exact_mut(row_bytes)
            .take(self.height as usize)
            .enumerate()
        {
            dst.copy_from_slice(self.row(y as u32));
        }
    }

    pub fn size(&self) -> crate::rendering::coord::Size {
        crate::rendering::coord::Size::new(self.width, self.height)
    }
}

/// Which surface a capture reads back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureKind {
    /// The composed render target (video plus overlays) at display size.
    Display,
    /// The offscreen video surface at native size, without overlays.
    Video,
}

/// Dimensions reported by the capture protocol. Pixels are BGRA8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureInfo {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
}

impl CaptureInfo {
    pub fn for_size(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            stride: width as usize * 4,
        }
    }

    /// Bytes a capture buffer must hold.
    pub fn buffer_len(&self) -> usize {
        self.stride * self.height as usize
    }
}
