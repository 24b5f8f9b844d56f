//! Pixel formats accepted for video surfaces and their memory layouts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PresentError;

/// Layout of a video surface.
///
/// Planar layouts follow the device-native arrangement: `Yv12` stores the V plane
/// before the U plane, `Nv12` stores U/V interleaved after the luma plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PixelFormat {
    /// 4:2:0, three planes (Y, V, U).
    Yv12,
    /// 4:2:0, luma plane plus interleaved UV plane.
    Nv12,
    /// Packed 4:2:2, Y0 U Y1 V.
    Yuy2,
    /// Packed 4:2:2, U Y0 V Y1.
    Uyvy,
    /// X1R5G5B5, little endian.
    Rgb555,
    /// R5G6B5, little endian.
    Rgb565,
    /// X8R8G8B8 (B, G, R, X in memory).
    Rgb32,
    /// A8R8G8B8 (B, G, R, A in memory).
    Argb32,
    /// Single 8-bit luma plane, full range.
    Gray8,
    /// 8-bit indices into a 256-entry palette.
    Pal8,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 10] = [
        PixelFormat::Yv12,
        PixelFormat::Nv12,
        PixelFormat::Yuy2,
        PixelFormat::Uyvy,
        PixelFormat::Rgb555,
        PixelFormat::Rgb565,
        PixelFormat::Rgb32,
        PixelFormat::Argb32,
        PixelFormat::Gray8,
        PixelFormat::Pal8,
    ];

    pub fn plane_count(self) -> usize {
        match self {
            PixelFormat::Yv12 => 3,
            PixelFormat::Nv12 => 2,
            _ => 1,
        }
    }

    /// Two- or three-plane 4:2:0.
    pub fn is_planar(self) -> bool {
        self.plane_count() > 1
    }

    pub fn is_yuv(self) -> bool {
        matches!(
            self,
            PixelFormat::Yv12 | PixelFormat::Nv12 | PixelFormat::Yuy2 | PixelFormat::Uyvy
        )
    }

    /// Bytes per pixel of the first plane.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Yv12 | PixelFormat::Nv12 | PixelFormat::Gray8 | PixelFormat::Pal8 => 1,
            PixelFormat::Yuy2 | PixelFormat::Uyvy | PixelFormat::Rgb555 | PixelFormat::Rgb565 => 2,
            PixelFormat::Rgb32 | PixelFormat::Argb32 => 4,
        }
    }

    /// Tight byte length of one row of the first plane.
    pub fn row_bytes(self, width: u32) -> usize {
        match self {
            // 4:2:2 macro-pixels cover two columns
            PixelFormat::Yuy2 | PixelFormat::Uyvy => (width as usize).div_ceil(2) * 4,
            _ => width as usize * self.bytes_per_pixel(),
        }
    }

    /// Chroma plane dimensions for 4:2:0 layouts, rounded up for odd sizes.
    pub fn chroma_size(self, width: u32, height: u32) -> Option<(u32, u32)> {
        if self.is_planar() {
            Some((width.div_ceil(2), height.div_ceil(2)))
        } else {
            None
        }
    }

    /// Row pitch for `width` rounded up to `alignment` bytes.
    ///
    /// Planar pitches are kept even so the half-pitch chroma rows of `Yv12` fit.
    pub fn pitch_for(self, width: u32, alignment: usize) -> usize {
        let alignment = if self.is_planar() {
            alignment.max(2)
        } else {
            alignment.max(1)
        };
        self.row_bytes(width).div_ceil(alignment) * alignment
    }

    /// Total bytes of a surface with the given luma pitch and height.
    pub fn surface_len(self, pitch: usize, height: u32) -> usize {
        let h = height as usize;
        let ch = height.div_ceil(2) as usize;
        match self {
            PixelFormat::Yv12 => pitch * h + 2 * (pitch / 2) * ch,
            PixelFormat::Nv12 => pitch * h + pitch * ch,
            _ => pitch * h,
        }
    }

    /// Four-character code.
    pub fn fourcc(self) -> &'static str {
        match self {
            PixelFormat::Yv12 => "YV12",
            PixelFormat::Nv12 => "NV12",
            PixelFormat::Yuy2 => "YUY2",
            PixelFormat::Uyvy => "UYVY",
            PixelFormat::Rgb555 => "RGB5",
            PixelFormat::Rgb565 => "R565",
            PixelFormat::Rgb32 => "RGB4",
            PixelFormat::Argb32 => "ARGB",
            PixelFormat::Gray8 => "GREY",
            PixelFormat::Pal8 => "PAL8",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.fourcc())
    }
}

impl FromStr for PixelFormat {
    type Err = PresentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        PixelFormat::ALL
            .iter()
            .copied()
            .find(|f| f.fourcc() == code)
            .ok_or_else(|| PresentError::UnsupportedFormat(format!("unknown FOURCC '{}'", s)))
    }
}
