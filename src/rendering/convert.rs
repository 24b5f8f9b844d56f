//! Conversion from native surface layouts to the BGRA display format.
//!
//! YUV uses BT.601 limited-range integer coefficients. No gamma or transfer
//! function is applied.

use super::format::PixelFormat;
use super::surface::{ChromaRegions, PresentationSurface};
use super::types::{Color, Frame};

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// One YUV sample to a BGRA pixel (opaque).
#[inline]
pub fn yuv_to_bgra(y: u8, u: u8, v: u8) -> [u8; 4] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;
    [clamp_u8(b), clamp_u8(g), clamp_u8(r), 0xFF]
}

/// BGRA pixel back to limited-range YUV.
pub fn bgra_to_yuv(px: [u8; 4]) -> (u8, u8, u8) {
    let (b, g, r) = (px[0] as i32, px[1] as i32, px[2] as i32);
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (clamp_u8(y), clamp_u8(u), clamp_u8(v))
}

#[inline]
fn expand5(v: u16) -> u8 {
    let v = (v & 0x1F) as u8;
    (v << 3) | (v >> 2)
}

#[inline]
fn expand6(v: u16) -> u8 {
    let v = (v & 0x3F) as u8;
    (v << 2) | (v >> 4)
}

/// Convert a whole surface into a new tightly packed frame.
pub fn surface_to_frame(surface: &PresentationSurface) -> Frame {
    let mut frame = Frame::black(surface.width(), surface.height());
    convert_into(surface, &mut frame);
    frame
}

/// Convert into an existing frame of the same size.
pub fn convert_into(surface: &PresentationSurface, frame: &mut Frame) {
    debug_assert_eq!((frame.width, frame.height), (surface.width(), surface.height()));
    let data = surface.data();
    let luma = surface.luma_region();
    let width = surface.width() as usize;
    let stride = frame.stride;
    let format = surface.format();
    let chroma = surface.chroma_regions();

    for y in 0..surface.height() as usize {
        let src = luma.row(data, y);
        let out = &mut frame.data[y * stride..y * stride + width * 4];

        match (format, chroma) {
            (PixelFormat::Yv12, ChromaRegions::Separate { u, v }) => {
                let urow = u.row(data, y / 2);
                let vrow = v.row(data, y / 2);
                for (x, px) in out.chunks_exact_mut(4).enumerate() {
                    px.copy_from_slice(&yuv_to_bgra(src[x], urow[x / 2], vrow[x / 2]));
                }
            }
            (PixelFormat::Nv12, ChromaRegions::Interleaved(uv)) => {
                let crow = uv.row(data, y / 2);
                for (x, px) in out.chunks_exact_mut(4).enumerate() {
                    let c = (x / 2) * 2;
                    px.copy_from_slice(&yuv_to_bgra(src[x], crow[c], crow[c + 1]));
                }
            }
            (PixelFormat::Yuy2, _) => {
                for (x, px) in out.chunks_exact_mut(4).enumerate() {
                    let m = &src[(x / 2) * 4..(x / 2) * 4 + 4];
                    let l = if x % 2 == 0 { m[0] } else { m[2] };
                    px.copy_from_slice(&yuv_to_bgra(l, m[1], m[3]));
                }
            }
            (PixelFormat::Uyvy, _) => {
                for (x, px) in out.chunks_exact_mut(4).enumerate() {
                    let m = &src[(x / 2) * 4..(x / 2) * 4 + 4];
                    let l = if x % 2 == 0 { m[1] } else { m[3] };
                    px.copy_from_slice(&yuv_to_bgra(l, m[0], m[2]));
                }
            }
            (PixelFormat::Rgb555, _) => {
                for (px, s) in out.chunks_exact_mut(4).zip(src.chunks_exact(2)) {
                    let v = u16::from_le_bytes([s[0], s[1]]);
                    px.copy_from_slice(&[expand5(v), expand5(v >> 5), expand5(v >> 10), 0xFF]);
                }
            }
            (PixelFormat::Rgb565, _) => {
                for (px, s) in out.chunks_exact_mut(4).zip(src.chunks_exact(2)) {
                    let v = u16::from_le_bytes([s[0], s[1]]);
                    px.copy_from_slice(&[expand5(v), expand6(v >> 5), expand5(v >> 11), 0xFF]);
                }
            }
            (PixelFormat::Rgb32, _) => {
                for (px, s) in out.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
                    px.copy_from_slice(&[s[0], s[1], s[2], 0xFF]);
                }
            }
            (PixelFormat::Argb32, _) => out.copy_from_slice(src),
            (PixelFormat::Gray8, _) => {
                for (px, &l) in out.chunks_exact_mut(4).zip(src) {
                    px.copy_from_slice(&[l, l, l, 0xFF]);
                }
            }
            (PixelFormat::Pal8, _) => {
                let palette = surface.palette().unwrap_or(&[]);
                for (px, &i) in out.chunks_exact_mut(4).zip(src) {
                    let color = palette.get(i as usize).copied().unwrap_or(Color::BLACK);
                    px.copy_from_slice(&color.to_bgra());
                }
            }
            // planar formats always carry chroma regions
            (PixelFormat::Yv12 | PixelFormat::Nv12, _) => {}
        }
    }
}
