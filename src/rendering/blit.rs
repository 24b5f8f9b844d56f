//! Copies caller pixel planes into a surface's native memory layout.

use crate::error::{PresentError, PresentResult};

use super::surface::{ChromaRegions, PlaneRegion, PresentationSurface};
use super::types::{ChromaOrder, Plane, Planes};

/// Write one decoded frame into `surface`.
///
/// All planes are bounds-checked before the first byte is written, so a rejected
/// frame leaves the previous contents intact. `interleaved_order` describes the
/// chroma plane of two-plane input; it is rewritten to U/V order on copy.
pub fn fill_surface(
    surface: &mut PresentationSurface,
    planes: &Planes<'_>,
    interleaved_order: ChromaOrder,
) -> PresentResult<()> {
    let format = surface.format();
    let luma = surface.luma_region();

    match (surface.chroma_regions(), planes) {
        (ChromaRegions::Separate { u, v }, Planes::Planar { y, u: src_u, v: src_v }) => {
            check(y, &luma, "Y plane")?;
            check(src_u, &u, "U plane")?;
            check(src_v, &v, "V plane")?;
            let data = surface.data_mut();
            copy_rows(data, &luma, y);
            copy_rows(data, &v, src_v);
            copy_rows(data, &u, src_u);
        }
        (ChromaRegions::Interleaved(uv), Planes::SemiPlanar { luma: src_y, chroma }) => {
            check(src_y, &luma, "Y plane")?;
            check(chroma, &uv, "UV plane")?;
            let data = surface.data_mut();
            copy_rows(data, &luma, src_y);
            match interleaved_order {
                ChromaOrder::Uv => copy_rows(data, &uv, chroma),
                ChromaOrder::Vu => copy_rows_swapped(data, &uv, chroma),
            }
        }
        (ChromaRegions::None, Planes::Packed(src)) => {
            check(src, &luma, "packed plane")?;
            copy_packed(surface.data_mut(), &luma, src);
        }
        (_, other) => {
            return Err(PresentError::InvalidArgument(format!(
                "{} expects {} plane(s), got {}",
                format,
                format.plane_count(),
                other.plane_count()
            )));
        }
    }
    Ok(())
}

fn check(src: &Plane<'_>, region: &PlaneRegion, name: &str) -> PresentResult<()> {
    src.validate(name, region.row_bytes, region.rows)
}

/// Row-by-row copy honoring both pitches.
fn copy_rows(dst: &mut [u8], region: &PlaneRegion, src: &Plane<'_>) {
    for y in 0..region.rows {
        region
            .row_mut(dst, y)
            .copy_from_slice(src.row(y, region.row_bytes));
    }
}

/// Copy interleaved V/U pairs into U/V order.
fn copy_rows_swapped(dst: &mut [u8], region: &PlaneRegion, src: &Plane<'_>) {
    for y in 0..region.rows {
        let out = region.row_mut(dst, y);
        let input = src.row(y, region.row_bytes);
        for (o, i) in out.chunks_exact_mut(2).zip(input.chunks_exact(2)) {
            o[0] = i[1];
            o[1] = i[0];
        }
    }
}

/// Packed frames whose pitch matches the surface go over in one bulk copy.
fn copy_packed(dst: &mut [u8], region: &PlaneRegion, src: &Plane<'_>) {
    let bulk = region.pitch * region.rows;
    if src.pitch == region.pitch && src.data.len() >= bulk {
        dst[region.offset..region.offset + bulk].copy_from_slice(&src.data[..bulk]);
    } else {
        copy_rows(dst, region, src);
    }
}

/// Map positional plane arrays onto named planes.
///
/// Three-plane input uses `planar_order` for slots 1 and 2 (`Vu` means slot 1 is V).
pub fn planes_from_slots<'a>(
    plane_count: usize,
    data: &[&'a [u8]],
    pitches: &[usize],
    planar_order: ChromaOrder,
) -> PresentResult<Planes<'a>> {
    if data.len() < plane_count || pitches.len() < plane_count {
        return Err(PresentError::InvalidArgument(format!(
            "expected {} planes with pitches, got {} planes and {} pitches",
            plane_count,
            data.len(),
            pitches.len()
        )));
    }
    let plane = |i: usize| Plane::new(data[i], pitches[i]);
    Ok(match plane_count {
        1 => Planes::Packed(plane(0)),
        2 => Planes::SemiPlanar {
            luma: plane(0),
            chroma: plane(1),
        },
        _ => {
            let (u, v) = match planar_order {
                ChromaOrder::Uv => (plane(1), plane(2)),
                ChromaOrder::Vu => (plane(2), plane(1)),
            };
            Planes::Planar { y: plane(0), u, v }
        }
    })
}
