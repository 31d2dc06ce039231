//! Mapping between world envelopes, mosaic pixels and tile indices.
//!
//! Mosaics are north-up: pixel rows grow southwards from the upper-left
//! corner, so `px = (x - ulx) / scale` and `py = (uly - y) / scale`.
//! Pixel coordinates are corner based; the centre of pixel `(0, 0)` is
//! `(0.5, 0.5)`.

use serde::{Deserialize, Serialize};

use pyramid_common::{AffineTransform, AxisRange, BoundingBox, Crs, Envelope, PixelRect, TileRange};

use crate::store::MosaicGeometry;

/// Pixel coordinates closer than this to an integer are snapped to it
/// before flooring/ceiling.
const PIXEL_EPSILON: f64 = 1e-9;

/// Pixels and tiles of a mosaic covered by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSelection {
    /// Covered pixel area, in mosaic pixel coordinates.
    pub pixels: PixelRect,
    /// Tiles overlapping `pixels` (half-open).
    pub tiles: TileRange,
}

/// Grid-to-world transform of the whole mosaic.
pub fn mosaic_grid_to_world(geometry: &MosaicGeometry) -> AffineTransform {
    let (ulx, uly) = geometry.origin();
    AffineTransform::north_up(ulx, uly, geometry.scale)
}

/// Horizontal world bounds of the mosaic.
pub fn mosaic_bbox(geometry: &MosaicGeometry) -> BoundingBox {
    let (ulx, uly) = geometry.origin();
    BoundingBox::new(
        ulx,
        uly - geometry.pixel_height() as f64 * geometry.scale,
        ulx + geometry.pixel_width() as f64 * geometry.scale,
        uly,
    )
}

/// World envelope of the mosaic in `crs`; each extra axis is the point
/// range of the mosaic's slice ordinate.
pub fn mosaic_envelope(geometry: &MosaicGeometry, crs: &Crs) -> Envelope {
    Envelope::new(crs.clone(), mosaic_bbox(geometry))
        .with_extra(geometry.slice_values().iter().map(|&v| AxisRange::point(v)))
}

/// Fractional mosaic pixel coordinates of a world point.
pub fn world_to_pixel(geometry: &MosaicGeometry, x: f64, y: f64) -> (f64, f64) {
    let (ulx, uly) = geometry.origin();
    ((x - ulx) / geometry.scale, (uly - y) / geometry.scale)
}

fn snap(value: f64) -> f64 {
    let rounded = value.round();
    if (value - rounded).abs() < PIXEL_EPSILON {
        rounded
    } else {
        value
    }
}

/// Pixel area and tile range of `geometry` covered by `bbox`.
///
/// `bbox` must already be in the mosaic's horizontal CRS. Returns `None`
/// when the box misses the mosaic or covers no whole-or-partial pixel.
pub fn envelope_to_tile_range(geometry: &MosaicGeometry, bbox: &BoundingBox) -> Option<TileSelection> {
    let clipped = mosaic_bbox(geometry).intersection(bbox)?;

    let (px_min, py_min) = world_to_pixel(geometry, clipped.min_x, clipped.max_y);
    let (px_max, py_max) = world_to_pixel(geometry, clipped.max_x, clipped.min_y);

    let width = geometry.pixel_width();
    let height = geometry.pixel_height();
    let px_min = (snap(px_min).floor().max(0.0) as u64).min(width);
    let py_min = (snap(py_min).floor().max(0.0) as u64).min(height);
    let px_max = (snap(px_max).ceil().max(0.0) as u64).min(width);
    let py_max = (snap(py_max).ceil().max(0.0) as u64).min(height);

    if px_min >= px_max || py_min >= py_max {
        return None;
    }

    let tw = geometry.tile_size.0 as u64;
    let th = geometry.tile_size.1 as u64;
    let tiles = TileRange::new(
        (px_min / tw) as u32,
        (py_min / th) as u32,
        (px_max.div_ceil(tw) as u32).min(geometry.grid_size.0),
        (py_max.div_ceil(th) as u32).min(geometry.grid_size.1),
    );

    Some(TileSelection {
        pixels: PixelRect::new(px_min, py_min, px_max - px_min, py_max - py_min),
        tiles,
    })
}

/// Pixel rectangle of tile `(tx, ty)` in mosaic pixel coordinates.
pub fn tile_pixel_rect(geometry: &MosaicGeometry, tx: u32, ty: u32) -> PixelRect {
    let tw = geometry.tile_size.0 as u64;
    let th = geometry.tile_size.1 as u64;
    PixelRect::new(tx as u64 * tw, ty as u64 * th, tw, th)
}

/// Transform from tile-local pixel space to world coordinates.
///
/// The centre `(0.5, 0.5)` of the tile's first pixel maps to the world
/// sample point of that pixel.
pub fn tile_to_world(geometry: &MosaicGeometry, tx: u32, ty: u32) -> AffineTransform {
    let rect = tile_pixel_rect(geometry, tx, ty);
    mosaic_grid_to_world(geometry).offset_pixels(rect.x as f64, rect.y as f64)
}

/// Horizontal world bounds of one tile.
pub fn tile_bbox(geometry: &MosaicGeometry, tx: u32, ty: u32) -> BoundingBox {
    let t = tile_to_world(geometry, tx, ty);
    let (min_x, max_y) = t.apply(0.0, 0.0);
    let (max_x, min_y) = t.apply(geometry.tile_size.0 as f64, geometry.tile_size.1 as f64);
    BoundingBox::new(min_x, min_y, max_x, max_y)
}

/// World envelope of one tile, carrying the mosaic's slice ordinates.
pub fn tile_envelope(geometry: &MosaicGeometry, crs: &Crs, tx: u32, ty: u32) -> Envelope {
    Envelope::new(crs.clone(), tile_bbox(geometry, tx, ty))
        .with_extra(geometry.slice_values().iter().map(|&v| AxisRange::point(v)))
}
