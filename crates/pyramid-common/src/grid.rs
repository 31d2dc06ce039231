//! Grid-to-world transforms and grid geometries.

use serde::{Deserialize, Serialize};

use crate::{AxisRange, BoundingBox, Crs, Envelope};

/// 2-D affine transform in the GDAL geotransform layout:
///
/// ```text
/// x = c + a * col + b * row
/// y = f + d * col + e * row
/// ```
///
/// Pixel coordinates are pixel-corner based: `(0, 0)` is the outer corner of
/// the first pixel and `(0.5, 0.5)` its centre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl AffineTransform {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0)
    }

    /// North-up transform with the upper-left corner at `(origin_x, origin_y)`
    /// and square pixels of `scale` world units. Rows grow southwards.
    pub fn north_up(origin_x: f64, origin_y: f64, scale: f64) -> Self {
        Self::new(scale, 0.0, origin_x, 0.0, -scale, origin_y)
    }

    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.c + self.a * col + self.b * row,
            self.f + self.d * col + self.e * row,
        )
    }

    fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    /// Inverse transform, `None` when the matrix is singular.
    pub fn inverse(&self) -> Option<AffineTransform> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let a = self.e / det;
        let b = -self.b / det;
        let d = -self.d / det;
        let e = self.a / det;
        let c = -(a * self.c + b * self.f);
        let f = -(d * self.c + e * self.f);
        Some(Self::new(a, b, c, d, e, f))
    }

    /// Transform applying `self` first, then `next`.
    pub fn then(&self, next: &AffineTransform) -> AffineTransform {
        AffineTransform {
            a: next.a * self.a + next.b * self.d,
            b: next.a * self.b + next.b * self.e,
            c: next.a * self.c + next.b * self.f + next.c,
            d: next.d * self.a + next.e * self.d,
            e: next.d * self.b + next.e * self.e,
            f: next.d * self.c + next.e * self.f + next.f,
        }
    }

    /// Same mapping for a grid whose pixel `(0, 0)` is this grid's pixel `(dx, dy)`.
    pub fn offset_pixels(&self, dx: f64, dy: f64) -> AffineTransform {
        let (c, f) = self.apply(dx, dy);
        AffineTransform { c, f, ..*self }
    }

    /// Pixel size along x and y, when the transform has no rotation terms.
    pub fn resolution(&self) -> Option<(f64, f64)> {
        if self.b != 0.0 || self.d != 0.0 {
            return None;
        }
        Some((self.a.abs(), self.e.abs()))
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Extent, grid-to-world transform and CRS of a gridded coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub width: usize,
    pub height: usize,
    pub grid_to_world: AffineTransform,
    pub crs: Crs,
    /// Range covered along each extra axis of `crs`.
    pub slice: Vec<AxisRange>,
}

impl GridGeometry {
    /// Two-dimensional geometry (any extra axes of `crs` are left unbounded).
    pub fn new(width: usize, height: usize, grid_to_world: AffineTransform, crs: Crs) -> Self {
        let slice = vec![AxisRange::unbounded(); crs.extra_axes.len()];
        Self {
            width,
            height,
            grid_to_world,
            crs,
            slice,
        }
    }

    pub fn with_slice(mut self, slice: Vec<AxisRange>) -> Self {
        self.slice = slice;
        self
    }

    /// Horizontal bounds of the grid (outer pixel corners).
    pub fn bbox(&self) -> BoundingBox {
        let corners = [
            self.grid_to_world.apply(0.0, 0.0),
            self.grid_to_world.apply(self.width as f64, 0.0),
            self.grid_to_world.apply(0.0, self.height as f64),
            self.grid_to_world.apply(self.width as f64, self.height as f64),
        ];
        let mut bbox = BoundingBox::new(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (x, y) in corners {
            bbox.min_x = bbox.min_x.min(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_x = bbox.max_x.max(x);
            bbox.max_y = bbox.max_y.max(y);
        }
        bbox
    }

    pub fn envelope(&self) -> Envelope {
        Envelope::new(self.crs.clone(), self.bbox()).with_extra(self.slice.iter().copied())
    }

    pub fn resolution(&self) -> Option<(f64, f64)> {
        self.grid_to_world.resolution()
    }

    /// World coordinates of the centre of pixel `(col, row)`.
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.grid_to_world.apply(col as f64 + 0.5, row as f64 + 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CrsCode;

    #[test]
    fn test_north_up_apply() {
        let t = AffineTransform::north_up(100.0, 200.0, 10.0);
        assert_eq!(t.apply(0.0, 0.0), (100.0, 200.0));
        assert_eq!(t.apply(1.0, 2.0), (110.0, 180.0));
        assert_eq!(t.resolution(), Some((10.0, 10.0)));
    }

    #[test]
    fn test_inverse_roundtrip() {
        let t = AffineTransform::new(2.0, 0.5, 10.0, -0.25, -3.0, 50.0);
        let inv = t.inverse().unwrap();
        let (x, y) = t.apply(7.5, 3.25);
        let (col, row) = inv.apply(x, y);
        assert!((col - 7.5).abs() < 1e-9);
        assert!((row - 3.25).abs() < 1e-9);
    }

    #[test]
    fn test_singular_has_no_inverse() {
        let t = AffineTransform::new(0.0, 0.0, 1.0, 0.0, 0.0, 1.0);
        assert!(t.inverse().is_none());
    }

    #[test]
    fn test_then_composes_in_order() {
        let scale = AffineTransform::new(2.0, 0.0, 0.0, 0.0, 2.0, 0.0);
        let shift = AffineTransform::new(1.0, 0.0, 5.0, 0.0, 1.0, -5.0);
        let combined = scale.then(&shift);
        assert_eq!(combined.apply(1.0, 1.0), (7.0, -3.0));
    }

    #[test]
    fn test_offset_pixels() {
        let t = AffineTransform::north_up(0.0, 0.0, 10.0);
        let shifted = t.offset_pixels(256.0, 256.0);
        assert_eq!(shifted.apply(0.0, 0.0), (2560.0, -2560.0));
        assert_eq!(shifted.apply(1.0, 1.0), t.apply(257.0, 257.0));
    }

    #[test]
    fn test_grid_geometry_bbox() {
        let geometry = GridGeometry::new(
            100,
            50,
            AffineTransform::north_up(-10.0, 20.0, 0.5),
            Crs::new(CrsCode::Epsg4326),
        );
        assert_eq!(geometry.bbox(), BoundingBox::new(-10.0, -5.0, 40.0, 20.0));
        assert_eq!(geometry.pixel_center(0, 0), (-9.75, 19.75));
    }
}
