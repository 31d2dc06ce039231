//! Level templates for new pyramids.

use pyramid_common::BoundingBox;

use crate::config::LayoutConfig;
use crate::error::{PyramidError, Result};
use crate::store::MosaicGeometry;

/// Fractional counts within this of an integer are not rounded up.
const COUNT_EPSILON: f64 = 1e-6;

/// Round a fractional pixel or tile count up, at least 1.
fn ceil_count(value: f64) -> f64 {
    (value - COUNT_EPSILON).ceil().max(1.0)
}

/// Computes the mosaic geometries of a pyramid over an extent.
pub struct PyramidLayout;

impl PyramidLayout {
    /// Geometries of every level over `extent`, level 0 at `base_scale`.
    ///
    /// Each next level is coarser by `downscale_factor`; levels stop once the
    /// smaller pixel dimension drops below `min_dimension`. Every level is
    /// repeated for each entry of `slices` (the extra-axis ordinates of one
    /// slice); an empty `slices` yields plain 2-D mosaics.
    pub fn levels(
        extent: &BoundingBox,
        base_scale: f64,
        config: &LayoutConfig,
        slices: &[Vec<f64>],
    ) -> Result<Vec<MosaicGeometry>> {
        config.validate().map_err(PyramidError::Config)?;
        if !(base_scale > 0.0 && base_scale.is_finite()) {
            return Err(PyramidError::invalid_geometry(format!(
                "base scale must be positive, got {}",
                base_scale
            )));
        }
        if !extent.is_valid() || extent.is_empty() {
            return Err(PyramidError::invalid_geometry(format!(
                "layout extent {:?} is empty",
                extent
            )));
        }

        let base_width = ceil_count(extent.width() / base_scale) as usize;
        let base_height = ceil_count(extent.height() / base_scale) as usize;
        let num_levels = config.calculate_num_levels(base_width, base_height);

        let no_slices = [Vec::new()];
        let slices = if slices.is_empty() { &no_slices[..] } else { slices };

        let mut geometries = Vec::with_capacity(num_levels * slices.len());
        for level in 0..num_levels {
            let scale = base_scale * (config.downscale_factor as f64).powi(level as i32);
            let tiles_x = ceil_count(extent.width() / scale / config.tile_size as f64) as u32;
            let tiles_y = ceil_count(extent.height() / scale / config.tile_size as f64) as u32;

            for slice in slices {
                let mut upper_left = vec![extent.min_x, extent.max_y];
                upper_left.extend_from_slice(slice);
                let id = if slice.is_empty() {
                    level.to_string()
                } else {
                    let ordinates: Vec<String> = slice.iter().map(|v| v.to_string()).collect();
                    format!("{}@{}", level, ordinates.join(","))
                };
                geometries.push(MosaicGeometry::new(
                    id,
                    scale,
                    (config.tile_size, config.tile_size),
                    (tiles_x, tiles_y),
                    upper_left,
                ));
            }
        }

        Ok(geometries)
    }
}
